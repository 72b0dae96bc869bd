//! gateway-cli 网关命令行工具：列出厂商、发现模型、流式生成
//!
//! Usage:
//!   gateway-cli providers                                  List built-in providers
//!   gateway-cli models <config>                            List models for a config file
//!   gateway-cli stream <config> [--system <text>] <prompt...>
//!                                                          Stream a completion to stdout
//!
//! `<config>` is a `UserConfig` snapshot in YAML or JSON. Logs go to stderr and
//! are filtered with `RUST_LOG` (default `warn`).

use std::io::Write;

use anyhow::{bail, Context};
use ghosttype_gateway::registry::{Capability, BUILTIN_PROVIDERS};
use ghosttype_gateway::{Gateway, Message, UnifiedRequest, UserConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        std::process::exit(1);
    };

    match command.as_str() {
        "providers" => cmd_providers(),
        "models" => cmd_models(&args[1..]).await,
        "stream" => cmd_stream(&args[1..]).await,
        "version" | "--version" | "-V" => {
            println!("gateway-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"gateway-cli: unified cloud inference gateway

USAGE:
    gateway-cli <COMMAND> [OPTIONS]

COMMANDS:
    providers                                   List built-in providers
    models <config>                             Discover models for a provider config
    stream <config> [--system <text>] <prompt>  Stream a completion to stdout
    version                                     Show version information
    help                                        Show this help message

ENVIRONMENT:
    RUST_LOG                    Log filter (default: warn)
    GHOSTTYPE_PROXY_URL         HTTP(S) proxy for all provider traffic
    <PROVIDER>_API_KEY          Fallback API key when none is saved"#
    );
}

fn cmd_providers() -> anyhow::Result<()> {
    println!("{:<18} {:<22} {:<14} DEFAULT MODEL", "ID", "NAME", "KIND");
    for d in BUILTIN_PROVIDERS {
        let kind = match d.capability {
            Capability::Generation(_) => "generation",
            Capability::Transcription => "transcription",
        };
        println!(
            "{:<18} {:<22} {:<14} {}",
            d.id, d.display_name, kind, d.default_model
        );
    }
    Ok(())
}

fn load_config(args: &[String]) -> anyhow::Result<UserConfig> {
    let Some(path) = args.first() else {
        bail!("missing <config> argument");
    };
    UserConfig::from_path(path).with_context(|| format!("loading config from {path}"))
}

async fn cmd_models(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let gateway = Gateway::new()?;
    let models = gateway
        .discover_models(&config)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message(config.reveals_error_bodies())))?;
    for model in models {
        println!("{model}");
    }
    Ok(())
}

async fn cmd_stream(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;

    let mut system = String::new();
    let mut prompt_words: Vec<&str> = Vec::new();
    let mut rest = args[1..].iter();
    while let Some(arg) = rest.next() {
        if arg == "--system" {
            system = rest.next().cloned().context("--system needs a value")?;
        } else {
            prompt_words.push(arg);
        }
    }
    if prompt_words.is_empty() {
        bail!("missing <prompt>");
    }

    let request = UnifiedRequest::builder()
        .mode("ask")
        .system_prompt(system)
        .message(Message::user(prompt_words.join(" ")))
        .build();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let gateway = Gateway::new()?;
    let mut stdout = std::io::stdout();
    let result = gateway
        .stream_generate(
            &config,
            &request,
            |token| {
                let _ = stdout.write_all(token.as_bytes());
                let _ = stdout.flush();
            },
            &cancel,
        )
        .await;

    match result {
        Ok(out) => {
            println!();
            eprintln!(
                "[{} {} | http {} | attempts {} | first token {} | {} ms]",
                out.stats.provider_id,
                out.stats.model,
                out.stats.http_status,
                out.stats.attempts,
                out.first_token_latency_ms
                    .map(|ms| format!("{ms:.0} ms"))
                    .unwrap_or_else(|| "-".to_string()),
                out.stats.duration_ms,
            );
            Ok(())
        }
        Err(e) => bail!(e.user_message(config.reveals_error_bodies())),
    }
}
