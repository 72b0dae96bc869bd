//! 流水线处理模块：字节流 → SSE 行 → 方言片段 → 合并后的输出
//!
//! # Streaming pipeline
//!
//! ```text
//! HTTP bytes → decode::sse_lines → drivers::parse_event → reconcile → caller
//!                 │                      │                    │
//!              line split,           dialect text,        monotonic output,
//!              [DONE]                vendor errors        per-token callback
//! ```
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | SSE line splitting and `data:` classification |
//! | [`reconcile`] | Delta / cumulative fragment merging |
//! | [`retry`] | Resilience wrapper around connect-and-validate |

pub mod decode;
pub mod reconcile;
pub mod retry;

use bytes::Bytes;
use futures::StreamExt;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::drivers::{parse_event, ParseCursor, ParsedEvent, ParserKind};
use crate::{BoxStream, Error, Result};

use decode::SseLine;
use reconcile::reconcile;

/// Mutable state of one streaming call.
#[derive(Debug, Clone)]
pub struct StreamState {
    /// Reconciled output so far.
    pub output: String,
    /// Raw parser accumulator carried between events.
    pub cursor: ParseCursor,
    pub first_token_latency_ms: Option<f64>,
    pub started: Instant,
}

impl StreamState {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self {
            output: String::new(),
            cursor: ParseCursor::default(),
            first_token_latency_ms: None,
            started,
        }
    }

    fn mark_first_token(&mut self) {
        if self.first_token_latency_ms.is_none() {
            self.first_token_latency_ms = Some(self.started.elapsed().as_secs_f64() * 1000.0);
        }
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

/// Facts about the open response needed to report in-stream failures.
#[derive(Debug, Clone, Default)]
pub struct StreamContext {
    pub http_status: u16,
    pub upstream_request_id: Option<String>,
}

/// Consume an SSE body until `[DONE]` or EOF, reconciling fragments into `state`.
///
/// `on_fragment` receives each raw fragment that changed the output, after the
/// state update. Fails with `EmptyLlmResponse` when the stream ends cleanly but
/// the output is blank.
pub async fn read_stream<F>(
    body: BoxStream<'static, Bytes>,
    parser: ParserKind,
    context: &StreamContext,
    cancel: &CancellationToken,
    state: &mut StreamState,
    mut on_fragment: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let mut lines = decode::sse_lines(body);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            next = lines.next() => next,
        };
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let payload = match next {
            None | Some(Ok(SseLine::Done)) => break,
            Some(Err(e)) => return Err(e),
            Some(Ok(SseLine::Data(payload))) => payload,
        };

        let fragment = match parse_event(parser, &payload, &state.cursor) {
            Ok(ParsedEvent::Fragment(f)) => f,
            Ok(ParsedEvent::Skip) => continue,
            Ok(ParsedEvent::VendorError(body)) => {
                return Err(Error::provider_failure(
                    context.http_status,
                    &body.to_string(),
                    context.upstream_request_id.clone(),
                ));
            }
            Err(e) => {
                debug!(parser = ?parser, error = %e, "skipping malformed stream event");
                continue;
            }
        };

        state.cursor = fragment.cursor;
        if fragment.text.is_empty() {
            continue;
        }
        state.mark_first_token();
        if reconcile(&mut state.output, &fragment.text).changed() {
            on_fragment(&fragment.text);
        }
    }

    if state.output.trim().is_empty() {
        return Err(Error::EmptyLlmResponse);
    }
    Ok(())
}
