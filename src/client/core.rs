use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UserConfig;
use crate::credentials::CredentialResolver;
use crate::drivers;
use crate::pipeline::retry::{with_retry, RetryPolicy};
use crate::pipeline::{read_stream, StreamContext, StreamState};
use crate::runtime::RuntimeConfig;
use crate::transport::HttpTransport;
use crate::types::{CallStats, GenerationOutput, UnifiedRequest};
use crate::{Error, Result};

use super::builder::GatewayBuilder;
use super::execution::connect_once;
use super::signals::{InflightSnapshot, SignalsSnapshot};

type GateKey = (String, usize);

/// Unified cloud inference gateway.
///
/// Cheap to clone; clones share the HTTP client, credential resolver and
/// admission gates.
#[derive(Clone)]
pub struct Gateway {
    pub(crate) inner: Arc<GatewayInner>,
}

pub(crate) struct GatewayInner {
    pub(crate) transport: HttpTransport,
    pub(crate) credentials: CredentialResolver,
    pub(crate) retry_base_delay: Duration,
    pub(crate) retry_max_delay: Duration,
    gates: Mutex<HashMap<GateKey, Arc<Semaphore>>>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("retry_base_delay", &self.inner.retry_base_delay)
            .field("retry_max_delay", &self.inner.retry_max_delay)
            .finish_non_exhaustive()
    }
}

/// Channel form of a running generation, returned by [`Gateway::stream_tokens`].
#[derive(Debug)]
pub struct GenerationHandle {
    /// Fragments in reconciliation order. Closed when the call ends.
    pub tokens: mpsc::UnboundedReceiver<String>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<Result<GenerationOutput>>,
}

impl GenerationHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the final result. Undelivered tokens are dropped.
    pub async fn finish(self) -> Result<GenerationOutput> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(Error::Cancelled),
        }
    }
}

impl Gateway {
    pub(crate) fn from_parts(
        transport: HttpTransport,
        credentials: CredentialResolver,
        retry_base_delay: Duration,
        retry_max_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                transport,
                credentials,
                retry_base_delay,
                retry_max_delay,
                gates: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Gateway backed by the OS keychain and a default HTTP client.
    pub fn new() -> Result<Self> {
        GatewayBuilder::new().build()
    }

    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn credentials(&self) -> &CredentialResolver {
        &self.inner.credentials
    }

    /// Snapshot admission gate usage (facts only).
    pub fn signals(&self) -> SignalsSnapshot {
        let gates = self.lock_gates();
        let mut inflight: Vec<InflightSnapshot> = gates
            .iter()
            .map(|((provider_id, max), sem)| {
                let available = sem.available_permits();
                InflightSnapshot {
                    provider_id: provider_id.clone(),
                    max: *max,
                    available,
                    in_use: max.saturating_sub(available),
                }
            })
            .collect();
        inflight.sort_by(|a, b| (&a.provider_id, a.max).cmp(&(&b.provider_id, b.max)));
        SignalsSnapshot { inflight }
    }

    fn lock_gates(&self) -> std::sync::MutexGuard<'_, HashMap<GateKey, Arc<Semaphore>>> {
        self.inner
            .gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn gate(&self, key: GateKey) -> Arc<Semaphore> {
        let max = key.1.max(1);
        let mut gates = self.lock_gates();
        if let Some(gate) = gates.get(&key) {
            return gate.clone();
        }
        // Permits and waiters hold a clone; a lone reference means the gate is idle.
        gates.retain(|_, gate| Arc::strong_count(gate) > 1);
        gates
            .entry(key)
            .or_insert_with(|| Arc::new(Semaphore::new(max)))
            .clone()
    }

    /// Wait for a stream slot; the permit is held for the life of the stream.
    async fn admit(
        &self,
        runtime: &RuntimeConfig,
        cancel: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit> {
        let gate = self.gate(runtime.admission_key());
        if gate.available_permits() == 0 {
            debug!(
                provider = runtime.provider_id.as_str(),
                max_in_flight = runtime.max_in_flight,
                "waiting for admission"
            );
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            permit = gate.acquire_owned() => permit.map_err(|_| Error::Cancelled),
        }
    }

    /// Stream one completion.
    ///
    /// `on_token` sees each fragment that changed the output, in order. With
    /// streaming disabled in `config` it is called once with the final output.
    pub async fn stream_generate<F>(
        &self,
        config: &UserConfig,
        request: &UnifiedRequest,
        on_token: F,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput>
    where
        F: FnMut(&str) + Send,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let runtime = RuntimeConfig::resolve(config, &self.inner.credentials).await?;
        self.generate_with_runtime(&runtime, request, on_token, cancel)
            .await
    }

    /// Like [`stream_generate`](Self::stream_generate) with an already resolved runtime config.
    pub async fn generate_with_runtime<F>(
        &self,
        runtime: &RuntimeConfig,
        request: &UnifiedRequest,
        mut on_token: F,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutput>
    where
        F: FnMut(&str) + Send,
    {
        let started = Instant::now();
        let http = drivers::build_request(runtime, request)?;
        let privacy_mode = runtime.privacy_mode || request.metadata.privacy_mode;
        let reveal_body = runtime.reveal_error_bodies && !privacy_mode;

        let _permit = self.admit(runtime, cancel).await?;

        info!(
            provider = runtime.provider_id.as_str(),
            model = runtime.model_name.as_str(),
            request_id = request.request_id.as_str(),
            mode = request.mode.as_str(),
            "starting generation"
        );

        let policy = RetryPolicy::new(runtime.max_retries)
            .with_delays(self.inner.retry_base_delay, self.inner.retry_max_delay);
        let transport = &self.inner.transport;
        let http_ref = &http;
        let timeout = runtime.timeout();
        let opened = with_retry(&policy, cancel, move |attempt| {
            debug!(attempt, "connecting to provider");
            connect_once(transport, http_ref, timeout, privacy_mode)
        })
        .await
        .map_err(|e| {
            warn!(
                provider = runtime.provider_id.as_str(),
                request_id = request.request_id.as_str(),
                http_status = e.status_code(),
                error = %e.user_message(reveal_body),
                "generation failed to connect"
            );
            e
        })?;

        let attempts = opened.attempts;
        let stream = opened.value;
        let context = StreamContext {
            http_status: stream.http_status,
            upstream_request_id: stream.upstream_request_id.clone(),
        };

        let mut state = StreamState::started_at(started);
        let streaming = runtime.streaming_enabled;
        let read = read_stream(
            stream.body,
            runtime.parser_kind,
            &context,
            cancel,
            &mut state,
            |fragment| {
                if streaming {
                    on_token(fragment);
                }
            },
        )
        .await;

        if let Err(e) = read {
            warn!(
                provider = runtime.provider_id.as_str(),
                request_id = request.request_id.as_str(),
                http_status = stream.http_status,
                error = %e.user_message(reveal_body),
                "generation stream ended with error"
            );
            return Err(e);
        }

        let output = state.output.trim().to_string();
        if !streaming {
            on_token(&output);
        }

        let stats = CallStats {
            provider_id: runtime.provider_id.clone(),
            model: runtime.model_name.clone(),
            attempts,
            http_status: stream.http_status,
            client_request_id: request.request_id.clone(),
            upstream_request_id: stream.upstream_request_id,
            duration_ms: started.elapsed().as_millis(),
        };

        info!(
            provider = stats.provider_id.as_str(),
            model = stats.model.as_str(),
            attempts = stats.attempts,
            http_status = stats.http_status,
            duration_ms = stats.duration_ms as u64,
            first_token_ms = state.first_token_latency_ms,
            output_chars = output.chars().count(),
            "generation finished"
        );

        Ok(GenerationOutput {
            output,
            first_token_latency_ms: state.first_token_latency_ms,
            output_language_policy: runtime.output_language.clone(),
            stats,
        })
    }

    /// Run a generation on a background task and deliver tokens through a channel.
    ///
    /// The reader never waits for the consumer; dropping the receiver does not
    /// stop the call, cancelling the handle does.
    pub fn stream_tokens(&self, config: UserConfig, request: UnifiedRequest) -> GenerationHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let gateway = self.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            gateway
                .stream_generate(
                    &config,
                    &request,
                    move |fragment| {
                        let _ = tx.send(fragment.to_string());
                    },
                    &token,
                )
                .await
        });

        GenerationHandle {
            tokens: rx,
            cancel,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemorySecretStore;
    use crate::registry::ProviderId;

    fn gateway() -> Gateway {
        Gateway::builder()
            .secret_store(Arc::new(MemorySecretStore::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_gates_are_shared_per_provider_and_limit() {
        let gw = gateway();
        let a = gw.gate(("openai".into(), 2));
        let b = gw.gate(("openai".into(), 2));
        let c = gw.gate(("openai".into(), 3));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let _held = a.clone().acquire_owned().await.unwrap();
        let signals = gw.signals();
        assert_eq!(signals.inflight.len(), 2);
        assert_eq!(
            signals.inflight[0],
            InflightSnapshot {
                provider_id: "openai".into(),
                max: 2,
                available: 1,
                in_use: 1
            }
        );
    }

    #[tokio::test]
    async fn test_precancelled_call_does_nothing() {
        let gw = gateway();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gw
            .stream_generate(
                &UserConfig::default(),
                &UnifiedRequest::builder().build(),
                |_| {},
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(gw.signals().inflight.is_empty());
    }

    #[tokio::test]
    async fn test_configuration_error_before_admission() {
        let gw = gateway();
        let err = gw
            .stream_generate(
                &UserConfig::default(),
                &UnifiedRequest::builder().build(),
                |_| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingApiKey { .. }));
        assert!(gw.signals().inflight.is_empty());
    }

    #[tokio::test]
    async fn test_idle_gates_are_dropped_when_a_new_key_appears() {
        let gw = gateway();
        drop(gw.gate(("custom-a".into(), 1)));
        let _kept = gw.gate(("custom-b".into(), 2));
        let busy = gw.gate(("custom-c".into(), 1)).acquire_owned().await.unwrap();
        drop(gw.gate(("custom-d".into(), 1)));
        let _fresh = gw.gate(("custom-e".into(), 1));

        let ids: Vec<String> = gw
            .signals()
            .inflight
            .into_iter()
            .map(|g| g.provider_id)
            .collect();
        assert_eq!(ids, vec!["custom-b", "custom-c", "custom-e"]);
        drop(busy);
    }

    #[tokio::test]
    async fn test_admission_resumes_when_slot_frees() {
        let gw = gateway();
        let config = UserConfig {
            max_in_flight: 1,
            ..UserConfig::for_provider(ProviderId::Groq)
        };
        let rt = RuntimeConfig::assemble(&config, "k".into()).unwrap();
        let cancel = CancellationToken::new();

        let first = gw.admit(&rt, &cancel).await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(20), gw.admit(&rt, &cancel)).await;
        assert!(blocked.is_err());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), gw.admit(&rt, &cancel)).await;
        assert!(matches!(second, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn test_call_waits_for_slot_and_cancel_releases_it() {
        let gw = gateway();
        let held = gw.gate(("openai".into(), 1)).acquire_owned().await.unwrap();

        // Port 9 is never reached: the call must stop at admission.
        let config = UserConfig {
            max_in_flight: 1,
            api_key_input: "sk-gate".into(),
            base_url: "http://127.0.0.1:9".into(),
            ..UserConfig::for_provider(ProviderId::OpenAi)
        };
        let cancel = CancellationToken::new();
        let waiter = {
            let gw = gw.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let request = UnifiedRequest::builder().build();
                gw.stream_generate(&config, &request, |_| {}, &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        let signals = gw.signals();
        let gate = signals.for_provider("openai").unwrap();
        assert_eq!((gate.max, gate.in_use), (1, 1));

        cancel.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        drop(held);
        assert_eq!(gw.signals().for_provider("openai").unwrap().in_use, 0);
    }
}
