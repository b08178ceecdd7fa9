//! Request tracking on top of an [`AiGateway`]: every in-flight request gets
//! an id, a timeout and a cancellation handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AiGateway, AiOperation, AiPayload, AiResponse, GatewayError, ProgressFn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

struct PendingRequest {
    operation: AiOperation,
    started: Instant,
    cancel: oneshot::Sender<()>,
}

pub struct AiService {
    gateway: Arc<dyn AiGateway>,
    timeout: Duration,
    pending: Mutex<HashMap<Uuid, PendingRequest>>,
}

impl AiService {
    pub fn new(gateway: Arc<dyn AiGateway>) -> Self {
        Self::with_timeout(gateway, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(gateway: Arc<dyn AiGateway>, timeout: Duration) -> Self {
        Self {
            gateway,
            timeout,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<Uuid, PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one request. Resolves to the gateway's answer, `Timeout` when the
    /// deadline passes first, or `Cancelled` after [`cancel_all_requests`].
    ///
    /// [`cancel_all_requests`]: AiService::cancel_all_requests
    pub async fn request(
        &self,
        operation: AiOperation,
        payload: AiPayload,
        progress: Option<ProgressFn>,
    ) -> Result<AiResponse, GatewayError> {
        if payload.provider_list.is_empty() {
            return Err(GatewayError::NoProviders);
        }

        let id = Uuid::new_v4();
        let (cancel, cancelled) = oneshot::channel();
        self.pending().insert(
            id,
            PendingRequest {
                operation,
                started: Instant::now(),
                cancel,
            },
        );
        debug!(request_id = %id, operation = operation.as_str(), "AI request started");

        let outcome = tokio::select! {
            result = self.gateway.request(operation, &payload, progress) => result,
            _ = tokio::time::sleep(self.timeout) => Err(GatewayError::Timeout {
                secs: self.timeout.as_secs(),
            }),
            _ = cancelled => Err(GatewayError::Cancelled),
        };

        if let Some(done) = self.pending().remove(&id) {
            debug!(
                request_id = %id,
                elapsed_ms = done.started.elapsed().as_millis() as u64,
                "AI request finished"
            );
        }
        if let Err(e) = &outcome {
            warn!(request_id = %id, operation = operation.as_str(), "AI request failed: {}", e);
        }
        outcome
    }

    /// Cancels every in-flight request. Returns how many were cancelled.
    pub fn cancel_all_requests(&self) -> usize {
        let drained: Vec<(Uuid, PendingRequest)> = self.pending().drain().collect();
        let count = drained.len();
        for (id, request) in drained {
            debug!(request_id = %id, operation = request.operation.as_str(), "Cancelling AI request");
            let _ = request.cancel.send(());
        }
        if count > 0 {
            info!(count, "Cancelled pending AI requests");
        }
        count
    }

    pub fn pending_request_count(&self) -> usize {
        self.pending().len()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::gateway::{ProviderConfig, Route};
    use crate::models::Provider;

    /// Answers after `delay`.
    struct SlowGateway {
        delay: Duration,
    }

    #[async_trait]
    impl AiGateway for SlowGateway {
        async fn request(
            &self,
            operation: AiOperation,
            _payload: &AiPayload,
            _progress: Option<ProgressFn>,
        ) -> Result<AiResponse, GatewayError> {
            tokio::time::sleep(self.delay).await;
            Ok(AiResponse {
                result: json!({"op": operation.as_str()}),
                used_provider: "claude".to_string(),
                used_model: "m".to_string(),
            })
        }
    }

    fn payload() -> AiPayload {
        AiPayload {
            provider_list: vec![ProviderConfig {
                provider: Provider::Claude,
                api_key: "k".to_string(),
                model: "m".to_string(),
                route: Route::Direct,
            }],
            ..AiPayload::default()
        }
    }

    fn service(delay_secs: u64, timeout_secs: u64) -> AiService {
        AiService::with_timeout(
            Arc::new(SlowGateway {
                delay: Duration::from_secs(delay_secs),
            }),
            Duration::from_secs(timeout_secs),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_completes_and_clears_pending() {
        let service = service(1, 10);
        let response = service
            .request(AiOperation::AnalyzeMatch, payload(), None)
            .await
            .unwrap();
        assert_eq!(response.result["op"], "analyze-match");
        assert_eq!(service.pending_request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out() {
        let service = service(60, 5);
        let err = service
            .request(AiOperation::TailorResume, payload(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { secs: 5 }));
        assert_eq!(service.pending_request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_requests() {
        let service = Rc::new(service(60, 300));
        let running = {
            let service = Rc::clone(&service);
            async move { service.request(AiOperation::TailorResume, payload(), None).await }
        };
        let canceller = {
            let service = Rc::clone(&service);
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                assert_eq!(service.pending_request_count(), 1);
                service.cancel_all_requests()
            }
        };

        let (result, cancelled) = tokio::join!(running, canceller);
        assert_eq!(cancelled, 1);
        assert!(matches!(result, Err(GatewayError::Cancelled)));
        assert_eq!(service.pending_request_count(), 0);
        assert_eq!(service.cancel_all_requests(), 0);
    }

    #[tokio::test]
    async fn test_empty_provider_list_never_reaches_gateway() {
        let service = service(0, 1);
        let err = service
            .request(AiOperation::AnalyzeMatch, AiPayload::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoProviders));
        assert_eq!(service.pending_request_count(), 0);
    }
}
