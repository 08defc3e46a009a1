//! Delivery contracts.
//!
//! The dispatcher never talks to the network itself. It hands outbound
//! requests to a [`Delivery`] implementation and reports each completion,
//! exactly once, to a [`ResultObserver`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{DeliveryError, DeliveryResult};
use crate::foundation::event::{BotToken, ConversationKey};

use super::outbound::{ApiResponse, OutboundRequest};

// ============================================================================
// Delivery
// ============================================================================

/// Sends outbound requests to the chat platform.
///
/// A successful return carries the platform envelope even when it says
/// `ok: false`; `Err` means the request did not complete.
#[async_trait]
pub trait Delivery: Send + Sync + 'static {
    async fn deliver(&self, token: &BotToken, request: OutboundRequest)
    -> DeliveryResult<ApiResponse>;
}

/// A shared delivery collaborator.
pub type BoxedDelivery = Arc<dyn Delivery>;

/// Delivery backed by an async closure.
///
/// ```rust,ignore
/// let delivery = delivery_fn(|token, request| async move {
///     http.post(token, request).await
/// });
/// ```
pub struct DeliveryFn<F> {
    f: F,
}

/// Wraps an async closure as a [`Delivery`].
pub fn delivery_fn<F, Fut>(f: F) -> DeliveryFn<F>
where
    F: Fn(BotToken, OutboundRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DeliveryResult<ApiResponse>> + Send + 'static,
{
    DeliveryFn { f }
}

#[async_trait]
impl<F, Fut> Delivery for DeliveryFn<F>
where
    F: Fn(BotToken, OutboundRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DeliveryResult<ApiResponse>> + Send + 'static,
{
    async fn deliver(
        &self,
        token: &BotToken,
        request: OutboundRequest,
    ) -> DeliveryResult<ApiResponse> {
        (self.f)(token.clone(), request).await
    }
}

// ============================================================================
// Result observation
// ============================================================================

/// The completion of one delivery, with enough context to trace it back.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub token: BotToken,
    pub update_id: i64,
    pub conversation: ConversationKey,
    pub handler_id: Arc<str>,
    pub method: String,
    pub outcome: Result<ApiResponse, DeliveryError>,
}

impl DeliveryReport {
    /// True when the request completed and the platform accepted it.
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, Ok(response) if response.ok)
    }
}

/// Receives every delivery completion.
///
/// Called from the task that ran the delivery, never from the dispatch task.
pub trait ResultObserver: Send + Sync + 'static {
    fn on_result(&self, report: DeliveryReport);
}

impl<F> ResultObserver for F
where
    F: Fn(DeliveryReport) + Send + Sync + 'static,
{
    fn on_result(&self, report: DeliveryReport) {
        self(report)
    }
}

pub type BoxedObserver = Arc<dyn ResultObserver>;

/// The default observer: logs failures, stays quiet on success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ResultObserver for LoggingObserver {
    fn on_result(&self, report: DeliveryReport) {
        match &report.outcome {
            Ok(response) if response.ok => {
                debug!(
                    token = %report.token,
                    conversation = %report.conversation,
                    handler = %report.handler_id,
                    method = %report.method,
                    "Delivered"
                );
            }
            Ok(response) => {
                warn!(
                    token = %report.token,
                    conversation = %report.conversation,
                    handler = %report.handler_id,
                    method = %report.method,
                    code = response.error_code.unwrap_or_default(),
                    description = response.description.as_deref().unwrap_or(""),
                    "Platform rejected outbound request"
                );
            }
            Err(error) => {
                warn!(
                    token = %report.token,
                    conversation = %report.conversation,
                    handler = %report.handler_id,
                    method = %report.method,
                    error = %error,
                    "Delivery failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_delivery_fn() {
        let delivery = delivery_fn(|token, request| async move {
            Ok(ApiResponse::success(serde_json::json!({
                "token": token.as_str(),
                "method": request.method(),
            })))
        });

        let response = delivery
            .deliver(&BotToken::new("t"), OutboundRequest::send_message(1, "hi"))
            .await
            .unwrap();
        assert!(response.ok);
        assert_eq!(response.result.unwrap()["method"], "sendMessage");
    }

    #[test]
    fn test_closure_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: BoxedObserver = Arc::new(move |report: DeliveryReport| {
            sink.lock().unwrap().push(report.is_success());
        });

        let report = |outcome| DeliveryReport {
            token: BotToken::new("t"),
            update_id: 1,
            conversation: ConversationKey::Chat(1),
            handler_id: Arc::from("h"),
            method: "sendMessage".into(),
            outcome,
        };

        observer.on_result(report(Ok(ApiResponse::success(serde_json::Value::Null))));
        observer.on_result(report(Ok(ApiResponse::failure(403, "blocked"))));
        observer.on_result(report(Err(DeliveryError::Timeout)));

        assert_eq!(*seen.lock().unwrap(), [true, false, false]);
    }
}
