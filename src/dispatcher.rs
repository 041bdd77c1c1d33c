//! Publishing runner requests to the broker with bounded retry.
//!
//! Kept as a narrow trait so task evaluation (`domain::programming`) never
//! depends on the concrete transport — tests substitute [`NullDispatcher`]
//! or a recording stub instead of standing up a broker connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::broker::Broker;
use crate::domain::programming::RunnerRequest;
use crate::error::AppError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 6;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: RunnerRequest) -> Result<(), AppError>;
}

/// Publishes through a [`Broker`], retrying transient publish failures with
/// exponential backoff before surfacing `DISPATCH_FAILED`.
pub struct BrokerDispatcher {
    broker: Arc<Broker>,
}

impl BrokerDispatcher {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl Dispatcher for BrokerDispatcher {
    async fn dispatch(&self, request: RunnerRequest) -> Result<(), AppError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.broker.publish_request(&request).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        submission_id = %request.submission_id,
                        attempt,
                        error = %e,
                        "publish attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }

        Err(AppError::DispatchFailed(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

/// A dispatcher that accepts every request without publishing anything.
/// Used by task-level unit tests that only care about evaluation logic.
#[derive(Default)]
pub struct NullDispatcher {
    count: std::sync::atomic::AtomicUsize,
}

impl NullDispatcher {
    pub fn dispatched_count(&self) -> usize {
        self.count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Dispatcher for NullDispatcher {
    async fn dispatch(&self, _request: RunnerRequest) -> Result<(), AppError> {
        self.count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_dispatcher_counts_dispatches() {
        let dispatcher = NullDispatcher::default();
        let request = RunnerRequest::create(
            vec![],
            crate::domain::programming::RunnerEnvironment {
                language: "python".to_string(),
                version: "3.11".to_string(),
            },
        );
        dispatcher.dispatch(request).await.unwrap();
        assert_eq!(dispatcher.dispatched_count(), 1);
    }
}
