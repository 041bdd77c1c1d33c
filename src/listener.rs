//! Long-lived subscriber on the runner result fan-out exchange. Spawned as
//! a background task from `main`, the same way the teacher's websocket
//! handler runs its own long-lived send/ping loops.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use crate::broker::Broker;
use crate::domain::task::TaskEvalStatus;
use crate::error::AppError;
use crate::store::Store;

/// The message a runner publishes once a submission package finishes.
#[derive(Debug, Deserialize)]
struct RunnerResultMessage {
    submission_id: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Run forever, applying each incoming result to the store. Never returns
/// under normal operation; reconnects are handled inside [`Broker`].
pub async fn run(broker: Arc<Broker>, store: Arc<dyn Store>) {
    loop {
        match broker.subscribe_results::<RunnerResultMessage>("contest-eval-listener").await {
            Ok(mut stream) => {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok((message, delivery)) => {
                            if let Err(e) = apply_message(&store, message).await {
                                tracing::warn!(error = %e, "failed to apply runner result");
                                continue;
                            }
                            if let Err(e) = broker.ack(&delivery).await {
                                tracing::error!(error = %e, "failed to ack runner result");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "malformed runner result message, dropping");
                        }
                    }
                }
                tracing::warn!("runner result stream ended, resubscribing");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to subscribe to runner results, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    }
}

async fn apply_message(store: &Arc<dyn Store>, message: RunnerResultMessage) -> Result<(), AppError> {
    let existing = store
        .find_task_result_by_task_submission_id(&message.submission_id)
        .await?;

    if existing.is_none() {
        tracing::warn!(
            submission_id = %message.submission_id,
            "no task result correlates to this submission id, dropping as stale"
        );
        return Ok(());
    }

    let (status, result) = match message.error {
        Some(err) => (TaskEvalStatus::Fail, Some(Value::String(err))),
        None => (TaskEvalStatus::Success, message.result),
    };

    store
        .apply_task_result(&message.submission_id, status, result)
        .await
}
