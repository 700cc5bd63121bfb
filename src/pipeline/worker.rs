//! Record worker pool
//!
//! Every record is mapped on the blocking pool, with a semaphore bounding how
//! many run at once. A record that errors or panics only fails itself: the
//! join error is turned into a `RecordProcessing` failure for that index and
//! its siblings carry on.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, Instrument};

use super::{ProcessedRecord, RecordFailure};
use crate::error::{NormalizerError, Result};
use serde_json::Value;

pub type RecordResult = std::result::Result<ProcessedRecord, RecordFailure>;

/// Processes `(index, raw)` jobs with at most `worker_count` in flight.
///
/// Results come back in job order.
pub async fn run<F>(jobs: Vec<(usize, Value)>, worker_count: usize, process: F) -> Vec<RecordResult>
where
    F: Fn(usize, &Value) -> Result<ProcessedRecord> + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
    let process = Arc::new(process);

    debug!(jobs = jobs.len(), workers = worker_count, "Starting record workers");

    let tasks = jobs.into_iter().map(|(index, raw)| {
        let semaphore = semaphore.clone();
        let process = process.clone();

        async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return Err(RecordFailure::new(index, format!("worker pool closed: {e}"))),
            };

            let handle = tokio::task::spawn_blocking(move || process(index, &raw));
            match handle.await {
                Ok(Ok(processed)) => Ok(processed),
                Ok(Err(e)) => {
                    error!(index, error = %e, "Record failed");
                    Err(RecordFailure::from_error(index, e))
                }
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        join_error.to_string()
                    };
                    error!(index, reason = %reason, "Record worker panicked");
                    Err(RecordFailure::new(index, format!("worker panicked: {reason}")))
                }
            }
        }
        .instrument(tracing::debug_span!("record", index))
    });

    futures::future::join_all(tasks).await
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Rejects raw records that are not JSON objects
pub fn ensure_object(index: usize, raw: &Value) -> Result<()> {
    if raw.is_object() {
        Ok(())
    } else {
        Err(NormalizerError::RecordProcessing {
            index,
            reason: format!("expected a JSON object, got {}", json_kind(raw)),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
