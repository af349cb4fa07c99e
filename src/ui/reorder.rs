//! Serialised category-order writes.
//!
//! One worker task drains an unbounded queue and performs one write at a
//! time, in submission order. Outcomes go back to the event loop as
//! `AppEvent`s; a failed job never stops the worker.
use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{ApiError, Category, TrackerApi, ValidationError};
use crate::app::AppEvent;

use super::helpers::catch_task_panic;

/// Destination of reorder jobs.
pub trait OrderWriter: Send + Sync + 'static {
    /// Persist `order` and return the server's authoritative category list.
    fn write_order(
        &self,
        order: Vec<String>,
    ) -> impl Future<Output = Result<Vec<Category>, ApiError>> + Send;
}

impl OrderWriter for TrackerApi {
    async fn write_order(&self, order: Vec<String>) -> Result<Vec<Category>, ApiError> {
        self.reorder_categories(&order).await
    }
}

/// Reject orders that cannot change anything.
pub fn check_order(order: &[String]) -> Result<(), ValidationError> {
    if order.len() < 2 {
        return Err(ValidationError::NothingToReorder);
    }
    Ok(())
}

/// Handle to the reorder worker.
pub struct ReorderQueue {
    tx: mpsc::UnboundedSender<Vec<String>>,
    worker: JoinHandle<()>,
}

impl ReorderQueue {
    pub fn spawn<W: OrderWriter>(writer: W, events: mpsc::Sender<AppEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(worker_loop(writer, rx, events));
        Self { tx, worker }
    }

    /// Append a job. Orders with fewer than two names are rejected.
    pub fn enqueue(&self, order: Vec<String>) -> Result<(), ValidationError> {
        check_order(&order)?;
        tracing::debug!(?order, "Queueing category reorder");
        if self.tx.send(order).is_err() {
            tracing::warn!("Reorder worker stopped, dropping job");
        }
        Ok(())
    }
}

impl Drop for ReorderQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn worker_loop<W: OrderWriter>(
    writer: W,
    mut rx: mpsc::UnboundedReceiver<Vec<String>>,
    events: mpsc::Sender<AppEvent>,
) {
    while let Some(order) = rx.recv().await {
        let event = match catch_task_panic(writer.write_order(order.clone())).await {
            Ok(Ok(categories)) => {
                tracing::info!(count = categories.len(), "Category order saved");
                AppEvent::ReorderSaved { order, categories }
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, ?order, "Category reorder failed");
                AppEvent::ReorderFailed {
                    order,
                    error: e.to_string(),
                }
            }
            Err(panic_msg) => {
                tracing::error!(error = %panic_msg, "Reorder task panicked");
                AppEvent::TaskPanicked {
                    task: "reorder",
                    error: panic_msg,
                }
            }
        };
        if events.send(event).await.is_err() {
            tracing::debug!("Event receiver dropped, stopping reorder worker");
            return;
        }
    }
}
