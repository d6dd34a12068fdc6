//! Fan-out of status changes to observers and subscribers

use super::{ErrorData, LifecycleStatus, StatusEvent, SuccessData};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Callback invoked with every status change
pub type StatusObserver = Arc<dyn Fn(&LifecycleStatus) + Send + Sync>;
pub type ErrorObserver = Arc<dyn Fn(&ErrorData) + Send + Sync>;
pub type SuccessObserver = Arc<dyn Fn(&SuccessData) + Send + Sync>;

/// Delivers each status exactly once to every registered observer.
///
/// Callers must serialize `emit`; [`super::StatusStore`] does so by emitting
/// under its lock.
pub struct StatusEmitter {
    session_id: Uuid,
    on_status: Vec<StatusObserver>,
    on_error: Vec<ErrorObserver>,
    on_success: Vec<SuccessObserver>,
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusEmitter {
    pub fn new(session_id: Uuid, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            session_id,
            on_status: Vec::new(),
            on_error: Vec::new(),
            on_success: Vec::new(),
            sender,
        }
    }

    pub fn on_status(&mut self, observer: StatusObserver) {
        self.on_status.push(observer);
    }

    pub fn on_error(&mut self, observer: ErrorObserver) {
        self.on_error.push(observer);
    }

    pub fn on_success(&mut self, observer: SuccessObserver) {
        self.on_success.push(observer);
    }

    /// Receiver for status events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, sequence: u64, status: &LifecycleStatus) {
        debug!(
            session = %self.session_id,
            sequence,
            status = %status.name(),
            "Emitting lifecycle status"
        );

        for observer in &self.on_status {
            observer(status);
        }

        match status {
            LifecycleStatus::Error(data) => {
                for observer in &self.on_error {
                    observer(data);
                }
            }
            LifecycleStatus::Success(data) => {
                for observer in &self.on_success {
                    observer(data);
                }
            }
            _ => {}
        }

        // No subscribers is fine
        let _ = self.sender.send(StatusEvent {
            session_id: self.session_id,
            sequence,
            status: status.clone(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        });
    }
}
