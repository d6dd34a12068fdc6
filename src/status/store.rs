//! Single source of truth for the current lifecycle status

use super::{LifecycleStatus, StatusEmitter, StatusEvent};
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::Cell;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::{info, warn};

struct Current {
    status: LifecycleStatus,
    sequence: u64,
    /// Applied transitions not yet delivered, in sequence order
    undelivered: VecDeque<(u64, LifecycleStatus)>,
}

/// Holds the current status and applies transitions.
///
/// Transitions are applied and queued under one lock, then delivered by the
/// outermost `transition` call on the emitting thread. Observers therefore
/// see every status in the order it was applied, and a transition issued
/// from inside an observer is delivered after the one being observed.
pub struct StatusStore {
    current: Mutex<Current>,
    // Set while a thread is draining the queue
    emitting: ReentrantMutex<Cell<bool>>,
    emitter: StatusEmitter,
}

/// Clears the draining flag even if an observer panics
struct Draining<'a>(&'a Cell<bool>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl StatusStore {
    /// Create the store in `init` and emit that initial status once
    pub fn new(emitter: StatusEmitter) -> Self {
        let store = Self {
            current: Mutex::new(Current {
                status: LifecycleStatus::Init,
                sequence: 0,
                undelivered: VecDeque::new(),
            }),
            emitting: ReentrantMutex::new(Cell::new(false)),
            emitter,
        };
        store.emitter.emit(0, &LifecycleStatus::Init);
        store
    }

    pub fn get(&self) -> LifecycleStatus {
        self.current.lock().status.clone()
    }

    /// Replace the current status. Any status may follow any other.
    pub fn transition(&self, next: LifecycleStatus) {
        let emitting = self.emitting.lock();

        {
            let mut current = self.current.lock();

            let from = current.status.name();
            let to = next.name();
            if LifecycleStatus::is_expected_transition(from, to) {
                info!("Lifecycle transition {} -> {}", from, to);
            } else {
                warn!("Unusual lifecycle transition {} -> {}", from, to);
            }

            current.sequence += 1;
            current.status = next.clone();
            let sequence = current.sequence;
            current.undelivered.push_back((sequence, next));
        }

        // Nested call from an observer; the outer call delivers it
        if emitting.replace(true) {
            return;
        }
        let _draining = Draining(&emitting);

        loop {
            let Some((sequence, status)) = self.current.lock().undelivered.pop_front() else {
                break;
            };
            self.emitter.emit(sequence, &status);
        }
    }

    /// Number of transitions applied so far
    pub fn sequence(&self) -> u64 {
        self.current.lock().sequence
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.emitter.subscribe()
    }
}
