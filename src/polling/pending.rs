use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::callback::LongPollingCallback;
use crate::storage::PullRequest;

/// Lifecycle of a parked fetch.
///
/// `Pending` is the only state with outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PendingState {
    Pending = 0,
    Succeeded = 1,
    Expired = 2,
    Failed = 3,
    Cancelled = 4,
}

impl PendingState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PendingState::Pending,
            1 => PendingState::Succeeded,
            2 => PendingState::Expired,
            3 => PendingState::Failed,
            _ => PendingState::Cancelled,
        }
    }

    /// Metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            PendingState::Pending => "pending",
            PendingState::Succeeded => "success",
            PendingState::Expired => "expire",
            PendingState::Failed => "exception",
            PendingState::Cancelled => "cancelled",
        }
    }
}

/// A fetch parked until data arrives, its deadline passes, or a pull fails.
pub(crate) struct PendingFetch {
    pub(crate) id: u64,
    pub(crate) request: PullRequest,
    pub(crate) transport_id: String,
    pub(crate) registered_at: Instant,
    pub(crate) deadline: Instant,
    state: AtomicU8,
    callback: Mutex<Option<Box<dyn LongPollingCallback>>>,
    timer: Mutex<Option<AbortHandle>>,
    /// Serializes pull attempts for this fetch.
    pub(crate) pulling: tokio::sync::Mutex<()>,
    /// Set by every data notification; cleared by the attempt that serves it.
    pub(crate) recheck: AtomicBool,
}

impl PendingFetch {
    pub(crate) fn new(
        id: u64,
        request: PullRequest,
        transport_id: String,
        deadline: Instant,
        callback: Box<dyn LongPollingCallback>,
    ) -> Self {
        Self {
            id,
            request,
            transport_id,
            registered_at: Instant::now(),
            deadline,
            state: AtomicU8::new(PendingState::Pending as u8),
            callback: Mutex::new(Some(callback)),
            timer: Mutex::new(None),
            pulling: tokio::sync::Mutex::new(()),
            recheck: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> PendingState {
        PendingState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.state() == PendingState::Pending
    }

    /// Move out of `Pending`. Exactly one caller ever gets `true`.
    pub(crate) fn transition(&self, to: PendingState) -> bool {
        debug_assert_ne!(to, PendingState::Pending);
        self.state
            .compare_exchange(
                PendingState::Pending as u8,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub(crate) fn take_callback(&self) -> Option<Box<dyn LongPollingCallback>> {
        self.callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Store the deadline timer. If the fetch already left `Pending` the
    /// timer is aborted right away.
    pub(crate) fn arm_timer(&self, handle: AbortHandle) {
        *self.timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        if !self.is_pending() {
            self.disarm_timer();
        }
    }

    pub(crate) fn disarm_timer(&self) {
        if let Some(handle) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    /// Drop the timer handle without aborting; used by the timer task itself.
    pub(crate) fn forget_timer(&self) {
        self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Whether a notification for `partition` concerns this fetch.
    pub(crate) fn watches_partition(&self, partition: i32) -> bool {
        self.request.partition.is_none_or(|p| p == partition)
    }
}
