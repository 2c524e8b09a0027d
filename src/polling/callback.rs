use crate::error::{Error, Result};
use crate::storage::PullResult;

/// Completion hooks of a parked fetch.
///
/// The engine invokes exactly one of these methods, exactly once, and never
/// for a fetch cancelled because its connection closed. Implementations
/// write the response themselves; an `Err` is logged by the engine and
/// otherwise ignored.
pub trait LongPollingCallback: Send + Sync + 'static {
    /// A pull returned data (or a non-success code) before the deadline.
    fn on_success(&self, result: PullResult) -> Result<()>;

    /// The deadline elapsed without data.
    fn on_expire(&self) -> Result<()>;

    /// A pull failed.
    fn on_exception(&self, error: Error) -> Result<()>;
}
