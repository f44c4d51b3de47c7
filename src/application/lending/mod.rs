mod engine;
mod errors;
mod retry;

pub use engine::{Availability, LendingEngine, Outcome};
pub use errors::{Entity, ErrorKind, InvalidTransition, LendingError, Result};
pub use retry::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF_MS, RetryPolicy};
