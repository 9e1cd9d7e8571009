//! Outbound webhook delivery.
//!
//! Business handlers call [`Dispatcher::trigger`]; every matching
//! subscription then gets its own signed, retried, audited delivery run on
//! the tokio runtime.

pub mod audit;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod store;

pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{Result, WebhookError};
