//! Remote watch-progress persistence.

pub mod backend;
pub mod client;
pub mod errors;
pub mod rest;
pub mod retry;

pub use backend::ProgressBackend;
pub use client::{ProgressStore, SaveOutcome, SaveTicket};
pub use errors::ProgressStoreError;
pub use rest::RestProgressBackend;
pub use retry::RetryPolicy;
