mod service;
mod view;

// Public API of the session runtime.
pub use crate::error::SessionError;
pub use service::{SessionRuntimeService, StartRequest};
