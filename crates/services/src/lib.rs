#![forbid(unsafe_code)]

pub mod error;
pub mod sessions;

pub use workout_core::Clock;

pub use error::SessionError;
pub use sessions::{SessionRuntimeService, StartRequest};
