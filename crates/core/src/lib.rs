#![forbid(unsafe_code)]

pub mod model;
pub mod pointer;
pub mod snapshot;
pub mod time;

pub use pointer::Pointer;
pub use time::Clock;
