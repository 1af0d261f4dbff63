#[cfg(feature = "http")]
pub mod http;
mod job;
pub mod line;
pub mod macros;
pub mod point;
pub mod publisher;
pub mod sink;
