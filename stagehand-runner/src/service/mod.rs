//! Service layer
//!
//! Log buffering and forwarding. The tracing layer writes into the buffer,
//! the forwarder drains it to the log channel.

pub mod log_buffer;
pub mod log_forwarder;

// Re-export traits
pub use log_buffer::LogBufferService;

// Re-export implementations
pub use log_buffer::InMemoryLogBuffer;
pub use log_forwarder::{forward, spawn_log_forwarder};
