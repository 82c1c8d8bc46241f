#[macro_use]
mod log_macros;

pub mod error;
pub mod event_loop;
pub mod lifecycle;
pub mod receiver;
pub mod tracing_init;
