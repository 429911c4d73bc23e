//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Fallback sweep: removes expired fallback store entries at a fixed interval

mod sweep;

pub use sweep::spawn_sweep_task;
