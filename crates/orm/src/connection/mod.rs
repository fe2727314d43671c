//! Connection Management
//!
//! Shared pool registry for pooled drivers.

pub mod pool;

pub use pool::*;
