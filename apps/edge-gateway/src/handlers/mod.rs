//! HTTP handlers

pub mod alarm;
pub mod health;
pub mod kv;
pub mod metrics;
pub mod ports;
pub mod resources;

pub use alarm::*;
pub use health::*;
pub use kv::*;
pub use metrics::*;
pub use ports::*;
pub use resources::*;
