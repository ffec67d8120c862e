//! Hardware abstraction boundary: one module per supported target,
//! each implementing [`crate::port::Port`]. Only built for real
//! targets (`target_os = "none"`) — host test runs never pull this in.

pub mod cortex_m4;
