//! Compute device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a surface
//! - adopting a device supplied by the host environment
//! - scoping device-side errors to the call that raised them
//! - waiting on queue submissions

mod context;
mod error;
mod init;

pub use context::ComputeDevice;
pub use init::ComputeInit;
