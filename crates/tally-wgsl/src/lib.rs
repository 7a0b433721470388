//! Kernel-source tooling for **tally** WGSL reduction kernels.
//!
//! This crate is intentionally dependency-free so kernel sources can be
//! checked by editors and linters without pulling in any GPU code.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`error`] | `ExpandError` |
//! | [`scan`] | `Scanner`, `Placeholder` |
//! | [`expand`] | `Constants`, `expand` entry point |
//! | [`interface`] | `KernelInterface` (bindings + entry points) |
//!
//! # Quick start
//!
//! ```rust
//! use tally_wgsl::{expand, Constants};
//!
//! let src = "@compute @workgroup_size($<WORKGROUP_SIZE>) fn main() {}";
//! let out = expand(src, &Constants::new().with("WORKGROUP_SIZE", 64)).unwrap();
//! assert_eq!(out, "@compute @workgroup_size(64) fn main() {}");
//! ```

pub mod error;
pub mod expand;
pub mod interface;
pub mod scan;

pub use error::{ExpandError, ExpandErrorKind};
pub use expand::{expand, Constants};
pub use interface::KernelInterface;
