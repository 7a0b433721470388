//! Reduction Driver.
//!
//! Two states: running while more than one element remains, done at one.
//! Each pass dispatches `ceil(elements / workgroup_size)` workgroups and the
//! partial sums they write become the next pass's elements.

mod cancel;
mod driver;
mod plan;

pub use cancel::CancelToken;
pub use driver::{PassObserver, Reduced, Reducer};
pub use plan::{plan_passes, PassPlan};
