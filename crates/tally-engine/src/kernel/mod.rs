//! Reduction kernels and the compute pipeline built from them.
//!
//! A kernel is WGSL text with `$<NAME>` placeholders. Before compilation it is
//! expanded with the config's constants (`WORKGROUP_SIZE`,
//! `WORKGROUP_SIZE_POW2`) plus any constants set on the [`Kernel`].
//!
//! Kernel contract:
//! - one `@compute` entry point (default `main`)
//! - `@group(0) @binding(0)`: read-only `array<f32>` input
//! - `@group(0) @binding(1)`: read-write `array<f32>` output
//! - `@group(0) @binding(2..)`: optional read-write scratch arrays
//! - each workgroup reduces `WORKGROUP_SIZE` inputs and writes exactly one
//!   value to `output[workgroup_id.x]`

mod pipeline;

use std::borrow::Cow;

use tally_wgsl::Constants;

use crate::config::ReduceConfig;
use crate::error::ConfigError;

pub use pipeline::{BindingLayout, ReductionPipeline};

const SUM_WGSL: &str = include_str!("shaders/sum.wgsl");
const SUM_STAGED_WGSL: &str = include_str!("shaders/sum_staged.wgsl");

/// Kernel source plus the entry point and constants it is compiled with.
#[derive(Debug, Clone)]
pub struct Kernel {
    label: String,
    source: Cow<'static, str>,
    entry_point: String,
    constants: Constants,
}

impl Kernel {
    /// Workgroup-memory tree sum. Needs no scratch buffers.
    pub fn sum() -> Self {
        Self::from_source("tally sum", SUM_WGSL)
    }

    /// Tree sum staged through one scratch buffer (`num_scratch = 1`).
    pub fn sum_staged() -> Self {
        Self::from_source("tally staged sum", SUM_STAGED_WGSL)
    }

    pub fn from_source(label: impl Into<String>, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            entry_point: "main".to_string(),
            constants: Constants::new(),
        }
    }

    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    /// Adds a constant for `$<name>`. Overrides the config-derived constants.
    pub fn constant(mut self, name: impl Into<String>, value: impl std::fmt::Display) -> Self {
        self.constants.set(name, value);
        self
    }

    /// Source text before preprocessing.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entry(&self) -> &str {
        &self.entry_point
    }

    /// Expands placeholders against `config`'s constants and this kernel's own.
    pub fn preprocess(&self, config: &ReduceConfig) -> Result<String, ConfigError> {
        let mut constants = config.kernel_constants();
        constants.extend_from(&self.constants);
        Ok(tally_wgsl::expand(&self.source, &constants)?)
    }
}

#[cfg(test)]
mod tests {
    use tally_wgsl::{ExpandErrorKind, KernelInterface};

    use super::*;

    #[test]
    fn builtin_sum_expands_cleanly() {
        let src = Kernel::sum().preprocess(&ReduceConfig::with_workgroup_size(4)).unwrap();
        assert!(src.contains("const WORKGROUP_SIZE: u32 = 4u;"));
        assert!(src.contains("const WORKGROUP_SIZE_POW2: u32 = 4u;"));
        assert!(!src.contains("$<"));
    }

    #[test]
    fn builtin_interfaces_match_their_scratch_needs() {
        let config = ReduceConfig::default();
        let sum = KernelInterface::scan(&Kernel::sum().preprocess(&config).unwrap());
        let staged = KernelInterface::scan(&Kernel::sum_staged().preprocess(&config).unwrap());
        assert!(BindingLayout::new(0).check(&sum, "main").is_ok());
        assert!(BindingLayout::new(1).check(&staged, "main").is_ok());
    }

    #[test]
    fn kernel_constants_override_config() {
        let k = Kernel::from_source("t", "$<WORKGROUP_SIZE>").constant("WORKGROUP_SIZE", 7);
        assert_eq!(k.preprocess(&ReduceConfig::with_workgroup_size(4)).unwrap(), "7");
    }

    #[test]
    fn missing_constant_is_a_config_error() {
        let k = Kernel::from_source("t", "let x = $<UNKNOWN>;");
        match k.preprocess(&ReduceConfig::default()) {
            Err(ConfigError::Preprocess(e)) => {
                assert_eq!(e.kind, ExpandErrorKind::Unresolved("UNKNOWN".into()));
            }
            other => panic!("expected Preprocess error, got {other:?}"),
        }
    }

    #[test]
    fn entry_point_defaults_to_main() {
        assert_eq!(Kernel::sum().entry(), "main");
        assert_eq!(Kernel::sum().entry_point("reduce").entry(), "reduce");
    }
}
