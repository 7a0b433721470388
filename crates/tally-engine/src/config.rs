use std::time::Duration;

use tally_wgsl::Constants;

use crate::error::ConfigError;

/// When the driver copies Output into the host-readable buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum HostCopy {
    /// Every pass, so the latest partial result is always host-visible.
    #[default]
    EveryPass,
    /// Only in the batch that produces the final scalar.
    FinalPass,
}

/// Parameters for one reduction request.
///
/// Passed explicitly to buffer allocation, pipeline build and the driver; there
/// is no process-wide default workgroup size.
#[derive(Debug, Clone)]
pub struct ReduceConfig {
    /// Invocations per workgroup; each workgroup reduces this many elements to one.
    pub workgroup_size: u32,

    /// Scratch buffers bound at slots `2..2 + num_scratch`.
    pub num_scratch: usize,

    pub host_copy: HostCopy,

    /// Upper bound on waiting for the result buffer to become host-visible.
    ///
    /// `None` waits indefinitely.
    pub map_timeout: Option<Duration>,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            workgroup_size: 64,
            num_scratch: 0,
            host_copy: HostCopy::EveryPass,
            map_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl ReduceConfig {
    pub fn with_workgroup_size(workgroup_size: u32) -> Self {
        Self {
            workgroup_size,
            ..Self::default()
        }
    }

    /// Device-independent checks.
    ///
    /// A workgroup size of 1 would never shrink the element count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workgroup_size < 2 {
            return Err(ConfigError::WorkgroupTooSmall(self.workgroup_size));
        }
        Ok(())
    }

    /// Least power of two ≥ `workgroup_size`.
    pub fn workgroup_size_pow2(&self) -> u32 {
        self.workgroup_size.next_power_of_two()
    }

    /// Constants every kernel source may reference.
    pub fn kernel_constants(&self) -> Constants {
        Constants::new()
            .with("WORKGROUP_SIZE", self.workgroup_size)
            .with("WORKGROUP_SIZE_POW2", self.workgroup_size_pow2())
    }
}

/// Rounds `n` up to the next multiple of `multiple`.
#[inline]
pub(crate) fn round_up(n: usize, multiple: usize) -> usize {
    n.div_ceil(multiple) * multiple
}
