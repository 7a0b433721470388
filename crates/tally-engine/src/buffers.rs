//! Buffer Set Manager.
//!
//! One reduction uses four buffer roles:
//! - Input: read by the kernel at binding 0, refilled from Output each pass
//! - Output: written by the kernel at binding 1, cleared after each pass
//! - Scratch(i): per-pass kernel workspace at binding `2 + i`
//! - HostRead: mapped by the host after the last pass, never bound
//!
//! Input, Output and every Scratch buffer share the initial padded byte length.
//! The element count shrinks each pass, but the driver only ever touches the
//! low-order live range, so buffers are allocated once.

use wgpu::util::DeviceExt;

use crate::config::ReduceConfig;
use crate::dataset::Dataset;
use crate::device::ComputeDevice;
use crate::error::{ConfigError, ReduceError};

pub(crate) const ELEMENT_SIZE: u64 = std::mem::size_of::<f32>() as u64;

// ── BufferRole ────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferRole {
    Input,
    Output,
    Scratch(usize),
    HostRead,
}

impl BufferRole {
    /// Bind group slot, or `None` for the host-side buffer.
    pub fn binding(self) -> Option<u32> {
        match self {
            BufferRole::Input => Some(0),
            BufferRole::Output => Some(1),
            BufferRole::Scratch(i) => Some(2 + i as u32),
            BufferRole::HostRead => None,
        }
    }

    pub fn usage(self) -> wgpu::BufferUsages {
        use wgpu::BufferUsages as U;
        match self {
            BufferRole::Input => U::STORAGE | U::COPY_DST,
            // Source of the host and ping-pong copies; destination of clears.
            BufferRole::Output => U::STORAGE | U::COPY_SRC | U::COPY_DST,
            BufferRole::Scratch(_) => U::STORAGE,
            BufferRole::HostRead => U::MAP_READ | U::COPY_DST,
        }
    }

    pub fn label(self) -> String {
        match self {
            BufferRole::Input => "tally input buffer".to_string(),
            BufferRole::Output => "tally output buffer".to_string(),
            BufferRole::Scratch(i) => format!("tally scratch buffer ({i})"),
            BufferRole::HostRead => "tally host read buffer".to_string(),
        }
    }
}

// ── RoleBuffer ────────────────────────────────────────────────────────────

/// A device buffer tagged with the role it plays.
#[derive(Debug)]
pub struct RoleBuffer {
    role: BufferRole,
    buffer: wgpu::Buffer,
}

impl RoleBuffer {
    fn new(device: &wgpu::Device, role: BufferRole, size: u64) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&role.label()),
            size,
            usage: role.usage(),
            mapped_at_creation: false,
        });
        Self { role, buffer }
    }

    fn with_contents(device: &wgpu::Device, role: BufferRole, contents: &[f32]) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&role.label()),
            contents: bytemuck::cast_slice(contents),
            usage: role.usage(),
        });
        Self { role, buffer }
    }

    pub fn role(&self) -> BufferRole {
        self.role
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn byte_len(&self) -> u64 {
        self.buffer.size()
    }
}

// ── BufferSet ─────────────────────────────────────────────────────────────

/// The buffers one reduction owns, from upload to readback.
///
/// A `BufferSet` is consumed by [`crate::Reducer::run`]; Output is cleared
/// destructively each pass, so a set is never shared or reread.
#[derive(Debug)]
pub struct BufferSet {
    input: RoleBuffer,
    output: RoleBuffer,
    scratch: Vec<RoleBuffer>,
    host_read: RoleBuffer,
    len: usize,
    padded_len: usize,
    workgroup_size: u32,
}

impl BufferSet {
    pub fn input(&self) -> &RoleBuffer {
        &self.input
    }

    pub fn output(&self) -> &RoleBuffer {
        &self.output
    }

    pub fn scratch(&self) -> &[RoleBuffer] {
        &self.scratch
    }

    pub fn host_read(&self) -> &RoleBuffer {
        &self.host_read
    }

    /// Element count before padding.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn padded_len(&self) -> usize {
        self.padded_len
    }

    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    /// Bound buffers in slot order: Input, Output, Scratch(0..).
    pub fn bound(&self) -> impl Iterator<Item = &RoleBuffer> {
        [&self.input, &self.output].into_iter().chain(self.scratch.iter())
    }
}

/// Uploads `dataset`, padded to the workgroup size, and allocates every role.
pub fn allocate(
    device: &ComputeDevice,
    dataset: &Dataset,
    config: &ReduceConfig,
) -> Result<BufferSet, ReduceError> {
    config.validate()?;
    let workgroup_size = config.workgroup_size;
    let padded = dataset.padded(workgroup_size);
    check_limits(&device.limits(), padded.len(), workgroup_size)?;

    let bytes = padded.len() as u64 * ELEMENT_SIZE;
    let raw = device.device();

    let input = RoleBuffer::with_contents(raw, BufferRole::Input, &padded);
    let output = RoleBuffer::new(raw, BufferRole::Output, bytes);
    let scratch = (0..config.num_scratch)
        .map(|i| RoleBuffer::new(raw, BufferRole::Scratch(i), bytes))
        .collect();
    // Sized once at the largest result; later passes only fill its low elements.
    let host_read = RoleBuffer::new(raw, BufferRole::HostRead, bytes);

    debug_assert_eq!(input.byte_len(), output.byte_len());
    log::debug!(
        "allocated buffer set: {} elements padded to {} ({} bytes each), {} scratch",
        dataset.len(),
        padded.len(),
        bytes,
        config.num_scratch
    );

    Ok(BufferSet {
        input,
        output,
        scratch,
        host_read,
        len: dataset.len(),
        padded_len: padded.len(),
        workgroup_size,
    })
}

/// Checks a padded dataset against the device's compute and binding limits.
pub(crate) fn check_limits(
    limits: &wgpu::Limits,
    padded_len: usize,
    workgroup_size: u32,
) -> Result<(), ConfigError> {
    let wg_limit = limits
        .max_compute_invocations_per_workgroup
        .min(limits.max_compute_workgroup_size_x);
    if workgroup_size > wg_limit {
        return Err(ConfigError::WorkgroupTooLarge {
            requested: workgroup_size,
            limit: wg_limit,
        });
    }

    let bytes = padded_len as u64 * ELEMENT_SIZE;
    let byte_limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    if bytes > byte_limit {
        return Err(ConfigError::DatasetTooLarge {
            bytes,
            limit: byte_limit,
        });
    }

    let workgroups = (padded_len / workgroup_size as usize) as u64;
    if workgroups > u64::from(limits.max_compute_workgroups_per_dimension) {
        return Err(ConfigError::TooManyWorkgroups {
            workgroups,
            limit: limits.max_compute_workgroups_per_dimension,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_slots_follow_role_order() {
        assert_eq!(BufferRole::Input.binding(), Some(0));
        assert_eq!(BufferRole::Output.binding(), Some(1));
        assert_eq!(BufferRole::Scratch(0).binding(), Some(2));
        assert_eq!(BufferRole::Scratch(3).binding(), Some(5));
        assert_eq!(BufferRole::HostRead.binding(), None);
    }

    #[test]
    fn output_is_copy_source_and_destination() {
        let u = BufferRole::Output.usage();
        assert!(u.contains(wgpu::BufferUsages::COPY_SRC));
        assert!(u.contains(wgpu::BufferUsages::COPY_DST));
        assert!(u.contains(wgpu::BufferUsages::STORAGE));
    }

    #[test]
    fn host_read_is_mappable_and_never_bound() {
        let u = BufferRole::HostRead.usage();
        assert!(u.contains(wgpu::BufferUsages::MAP_READ));
        assert!(!u.contains(wgpu::BufferUsages::STORAGE));
    }

    #[test]
    fn scratch_is_not_copied_to_host() {
        assert!(!BufferRole::Scratch(0).usage().contains(wgpu::BufferUsages::COPY_SRC));
    }

    #[test]
    fn default_limits_accept_small_dataset() {
        assert!(check_limits(&wgpu::Limits::default(), 1024, 64).is_ok());
    }

    #[test]
    fn workgroup_over_device_limit_is_rejected() {
        let err = check_limits(&wgpu::Limits::default(), 4096, 4096).unwrap_err();
        assert!(matches!(err, ConfigError::WorkgroupTooLarge { requested: 4096, .. }));
    }

    #[test]
    fn dataset_over_binding_limit_is_rejected() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 1024,
            ..wgpu::Limits::default()
        };
        let err = check_limits(&limits, 512, 64).unwrap_err();
        assert!(matches!(err, ConfigError::DatasetTooLarge { bytes: 2048, .. }));
    }

    #[test]
    fn too_many_first_pass_workgroups_is_rejected() {
        let limits = wgpu::Limits {
            max_compute_workgroups_per_dimension: 4,
            ..wgpu::Limits::default()
        };
        let err = check_limits(&limits, 2 * 5, 2).unwrap_err();
        assert!(matches!(err, ConfigError::TooManyWorkgroups { workgroups: 5, limit: 4 }));
    }
}
