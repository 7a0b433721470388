use tally_wgsl::KernelInterface;

use crate::buffers::{BufferRole, BufferSet};
use crate::config::ReduceConfig;
use crate::device::ComputeDevice;
use crate::error::{ConfigError, ReduceError};

use super::Kernel;

// ── BindingLayout ─────────────────────────────────────────────────────────

/// Fixed slot mapping: 0 → Input (read-only), 1 → Output, 2.. → Scratch.
///
/// Slots never change between passes; only the bytes behind them do.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BindingLayout {
    num_scratch: usize,
}

impl BindingLayout {
    pub fn new(num_scratch: usize) -> Self {
        Self { num_scratch }
    }

    pub fn num_scratch(&self) -> usize {
        self.num_scratch
    }

    /// Bound roles in slot order.
    pub fn roles(&self) -> impl Iterator<Item = BufferRole> {
        [BufferRole::Input, BufferRole::Output]
            .into_iter()
            .chain((0..self.num_scratch).map(BufferRole::Scratch))
    }

    pub fn slots(&self) -> Vec<u32> {
        self.roles().filter_map(BufferRole::binding).collect()
    }

    /// Verifies a kernel declares exactly this layout's slots and the entry point.
    ///
    /// When some binding argument could not be evaluated the slot comparison is
    /// left to the device, which rejects a mismatched layout at pipeline creation.
    pub fn check(&self, interface: &KernelInterface, entry_point: &str) -> Result<(), ConfigError> {
        let expected = self.slots();
        let declared: Vec<u32> = interface.bindings.iter().copied().collect();
        if interface.unresolved_bindings {
            log::debug!("kernel binding slots not statically known; found {declared:?}");
        } else if declared != expected {
            return Err(ConfigError::BindingMismatch { declared, expected });
        }
        if !interface.has_entry_point(entry_point) {
            return Err(ConfigError::MissingEntryPoint(entry_point.to_string()));
        }
        Ok(())
    }

    fn entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        self.roles()
            .filter_map(|role| {
                let binding = role.binding()?;
                Some(storage_entry(binding, role == BufferRole::Input))
            })
            .collect()
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

// ── ReductionPipeline ─────────────────────────────────────────────────────

/// A compiled kernel paired with its binding layout.
///
/// Immutable once built; reusable for any [`BufferSet`] with the same scratch
/// count and workgroup size.
pub struct ReductionPipeline {
    layout: BindingLayout,
    workgroup_size: u32,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl ReductionPipeline {
    /// Builds a pipeline whose layout matches `buffers`.
    pub async fn build(
        device: &ComputeDevice,
        buffers: &BufferSet,
        kernel: &Kernel,
        config: &ReduceConfig,
    ) -> Result<Self, ReduceError> {
        if buffers.workgroup_size() != config.workgroup_size {
            return Err(ConfigError::WorkgroupMismatch {
                pipeline: config.workgroup_size,
                buffers: buffers.workgroup_size(),
            }
            .into());
        }
        Self::for_layout(device, BindingLayout::new(buffers.scratch().len()), kernel, config).await
    }

    /// Builds a pipeline for `layout` ahead of any buffer allocation.
    ///
    /// Device errors raised while compiling are reported as
    /// [`ConfigError::KernelRejected`]; they are scoped to this call, so other
    /// builds or reductions on the same device never see them.
    pub async fn for_layout(
        device: &ComputeDevice,
        layout: BindingLayout,
        kernel: &Kernel,
        config: &ReduceConfig,
    ) -> Result<Self, ReduceError> {
        config.validate()?;
        let source = kernel.preprocess(config)?;
        layout.check(&KernelInterface::scan(&source), kernel.entry())?;

        if let Some(lost) = device.lost() {
            return Err(ReduceError::DeviceUnavailable(lost));
        }

        let scope = device.error_scope();
        let raw = device.device();
        let shader = raw.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kernel.label()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = raw.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tally compute bgl"),
            entries: &layout.entries(),
        });

        let pipeline_layout = raw.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tally compute pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = raw.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("tally compute pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(kernel.entry()),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(message) = scope.pop().await {
            return Err(ConfigError::KernelRejected(message).into());
        }

        log::debug!(
            "built pipeline {:?} (entry {:?}, workgroup size {}, slots {:?})",
            kernel.label(),
            kernel.entry(),
            config.workgroup_size,
            layout.slots()
        );

        Ok(Self {
            layout,
            workgroup_size: config.workgroup_size,
            bind_group_layout,
            pipeline,
        })
    }

    pub fn layout(&self) -> BindingLayout {
        self.layout
    }

    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    pub(crate) fn raw(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    /// Creates the bind group attaching `buffers` to this pipeline's slots.
    pub(crate) async fn bind(
        &self,
        device: &ComputeDevice,
        buffers: &BufferSet,
    ) -> Result<wgpu::BindGroup, ReduceError> {
        if buffers.scratch().len() != self.layout.num_scratch() {
            return Err(ConfigError::ScratchCountMismatch {
                expected: self.layout.num_scratch(),
                actual: buffers.scratch().len(),
            }
            .into());
        }
        if buffers.workgroup_size() != self.workgroup_size {
            return Err(ConfigError::WorkgroupMismatch {
                pipeline: self.workgroup_size,
                buffers: buffers.workgroup_size(),
            }
            .into());
        }

        let entries: Vec<wgpu::BindGroupEntry<'_>> = buffers
            .bound()
            .filter_map(|b| {
                Some(wgpu::BindGroupEntry {
                    binding: b.role().binding()?,
                    resource: b.buffer().as_entire_binding(),
                })
            })
            .collect();

        let scope = device.error_scope();
        let bind_group = device.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tally compute bind group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });
        match scope.pop().await {
            Some(message) => Err(ConfigError::BindingRejected(message).into()),
            None => Ok(bind_group),
        }
    }
}
