use crate::buffers::BufferSet;
use crate::config::{HostCopy, ReduceConfig};
use crate::device::ComputeDevice;
use crate::error::ReduceError;
use crate::kernel::ReductionPipeline;
use crate::readback;

use super::{plan_passes, CancelToken, PassPlan};

/// Outcome of a completed reduction.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Reduced {
    pub value: f32,
    pub passes: usize,
    /// Element count before padding.
    pub len: usize,
    pub padded_len: usize,
}

/// Called after each pass has been submitted.
pub type PassObserver<'a> = Box<dyn Fn(&PassPlan) + Send + Sync + 'a>;

/// Runs the pass loop for one buffer set against a compiled pipeline.
pub struct Reducer<'a> {
    device: &'a ComputeDevice,
    pipeline: &'a ReductionPipeline,
    host_copy: HostCopy,
    map_timeout: Option<std::time::Duration>,
    cancel: Option<CancelToken>,
    on_pass: Option<PassObserver<'a>>,
}

impl<'a> Reducer<'a> {
    pub fn new(
        device: &'a ComputeDevice,
        pipeline: &'a ReductionPipeline,
        config: &ReduceConfig,
    ) -> Self {
        Self {
            device,
            pipeline,
            host_copy: config.host_copy,
            map_timeout: config.map_timeout,
            cancel: None,
            on_pass: None,
        }
    }

    /// Checks `token` before each pass.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Reports progress once per submitted pass.
    pub fn on_pass(mut self, observer: impl Fn(&PassPlan) + Send + Sync + 'a) -> Self {
        self.on_pass = Some(Box::new(observer));
        self
    }

    /// Reduces `buffers` to one scalar.
    ///
    /// Consumes the buffer set: after any outcome, including cancellation, its
    /// contents are not a valid input for another run.
    pub async fn run(&self, buffers: BufferSet) -> Result<Reduced, ReduceError> {
        let bind_group = self.pipeline.bind(self.device, &buffers).await?;
        let plan = plan_passes(buffers.padded_len(), buffers.workgroup_size());

        let mut last_submission = None;
        for pass in &plan {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                log::warn!("reduction cancelled before pass {} of {}", pass.index, plan.len());
                return Err(ReduceError::Cancelled { pass: pass.index });
            }
            last_submission = Some(self.submit_pass(&buffers, &bind_group, pass).await?);
            if let Some(observer) = &self.on_pass {
                observer(pass);
            }
        }

        let read_bytes = plan.last().map_or(0, |p| p.live_bytes);
        let values = readback::read(
            self.device,
            buffers.host_read(),
            read_bytes,
            last_submission,
            self.map_timeout,
        )
        .await?;
        let value = values
            .first()
            .copied()
            .ok_or_else(|| ReduceError::MapFailure("result buffer is empty".to_string()))?;

        log::info!(
            "reduced {} elements (padded {}) in {} passes",
            buffers.len(),
            buffers.padded_len(),
            plan.len()
        );

        Ok(Reduced {
            value,
            passes: plan.len(),
            len: buffers.len(),
            padded_len: buffers.padded_len(),
        })
    }

    /// Encodes and submits one pass as a single command batch:
    /// dispatch, Output → HostRead, Output → Input, clear Output.
    async fn submit_pass(
        &self,
        buffers: &BufferSet,
        bind_group: &wgpu::BindGroup,
        pass: &PassPlan,
    ) -> Result<wgpu::SubmissionIndex, ReduceError> {
        log::debug!(
            "pass {}: {} elements, {} workgroups, {} live bytes",
            pass.index,
            pass.elements,
            pass.workgroups,
            pass.live_bytes
        );

        if let Some(lost) = self.device.lost() {
            return Err(ReduceError::Submission {
                pass: pass.index,
                message: lost,
            });
        }

        let scope = self.device.error_scope();
        let device = self.device.device();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tally pass encoder"),
        });

        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("tally reduction pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(self.pipeline.raw());
            cpass.set_bind_group(0, bind_group, &[]);
            cpass.dispatch_workgroups(pass.workgroups, 1, 1);
        }

        let output = buffers.output().buffer();
        if self.host_copy == HostCopy::EveryPass || pass.is_last {
            encoder.copy_buffer_to_buffer(output, 0, buffers.host_read().buffer(), 0, pass.live_bytes);
        }
        encoder.copy_buffer_to_buffer(output, 0, buffers.input().buffer(), 0, pass.live_bytes);
        encoder.clear_buffer(output, 0, None);

        let submission = self.device.queue().submit(std::iter::once(encoder.finish()));

        if let Some(message) = scope.pop().await {
            return Err(ReduceError::Submission {
                pass: pass.index,
                message,
            });
        }
        Ok(submission)
    }
}
