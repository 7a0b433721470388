use std::time::Duration;

use crate::error::ReduceError;

use super::error::{DeviceHealth, ErrorScope};
use super::ComputeInit;

/// Owns a wgpu device + queue used for compute work.
///
/// One `ComputeDevice` may serve many reductions; each reduction owns its own
/// buffers. Ordering between passes comes from the queue's FIFO submission order.
pub struct ComputeDevice {
    /// Adapter description, when the device was acquired here.
    adapter_info: Option<wgpu::AdapterInfo>,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    health: DeviceHealth,
}

impl ComputeDevice {
    /// Acquires an adapter and device with no presentation surface.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: ComputeInit) -> Result<Self, ReduceError> {
        let ComputeInit {
            backends,
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .map_err(|e| ReduceError::DeviceUnavailable(format!("no suitable adapter: {e}")))?;

        let info = adapter.get_info();
        log::info!("using adapter {:?} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("tally-engine device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| ReduceError::DeviceUnavailable(format!("device request failed: {e}")))?;

        let mut this = Self::from_parts(device, queue);
        this.adapter_info = Some(info);
        Ok(this)
    }

    /// Adopts a device supplied by the host environment.
    ///
    /// Installs this crate's uncaptured-error and device-lost handlers,
    /// replacing any existing ones.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let health = DeviceHealth::default();
        health.install(&device);
        Self {
            adapter_info: None,
            device,
            queue,
            health,
        }
    }

    pub fn adapter_info(&self) -> Option<&wgpu::AdapterInfo> {
        self.adapter_info.as_ref()
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Opens an error scope on the calling thread.
    pub(crate) fn error_scope(&self) -> ErrorScope {
        ErrorScope::push(&self.device)
    }

    /// Why the device was lost, if it was.
    pub(crate) fn lost(&self) -> Option<String> {
        self.health.lost()
    }

    /// Blocks until `submission` (or all work when `None`) completes and
    /// pending map callbacks have fired.
    ///
    /// A no-op on the web, where the browser drives completion.
    pub(crate) fn wait(
        &self,
        submission: Option<wgpu::SubmissionIndex>,
        timeout: Option<Duration>,
    ) -> Result<(), ReduceError> {
        poll_outcome(self.device.poll(wgpu::PollType::Wait {
            submission_index: submission,
            timeout,
        }))
    }
}

fn poll_outcome(result: Result<wgpu::PollStatus, wgpu::PollError>) -> Result<(), ReduceError> {
    match result {
        Ok(_) => Ok(()),
        Err(wgpu::PollError::Timeout) => Err(ReduceError::MapTimeout),
        Err(e) => Err(ReduceError::MapFailure(e.to_string())),
    }
}
