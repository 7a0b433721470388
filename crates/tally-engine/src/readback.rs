//! Result Reader.
//!
//! Maps the host-readable buffer and copies its low-order `f32`s out. The map
//! is released on every exit path, including errors and timeouts.

use std::time::Duration;

use crate::buffers::{BufferRole, RoleBuffer};
use crate::device::ComputeDevice;
use crate::error::ReduceError;

/// Unmaps the buffer when dropped, unless the map request itself failed.
struct MapGuard<'a> {
    buffer: &'a wgpu::Buffer,
    armed: bool,
}

impl Drop for MapGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.buffer.unmap();
        }
    }
}

/// Reads the first `bytes` of `host` once `submission` has completed.
///
/// On the web the await on the map callback is where the driver yields to the
/// browser. On native targets the device is polled to completion first, so the
/// calling thread blocks (up to `timeout`) and the await then resolves at once.
/// Only index 0 is meaningful after a completed reduction.
pub async fn read(
    device: &ComputeDevice,
    host: &RoleBuffer,
    bytes: u64,
    submission: Option<wgpu::SubmissionIndex>,
    timeout: Option<Duration>,
) -> Result<Vec<f32>, ReduceError> {
    debug_assert_eq!(host.role(), BufferRole::HostRead);
    let bytes = bytes.min(host.byte_len());
    let slice = host.buffer().slice(..bytes);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let scope = device.error_scope();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let rejected = scope.pop();
    let mut guard = MapGuard {
        buffer: host.buffer(),
        armed: true,
    };

    if let Some(message) = rejected.await {
        guard.armed = false;
        return Err(ReduceError::MapFailure(message));
    }

    device.wait(submission, timeout)?;

    let mapped = rx
        .await
        .map_err(|_| ReduceError::MapFailure("map callback dropped".to_string()))?;
    if let Err(e) = mapped {
        guard.armed = false;
        return Err(ReduceError::MapFailure(e.to_string()));
    }

    let view = slice.get_mapped_range();
    let values = bytemuck::cast_slice::<u8, f32>(&view).to_vec();
    drop(view);
    drop(guard);

    Ok(values)
}
