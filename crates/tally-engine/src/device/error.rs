use std::future::Future;
use std::sync::{Arc, Mutex};

/// Captures device errors raised by calls made on this thread between
/// [`ErrorScope::push`] and [`ErrorScope::pop`].
///
/// wgpu keeps error scopes per thread, so concurrent reductions on one device
/// each see only their own failures. Must be popped before the caller awaits.
pub(crate) struct ErrorScope {
    // Popped (and dropped) in field order, the reverse of push order.
    internal: wgpu::ErrorScopeGuard,
    out_of_memory: wgpu::ErrorScopeGuard,
    validation: wgpu::ErrorScopeGuard,
}

impl ErrorScope {
    pub(crate) fn push(device: &wgpu::Device) -> Self {
        let validation = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let out_of_memory = device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let internal = device.push_error_scope(wgpu::ErrorFilter::Internal);
        Self {
            internal,
            out_of_memory,
            validation,
        }
    }

    /// Closes the scope and resolves to every captured error, joined.
    pub(crate) fn pop(self) -> impl Future<Output = Option<String>> {
        let Self {
            internal,
            out_of_memory,
            validation,
        } = self;
        let pending = [internal.pop(), out_of_memory.pop(), validation.pop()];

        async move {
            let mut messages = Vec::new();
            for error in pending {
                if let Some(error) = error.await {
                    messages.push(error.to_string());
                }
            }
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
    }
}

/// Device-wide hooks: logs errors that escape every scope and records loss of
/// the device, which affects every reduction using it.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeviceHealth {
    lost: Arc<Mutex<Option<String>>>,
}

impl DeviceHealth {
    pub(crate) fn install(&self, device: &wgpu::Device) {
        device.on_uncaptured_error(Arc::new(|error: wgpu::Error| {
            log::error!("uncaptured wgpu error: {error}");
        }));

        let health = self.clone();
        device.set_device_lost_callback(move |reason, message| {
            log::error!("device lost: reason={reason:?}, message={message}");
            health.mark_lost(format!("device lost ({reason:?}): {message}"));
        });
    }

    pub(crate) fn mark_lost(&self, message: String) {
        let mut lost = self.lost.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        lost.get_or_insert(message);
    }

    /// The loss message, if the device has been lost. Never cleared.
    pub(crate) fn lost(&self) -> Option<String> {
        self.lost
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
