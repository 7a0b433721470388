//! Tally engine crate.
//!
//! Reduces a large `f32` array to one scalar on the GPU by dispatching a
//! fixed-size compute kernel over shrinking data until one value remains.
//!
//! Flow: text input → [`Dataset`] → [`BufferSet`] → [`ReductionPipeline`] →
//! [`Reducer`] pass loop → host readback.

pub mod buffers;
pub mod config;
pub mod dataset;
pub mod device;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod readback;
pub mod reduce;

pub use buffers::{allocate, BufferRole, BufferSet, RoleBuffer};
pub use config::{HostCopy, ReduceConfig};
pub use dataset::Dataset;
pub use device::{ComputeDevice, ComputeInit};
pub use error::{ConfigError, ReduceError};
pub use kernel::{BindingLayout, Kernel, ReductionPipeline};
pub use reduce::{plan_passes, CancelToken, PassObserver, PassPlan, Reduced, Reducer};

/// Reduces newline-separated numbers with the built-in sum kernel.
pub async fn reduce(
    device: &ComputeDevice,
    input: &str,
    config: &ReduceConfig,
) -> Result<Reduced, ReduceError> {
    reduce_with(device, input, &Kernel::sum(), config).await
}

/// Reduces newline-separated numbers with `kernel`.
///
/// Buffers and pipeline are created for this call only. To reuse a compiled
/// pipeline across inputs, drive [`allocate`], [`ReductionPipeline::build`] and
/// [`Reducer`] directly.
pub async fn reduce_with(
    device: &ComputeDevice,
    input: &str,
    kernel: &Kernel,
    config: &ReduceConfig,
) -> Result<Reduced, ReduceError> {
    config.validate()?;
    let dataset = Dataset::parse(input)?;
    let buffers = allocate(device, &dataset, config)?;
    let pipeline = ReductionPipeline::build(device, &buffers, kernel, config).await?;
    Reducer::new(device, &pipeline, config).run(buffers).await
}

/// Blocking form of [`reduce_with`] for hosts without an async runtime.
pub fn reduce_blocking(
    device: &ComputeDevice,
    input: &str,
    kernel: &Kernel,
    config: &ReduceConfig,
) -> Result<Reduced, ReduceError> {
    pollster::block_on(reduce_with(device, input, kernel, config))
}

#[cfg(test)]
mod gpu_tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    const BROKEN: &str = "@group(0) @binding(0) var<storage, read> input: array<f32>;\n\
                          @group(0) @binding(1) var<storage, read_write> output: array<f32>;\n\
                          @compute @workgroup_size($<WORKGROUP_SIZE>) fn main() { output[0] = nonsense; }";

    /// A device, or `None` on machines without any adapter.
    fn device() -> Option<ComputeDevice> {
        match pollster::block_on(ComputeDevice::new(ComputeInit::default())) {
            Ok(device) => Some(device),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    fn run(device: &ComputeDevice, input: &str, kernel: &Kernel, config: &ReduceConfig) -> Reduced {
        reduce_blocking(device, input, kernel, config).unwrap()
    }

    #[test]
    fn four_elements_one_workgroup() {
        let Some(device) = device() else { return };
        let r = run(&device, "1\n2\n3\n4", &Kernel::sum(), &ReduceConfig::with_workgroup_size(4));
        assert_eq!(r.value, 10.0);
        assert_eq!(r.passes, 1);
        assert_eq!(r.padded_len, 4);
    }

    #[test]
    fn five_elements_two_passes() {
        let Some(device) = device() else { return };
        let r = run(&device, "1\n2\n3\n4\n5", &Kernel::sum(), &ReduceConfig::with_workgroup_size(4));
        assert_eq!(r.value, 15.0);
        assert_eq!(r.passes, 2);
        assert_eq!((r.len, r.padded_len), (5, 8));
    }

    #[test]
    fn many_passes_over_large_input() {
        let Some(device) = device() else { return };
        let input = "1\n".repeat(100_000);
        let r = run(&device, &input, &Kernel::sum(), &ReduceConfig::with_workgroup_size(64));
        assert_eq!(r.value, 100_000.0);
        assert_eq!(r.passes, 3);
    }

    #[test]
    fn non_power_of_two_workgroup() {
        let Some(device) = device() else { return };
        let input: String = (1..=10).map(|v| format!("{v}\n")).collect();
        let r = run(&device, &input, &Kernel::sum(), &ReduceConfig::with_workgroup_size(3));
        assert_eq!(r.value, 55.0);
    }

    #[test]
    fn staged_kernel_uses_scratch() {
        let Some(device) = device() else { return };
        let config = ReduceConfig {
            workgroup_size: 8,
            num_scratch: 1,
            ..ReduceConfig::default()
        };
        let input: String = (1..=100).map(|v| format!("{v}\n")).collect();
        let r = run(&device, &input, &Kernel::sum_staged(), &config);
        assert_eq!(r.value, 5050.0);
    }

    #[test]
    fn final_pass_host_copy_gives_same_result() {
        let Some(device) = device() else { return };
        let config = ReduceConfig {
            workgroup_size: 4,
            host_copy: HostCopy::FinalPass,
            ..ReduceConfig::default()
        };
        let input: String = (1..=50).map(|v| format!("{v}\n")).collect();
        assert_eq!(run(&device, &input, &Kernel::sum(), &config).value, 1275.0);
    }

    #[test]
    fn negative_and_fractional_values() {
        let Some(device) = device() else { return };
        let r = run(&device, "-1.5\n2.25\n-0.75\n", &Kernel::sum(), &ReduceConfig::with_workgroup_size(2));
        assert_eq!(r.value, 0.0);
    }

    #[test]
    fn pipeline_is_reusable_across_buffer_sets() {
        let Some(device) = device() else { return };
        let config = ReduceConfig::with_workgroup_size(16);
        let pipeline = pollster::block_on(ReductionPipeline::for_layout(
            &device,
            BindingLayout::new(0),
            &Kernel::sum(),
            &config,
        ))
        .unwrap();

        for n in [1usize, 17, 300] {
            let data = Dataset::from_values(vec![2.0; n]).unwrap();
            let buffers = allocate(&device, &data, &config).unwrap();
            let r = pollster::block_on(Reducer::new(&device, &pipeline, &config).run(buffers)).unwrap();
            assert_eq!(r.value, 2.0 * n as f32, "n = {n}");
        }
    }

    #[test]
    fn scratch_count_mismatch_on_reuse() {
        let Some(device) = device() else { return };
        let config = ReduceConfig::with_workgroup_size(4);
        let pipeline = pollster::block_on(ReductionPipeline::for_layout(
            &device,
            BindingLayout::new(0),
            &Kernel::sum(),
            &config,
        ))
        .unwrap();
        let with_scratch = ReduceConfig { num_scratch: 1, ..config.clone() };
        let data = Dataset::parse("1\n2").unwrap();
        let buffers = allocate(&device, &data, &with_scratch).unwrap();
        let err = pollster::block_on(Reducer::new(&device, &pipeline, &config).run(buffers)).unwrap_err();
        assert!(matches!(
            err,
            ReduceError::Config(ConfigError::ScratchCountMismatch { expected: 0, actual: 1 })
        ));
    }

    #[test]
    fn binding_mismatch_caught_at_build() {
        let Some(device) = device() else { return };
        let config = ReduceConfig { num_scratch: 1, ..ReduceConfig::default() };
        let err = reduce_blocking(&device, "1\n2\n3", &Kernel::sum(), &config).unwrap_err();
        assert!(matches!(err, ReduceError::Config(ConfigError::BindingMismatch { .. })));
    }

    #[test]
    fn invalid_wgsl_is_rejected_by_device() {
        let Some(device) = device() else { return };
        let kernel = Kernel::from_source("broken", BROKEN);
        let err = reduce_blocking(&device, "1", &kernel, &ReduceConfig::default()).unwrap_err();
        assert!(matches!(err, ReduceError::Config(ConfigError::KernelRejected(_))));
    }

    #[test]
    fn cancelled_before_first_pass() {
        let Some(device) = device() else { return };
        let config = ReduceConfig::with_workgroup_size(4);
        let data = Dataset::parse("1\n2\n3\n4\n5").unwrap();
        let buffers = allocate(&device, &data, &config).unwrap();
        let pipeline =
            pollster::block_on(ReductionPipeline::build(&device, &buffers, &Kernel::sum(), &config))
                .unwrap();
        let token = CancelToken::new();
        token.cancel();
        let err = pollster::block_on(
            Reducer::new(&device, &pipeline, &config).with_cancel(token).run(buffers),
        )
        .unwrap_err();
        assert!(matches!(err, ReduceError::Cancelled { pass: 0 }));
    }

    #[test]
    fn empty_input_is_a_config_error() {
        let Some(device) = device() else { return };
        let err = reduce_blocking(&device, "", &Kernel::sum(), &ReduceConfig::default()).unwrap_err();
        assert!(matches!(err, ReduceError::Config(ConfigError::EmptyInput)));
    }

    #[test]
    fn workgroup_size_one_is_rejected() {
        let Some(device) = device() else { return };
        let err = reduce_blocking(&device, "1\n2", &Kernel::sum(), &ReduceConfig::with_workgroup_size(1))
            .unwrap_err();
        assert!(matches!(err, ReduceError::Config(ConfigError::WorkgroupTooSmall(1))));
    }

    #[test]
    fn rejected_kernel_does_not_leak_into_concurrent_reductions() {
        let Some(device) = device() else { return };
        let broken = Kernel::from_source("broken", BROKEN);
        let config = ReduceConfig::with_workgroup_size(2);

        std::thread::scope(|s| {
            let failing = s.spawn(|| {
                for _ in 0..50 {
                    let err = reduce_blocking(&device, "1", &broken, &config).unwrap_err();
                    assert!(matches!(err, ReduceError::Config(ConfigError::KernelRejected(_))));
                }
            });
            for _ in 0..100 {
                let r = reduce_blocking(&device, "1\n2\n3", &Kernel::sum(), &config).unwrap();
                assert_eq!(r.value, 6.0);
            }
            failing.join().unwrap();
        });
    }

    #[test]
    fn cancelled_between_passes() {
        let Some(device) = device() else { return };
        let config = ReduceConfig::with_workgroup_size(4);
        let data = Dataset::from_values(vec![1.0; 1000]).unwrap();
        let buffers = allocate(&device, &data, &config).unwrap();
        assert_eq!(plan_passes(buffers.padded_len(), 4).len(), 5);
        let pipeline =
            pollster::block_on(ReductionPipeline::build(&device, &buffers, &Kernel::sum(), &config))
                .unwrap();

        let token = CancelToken::new();
        let seen = Mutex::new(Vec::new());
        let reducer = Reducer::new(&device, &pipeline, &config)
            .with_cancel(token.clone())
            .on_pass(|pass| {
                seen.lock().unwrap().push(pass.index);
                if pass.index == 2 {
                    token.cancel();
                }
            });
        let err = pollster::block_on(reducer.run(buffers)).unwrap_err();
        assert!(matches!(err, ReduceError::Cancelled { pass: 3 }));
        drop(reducer);
        assert_eq!(seen.into_inner().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn pass_observer_sees_every_pass() {
        let Some(device) = device() else { return };
        let config = ReduceConfig::with_workgroup_size(4);
        let data = Dataset::parse("1\n2\n3\n4\n5").unwrap();
        let buffers = allocate(&device, &data, &config).unwrap();
        let pipeline =
            pollster::block_on(ReductionPipeline::build(&device, &buffers, &Kernel::sum(), &config))
                .unwrap();

        let seen = Mutex::new(Vec::new());
        let reducer = Reducer::new(&device, &pipeline, &config)
            .on_pass(|pass| seen.lock().unwrap().push((pass.index, pass.workgroups, pass.is_last)));
        let r = pollster::block_on(reducer.run(buffers)).unwrap();
        drop(reducer);
        assert_eq!(r.value, 15.0);
        assert_eq!(seen.into_inner().unwrap(), vec![(0, 2, false), (1, 1, true)]);
    }

    #[test]
    fn zero_map_timeout_never_returns_a_stale_value() {
        let Some(device) = device() else { return };
        // A completed wait returns Ok even with a zero timeout, so a fast device
        // may still finish; what must never happen is a wrong value.
        let config = ReduceConfig {
            workgroup_size: 2,
            map_timeout: Some(Duration::ZERO),
            ..ReduceConfig::default()
        };
        let input = "1\n".repeat(1 << 20);
        match reduce_blocking(&device, &input, &Kernel::sum(), &config) {
            Ok(r) => assert_eq!(r.value, (1u32 << 20) as f32),
            Err(err) => assert!(matches!(err, ReduceError::MapTimeout), "got {err:?}"),
        }
    }

    #[test]
    fn unmappable_result_buffer_is_map_failure() {
        let Some(device) = device() else { return };
        let config = ReduceConfig::with_workgroup_size(2);
        let data = Dataset::parse("1\n2").unwrap();
        let buffers = allocate(&device, &data, &config).unwrap();
        buffers.host_read().buffer().destroy();

        let err = pollster::block_on(readback::read(
            &device,
            buffers.host_read(),
            4,
            None,
            Some(Duration::from_secs(5)),
        ))
        .unwrap_err();
        assert!(matches!(err, ReduceError::MapFailure(_)), "got {err:?}");
    }

    #[test]
    fn failed_copy_is_reported_for_its_pass() {
        let Some(device) = device() else { return };
        let config = ReduceConfig::with_workgroup_size(4);
        let data = Dataset::from_values(vec![1.0; 64]).unwrap();
        let buffers = allocate(&device, &data, &config).unwrap();
        let pipeline =
            pollster::block_on(ReductionPipeline::build(&device, &buffers, &Kernel::sum(), &config))
                .unwrap();
        // Not bound, so only the pass's Output -> HostRead copy touches it.
        buffers.host_read().buffer().destroy();

        let err = pollster::block_on(Reducer::new(&device, &pipeline, &config).run(buffers)).unwrap_err();
        assert!(matches!(err, ReduceError::Submission { pass: 0, .. }), "got {err:?}");
    }

    #[test]
    fn rejected_bind_group_stops_the_run() {
        let Some(device) = device() else { return };
        let config = ReduceConfig::with_workgroup_size(4);
        let data = Dataset::from_values(vec![1.0; 64]).unwrap();
        let buffers = allocate(&device, &data, &config).unwrap();
        let pipeline =
            pollster::block_on(ReductionPipeline::build(&device, &buffers, &Kernel::sum(), &config))
                .unwrap();
        buffers.input().buffer().destroy();

        let passes = Mutex::new(0usize);
        let reducer = Reducer::new(&device, &pipeline, &config).on_pass(|_| *passes.lock().unwrap() += 1);
        let err = pollster::block_on(reducer.run(buffers)).unwrap_err();
        drop(reducer);
        assert!(matches!(err, ReduceError::Config(ConfigError::BindingRejected(_))), "got {err:?}");
        assert_eq!(passes.into_inner().unwrap(), 0);
    }

    #[test]
    fn const_named_slots_build_and_reduce() {
        let Some(device) = device() else { return };
        let src = Kernel::sum().source().replace("@binding(1)", "@binding(OUTPUT_SLOT)")
            + "\nconst OUTPUT_SLOT = 1u;\n";
        let kernel = Kernel::from_source("named slots", src);
        let r = run(&device, "1\n2\n3\n4\n5", &kernel, &ReduceConfig::with_workgroup_size(4));
        assert_eq!(r.value, 15.0);
    }
}
