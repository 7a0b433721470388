use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use tally_engine::logging::{init_logging, LoggingConfig};
use tally_engine::{ComputeDevice, ComputeInit, HostCopy, Kernel, ReduceConfig};

#[derive(Debug, Copy, Clone, ValueEnum)]
enum HostCopyArg {
    Every,
    Final,
}

impl From<HostCopyArg> for HostCopy {
    fn from(arg: HostCopyArg) -> Self {
        match arg {
            HostCopyArg::Every => HostCopy::EveryPass,
            HostCopyArg::Final => HostCopy::FinalPass,
        }
    }
}

/// Reduce newline-separated numbers to one value on the GPU.
#[derive(Debug, Parser)]
#[command(name = "tally", version)]
struct Args {
    /// Input file; reads stdin when omitted or `-`.
    input: Option<PathBuf>,

    #[arg(short, long, default_value_t = 64)]
    workgroup_size: u32,

    /// WGSL kernel to run instead of the built-in sum.
    #[arg(short, long)]
    kernel: Option<PathBuf>,

    /// Kernel entry point.
    #[arg(long, default_value = "main")]
    entry: String,

    /// Scratch buffers to bind at slots 2.. (the kernel must declare them).
    #[arg(long, default_value_t = 0)]
    scratch: usize,

    /// When to copy partial results to the host-readable buffer.
    #[arg(long, value_enum, default_value = "every")]
    host_copy: HostCopyArg,

    /// Seconds to wait for the result before giving up; 0 waits forever.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Only accept a software adapter.
    #[arg(long)]
    fallback_adapter: bool,

    /// Log filter in env_logger syntax, e.g. `tally_engine=debug`.
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(LoggingConfig {
        env_filter: args.log.clone(),
        ..LoggingConfig::default()
    });

    let input = read_input(args.input.as_deref())?;
    let kernel = match &args.kernel {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read kernel {}", path.display()))?;
            Kernel::from_source(path.display().to_string(), source)
        }
        None => Kernel::sum(),
    }
    .entry_point(args.entry.clone());

    let config = ReduceConfig {
        workgroup_size: args.workgroup_size,
        num_scratch: args.scratch,
        host_copy: args.host_copy.into(),
        map_timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
    };

    let device = pollster::block_on(ComputeDevice::new(ComputeInit {
        force_fallback_adapter: args.fallback_adapter,
        ..ComputeInit::default()
    }))
    .context("failed to acquire a compute device")?;

    let reduced = tally_engine::reduce_blocking(&device, &input, &kernel, &config)
        .context("reduction failed")?;

    log::info!(
        "{} values, {} passes of workgroup size {}",
        reduced.len,
        reduced.passes,
        config.workgroup_size
    );
    println!("{}", reduced.value);
    Ok(())
}

fn read_input(path: Option<&std::path::Path>) -> Result<String> {
    match path {
        Some(p) if p.as_os_str() != "-" => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read input {}", p.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}
