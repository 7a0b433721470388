use tally_wgsl::ExpandError;

/// Problems detected before or at pipeline build. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("input is empty; nothing to reduce")]
    EmptyInput,

    #[error("line {line}: {token:?} is not a number")]
    MalformedNumber { line: usize, token: String },

    #[error("workgroup size must be at least 2, got {0}")]
    WorkgroupTooSmall(u32),

    #[error("workgroup size {requested} exceeds device limit {limit}")]
    WorkgroupTooLarge { requested: u32, limit: u32 },

    #[error("dataset needs {bytes} bytes per buffer, device binding limit is {limit}")]
    DatasetTooLarge { bytes: u64, limit: u64 },

    #[error("first pass needs {workgroups} workgroups, device limit is {limit}")]
    TooManyWorkgroups { workgroups: u64, limit: u32 },

    #[error(transparent)]
    Preprocess(#[from] ExpandError),

    #[error("kernel declares bindings {declared:?}, layout provides {expected:?}")]
    BindingMismatch { declared: Vec<u32>, expected: Vec<u32> },

    #[error("kernel has no @compute entry point named {0:?}")]
    MissingEntryPoint(String),

    #[error("pipeline expects {expected} scratch buffers, buffer set has {actual}")]
    ScratchCountMismatch { expected: usize, actual: usize },

    #[error("pipeline built for workgroup size {pipeline}, buffer set padded for {buffers}")]
    WorkgroupMismatch { pipeline: u32, buffers: u32 },

    #[error("device rejected kernel: {0}")]
    KernelRejected(String),

    #[error("device rejected buffer bindings: {0}")]
    BindingRejected(String),
}

/// Everything a reduction can fail with. No variant carries a partial result.
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("no compute device available: {0}")]
    DeviceUnavailable(String),

    #[error("device rejected pass {pass}: {message}")]
    Submission { pass: usize, message: String },

    #[error("timed out waiting for the result buffer to map")]
    MapTimeout,

    #[error("failed to map the result buffer: {0}")]
    MapFailure(String),

    #[error("reduction cancelled before pass {pass}")]
    Cancelled { pass: usize },
}

impl From<ExpandError> for ReduceError {
    fn from(err: ExpandError) -> Self {
        Self::Config(ConfigError::Preprocess(err))
    }
}
