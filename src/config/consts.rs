/// Default per-edge credit/channel capacity
pub const DEFAULT_BUFFER_SIZE: usize = 16;
/// Upper bound for any configured buffer size
pub const MAX_BUFFER_SIZE: usize = 1 << 16;
/// Default capacity of an injection endpoint's own buffer
pub const DEFAULT_INJECTION_CAPACITY: usize = 32;
/// Elements a stage processes before yielding back to the worker pool
pub const DEFAULT_FAIRNESS_BUDGET: u32 = 64;
/// Default per-request timeout for ask stages (milliseconds)
pub const DEFAULT_ASK_TIMEOUT_MS: u64 = 5_000;
/// Default number of outstanding requests per ask stage
pub const DEFAULT_ASK_PARALLELISM: usize = 1;
/// Grace period given to worker threads on scheduler shutdown (milliseconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 1_000;
