//! Error types for the coalmine metrics generator.

use thiserror::Error;

/// The main error type for all coalmine operations.
///
/// Construction-time failures ([`GeneratorError`], [`ConfigError`]) abort a
/// run before any I/O happens. [`WriteError`]s are fatal to the worker that
/// hit them and cancel the rest of the run.
#[derive(Error, Debug)]
pub enum CoalMineError {
    /// Error while building or advancing a generator.
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// Error while writing points to a destination.
    #[error("write error: {0}")]
    Write(#[from] WriteError),

    /// Error while loading or resolving configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The run was cancelled by an external signal or a failed sibling worker.
    #[error("generation was cancelled")]
    Cancelled,
}

impl CoalMineError {
    /// Bytes that reached the destination before the failure, if known.
    pub fn bytes_written(&self) -> u64 {
        match self {
            Self::Write(WriteError::Io { written, .. }) => *written,
            _ => 0,
        }
    }
}

/// Errors raised by point generators and generator groups.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneratorError {
    /// Unknown generator type name.
    #[error("type '{name}' is not valid, must be one of [const, counter, random]")]
    InvalidKind {
        /// The rejected type name.
        name: String,
    },

    /// A negative counter start whose deviation can never make it grow.
    #[error("counter value {value} and deviation {deviation} are meaningless")]
    InvalidCounterConfig {
        /// The configured starting value (and increment).
        value: f64,
        /// The configured deviation.
        deviation: f64,
    },

    /// Probability target outside `[1, 100]`.
    #[error("probability {target} is incorrect, must be in [1, 100]")]
    InvalidProbability {
        /// The rejected target.
        target: u8,
    },

    /// A zero step would never advance the time cursor.
    #[error("step must be greater than zero")]
    InvalidStep,

    /// The group has no member generators.
    #[error("no generators")]
    NoGenerators,

    /// The generator's cursor went past its stop bound.
    #[error("the last point reached")]
    GenerationOver,
}

/// Errors raised while delivering points to a destination.
#[derive(Error, Debug)]
pub enum WriteError {
    /// A write failed after `written` bytes had been delivered.
    #[error("write failed after {written} bytes: {source}")]
    Io {
        /// Bytes delivered before the failure.
        written: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The datagram payload size could not be determined.
    #[error("unable to determine datagram payload size: {source}")]
    PayloadSize {
        /// The underlying lookup error.
        #[source]
        source: std::io::Error,
    },

    /// Connecting to the destination failed.
    #[error("unable to connect to '{address}': {source}")]
    Connect {
        /// The address that could not be reached.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A worker task panicked or was aborted by the runtime.
    #[error("worker for '{pattern}' stopped unexpectedly: {reason}")]
    WorkerPanicked {
        /// Pattern of the group the worker was driving.
        pattern: String,
        /// Runtime-provided description.
        reason: String,
    },
}

/// Errors raised while loading or resolving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: std::path::PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: std::path::PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// The sink address is neither `-` nor a `tcp://` / `udp://` URI.
    #[error("sink '{address}' is not valid: {reason}")]
    InvalidSink {
        /// The rejected address.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A `from`/`until` expression could not be parsed.
    #[error("time '{expr}' is not valid: {reason}")]
    InvalidTime {
        /// The rejected expression.
        expr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A `--var` argument is not `key=value`, or repeats a key.
    #[error("invalid variable '{raw}': {reason}")]
    InvalidVariable {
        /// The rejected argument.
        raw: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Building the generators of one pattern failed.
    #[error("unable to create {kind} generators for '{pattern}': {source}")]
    Group {
        /// Generator type name of the failing entry.
        kind: String,
        /// The failing pattern.
        pattern: String,
        /// The underlying generator error.
        #[source]
        source: GeneratorError,
    },
}

/// Type alias for `Result<T, CoalMineError>`.
pub type Result<T> = std::result::Result<T, CoalMineError>;
