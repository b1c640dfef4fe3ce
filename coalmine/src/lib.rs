//! # coalmine
//!
//! Synthetic metrics generator for the carbon plaintext protocol.
//!
//! coalmine produces `name value timestamp\n` lines for many series at once
//! and streams them to standard output, a TCP connection or a UDP socket.
//! It is meant for load-testing graphite-compatible stacks and for
//! reproducing issues without the original data.
//!
//! ## Key Properties
//!
//! - Shell-style brace expansion turns one pattern into many series names
//! - Three value shapes: constant with noise, monotonic counter, random walk
//! - Deterministic coverage filter to emit a fixed share of points
//! - Historical batches or an unbounded real-time feed, one task per pattern
//! - UDP output is chunked to the local interface's payload size
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use coalmine::{Config, Sink, run_batch};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::default();
//! config.counter.push("server{01..10}.requests".to_string());
//! config.general.from = "-1h".to_string();
//!
//! let sink = Sink::connect(&config.sink_address()?).await?;
//! let groups = config.groups(coalmine::live::unix_now())?;
//!
//! let report = run_batch(groups, Arc::new(sink), CancellationToken::new()).await;
//! println!("{} bytes", report.into_result()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`PointGenerator`]: one series' time cursor, value and emit filter
//! - [`GeneratorGroup`]: every series expanded from one pattern
//! - [`Destination`]: transport seam, implemented by [`Sink`]
//! - [`run_batch`] / [`run_live`]: concurrent orchestrators with cancellation
//! - [`Config`]: TOML configuration resolved into groups
//!
//! ## Modules
//!
//! - [`expand`]: `{{ var }}` substitution and brace expansion
//! - [`generator`]: point generators and the coverage filter
//! - [`group`]: generator groups
//! - [`writer`]: serialization and chunked delivery
//! - [`sink`]: destinations and address parsing
//! - [`mtu`]: datagram payload size discovery
//! - [`batch`] / [`live`]: orchestrators
//! - [`config`] / [`timespec`]: configuration and time expressions
//! - [`error`]: error types

pub mod batch;
pub mod config;
pub mod error;
pub mod expand;
pub mod generator;
pub mod group;
pub mod live;
pub mod mtu;
pub mod sink;
mod supervisor;
pub mod timespec;
pub mod writer;

// Re-export primary API types at crate root for convenience.
pub use batch::run_batch;
pub use config::Config;
pub use error::{CoalMineError, ConfigError, GeneratorError, Result, WriteError};
pub use generator::{GeneratorKind, PointGenerator, Probability, SeriesParams};
pub use group::GeneratorGroup;
pub use live::{run_live, run_live_from};
pub use sink::{Destination, Sink, SinkAddress};
pub use supervisor::RunReport;
pub use writer::{write_all, write_group};
