//! CLI for the coalmine carbon metrics generator.
//!
//! Generates historical batches and live feeds in carbon plaintext format,
//! lists the series a configuration expands to and prints a config example.

use std::path::PathBuf;
use std::sync::Arc;

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use coalmine::config::{Config, EXAMPLE};
use coalmine::live::unix_now;
use coalmine::{GeneratorGroup, RunReport, Sink, run_batch, run_live};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// coal-mine: metrics generator for graphite in carbon plaintext format.
///
/// Curly braces in metric names are expanded as a shell would do it:
/// "server{01..10}.soft{1..5}" produces 50 series.
#[derive(Parser)]
#[command(name = "coal-mine", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Generate historical points for the configured window.
    Generate {
        #[command(flatten)]
        sink: SinkArgs,

        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        series: SeriesArgs,
    },

    /// Generate points for the current second until interrupted.
    ///
    /// `from` and `until` are ignored. Use --randomize to spread the load
    /// over each step.
    Online {
        #[command(flatten)]
        sink: SinkArgs,

        #[command(flatten)]
        series: SeriesArgs,
    },

    /// Print the series names a configuration expands to.
    Metrics {
        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        series: SeriesArgs,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print a documented configuration example.
    ConfigExample,
}

/// Destination flags.
#[derive(Args)]
struct SinkArgs {
    /// Carbon address: '-' for stdout, 'tcp://host:port' or 'udp://host:port'.
    #[arg(long, env = "CARBON")]
    carbon: Option<String>,
}

/// Historical window flags.
#[derive(Args)]
struct WindowArgs {
    /// Window start in graphite-web format (e.g. "-24h", "-1d12h", unix time).
    #[arg(long, env = "FROM", allow_hyphen_values = true)]
    from: Option<String>,

    /// Window end in graphite-web format.
    #[arg(long, env = "UNTIL", allow_hyphen_values = true)]
    until: Option<String>,
}

/// Generator flags; each one overrides the config file.
///
/// Every flag can also be set through the environment variable named in its
/// help. Pattern and variable lists from the environment are separated by
/// spaces.
#[derive(Args)]
struct SeriesArgs {
    /// Config file in TOML format.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Patterns for constant generators.
    #[arg(long = "const", env = "CONST", value_delimiter = ' ')]
    constant: Vec<String>,

    /// Patterns for counter generators.
    #[arg(long, env = "COUNTER", value_delimiter = ' ')]
    counter: Vec<String>,

    /// Patterns for random generators.
    #[arg(long, env = "RANDOM", value_delimiter = ' ')]
    random: Vec<String>,

    /// Seconds between points.
    #[arg(long, env = "STEP")]
    step: Option<u64>,

    /// Randomize each series' first timestamp within [0, step).
    #[arg(
        long,
        env = "RANDOMIZE",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    randomize: Option<bool>,

    /// Starting value for generators.
    #[arg(long, env = "VALUE", allow_negative_numbers = true)]
    value: Option<f64>,

    /// Deviation applied at every step.
    #[arg(long, env = "DEVIATION", allow_negative_numbers = true)]
    deviation: Option<f64>,

    /// Percentage of points written, in [1, 100].
    #[arg(long, env = "PROBABILITY")]
    probability: Option<u8>,

    /// Variable for {{ name }} placeholders, as key=value. Repeatable.
    #[arg(long = "var", env = "VAR", value_delimiter = ' ')]
    vars: Vec<String>,
}

/// Output format for the metrics listing.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// A parameter header followed by one name per line.
    Text,
    /// JSON array of objects.
    Json,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            sink,
            window,
            series,
        } => cmd_generate(&sink, &window, &series).await,
        Commands::Online { sink, series } => cmd_online(&sink, &series).await,
        Commands::Metrics {
            window,
            series,
            format,
        } => cmd_metrics(&window, &series, &format),
        Commands::ConfigExample => {
            print!("{EXAMPLE}");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays clean for the carbon stream.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Implements `coal-mine generate`.
async fn cmd_generate(sink: &SinkArgs, window: &WindowArgs, series: &SeriesArgs) -> CliResult {
    let mut config = load_config(series)?;
    sink.apply(&mut config);
    window.apply(&mut config);

    let address = config.sink_address()?;
    let groups = config.groups(unix_now())?;
    if groups.iter().all(GeneratorGroup::is_empty) {
        info!("no series configured, nothing to generate");
        return Ok(());
    }

    let sink = Sink::connect(&address).await?;
    let report = run_batch(groups, Arc::new(sink), cancel_on_signal()).await;
    finish(report)
}

/// Implements `coal-mine online`.
async fn cmd_online(sink: &SinkArgs, series: &SeriesArgs) -> CliResult {
    let mut config = load_config(series)?;
    sink.apply(&mut config);

    let address = config.sink_address()?;
    let groups = config.groups_live(unix_now())?;
    if groups.is_empty() {
        info!("no series configured, nothing to generate");
        return Ok(());
    }

    let sink = Sink::connect(&address).await?;
    let report = run_live(groups, Arc::new(sink), cancel_on_signal()).await;
    finish(report)
}

/// Implements `coal-mine metrics`.
fn cmd_metrics(window: &WindowArgs, series: &SeriesArgs, format: &OutputFormat) -> CliResult {
    let mut config = load_config(series)?;
    window.apply(&mut config);
    let groups = config.groups(unix_now())?;

    match format {
        OutputFormat::Text => {
            let general = &config.general;
            println!(
                "# value={} dev={} from={} until={} step={}",
                general.value, general.deviation, general.from, general.until, general.step
            );
            for group in &groups {
                for name in group.names() {
                    println!("{name}");
                }
            }
        }
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = groups
                .iter()
                .flat_map(|group| {
                    group.names().map(move |name| {
                        serde_json::json!({
                            "name": name,
                            "type": group.kind().as_str(),
                            "pattern": group.pattern(),
                            "step": group.step(),
                        })
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

/// Loads the config file, if any, and applies the generator flags.
fn load_config(args: &SeriesArgs) -> Result<Config, coalmine::ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if !args.constant.is_empty() {
        config.constant.clone_from(&args.constant);
    }
    if !args.counter.is_empty() {
        config.counter.clone_from(&args.counter);
    }
    if !args.random.is_empty() {
        config.random.clone_from(&args.random);
    }
    let general = &mut config.general;
    if let Some(step) = args.step {
        general.step = step;
    }
    if let Some(randomize) = args.randomize {
        general.randomize = randomize;
    }
    if let Some(value) = args.value {
        general.value = value;
    }
    if let Some(deviation) = args.deviation {
        general.deviation = deviation;
    }
    if let Some(probability) = args.probability {
        general.probability = probability;
    }
    config.add_variables(&args.vars)?;
    Ok(config)
}

impl SinkArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(carbon) = &self.carbon {
            config.carbon.clone_from(carbon);
        }
    }
}

impl WindowArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(from) = &self.from {
            config.general.from.clone_from(from);
        }
        if let Some(until) = &self.until {
            config.general.until.clone_from(until);
        }
    }
}

/// Turns the run report into the process result.
fn finish(report: RunReport) -> CliResult {
    let series = report.series;
    let bytes = report.into_result()?;
    info!(bytes, series, "done");
    Ok(())
}

/// Returns a token cancelled on SIGINT or SIGTERM.
fn cancel_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let handler = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("SIGINT received, stopping generation");
            }
            () = terminate => {
                info!("SIGTERM received, stopping generation");
            }
        }

        handler.cancel();
    });

    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "coal-mine",
            "generate",
            "--const",
            "a{1..2}",
            "--step",
            "5",
            "--randomize",
            "--value",
            "-30",
            "--deviation",
            "-31",
            "--var",
            "env=prod",
            "--from",
            "-1h",
        ]);
        let Commands::Generate { window, series, .. } = cli.command else {
            panic!("expected the generate command");
        };

        let mut config = load_config(&series).unwrap();
        window.apply(&mut config);

        assert_eq!(config.constant, ["a{1..2}"]);
        assert_eq!(config.general.step, 5);
        assert!(config.general.randomize);
        assert_eq!(config.general.value, -30.0);
        assert_eq!(config.general.deviation, -31.0);
        assert_eq!(config.general.from, "-1h");
        assert_eq!(config.vars["env"], "prod");
    }

    #[test]
    fn test_explicit_randomize_false() {
        let cli = Cli::parse_from(["coal-mine", "online", "--randomize", "false"]);
        let Commands::Online { series, .. } = cli.command else {
            panic!("expected the online command");
        };
        assert_eq!(series.randomize, Some(false));
    }

    #[test]
    fn test_hyphenated_window_values() {
        let cli = Cli::parse_from(["coal-mine", "metrics", "--from", "-2d", "--until", "-1h"]);
        let Commands::Metrics { window, .. } = cli.command else {
            panic!("expected the metrics command");
        };
        assert_eq!(window.from.as_deref(), Some("-2d"));
        assert_eq!(window.until.as_deref(), Some("-1h"));
    }

    #[test]
    fn test_every_setting_reads_the_environment() {
        let command = Cli::command();
        let generate = command.find_subcommand("generate").unwrap();
        let mut envs: Vec<String> = generate
            .get_arguments()
            .filter_map(|arg| arg.get_env())
            .map(|env| env.to_string_lossy().into_owned())
            .collect();
        envs.sort();
        assert_eq!(
            envs,
            [
                "CARBON",
                "CONST",
                "COUNTER",
                "DEVIATION",
                "FROM",
                "PROBABILITY",
                "RANDOM",
                "RANDOMIZE",
                "STEP",
                "UNTIL",
                "VALUE",
                "VAR"
            ]
        );
    }
}
