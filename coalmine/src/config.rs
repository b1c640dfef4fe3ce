//! Run configuration: TOML file, defaults and group resolution.
//!
//! A [`Config`] lists name patterns per generator kind, the parameters they
//! share ([`General`]) and `[[custom]]` entries that override any shared
//! parameter for a single pattern. Missing fields take the defaults of
//! [`Config::default`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, GeneratorError};
use crate::generator::{GeneratorKind, SeriesParams};
use crate::group::GeneratorGroup;
use crate::sink::SinkAddress;
use crate::timespec::parse_time;

/// Documented configuration example, as printed by `config-example`.
pub const EXAMPLE: &str = r#"# carbon-server address or '-' for STDOUT: '-', 'tcp://server:port' or 'udp://server:port'
carbon = "-"
# names for constant generators, braces are expanded like in shell
const = ["metric.const.example1", "metric.const.example{2..5}"]
# names for counter generators, braces are expanded like in shell
counter = ["metric.counter.example1", "metric.counter.example{2..5}"]
# names for random generators, braces are expanded like in shell
random = ["metric.random.example{1,{2..5},.subdir}"]
# from and until in graphite-web format: 'now', '-2d', '-1d12h', '+1h' or a unix timestamp
from = "-2d"
until = "now"
# step in seconds
step = 120
# randomize the starting time of each series within [0, step)
randomize = true
# first value for all generators
value = 333.0
# const values vary around the value, counters add [0, value + deviation),
# random series walk around the previous value
deviation = 15.15
# percentage of points written, in [1, 100]
probability = 100

# substitutions for {{ name }} placeholders in names
[vars]
env = "prod"

# generators with their own parameters; missing fields are taken from above
[[custom]]
name = "custom.random.{{env}}.generator{1..10}"
type = "random"
from = "-2d"
until = "1d"
step = 300
randomize = false
value = 1000.0
deviation = 123.456

[[custom]]
name = "custom.counter.generator{1..10}"
type = "counter"
from = "-2h"
step = 10
value = 100.0
deviation = 123.456
probability = 50
"#;

/// Parameters shared by all patterns of a config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct General {
    /// Window start in graphite-web format.
    pub from: String,
    /// Window end in graphite-web format.
    pub until: String,
    /// Seconds between points.
    pub step: u64,
    /// Randomize each series' first timestamp within `[0, step)`.
    pub randomize: bool,
    /// Initial value (and counter increment).
    pub value: f64,
    /// Magnitude of the random perturbation.
    pub deviation: f64,
    /// Percentage of points written, in `[1, 100]`.
    pub probability: u8,
}

impl Default for General {
    fn default() -> Self {
        Self {
            from: "-24h".to_string(),
            until: "now".to_string(),
            step: 60,
            randomize: false,
            value: 10.0,
            deviation: 5.0,
            probability: 100,
        }
    }
}

impl General {
    /// Series parameters for the window `[start, stop]`.
    pub fn params(&self, start: u64, stop: u64) -> SeriesParams {
        SeriesParams {
            start,
            stop,
            step: self.step,
            randomize_start: self.randomize,
            value: self.value,
            deviation: self.deviation,
            probability: self.probability,
        }
    }
}

/// Per-entry overrides of [`General`]; unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Overrides {
    /// Overrides [`General::from`].
    pub from: Option<String>,
    /// Overrides [`General::until`].
    pub until: Option<String>,
    /// Overrides [`General::step`].
    pub step: Option<u64>,
    /// Overrides [`General::randomize`].
    pub randomize: Option<bool>,
    /// Overrides [`General::value`].
    pub value: Option<f64>,
    /// Overrides [`General::deviation`].
    pub deviation: Option<f64>,
    /// Overrides [`General::probability`].
    pub probability: Option<u8>,
}

impl Overrides {
    /// Applies the set fields on top of `base`.
    pub fn apply(&self, base: &General) -> General {
        General {
            from: self.from.clone().unwrap_or_else(|| base.from.clone()),
            until: self.until.clone().unwrap_or_else(|| base.until.clone()),
            step: self.step.unwrap_or(base.step),
            randomize: self.randomize.unwrap_or(base.randomize),
            value: self.value.unwrap_or(base.value),
            deviation: self.deviation.unwrap_or(base.deviation),
            probability: self.probability.unwrap_or(base.probability),
        }
    }
}

/// A pattern with its own generator type and parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Custom {
    /// Name pattern.
    pub name: String,
    /// Generator type name: `const`, `counter` or `random`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Parameters that differ from the top level.
    #[serde(flatten)]
    pub overrides: Overrides,
}

/// Complete run configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Destination address: `-`, `tcp://host:port` or `udp://host:port`.
    pub carbon: String,
    /// Patterns for constant generators.
    #[serde(rename = "const")]
    pub constant: Vec<String>,
    /// Patterns for counter generators.
    pub counter: Vec<String>,
    /// Patterns for random generators.
    pub random: Vec<String>,
    /// Parameters shared by the patterns above.
    #[serde(flatten)]
    pub general: General,
    /// `{{ name }}` substitutions applied to every pattern.
    pub vars: BTreeMap<String, String>,
    /// Entries with their own parameters.
    pub custom: Vec<Custom>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            carbon: "-".to_string(),
            constant: Vec::new(),
            counter: Vec::new(),
            random: Vec::new(),
            general: General::default(),
            vars: BTreeMap::new(),
            custom: Vec::new(),
        }
    }
}

/// One resolved pattern: kind, pattern and effective parameters.
#[derive(Debug)]
struct Entry<'a> {
    kind: Result<GeneratorKind, GeneratorError>,
    kind_name: &'a str,
    pattern: &'a str,
    general: General,
}

impl Config {
    /// Loads a config from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not a valid config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The configuration documented by [`EXAMPLE`].
    pub fn example() -> Self {
        let vars = BTreeMap::from([("env".to_string(), "prod".to_string())]);
        Self {
            carbon: "-".to_string(),
            constant: vec![
                "metric.const.example1".to_string(),
                "metric.const.example{2..5}".to_string(),
            ],
            counter: vec![
                "metric.counter.example1".to_string(),
                "metric.counter.example{2..5}".to_string(),
            ],
            random: vec!["metric.random.example{1,{2..5},.subdir}".to_string()],
            general: General {
                from: "-2d".to_string(),
                until: "now".to_string(),
                step: 120,
                randomize: true,
                value: 333.0,
                deviation: 15.15,
                probability: 100,
            },
            vars,
            custom: vec![
                Custom {
                    name: "custom.random.{{env}}.generator{1..10}".to_string(),
                    kind: "random".to_string(),
                    overrides: Overrides {
                        from: Some("-2d".to_string()),
                        until: Some("1d".to_string()),
                        step: Some(300),
                        randomize: Some(false),
                        value: Some(1000.0),
                        deviation: Some(123.456),
                        probability: None,
                    },
                },
                Custom {
                    name: "custom.counter.generator{1..10}".to_string(),
                    kind: "counter".to_string(),
                    overrides: Overrides {
                        from: Some("-2h".to_string()),
                        step: Some(10),
                        value: Some(100.0),
                        deviation: Some(123.456),
                        probability: Some(50),
                        ..Overrides::default()
                    },
                },
            ],
        }
    }

    /// Parses the destination address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSink`] for malformed addresses.
    pub fn sink_address(&self) -> Result<SinkAddress, ConfigError> {
        SinkAddress::parse(&self.carbon)
    }

    /// Adds `key=value` variables, rejecting malformed or repeated keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidVariable`] for the first bad argument.
    pub fn add_variables<I, S>(&mut self, raw: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        for item in raw {
            let (key, value) = parse_variable(item.as_ref())?;
            if !seen.insert(key.clone()) {
                return Err(ConfigError::InvalidVariable {
                    raw: item.as_ref().to_string(),
                    reason: format!("duplicate variable '{key}'"),
                });
            }
            self.vars.insert(key, value);
        }
        Ok(())
    }

    /// Builds every group for a historical run, resolving `from`/`until`
    /// against `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTime`] for bad time expressions and
    /// [`ConfigError::Group`] naming the pattern whose generators could not
    /// be created.
    pub fn groups(&self, now: u64) -> Result<Vec<GeneratorGroup>, ConfigError> {
        self.build(|general| {
            let start = parse_time(&general.from, now)?;
            let stop = parse_time(&general.until, now)?;
            Ok((start, stop))
        })
    }

    /// Builds every group for a live run: all windows start and stop at
    /// `now`, `from`/`until` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Group`] naming the failing pattern.
    pub fn groups_live(&self, now: u64) -> Result<Vec<GeneratorGroup>, ConfigError> {
        self.build(|_| Ok((now, now)))
    }

    /// Total number of configured patterns.
    pub fn pattern_count(&self) -> usize {
        self.constant.len() + self.counter.len() + self.random.len() + self.custom.len()
    }

    fn entries(&self) -> Vec<Entry<'_>> {
        let shared = [
            (GeneratorKind::Const, &self.constant),
            (GeneratorKind::Counter, &self.counter),
            (GeneratorKind::Random, &self.random),
        ];
        let mut entries = Vec::with_capacity(self.pattern_count());
        for (kind, patterns) in shared {
            entries.extend(patterns.iter().map(|pattern| Entry {
                kind: Ok(kind),
                kind_name: kind.as_str(),
                pattern,
                general: self.general.clone(),
            }));
        }
        entries.extend(self.custom.iter().map(|custom| Entry {
            kind: custom.kind.parse(),
            kind_name: &custom.kind,
            pattern: &custom.name,
            general: custom.overrides.apply(&self.general),
        }));
        entries
    }

    fn build<F>(&self, window: F) -> Result<Vec<GeneratorGroup>, ConfigError>
    where
        F: Fn(&General) -> Result<(u64, u64), ConfigError>,
    {
        let vars: HashMap<String, String> =
            self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self.entries()
            .into_iter()
            .map(|entry| {
                let group_err = |source| ConfigError::Group {
                    kind: entry.kind_name.to_string(),
                    pattern: entry.pattern.to_string(),
                    source,
                };
                let kind = entry.kind.clone().map_err(group_err)?;
                let (start, stop) = window(&entry.general)?;
                let params = entry.general.params(start, stop);
                GeneratorGroup::expand(kind, entry.pattern, &vars, &params).map_err(group_err)
            })
            .collect()
    }
}

/// Splits a `key=value` argument.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidVariable`] if there is no `=` or the key is
/// empty.
pub fn parse_variable(raw: &str) -> Result<(String, String), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidVariable {
        raw: raw.to_string(),
        reason: reason.to_string(),
    };
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| invalid("must be in key=value form"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(invalid("empty variable name"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.carbon, "-");
        assert_eq!(config.general.from, "-24h");
        assert_eq!(config.general.until, "now");
        assert_eq!(config.general.step, 60);
        assert!(!config.general.randomize);
        assert_eq!(config.general.value, 10.0);
        assert_eq!(config.general.deviation, 5.0);
        assert_eq!(config.general.probability, 100);
    }

    #[test]
    fn test_example_parses() {
        let parsed: Config = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(parsed, Config::example());
    }

    #[test]
    fn test_example_groups() {
        let groups = Config::example().groups(NOW).unwrap();
        let sizes: Vec<usize> = groups.iter().map(GeneratorGroup::len).collect();
        assert_eq!(sizes, [1, 4, 1, 4, 6, 10, 10]);

        let custom_random = &groups[5];
        assert_eq!(custom_random.kind(), GeneratorKind::Random);
        assert_eq!(custom_random.step(), 300);
        assert_eq!(
            custom_random.names().next(),
            Some("custom.random.prod.generator1")
        );
        let first = &custom_random.members()[0];
        assert_eq!(first.start(), NOW - 2 * 86_400);
        assert_eq!(first.stop(), NOW + 86_400);

        // `until` inherited from the top level.
        let custom_counter = &groups[6];
        assert_eq!(custom_counter.members()[0].stop(), NOW);
        assert!(custom_counter.is_randomized());
        assert_eq!(custom_counter.members()[0].probability().target(), 50);
    }

    #[test]
    fn test_groups_live() {
        let groups = Config::example().groups_live(NOW).unwrap();
        for group in &groups {
            for member in group.members() {
                assert_eq!(member.start(), NOW);
                assert_eq!(member.stop(), NOW);
            }
        }
    }

    #[test]
    fn test_invalid_custom_type() {
        let config: Config = toml::from_str(
            r#"
            [[custom]]
            name = "x"
            type = "gauge"
            "#,
        )
        .unwrap();
        let err = config.groups(NOW).unwrap_err();
        match err {
            ConfigError::Group {
                kind,
                pattern,
                source,
            } => {
                assert_eq!(kind, "gauge");
                assert_eq!(pattern, "x");
                assert!(matches!(source, GeneratorError::InvalidKind { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_counter_names_pattern() {
        let config: Config = toml::from_str(
            r#"
            counter = ["c{1..2}"]
            value = -10.0
            deviation = 1.0
            "#,
        )
        .unwrap();
        let err = config.groups(NOW).unwrap_err();
        assert!(err.to_string().contains("c{1..2}"));
    }

    #[test]
    fn test_invalid_time() {
        let config = Config {
            general: General {
                from: "yesterday".to_string(),
                ..General::default()
            },
            constant: vec!["m".to_string()],
            ..Config::default()
        };
        assert!(matches!(
            config.groups(NOW).unwrap_err(),
            ConfigError::InvalidTime { .. }
        ));
        // Live runs ignore the window.
        assert_eq!(config.groups_live(NOW).unwrap().len(), 1);
    }

    #[test]
    fn test_wrong_field_type_rejected() {
        assert!(toml::from_str::<Config>("step = \"soon\"").is_err());
    }

    #[test]
    fn test_add_variables() {
        let mut config = Config::default();
        config
            .add_variables(["env=prod", "dc={eu,us}", "empty="])
            .unwrap();
        assert_eq!(config.vars["env"], "prod");
        assert_eq!(config.vars["dc"], "{eu,us}");
        assert_eq!(config.vars["empty"], "");

        let err = config.add_variables(["a=1", "a=2"]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
        assert!(config.add_variables(["novalue"]).is_err());
        assert!(config.add_variables(["=x"]).is_err());
    }

    #[test]
    fn test_sink_address() {
        let config = Config {
            carbon: "udp://127.0.0.1:2003".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.sink_address().unwrap(),
            SinkAddress::Udp("127.0.0.1:2003".to_string())
        );
    }
}
