//! Point generators: the per-series time/value state machine.
//!
//! A [`PointGenerator`] owns one series. Its cursor starts at `start` and
//! moves forward by `step` on every [`next`](PointGenerator::next) call. Once
//! the cursor is past `stop` the generator is exhausted: further `next` calls
//! return [`GeneratorError::GenerationOver`] without touching any state.
//!
//! # Kinds
//!
//! - [`GeneratorKind::Const`]: values resampled around a fixed baseline
//! - [`GeneratorKind::Counter`]: monotonically non-decreasing values
//! - [`GeneratorKind::Random`]: an unbounded random walk
//!
//! # Coverage filter
//!
//! Each generator carries a [`Probability`] that decides whether the current
//! point is written at all. Suppressed points still advance time and value.
//!
//! # Example
//!
//! ```rust
//! use coalmine::generator::{GeneratorKind, PointGenerator, SeriesParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let params = SeriesParams { start: 12, stop: 15, step: 1, value: 30.0, ..SeriesParams::default() };
//! let mut generator = PointGenerator::new(GeneratorKind::Const, "metric.name", &params)?;
//!
//! generator.next()?;
//! assert_eq!(generator.point(), b"metric.name 30 13\n");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use rand::Rng;

use crate::error::GeneratorError;

/// Generator type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    /// Values around a constant baseline.
    Const,
    /// Growing values.
    Counter,
    /// Values drifting from the previous one.
    Random,
}

impl GeneratorKind {
    /// All kinds, in their canonical order.
    pub const ALL: [GeneratorKind; 3] = [Self::Const, Self::Counter, Self::Random];

    /// The configuration name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Const => "const",
            Self::Counter => "counter",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorKind {
    type Err = GeneratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GeneratorError::InvalidKind {
                name: s.to_string(),
            })
    }
}

/// Resolved parameters shared by every series of one pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesParams {
    /// First timestamp, in seconds.
    pub start: u64,
    /// Last timestamp, in seconds.
    pub stop: u64,
    /// Interval between points, in seconds. Must be positive.
    pub step: u64,
    /// Shift the first timestamp by a random offset in `[0, step)`.
    pub randomize_start: bool,
    /// Starting value (the baseline for const, the increment for counter).
    pub value: f64,
    /// Magnitude of the symmetric random perturbation; `0` disables it.
    pub deviation: f64,
    /// Percentage of points to emit, in `[1, 100]`.
    pub probability: u8,
}

impl Default for SeriesParams {
    fn default() -> Self {
        Self {
            start: 0,
            stop: 0,
            step: 1,
            randomize_start: false,
            value: 0.0,
            deviation: 0.0,
            probability: 100,
        }
    }
}

/// Deterministic coverage filter emitting `target` percent of points.
///
/// Every decision adds `target` to an accumulator and emits when it reaches
/// 100. Over any 100 consecutive decisions exactly `target` points pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probability {
    target: u8,
    accumulator: u8,
}

impl Probability {
    /// Creates a filter with a random initial phase.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::InvalidProbability`] if `target` is not in `[1, 100]`.
    pub fn new<R: Rng + ?Sized>(target: u8, rng: &mut R) -> Result<Self, GeneratorError> {
        Self::with_phase(target, rng.gen_range(0..100))
    }

    /// Creates a filter with an explicit accumulator phase (taken modulo 100).
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::InvalidProbability`] if `target` is not in `[1, 100]`.
    pub fn with_phase(target: u8, accumulator: u8) -> Result<Self, GeneratorError> {
        if !(1..=100).contains(&target) {
            return Err(GeneratorError::InvalidProbability { target });
        }
        Ok(Self {
            target,
            accumulator: accumulator % 100,
        })
    }

    /// Configured emit percentage.
    pub fn target(&self) -> u8 {
        self.target
    }

    /// Current accumulator phase, always below 100.
    pub fn accumulator(&self) -> u8 {
        self.accumulator
    }

    /// Makes one emit decision.
    pub fn check(&mut self) -> bool {
        if self.target == 100 {
            return true;
        }
        // accumulator < 100 and target < 100, so the sum fits in a u8
        self.accumulator += self.target;
        if self.accumulator >= 100 {
            self.accumulator -= 100;
            return true;
        }
        false
    }
}

/// Kind-specific state.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Const { baseline: f64 },
    Counter { increment: f64 },
    Random,
}

/// One series' time cursor, current value and emit filter.
#[derive(Debug, Clone, PartialEq)]
pub struct PointGenerator {
    name: String,
    shape: Shape,
    start: u64,
    stop: u64,
    step: u64,
    time: u64,
    value: f64,
    deviation: f64,
    probability: Probability,
}

impl PointGenerator {
    /// Creates a generator using the thread-local RNG for the start offset
    /// and the filter phase.
    ///
    /// # Errors
    ///
    /// See [`PointGenerator::with_rng`].
    pub fn new(
        kind: GeneratorKind,
        name: impl Into<String>,
        params: &SeriesParams,
    ) -> Result<Self, GeneratorError> {
        Self::with_rng(kind, name, params, &mut rand::thread_rng())
    }

    /// Creates a generator drawing its random start offset and filter phase
    /// from `rng`.
    ///
    /// # Errors
    ///
    /// - [`GeneratorError::InvalidStep`] if `params.step` is zero
    /// - [`GeneratorError::InvalidProbability`] if the target is not in `[1, 100]`
    /// - [`GeneratorError::InvalidCounterConfig`] for a counter starting below
    ///   zero whose deviation does not exceed the start magnitude
    pub fn with_rng<R: Rng + ?Sized>(
        kind: GeneratorKind,
        name: impl Into<String>,
        params: &SeriesParams,
        rng: &mut R,
    ) -> Result<Self, GeneratorError> {
        if params.step == 0 {
            return Err(GeneratorError::InvalidStep);
        }
        let probability = Probability::new(params.probability, rng)?;

        let shape = match kind {
            GeneratorKind::Const => Shape::Const {
                baseline: params.value,
            },
            GeneratorKind::Counter => {
                if params.value < 0.0 && params.deviation.abs() <= params.value.abs() {
                    return Err(GeneratorError::InvalidCounterConfig {
                        value: params.value,
                        deviation: params.deviation,
                    });
                }
                Shape::Counter {
                    increment: params.value,
                }
            }
            GeneratorKind::Random => Shape::Random,
        };

        let time = if params.randomize_start {
            params.start.saturating_add(rng.gen_range(0..params.step))
        } else {
            params.start
        };

        Ok(Self {
            name: name.into(),
            shape,
            start: params.start,
            stop: params.stop,
            step: params.step,
            time,
            value: params.value,
            deviation: params.deviation,
            probability,
        })
    }

    /// Series name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generator kind.
    pub fn kind(&self) -> GeneratorKind {
        match self.shape {
            Shape::Const { .. } => GeneratorKind::Const,
            Shape::Counter { .. } => GeneratorKind::Counter,
            Shape::Random => GeneratorKind::Random,
        }
    }

    /// Configured start of the window.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Current stop bound (horizon).
    pub fn stop(&self) -> u64 {
        self.stop
    }

    /// Interval between points.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Current timestamp.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Configured deviation.
    pub fn deviation(&self) -> f64 {
        self.deviation
    }

    /// The emit filter.
    pub fn probability(&self) -> &Probability {
        &self.probability
    }

    /// Moves the horizon.
    pub fn set_stop(&mut self, stop: u64) {
        self.stop = stop;
    }

    /// Returns `true` once the cursor is past the horizon.
    pub fn is_exhausted(&self) -> bool {
        self.time > self.stop
    }

    /// Advances to the next point, sampling noise from the thread-local RNG.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::GenerationOver`] if the cursor was already
    /// past `stop`; the generator is left unchanged.
    pub fn next(&mut self) -> Result<(), GeneratorError> {
        self.next_with(rand::thread_rng().r#gen())
    }

    /// Advances to the next point using `sample`, a uniform draw from `[0, 1)`.
    ///
    /// The perturbation applied is `deviation * (1 - 2 * sample)`.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::GenerationOver`] if the cursor was already
    /// past `stop`; the generator is left unchanged.
    pub fn next_with(&mut self, sample: f64) -> Result<(), GeneratorError> {
        if self.is_exhausted() {
            return Err(GeneratorError::GenerationOver);
        }
        self.time = self.time.saturating_add(self.step);

        let noise = if self.deviation == 0.0 {
            0.0
        } else {
            self.deviation * (1.0 - 2.0 * sample)
        };
        match self.shape {
            Shape::Const { baseline } => self.value = baseline + noise,
            Shape::Counter { increment } => {
                let increment = increment + noise;
                if increment > 0.0 {
                    self.value += increment;
                }
            }
            Shape::Random => self.value += noise,
        }
        Ok(())
    }

    /// Appends the current point in carbon plaintext format to `buf`.
    ///
    /// Returns the number of bytes appended: zero when the generator is
    /// exhausted or the coverage filter suppresses the point.
    pub fn write_point(&mut self, buf: &mut Vec<u8>) -> usize {
        if self.is_exhausted() || !self.probability.check() {
            return 0;
        }
        let before = buf.len();
        // Writing into a Vec cannot fail.
        let _ = writeln!(buf, "{} {} {}", self.name, self.value, self.time);
        buf.len() - before
    }

    /// Returns the current point as bytes, e.g. `b"metric.name 123.33 1234567890\n"`.
    pub fn point(&mut self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.name.len() + 32);
        self.write_point(&mut buf);
        buf
    }
}
