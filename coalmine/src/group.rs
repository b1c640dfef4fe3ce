//! Generator groups: every series produced by one name pattern.
//!
//! A [`GeneratorGroup`] shares kind, step, window and the randomized-start
//! flag across its members. Members keep expansion order, so a group's
//! points for one tick are always serialized in the same order.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::GeneratorError;
use crate::expand::expand;
use crate::generator::{GeneratorKind, PointGenerator, SeriesParams};

/// Ordered set of point generators built from one pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorGroup {
    pattern: String,
    kind: GeneratorKind,
    step: u64,
    randomized: bool,
    members: Vec<PointGenerator>,
}

impl GeneratorGroup {
    /// Expands `pattern` and creates one generator per resulting name.
    ///
    /// A pattern expanding to nothing produces an empty group, not an error.
    ///
    /// # Errors
    ///
    /// Returns the first construction error of any member; no partial group
    /// is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::collections::HashMap;
    /// use coalmine::generator::{GeneratorKind, SeriesParams};
    /// use coalmine::group::GeneratorGroup;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let group = GeneratorGroup::expand(
    ///     GeneratorKind::Counter,
    ///     "host{1..3}.requests",
    ///     &HashMap::new(),
    ///     &SeriesParams { step: 10, ..SeriesParams::default() },
    /// )?;
    /// assert_eq!(group.len(), 3);
    /// # Ok(())
    /// # }
    /// ```
    pub fn expand(
        kind: GeneratorKind,
        pattern: &str,
        vars: &HashMap<String, String>,
        params: &SeriesParams,
    ) -> Result<Self, GeneratorError> {
        let members = expand(pattern, vars)
            .into_iter()
            .map(|name| PointGenerator::new(kind, name, params))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            pattern: pattern.to_string(),
            kind,
            step: params.step,
            randomized: params.randomize_start,
            members,
        })
    }

    /// The pattern the group was expanded from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Kind shared by all members.
    pub fn kind(&self) -> GeneratorKind {
        self.kind
    }

    /// Step shared by all members, in seconds.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Whether members started at a random offset.
    pub fn is_randomized(&self) -> bool {
        self.randomized
    }

    /// Members in expansion order.
    pub fn members(&self) -> &[PointGenerator] {
        &self.members
    }

    /// Mutable access to the members.
    pub fn members_mut(&mut self) -> &mut [PointGenerator] {
        &mut self.members
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the pattern produced no series.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Names of all members, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(PointGenerator::name)
    }

    /// Advances every member in order.
    ///
    /// Stops at the first member reporting the end of its window: members
    /// already advanced keep their new state, later ones are not touched.
    ///
    /// # Errors
    ///
    /// - [`GeneratorError::NoGenerators`] for an empty group
    /// - [`GeneratorError::GenerationOver`] from the first exhausted member
    pub fn next(&mut self) -> Result<(), GeneratorError> {
        if self.members.is_empty() {
            return Err(GeneratorError::NoGenerators);
        }
        for member in &mut self.members {
            member.next()?;
        }
        Ok(())
    }

    /// Advances each member on its own. Members past the horizon are left
    /// in place for a later tick, once the horizon has moved beyond them.
    ///
    /// Returns the number of members advanced.
    pub fn advance_each(&mut self) -> usize {
        self.members
            .iter_mut()
            .filter(|member| !member.is_exhausted())
            .map(PointGenerator::next)
            .filter(Result::is_ok)
            .count()
    }

    /// Moves the horizon of every member.
    pub fn set_stop(&mut self, stop: u64) {
        for member in &mut self.members {
            member.set_stop(stop);
        }
    }

    /// Appends every member's current point to `buf`, returning bytes added.
    pub fn serialize_into(&mut self, buf: &mut Vec<u8>) -> usize {
        self.members
            .iter_mut()
            .map(|member| member.write_point(buf))
            .sum()
    }

    /// Returns every member's current point as one buffer.
    pub fn points(&mut self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.members.len() * 48);
        self.serialize_into(&mut buf);
        buf
    }

    /// Live-mode tick interval: one second for randomized groups so each
    /// member fires close to its own offset, the step otherwise.
    pub fn tick_interval(&self) -> Duration {
        if self.randomized {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(self.step.max(1))
        }
    }
}
