use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Named aggregation computable over a bucketed interval.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFunction {
    Interp,
    Plot,
    Avg,
    Min,
    Max,
}

impl DataFunction {
    pub const ALL: [DataFunction; 5] = [
        DataFunction::Interp,
        DataFunction::Plot,
        DataFunction::Avg,
        DataFunction::Min,
        DataFunction::Max,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataFunction::Interp => "INTERP",
            DataFunction::Plot => "PLOT",
            DataFunction::Avg => "AVG",
            DataFunction::Min => "MIN",
            DataFunction::Max => "MAX",
        }
    }
}

impl fmt::Display for DataFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataFunction::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Unsupported(s.to_string()))
    }
}

/// How a processed read partitions `[start, end]`: either buckets of a
/// fixed width, or a fixed number of equal buckets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Buckets {
    Interval(Duration),
    Count(usize),
}

impl Buckets {
    /// The bucket width over `[start, end]`, never zero.
    pub fn width(self, span: Duration) -> Duration {
        let width = match self {
            Buckets::Interval(interval) => interval,
            Buckets::Count(count) => span / count.max(1).min(u32::MAX as usize) as u32,
        };
        width.max(Duration::from_micros(1))
    }
}
