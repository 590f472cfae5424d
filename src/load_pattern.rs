use rand::Rng;
use std::str::FromStr;
use tokio::time::Duration;

use crate::errors::ConfigError;

pub const DEFAULT_BASE_RPS: f64 = 10.0;
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(10);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);

/// How a worker paces itself between consecutive requests.
///
/// Each worker paces independently, so a pool of N workers running
/// `Constant { base_rps }` produces roughly `N * base_rps` requests per
/// second in aggregate. There is no pool-wide rate coordination.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadPattern {
    /// Fixed delay of `1 / base_rps` seconds.
    Constant { base_rps: f64 },

    /// Delay drawn uniformly from `[min_delay, max_delay]` on every call.
    Random {
        min_delay: Duration,
        max_delay: Duration,
    },
}

impl LoadPattern {
    pub fn name(&self) -> &'static str {
        match self {
            LoadPattern::Constant { .. } => "constant",
            LoadPattern::Random { .. } => "random",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            LoadPattern::Constant { base_rps } => {
                if !base_rps.is_finite()
                    || *base_rps <= 0.0
                    || Duration::try_from_secs_f64(1.0 / base_rps).is_err()
                {
                    return Err(ConfigError::InvalidRate(*base_rps));
                }
            }
            LoadPattern::Random {
                min_delay,
                max_delay,
            } => {
                if min_delay > max_delay {
                    return Err(ConfigError::InvalidDelayBounds {
                        min: *min_delay,
                        max: *max_delay,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for LoadPattern {
    fn default() -> Self {
        LoadPattern::Constant {
            base_rps: DEFAULT_BASE_RPS,
        }
    }
}

/// Pattern kind as named in configuration, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Constant,
    Random,
}

impl FromStr for PatternKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "constant" => Ok(PatternKind::Constant),
            "random" => Ok(PatternKind::Random),
            _ => Err(ConfigError::UnknownPattern(s.to_string())),
        }
    }
}

/// Validated pacing configuration shared read-only by every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadConfig {
    pattern: LoadPattern,
    duration: Duration,
}

impl LoadConfig {
    /// `duration` of zero means the run is unbounded.
    pub fn new(pattern: LoadPattern, duration: Duration) -> Result<Self, ConfigError> {
        pattern.validate()?;
        Ok(Self { pattern, duration })
    }

    pub fn constant(base_rps: f64) -> Result<Self, ConfigError> {
        Self::new(LoadPattern::Constant { base_rps }, Duration::ZERO)
    }

    pub fn random(min_delay: Duration, max_delay: Duration) -> Result<Self, ConfigError> {
        Self::new(
            LoadPattern::Random {
                min_delay,
                max_delay,
            },
            Duration::ZERO,
        )
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn pattern(&self) -> &LoadPattern {
        &self.pattern
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// `None` when the run has no configured end.
    pub fn deadline(&self) -> Option<Duration> {
        if self.duration.is_zero() {
            None
        } else {
            Some(self.duration)
        }
    }

    /// Delay a worker waits after finishing one request before the next.
    pub fn next_delay(&self) -> Duration {
        match &self.pattern {
            LoadPattern::Constant { base_rps } => Duration::from_secs_f64(1.0 / base_rps),
            LoadPattern::Random {
                min_delay,
                max_delay,
            } => {
                let min = duration_nanos(*min_delay);
                let max = duration_nanos(*max_delay);
                Duration::from_nanos(rand::thread_rng().gen_range(min..=max))
            }
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            pattern: LoadPattern::default(),
            duration: Duration::ZERO,
        }
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
