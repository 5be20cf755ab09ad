//! Annealing schedules and calibration parameters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default starting temperature of a run.
pub const DEFAULT_MAX_TEMPERATURE: f64 = 25_000.0;
/// Default final temperature of a run.
pub const DEFAULT_MIN_TEMPERATURE: f64 = 2.5;
/// Default number of annealing steps.
pub const DEFAULT_STEPS: usize = 50_000;
/// Default number of progress lines per run.
pub const DEFAULT_UPDATES: usize = 100;
/// Default number of trials per calibration round.
pub const DEFAULT_CALIBRATION_STEPS: usize = 2000;

/// Checks `0 < min < max` with both bounds finite.
pub(crate) fn check_temperatures(max: f64, min: f64) -> Result<(), String> {
    if !max.is_finite() || !min.is_finite() {
        return Err(format!("temperatures must be finite, got max={max} min={min}"));
    }
    if min <= 0.0 {
        return Err(format!("min temperature must be positive, got {min}"));
    }
    if min >= max {
        return Err(format!(
            "min temperature must be less than max temperature, got min={min} max={max}"
        ));
    }
    Ok(())
}

/// Temperature bounds and step count for a single annealing run.
///
/// Produced by [`Annealer::compute_run_schedule`](super::Annealer::compute_run_schedule)
/// and consumed by [`Annealer::run_schedule`](super::Annealer::run_schedule).
/// Always satisfies `0 < min_temperature < max_temperature`.
///
/// # Examples
///
/// ```
/// use u_anneal::sa::RunSchedule;
///
/// let schedule = RunSchedule::new(100.0, 0.5, 10_000).unwrap();
/// assert_eq!(schedule.steps(), 10_000);
/// assert!(RunSchedule::new(1.0, 2.0, 10).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawSchedule"))]
pub struct RunSchedule {
    max_temperature: f64,
    min_temperature: f64,
    steps: usize,
}

/// Unvalidated wire form of [`RunSchedule`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawSchedule {
    max_temperature: f64,
    min_temperature: f64,
    steps: usize,
}

#[cfg(feature = "serde")]
impl TryFrom<RawSchedule> for RunSchedule {
    type Error = String;

    fn try_from(raw: RawSchedule) -> Result<Self, String> {
        RunSchedule::new(raw.max_temperature, raw.min_temperature, raw.steps)
    }
}

impl RunSchedule {
    /// Creates a validated schedule.
    pub fn new(max_temperature: f64, min_temperature: f64, steps: usize) -> Result<Self, String> {
        check_temperatures(max_temperature, min_temperature)?;
        Ok(Self {
            max_temperature,
            min_temperature,
            steps,
        })
    }

    /// Re-checks the temperature bounds.
    pub fn validate(&self) -> Result<(), String> {
        check_temperatures(self.max_temperature, self.min_temperature)
    }

    /// Builds a schedule without checking it.
    #[cfg(test)]
    pub(crate) fn unchecked(max_temperature: f64, min_temperature: f64, steps: usize) -> Self {
        Self {
            max_temperature,
            min_temperature,
            steps,
        }
    }

    /// Starting temperature.
    pub fn max_temperature(&self) -> f64 {
        self.max_temperature
    }

    /// Final temperature.
    pub fn min_temperature(&self) -> f64 {
        self.min_temperature
    }

    /// Number of annealing steps.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Temperature at `step` of the exponential cooling curve.
    ///
    /// `T(step) = max * exp(-ln(max / min) * step / steps)`, so `T(0) = max`
    /// and `T(steps) = min`. A zero-step schedule stays at `max`.
    pub fn temperature_at(&self, step: usize) -> f64 {
        if self.steps == 0 {
            return self.max_temperature;
        }
        let factor = -(self.max_temperature / self.min_temperature).ln();
        self.max_temperature * (factor * step as f64 / self.steps as f64).exp()
    }
}

impl Default for RunSchedule {
    fn default() -> Self {
        Self {
            max_temperature: DEFAULT_MAX_TEMPERATURE,
            min_temperature: DEFAULT_MIN_TEMPERATURE,
            steps: DEFAULT_STEPS,
        }
    }
}

/// Configuration for an annealing run.
///
/// # Examples
///
/// ```
/// use u_anneal::sa::AnnealConfig;
///
/// let config = AnnealConfig::default()
///     .with_max_temperature(500.0)
///     .with_min_temperature(0.1)
///     .with_steps(20_000)
///     .with_updates(0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnnealConfig {
    /// Starting temperature. Higher values accept worsening moves more freely.
    pub max_temperature: f64,

    /// Final temperature. Must be positive and below `max_temperature`.
    pub min_temperature: f64,

    /// Number of perturbations to attempt.
    pub steps: usize,

    /// Number of progress lines to emit. 0 = silent.
    pub updates: usize,

    /// Random seed for reproducibility.
    pub seed: Option<u64>,
}

impl Default for AnnealConfig {
    fn default() -> Self {
        Self {
            max_temperature: DEFAULT_MAX_TEMPERATURE,
            min_temperature: DEFAULT_MIN_TEMPERATURE,
            steps: DEFAULT_STEPS,
            updates: DEFAULT_UPDATES,
            seed: None,
        }
    }
}

impl AnnealConfig {
    pub fn with_max_temperature(mut self, t: f64) -> Self {
        self.max_temperature = t;
        self
    }

    pub fn with_min_temperature(mut self, t: f64) -> Self {
        self.min_temperature = t;
        self
    }

    pub fn with_steps(mut self, n: usize) -> Self {
        self.steps = n;
        self
    }

    pub fn with_updates(mut self, n: usize) -> Self {
        self.updates = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Applies a calibrated schedule, keeping `updates` and `seed`.
    pub fn with_schedule(mut self, schedule: &RunSchedule) -> Self {
        self.max_temperature = schedule.max_temperature;
        self.min_temperature = schedule.min_temperature;
        self.steps = schedule.steps;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        check_temperatures(self.max_temperature, self.min_temperature)
    }

    /// The schedule part of this configuration.
    pub fn schedule(&self) -> Result<RunSchedule, String> {
        RunSchedule::new(self.max_temperature, self.min_temperature, self.steps)
    }
}

/// Parameters of the schedule calibration search.
///
/// The defaults reproduce the classical auto-tuning procedure: rounds of
/// 2000 trials, a 98% acceptance target for the maximum temperature, and
/// a 1.5x temperature step bounded by `[1e-10, 1e25]`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationConfig {
    /// Trials per temperature round.
    pub sample_steps: usize,

    /// Acceptance rate that defines the maximum temperature.
    pub target_acceptance: f64,

    /// Multiplicative temperature step between rounds. Must exceed 1.
    pub scale: f64,

    /// Lowest temperature a round may use.
    pub min_temperature_floor: f64,

    /// Highest temperature a round may use.
    pub max_temperature_ceiling: f64,

    /// Moves to try before giving up on finding a nonzero energy delta.
    pub max_seed_attempts: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sample_steps: DEFAULT_CALIBRATION_STEPS,
            target_acceptance: 0.98,
            scale: 1.5,
            min_temperature_floor: 1e-10,
            max_temperature_ceiling: 1e25,
            max_seed_attempts: 10_000,
        }
    }
}

impl CalibrationConfig {
    pub fn with_sample_steps(mut self, n: usize) -> Self {
        self.sample_steps = n;
        self
    }

    pub fn with_target_acceptance(mut self, rate: f64) -> Self {
        self.target_acceptance = rate;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_steps == 0 {
            return Err("sample_steps must be at least 1".into());
        }
        if !(self.target_acceptance > 0.0 && self.target_acceptance < 1.0) {
            return Err(format!(
                "target_acceptance must be in (0, 1), got {}",
                self.target_acceptance
            ));
        }
        if !(self.scale > 1.0 && self.scale.is_finite()) {
            return Err(format!("scale must be finite and > 1, got {}", self.scale));
        }
        check_temperatures(self.max_temperature_ceiling, self.min_temperature_floor)?;
        if self.max_seed_attempts == 0 {
            return Err("max_seed_attempts must be at least 1".into());
        }
        Ok(())
    }
}
