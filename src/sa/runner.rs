//! Annealing engine and execution loop.

use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::config::{AnnealConfig, RunSchedule};
use super::progress::{remaining, IntervalStats, ProgressLine, ProgressSink};
use super::types::StateMover;
use crate::error::{AnnealError, Result};

/// Summary of a completed annealing run.
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Number of perturbations attempted.
    pub steps: usize,

    /// Number of accepted moves (including improvements).
    pub accepted_moves: usize,

    /// Number of accepted moves that lowered the working energy.
    pub improving_moves: usize,

    /// Temperature at the last step.
    pub final_temperature: f64,

    /// Best energy at the end of the run.
    pub best_energy: f64,

    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Simulated annealing engine over a caller-defined state.
///
/// Holds the best state found so far together with its energy, the random
/// source and an optional progress sink. The best pair is replaced only when
/// a run completes, so it never reflects a partially finished search.
///
/// # Examples
///
/// ```
/// use rand::Rng;
/// use std::convert::Infallible;
/// use u_anneal::sa::{Annealer, StateMover};
///
/// struct Scale;
///
/// impl StateMover for Scale {
///     type State = f64;
///     type Error = Infallible;
///
///     fn perturb<R: Rng>(&self, x: &mut f64, rng: &mut R) -> Result<f64, Infallible> {
///         *x *= rng.random_range(0.7..1.4);
///         Ok((*x * 0.5).abs())
///     }
/// }
///
/// let mut annealer = Annealer::new(Scale, 20.0, 10.0).with_seed(42);
/// annealer.run_annealing(1.0, 0.01, 1000, 0).unwrap();
/// assert!(annealer.best_energy() < 10.0);
/// ```
pub struct Annealer<M: StateMover> {
    pub(crate) mover: M,
    pub(crate) best_state: M::State,
    pub(crate) best_energy: f64,
    pub(crate) rng: StdRng,
    pub(crate) progress: Option<ProgressSink>,
}

impl<M: StateMover> Annealer<M> {
    /// Creates an engine whose best pair is `(initial_state, initial_energy)`.
    ///
    /// The energy is trusted as given. The random source is seeded from
    /// the thread RNG; use [`with_seed`](Self::with_seed) for reproducibility.
    pub fn new(mover: M, initial_state: M::State, initial_energy: f64) -> Self {
        Self {
            mover,
            best_state: initial_state,
            best_energy: initial_energy,
            rng: StdRng::seed_from_u64(rand::random()),
            progress: None,
        }
    }

    /// Reseeds the random source.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Attaches a destination for progress lines.
    pub fn with_progress<W: Write + Send + 'static>(mut self, sink: W) -> Self {
        self.progress = Some(ProgressSink::new(Box::new(sink)));
        self
    }

    /// Detaches the progress sink, if any.
    pub fn without_progress(mut self) -> Self {
        self.progress = None;
        self
    }

    /// The best state found so far.
    pub fn best_state(&self) -> &M::State {
        &self.best_state
    }

    /// Energy of [`best_state`](Self::best_state).
    pub fn best_energy(&self) -> f64 {
        self.best_energy
    }

    /// The move capability.
    pub fn mover(&self) -> &M {
        &self.mover
    }

    /// Consumes the engine, returning the best state and its energy.
    pub fn into_best(self) -> (M::State, f64) {
        (self.best_state, self.best_energy)
    }

    /// Anneals from `max_t` down to `min_t` over `steps` perturbations.
    ///
    /// Temperature follows `T(step) = max_t * exp(-ln(max_t / min_t) * step / steps)`.
    /// Worsening moves are accepted with probability `exp(-dE / T)`. When
    /// `updates > 0` and a sink is attached, a progress line is written at
    /// step 0 and then every `steps / updates` steps.
    ///
    /// # Panics
    ///
    /// Panics unless `0 < min_t < max_t` and both are finite.
    ///
    /// # Errors
    ///
    /// Returns [`AnnealError::Move`] if the mover fails. The best pair is
    /// left as it was before the call.
    pub fn run_annealing(
        &mut self,
        max_t: f64,
        min_t: f64,
        steps: usize,
        updates: usize,
    ) -> Result<RunStats, M::Error> {
        let schedule = RunSchedule::new(max_t, min_t, steps)
            .unwrap_or_else(|msg| panic!("invalid annealing schedule: {msg}"));
        self.anneal(&schedule, updates)
    }

    /// Runs a schedule, typically one produced by
    /// [`compute_run_schedule`](Self::compute_run_schedule).
    ///
    /// # Panics
    ///
    /// Panics if the schedule's temperatures are out of order, as
    /// [`run_annealing`](Self::run_annealing) does.
    pub fn run_schedule(
        &mut self,
        schedule: &RunSchedule,
        updates: usize,
    ) -> Result<RunStats, M::Error> {
        self.anneal(schedule, updates)
    }

    /// Runs with `AnnealConfig::default()`: 25000 down to 2.5 over 50000 steps.
    pub fn run_default(&mut self) -> Result<RunStats, M::Error> {
        self.run_config(&AnnealConfig::default())
    }

    /// Runs a configuration, reseeding first when it carries a seed.
    ///
    /// Unlike [`run_annealing`](Self::run_annealing), an invalid
    /// configuration is reported as [`AnnealError::InvalidSchedule`].
    pub fn run_config(&mut self, config: &AnnealConfig) -> Result<RunStats, M::Error> {
        let schedule = config.schedule().map_err(AnnealError::InvalidSchedule)?;
        if let Some(seed) = config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.anneal(&schedule, config.updates)
    }

    fn anneal(&mut self, schedule: &RunSchedule, updates: usize) -> Result<RunStats, M::Error> {
        if let Err(msg) = schedule.validate() {
            panic!("invalid annealing schedule: {msg}");
        }
        let steps = schedule.steps();
        let start = Instant::now();

        info!(
            event = "anneal_start",
            max_temperature = schedule.max_temperature(),
            min_temperature = schedule.min_temperature(),
            steps,
            updates,
        );

        let mut state = self.best_state.clone();
        let mut energy = self.best_energy;
        let mut best_state = state.clone();
        let mut best_energy = energy;

        let report = updates > 0;
        let interval = if report { (steps / updates).max(1) } else { 0 };
        let mut stats = IntervalStats::default();
        let mut accepted_moves = 0usize;
        let mut improving_moves = 0usize;
        let mut temperature = schedule.max_temperature();

        if report {
            if let Some(sink) = self.progress.as_mut() {
                sink.begin();
            }
            self.report(0, steps, temperature, energy, &stats, start);
        }

        for step in 1..=steps {
            temperature = schedule.temperature_at(step);

            let mut candidate = state.clone();
            let candidate_energy = self
                .mover
                .perturb(&mut candidate, &mut self.rng)
                .map_err(AnnealError::Move)?;
            let delta = candidate_energy - energy;

            // Metropolis acceptance criterion
            let improved = delta < 0.0;
            let accept =
                improved || self.rng.random_range(0.0..1.0) < (-delta / temperature).exp();

            if accept {
                state = candidate;
                energy = candidate_energy;
                accepted_moves += 1;
                if improved {
                    improving_moves += 1;
                }
                if energy < best_energy {
                    best_state = state.clone();
                    best_energy = energy;
                }
            }
            stats.record(accept, improved);

            if report && step % interval == 0 {
                self.report(step, steps, temperature, energy, &stats, start);
                stats = IntervalStats::default();
            }
        }

        self.best_state = best_state;
        self.best_energy = best_energy;

        let elapsed = start.elapsed();
        info!(
            event = "anneal_end",
            steps,
            accepted_moves,
            improving_moves,
            duration_ms = elapsed.as_millis() as u64,
            best_energy,
        );

        Ok(RunStats {
            steps,
            accepted_moves,
            improving_moves,
            final_temperature: temperature,
            best_energy,
            elapsed,
        })
    }

    fn report(
        &mut self,
        step: usize,
        steps: usize,
        temperature: f64,
        energy: f64,
        stats: &IntervalStats,
        start: Instant,
    ) {
        let elapsed = start.elapsed();
        let line = ProgressLine {
            temperature,
            energy,
            acceptance: stats.acceptance(),
            improvement: stats.improvement(),
            elapsed,
            remaining: remaining(elapsed, step, steps),
        };

        debug!(
            event = "anneal_progress",
            step,
            temperature,
            energy,
            acceptance = line.acceptance,
            improvement = line.improvement,
        );

        if let Some(sink) = self.progress.as_mut() {
            sink.line(&line);
        }
    }
}

impl<M> fmt::Debug for Annealer<M>
where
    M: StateMover + fmt::Debug,
    M::State: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Annealer")
            .field("mover", &self.mover)
            .field("best_state", &self.best_state)
            .field("best_energy", &self.best_energy)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}
