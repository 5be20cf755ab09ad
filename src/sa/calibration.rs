//! Schedule calibration.
//!
//! Finds a temperature range and step count for a target wall-clock budget
//! by probing the acceptance behaviour of the caller's moves:
//!
//! 1. Perturb a scratch copy of the best state until the energy changes;
//!    the size of that change seeds the temperature.
//! 2. Scale the temperature by 1.5 until the acceptance rate of a round
//!    crosses 98%. That temperature is `Tmax`.
//! 3. Keep cooling from `Tmax` until a round sees no improving move. That
//!    temperature is `Tmin`.
//! 4. Extrapolate the step count from the number of moves tried during
//!    calibration and the time they took.
//!
//! Rounds stop at a floor of `1e-10` and a ceiling of `1e25`.

use std::time::Instant;

use rand::Rng;
use tracing::{debug, info, warn};

use super::config::{CalibrationConfig, RunSchedule, DEFAULT_CALIBRATION_STEPS};
use super::progress::{ProgressLine, ProgressSink};
use super::runner::Annealer;
use super::types::StateMover;
use crate::error::{AnnealError, Result};

/// Outcome of a fixed-temperature round.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sample {
    /// Accepted trials / trials.
    pub acceptance: f64,
    /// Improving trials / trials.
    pub improvement: f64,
    /// Energy of the last improving state reached.
    pub energy: f64,
}

/// Running totals for one calibration.
struct Tally {
    start: Instant,
    sampled_steps: usize,
    rounds: usize,
}

impl<M: StateMover> Annealer<M> {
    /// Runs `steps` Metropolis trials at the fixed temperature `temperature`.
    ///
    /// Starts from the best state but never updates it. Only improving
    /// moves are followed: a worsening move that passes the acceptance test
    /// is counted but the walk stays where it was. This keeps the round
    /// focused on how often improvements occur at `temperature`.
    pub(crate) fn sample_at_temperature(
        &mut self,
        temperature: f64,
        steps: usize,
    ) -> Result<Sample, M::Error> {
        let mut state = self.best_state.clone();
        let mut energy = self.best_energy;
        let mut accepted = 0usize;
        let mut improving = 0usize;

        for _ in 0..steps {
            let mut candidate = state.clone();
            let candidate_energy = self
                .mover
                .perturb(&mut candidate, &mut self.rng)
                .map_err(AnnealError::Move)?;
            let delta = candidate_energy - energy;

            let improved = delta < 0.0;
            let accept =
                improved || self.rng.random_range(0.0..1.0) < (-delta / temperature).exp();

            if accept {
                accepted += 1;
                if improved {
                    improving += 1;
                    state = candidate;
                    energy = candidate_energy;
                }
            }
        }

        if steps == 0 {
            return Ok(Sample {
                acceptance: 0.0,
                improvement: 0.0,
                energy,
            });
        }
        Ok(Sample {
            acceptance: accepted as f64 / steps as f64,
            improvement: improving as f64 / steps as f64,
            energy,
        })
    }

    /// Calibrates a schedule for a run of about `target_minutes`, using
    /// rounds of 2000 trials.
    pub fn compute_run_schedule_default(
        &mut self,
        target_minutes: f64,
    ) -> Result<RunSchedule, M::Error> {
        self.compute_run_schedule(target_minutes, DEFAULT_CALIBRATION_STEPS)
    }

    /// Calibrates a schedule for a run of about `target_minutes`, using
    /// rounds of `steps` trials.
    ///
    /// The step count is extrapolated from this machine's speed during
    /// calibration and the temperature bounds from noisy samples, so the
    /// result is a starting point rather than a guarantee.
    ///
    /// # Errors
    ///
    /// - [`AnnealError::InvalidDuration`] if `target_minutes` is not positive.
    /// - [`AnnealError::InvalidSampleSize`] if `steps` is zero.
    /// - [`AnnealError::DegenerateMoves`] if no move changes the energy.
    /// - [`AnnealError::Move`] if the mover fails.
    pub fn compute_run_schedule(
        &mut self,
        target_minutes: f64,
        steps: usize,
    ) -> Result<RunSchedule, M::Error> {
        let config = CalibrationConfig::default().with_sample_steps(steps);
        self.compute_run_schedule_with(target_minutes, &config)
    }

    /// Calibrates a schedule with explicit search parameters.
    pub fn compute_run_schedule_with(
        &mut self,
        target_minutes: f64,
        config: &CalibrationConfig,
    ) -> Result<RunSchedule, M::Error> {
        if !(target_minutes.is_finite() && target_minutes > 0.0) {
            return Err(AnnealError::InvalidDuration(target_minutes));
        }
        if config.sample_steps == 0 {
            return Err(AnnealError::InvalidSampleSize);
        }
        config.validate().map_err(AnnealError::InvalidSchedule)?;

        let mut tally = Tally {
            start: Instant::now(),
            sampled_steps: 0,
            rounds: 0,
        };
        if let Some(sink) = self.progress.as_mut() {
            sink.begin();
        }

        let mut temperature = self.seed_temperature(config, &mut tally)?;
        let mut sample = self.sample_round(temperature, config, &mut tally)?;

        while sample.acceptance > config.target_acceptance {
            let next = temperature / config.scale;
            if next < config.min_temperature_floor {
                warn!(temperature, "calibration reached the temperature floor");
                break;
            }
            temperature = next;
            sample = self.sample_round(temperature, config, &mut tally)?;
        }
        while sample.acceptance < config.target_acceptance {
            let next = temperature * config.scale;
            if next > config.max_temperature_ceiling {
                warn!(temperature, "calibration reached the temperature ceiling");
                break;
            }
            temperature = next;
            sample = self.sample_round(temperature, config, &mut tally)?;
        }
        let max_temperature = temperature;

        while sample.improvement > 0.0 {
            let next = temperature / config.scale;
            if next < config.min_temperature_floor {
                warn!(temperature, "calibration reached the temperature floor");
                break;
            }
            temperature = next;
            sample = self.sample_round(temperature, config, &mut tally)?;
        }
        let mut min_temperature = temperature;
        if min_temperature >= max_temperature {
            min_temperature = max_temperature / config.scale;
        }

        let elapsed = tally.start.elapsed().as_secs_f64().max(f64::EPSILON);
        let steps = (60.0 * target_minutes * tally.sampled_steps as f64 / elapsed) as usize;

        info!(
            event = "calibration_end",
            max_temperature,
            min_temperature,
            steps,
            rounds = tally.rounds,
            sampled_steps = tally.sampled_steps,
            duration_ms = (elapsed * 1000.0) as u64,
        );

        RunSchedule::new(max_temperature, min_temperature, steps)
            .map_err(AnnealError::InvalidSchedule)
    }

    /// Size of the first nonzero energy change from the best state.
    fn seed_temperature(
        &mut self,
        config: &CalibrationConfig,
        tally: &mut Tally,
    ) -> Result<f64, M::Error> {
        let mut scratch = self.best_state.clone();
        for _ in 0..config.max_seed_attempts {
            let energy = self
                .mover
                .perturb(&mut scratch, &mut self.rng)
                .map_err(AnnealError::Move)?;
            tally.sampled_steps += 1;

            let delta = (energy - self.best_energy).abs();
            if delta > 0.0 && delta.is_finite() {
                debug!(temperature = delta, "calibration seed temperature");
                return Ok(delta);
            }
        }
        Err(AnnealError::DegenerateMoves {
            attempts: config.max_seed_attempts,
        })
    }

    fn sample_round(
        &mut self,
        temperature: f64,
        config: &CalibrationConfig,
        tally: &mut Tally,
    ) -> Result<Sample, M::Error> {
        let sample = self.sample_at_temperature(temperature, config.sample_steps)?;
        tally.sampled_steps += config.sample_steps;
        tally.rounds += 1;

        debug!(
            event = "calibration_round",
            temperature,
            acceptance = sample.acceptance,
            improvement = sample.improvement,
            energy = sample.energy,
        );

        if let Some(sink) = self.progress.as_mut() {
            report_round(sink, temperature, &sample, tally);
        }
        Ok(sample)
    }
}

fn report_round(sink: &mut ProgressSink, temperature: f64, sample: &Sample, tally: &Tally) {
    sink.line(&ProgressLine {
        temperature,
        energy: sample.energy,
        acceptance: Some(sample.acceptance),
        improvement: Some(sample.improvement),
        elapsed: tally.start.elapsed(),
        remaining: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sa::runner::tests::{linear, Exhausted, FailingMover, LinearMover, SharedBuf};
    use crate::sa::FnMover;
    use rand::RngCore;
    use std::cell::Cell;
    use std::convert::Infallible;
    use std::hint::black_box;

    /// Leaves the state alone and always reports `base + delta`.
    struct FixedDelta {
        base: f64,
        delta: f64,
    }

    impl StateMover for FixedDelta {
        type State = ();
        type Error = Infallible;

        fn perturb<R: Rng>(
            &self,
            _state: &mut (),
            _rng: &mut R,
        ) -> std::result::Result<f64, Infallible> {
            Ok(self.base + self.delta)
        }
    }

    const BASE: f64 = 100.0;

    /// Replays a fixed outcome per calibration round.
    ///
    /// The first call seeds the temperature at 1. After that, calls are
    /// grouped into rounds of `sample_steps`; round `p` makes
    /// `plan[p].0` improving moves first, `plan[p].1` rejected (NaN) moves
    /// last and neutral moves in between. Rounds past the plan reject
    /// everything.
    struct Scripted {
        sample_steps: usize,
        plan: Vec<(usize, usize)>,
        calls: Cell<usize>,
        walk: Cell<f64>,
    }

    impl Scripted {
        fn new(sample_steps: usize, plan: Vec<(usize, usize)>) -> Self {
            Self {
                sample_steps,
                plan,
                calls: Cell::new(0),
                walk: Cell::new(BASE),
            }
        }
    }

    impl StateMover for Scripted {
        type State = ();
        type Error = Infallible;

        fn perturb<R: Rng>(
            &self,
            _state: &mut (),
            _rng: &mut R,
        ) -> std::result::Result<f64, Infallible> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call == 0 {
                return Ok(BASE + 1.0);
            }

            let (round, index) = ((call - 1) / self.sample_steps, (call - 1) % self.sample_steps);
            if index == 0 {
                self.walk.set(BASE);
            }
            let (improving, rejected) = self
                .plan
                .get(round)
                .copied()
                .unwrap_or((0, self.sample_steps));

            if index < improving {
                self.walk.set(self.walk.get() - 1.0);
                Ok(self.walk.get())
            } else if index >= self.sample_steps - rejected {
                Ok(f64::NAN)
            } else {
                Ok(self.walk.get())
            }
        }
    }

    /// Integer walk on `|x|` with some busy work per move.
    struct Walk;

    impl StateMover for Walk {
        type State = i64;
        type Error = Infallible;

        fn perturb<R: Rng>(
            &self,
            x: &mut i64,
            rng: &mut R,
        ) -> std::result::Result<f64, Infallible> {
            *x += if rng.random_bool(0.5) { 1 } else { -1 };
            let mut acc = 0u64;
            for i in 0..200u64 {
                acc = black_box(acc.wrapping_mul(31).wrapping_add(i));
            }
            black_box(acc);
            Ok(x.abs() as f64)
        }
    }

    #[test]
    fn test_sample_acceptance_matches_metropolis() {
        let (t, de) = (2.0, 1.5);
        let mover = FixedDelta { base: 10.0, delta: de };
        let mut annealer = Annealer::new(mover, (), 10.0).with_seed(11);

        let sample = annealer.sample_at_temperature(t, 20_000).unwrap();

        let expected = (-de / t).exp();
        assert!(
            (sample.acceptance - expected).abs() < 0.02,
            "expected acceptance near {expected}, got {}",
            sample.acceptance
        );
        assert_eq!(sample.improvement, 0.0);
        assert_eq!(sample.energy, 10.0);
    }

    #[test]
    fn test_sample_does_not_touch_best() {
        let mut annealer = linear(30.0);
        let sample = annealer.sample_at_temperature(1.0, 500).unwrap();
        assert!(sample.improvement > 0.0);
        assert!(sample.energy < 15.0);
        assert_eq!(*annealer.best_state(), 30.0);
        assert_eq!(annealer.best_energy(), 15.0);
    }

    #[test]
    fn test_sample_follows_improving_moves_only() {
        // Random +-1 steps on |x|: worsening proposals never move the walk.
        let mover = FnMover::new(|x: &mut i64, rng: &mut dyn RngCore| {
            *x += if rng.random_bool(0.5) { 1 } else { -1 };
            x.abs() as f64
        });
        let mut annealer = Annealer::new(mover, 5_i64, 5.0).with_seed(3);

        let sample = annealer.sample_at_temperature(1e12, 200).unwrap();

        // Every move is accepted at such a high temperature but the walk
        // only descends, reaching zero within the sample.
        assert!(sample.acceptance > 0.99);
        assert_eq!(sample.energy, 0.0);
    }

    #[test]
    fn test_sample_zero_steps() {
        let mut annealer = linear(30.0);
        let sample = annealer.sample_at_temperature(1.0, 0).unwrap();
        assert_eq!(sample.acceptance, 0.0);
        assert_eq!(sample.improvement, 0.0);
        assert_eq!(sample.energy, 15.0);
    }

    #[test]
    fn test_schedule_bounds_are_ordered() {
        let mut annealer = Annealer::new(Walk, 40_i64, 40.0).with_seed(5);
        let schedule = annealer.compute_run_schedule(0.1, 200).unwrap();

        assert!(schedule.min_temperature() > 0.0);
        assert!(schedule.min_temperature() < schedule.max_temperature());
        assert!(schedule.steps() > 0);
        assert_eq!(*annealer.best_state(), 40);
    }

    #[test]
    fn test_linear_schedule_bounds_are_ordered() {
        let mut annealer = linear(30.0);
        let schedule = annealer.compute_run_schedule(0.2, 300).unwrap();
        assert!(schedule.min_temperature() > 0.0);
        assert!(schedule.min_temperature() < schedule.max_temperature());
    }

    #[test]
    fn test_local_minimum_still_yields_ordered_bounds() {
        // Starting at the minimum: no round ever sees an improvement.
        let mut annealer = Annealer::new(Walk, 0_i64, 0.0).with_seed(8);
        let schedule = annealer.compute_run_schedule(0.1, 200).unwrap();
        assert!(schedule.min_temperature() < schedule.max_temperature());
    }

    #[test]
    fn test_steps_scale_with_target_time() {
        let mut short = Annealer::new(Walk, 40_i64, 40.0).with_seed(21);
        let mut long = Annealer::new(Walk, 40_i64, 40.0).with_seed(21);

        let a = short.compute_run_schedule(0.2, 500).unwrap();
        let b = long.compute_run_schedule(0.4, 500).unwrap();

        let ratio = b.steps() as f64 / a.steps() as f64;
        assert!(
            (ratio - 2.0).abs() <= 0.6,
            "expected step ratio near 2, got {ratio}"
        );
    }

    #[test]
    fn test_invalid_arguments() {
        let mut annealer = linear(30.0);
        assert!(matches!(
            annealer.compute_run_schedule(0.0, 100),
            Err(AnnealError::InvalidDuration(_))
        ));
        assert!(matches!(
            annealer.compute_run_schedule(f64::NAN, 100),
            Err(AnnealError::InvalidDuration(_))
        ));
        assert!(matches!(
            annealer.compute_run_schedule(1.0, 0),
            Err(AnnealError::InvalidSampleSize)
        ));
    }

    #[test]
    fn test_max_temperature_is_first_hot_enough_round() {
        // Every move worsens by 1, so a round accepts about exp(-1 / T).
        // exp(-1 / 1.5^9) = 0.974 and exp(-1 / 1.5^10) = 0.983.
        let mover = FixedDelta { base: 11.0, delta: 1.0 };
        let mut annealer = Annealer::new(mover, (), 10.0).with_seed(17);
        let config = CalibrationConfig::default().with_sample_steps(50_000);

        let schedule = annealer.compute_run_schedule_with(0.1, &config).unwrap();

        let expected = 1.5f64.powi(10);
        assert!(
            (schedule.max_temperature() - expected).abs() < 1e-9,
            "expected Tmax {expected}, got {}",
            schedule.max_temperature()
        );
        // No round ever improves, so the minimum sits one step below.
        assert!((schedule.min_temperature() - expected / 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_min_temperature_is_first_round_without_improvement() {
        let steps = 10;
        let mover = Scripted::new(
            steps,
            vec![
                (0, 5), // T = 1: half accepted, heat
                (0, 5), // T = 1.5: half accepted, heat
                (1, 0), // T = 2.25: all accepted, Tmax
                (1, 0), // T = 1.5: still improving
                (1, 0), // T = 1: still improving
                (0, 0), // T = 2/3: no improvement, Tmin
            ],
        );
        let mut annealer = Annealer::new(mover, (), BASE);
        let config = CalibrationConfig::default().with_sample_steps(steps);

        let schedule = annealer.compute_run_schedule_with(0.1, &config).unwrap();

        assert_eq!(schedule.max_temperature(), 2.25);
        assert!((schedule.min_temperature() - 2.25 / 1.5 / 1.5 / 1.5).abs() < 1e-12);
        // one seed move plus six rounds
        assert_eq!(annealer.mover().calls.get(), 1 + 6 * steps);
        assert_eq!(annealer.best_energy(), BASE);
    }

    #[test]
    fn test_cooling_stops_at_floor() {
        // Every move improves, so acceptance never drops below 98%.
        let mover = FnMover::new(|x: &mut i64, _rng: &mut dyn RngCore| {
            *x -= 1;
            *x as f64
        });
        let mut annealer = Annealer::new(mover, 0_i64, 0.0).with_seed(6);
        let config = CalibrationConfig::default().with_sample_steps(10);

        let schedule = annealer.compute_run_schedule_with(0.1, &config).unwrap();

        let max = schedule.max_temperature();
        assert!(max >= config.min_temperature_floor, "Tmax {max} below floor");
        assert!(max / config.scale < config.min_temperature_floor, "Tmax {max} not at floor");
        assert!((schedule.min_temperature() - max / config.scale).abs() < 1e-24);
    }

    #[test]
    fn test_heating_stops_at_ceiling() {
        // Past the seed every move is rejected, so acceptance stays at zero.
        let steps = 10;
        let mut annealer = Annealer::new(Scripted::new(steps, Vec::new()), (), BASE);
        let config = CalibrationConfig::default().with_sample_steps(steps);

        let schedule = annealer.compute_run_schedule_with(0.1, &config).unwrap();

        let max = schedule.max_temperature();
        assert!(max <= config.max_temperature_ceiling, "Tmax {max} above ceiling");
        assert!(max * config.scale > config.max_temperature_ceiling, "Tmax {max} not at ceiling");
        assert!((schedule.min_temperature() - max / config.scale).abs() <= 1e-9 * max);
    }

    #[test]
    fn test_degenerate_moves() {
        let mover = FixedDelta { base: 1.0, delta: 0.0 };
        let mut annealer = Annealer::new(mover, (), 1.0);
        let config = CalibrationConfig {
            max_seed_attempts: 50,
            ..CalibrationConfig::default()
        };
        let err = annealer.compute_run_schedule_with(1.0, &config).unwrap_err();
        assert!(matches!(err, AnnealError::DegenerateMoves { attempts: 50 }));
    }

    #[test]
    fn test_move_failure_propagates() {
        let mover = FailingMover {
            budget: std::cell::Cell::new(300),
        };
        let mut annealer = Annealer::new(mover, 1000.0, 1000.0).with_seed(2);
        let err = annealer.compute_run_schedule(1.0, 100).unwrap_err();
        assert!(matches!(err, AnnealError::Move(Exhausted)));
        assert_eq!(*annealer.best_state(), 1000.0);
        assert_eq!(annealer.best_energy(), 1000.0);
    }

    #[test]
    fn test_rounds_are_reported() {
        let buf = SharedBuf::default();
        let mut annealer = linear(30.0).with_progress(buf.clone());
        annealer.compute_run_schedule(0.1, 100).unwrap();

        let lines = buf.lines();
        assert!(lines.len() > 2);
        assert!(lines[1..].iter().all(|l| l.matches('%').count() == 2));
    }

    #[test]
    fn test_calibrated_schedule_runs() {
        let mut annealer = Annealer::new(LinearMover, 30.0, 15.0).with_seed(4);
        let schedule = annealer.compute_run_schedule(0.001, 200).unwrap();
        let short = RunSchedule::new(
            schedule.max_temperature(),
            schedule.min_temperature(),
            schedule.steps().min(2000),
        )
        .unwrap();
        annealer.run_schedule(&short, 0).unwrap();
        assert!(annealer.best_energy() <= 15.0);
    }
}
