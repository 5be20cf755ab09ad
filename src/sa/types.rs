//! Core trait for the annealing move capability.

use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;

use rand::{Rng, RngCore};

/// Perturbs a state in place and reports the resulting energy.
///
/// The user implements the neighbourhood move and energy evaluation.
/// The [`Annealer`](super::Annealer) handles temperature management,
/// acceptance, best-state tracking and calibration.
///
/// # Minimization
///
/// The engine minimizes energy. For maximization, negate it.
///
/// # Cost per proposal
///
/// Every proposal is made on a fresh clone of the current state, and a
/// rejected candidate is dropped. For large states, keep `Clone` cheap
/// (for example by sharing immutable parts behind an `Arc`).
///
/// # Randomness
///
/// The engine passes its own random source to every call so that a seeded
/// annealer is reproducible end to end. A mover should draw all of its
/// randomness from `rng` and keep no hidden global coupling.
///
/// # Examples
///
/// ```
/// use rand::Rng;
/// use std::convert::Infallible;
/// use u_anneal::sa::StateMover;
///
/// struct Scale;
///
/// impl StateMover for Scale {
///     type State = f64;
///     type Error = Infallible;
///
///     fn perturb<R: Rng>(&self, state: &mut f64, rng: &mut R) -> Result<f64, Infallible> {
///         *state *= rng.random_range(0.7..1.4);
///         Ok((*state * 0.5).abs())
///     }
/// }
/// ```
pub trait StateMover {
    /// The state representation.
    type State: Clone;

    /// Failure reported by [`perturb`](Self::perturb).
    ///
    /// Use [`Infallible`] when the move cannot fail.
    type Error;

    /// Moves `state` to a neighbouring candidate and returns its energy.
    ///
    /// On error the engine aborts the current operation and discards
    /// `state`, so a failed call may leave it half-modified.
    fn perturb<R: Rng>(&self, state: &mut Self::State, rng: &mut R) -> Result<f64, Self::Error>;
}

/// Adapts a closure into an infallible [`StateMover`].
///
/// ```
/// use rand::Rng;
/// use u_anneal::sa::{Annealer, FnMover};
///
/// let mover = FnMover::new(|x: &mut f64, rng: &mut dyn rand::RngCore| {
///     *x += rng.random_range(-1.0..1.0);
///     *x * *x
/// });
/// let annealer = Annealer::new(mover, 3.0, 9.0);
/// assert_eq!(*annealer.best_state(), 3.0);
/// ```
pub struct FnMover<S, F> {
    f: F,
    _state: PhantomData<fn() -> S>,
}

impl<S, F> FnMover<S, F>
where
    F: Fn(&mut S, &mut dyn RngCore) -> f64,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _state: PhantomData,
        }
    }
}

impl<S, F> fmt::Debug for FnMover<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMover").finish_non_exhaustive()
    }
}

impl<S, F> StateMover for FnMover<S, F>
where
    S: Clone,
    F: Fn(&mut S, &mut dyn RngCore) -> f64,
{
    type State = S;
    type Error = Infallible;

    fn perturb<R: Rng>(&self, state: &mut S, rng: &mut R) -> Result<f64, Infallible> {
        let rng: &mut dyn RngCore = rng;
        Ok((self.f)(state, rng))
    }
}
