//! Error types for annealing operations.

use thiserror::Error;

/// Error returned by the annealing engine.
///
/// `E` is the error type of the caller's [`StateMover`](crate::sa::StateMover).
/// Movers that cannot fail use [`std::convert::Infallible`].
#[derive(Debug, Error)]
pub enum AnnealError<E> {
    /// A schedule or configuration failed validation.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The requested calibration duration is not a positive finite number.
    #[error("target run time must be positive and finite, got {0} minutes")]
    InvalidDuration(f64),

    /// Calibration was asked to sample zero steps per round.
    #[error("calibration sample size must be at least 1")]
    InvalidSampleSize,

    /// Every perturbation tried while seeding calibration left the energy unchanged.
    #[error("no energy change observed after {attempts} moves")]
    DegenerateMoves {
        /// Number of moves attempted.
        attempts: usize,
    },

    /// The caller's move operation failed.
    #[error("state move failed")]
    Move(#[source] E),
}

/// Result type alias for annealing operations.
pub type Result<T, E> = std::result::Result<T, AnnealError<E>>;
