//! Progress reporting for annealing runs.

use std::fmt;
use std::io::Write;
use std::time::Duration;

use tracing::warn;

pub(crate) const HEADER: &str =
    " Temperature        Energy    Accept   Improve     Elapsed   Remaining";

/// Trial counters for one reporting interval.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct IntervalStats {
    pub trials: usize,
    pub accepts: usize,
    pub improves: usize,
}

impl IntervalStats {
    pub fn record(&mut self, accepted: bool, improved: bool) {
        self.trials += 1;
        if accepted {
            self.accepts += 1;
            if improved {
                self.improves += 1;
            }
        }
    }

    pub fn acceptance(&self) -> Option<f64> {
        (self.trials > 0).then(|| self.accepts as f64 / self.trials as f64)
    }

    pub fn improvement(&self) -> Option<f64> {
        (self.trials > 0).then(|| self.improves as f64 / self.trials as f64)
    }
}

/// One progress line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProgressLine {
    pub temperature: f64,
    pub energy: f64,
    pub acceptance: Option<f64>,
    pub improvement: Option<f64>,
    pub elapsed: Duration,
    pub remaining: Option<Duration>,
}

impl fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:12.5}  {:12.2}", self.temperature, self.energy)?;
        match (self.acceptance, self.improvement) {
            (Some(a), Some(i)) => write!(f, "  {:7.2}%  {:7.2}%", a * 100.0, i * 100.0)?,
            _ => write!(f, "  {:>8}  {:>8}", "", "")?,
        }
        write!(f, "  {:>10}", Clock(self.elapsed))?;
        match self.remaining {
            Some(r) => write!(f, "  {:>10}", Clock(r)),
            None => write!(f, "  {:>10}", ""),
        }
    }
}

/// `H:MM:SS` rendering of a duration.
struct Clock(Duration);

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        let text = format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
        f.pad(&text)
    }
}

/// Linear extrapolation of the time left after `done` of `total` steps.
pub(crate) fn remaining(elapsed: Duration, done: usize, total: usize) -> Option<Duration> {
    if done == 0 {
        return None;
    }
    let left = total.saturating_sub(done) as f64;
    Some(elapsed.mul_f64(left / done as f64))
}

/// Ordered text destination for progress lines.
///
/// A failed write disables the sink until the next run begins, so a broken
/// pipe never aborts the search.
pub(crate) struct ProgressSink {
    out: Box<dyn Write + Send>,
    failed: bool,
}

impl ProgressSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out, failed: false }
    }

    /// Resets the failure flag and writes the column header.
    pub fn begin(&mut self) {
        self.failed = false;
        self.write_text(HEADER);
    }

    pub fn line(&mut self, line: &ProgressLine) {
        self.write_text(&line.to_string());
    }

    fn write_text(&mut self, text: &str) {
        if self.failed {
            return;
        }
        let result = writeln!(self.out, "{text}").and_then(|()| self.out.flush());
        if let Err(err) = result {
            warn!(error = %err, "progress sink write failed; suppressing further output");
            self.failed = true;
        }
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}
