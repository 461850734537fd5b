//! Poisson scheduling for probe connections.
//!
//! Feelers and tip probes fire on exponentially distributed intervals, so
//! an observer cannot predict when the node will test an address or
//! cross-check its tip. Draws happen lazily: the timer arms itself the
//! first time it is consulted.

use std::time::Duration;

use rand::Rng;

use crate::domain::types::Timestamp;

/// Draw one exponential inter-arrival interval with the given mean.
pub fn poisson_interval<R: Rng + ?Sized>(rng: &mut R, mean: Duration) -> Duration {
    // u is kept away from zero so ln() stays finite; the draw is capped
    // by that bound at roughly 36x the mean.
    let u: f64 = rng.gen_range(f64::EPSILON..1.0);
    mean.mul_f64(-u.ln())
}

/// A self-rearming Poisson timer.
#[derive(Debug)]
pub struct PoissonTimer {
    mean: Duration,
    next_at: Option<Timestamp>,
}

impl PoissonTimer {
    pub fn new(mean: Duration) -> Self {
        Self {
            mean,
            next_at: None,
        }
    }

    /// True when the scheduled instant has passed. Firing rearms the
    /// timer; the first call only arms it.
    pub fn fire<R: Rng + ?Sized>(&mut self, now: Timestamp, rng: &mut R) -> bool {
        match self.next_at {
            None => {
                self.next_at = Some(now.saturating_add(poisson_interval(rng, self.mean)));
                false
            }
            Some(at) if now >= at => {
                self.next_at = Some(now.saturating_add(poisson_interval(rng, self.mean)));
                true
            }
            Some(_) => false,
        }
    }

    pub fn next_at(&self) -> Option<Timestamp> {
        self.next_at
    }
}
