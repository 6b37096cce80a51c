use std::sync::{Arc, Mutex, PoisonError};

use procsim_shared::SimTime;

/// Shared simulated clock.
///
/// Cloning yields another handle to the same counter. Only the actor holding
/// the baton advances it, so the mutex is never contended; it exists to make
/// the handle `Send + Sync`.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Arc<Mutex<SimTime>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(time: SimTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(time)),
        }
    }

    pub fn now(&self) -> SimTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves time forward by `dt` and returns the new time. Negative or
    /// non-finite steps are ignored so the clock never runs backwards.
    pub fn advance(&self, dt: SimTime) -> SimTime {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if dt.is_finite() && dt > 0.0 {
            *now += dt;
        }
        *now
    }
}
