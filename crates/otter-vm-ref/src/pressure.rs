//! Memory-pressure feedback for soft reference decay
//!
//! The allocation path reports pressure events between collections. When any
//! were seen, the next decay evaluation subtracts an extra amount equal to
//! half the average remaining budget of all soft entries (at least 1). The
//! extra decrement shrinks as the population's budget shrinks, so sustained
//! pressure converges instead of wiping every soft entry in one cycle.

/// Baseline decrement applied to untouched soft entries per collection
pub const BASE_DECREMENT: u16 = 1;

/// Pressure event counter and decrement computation
#[derive(Debug, Clone)]
pub struct PressureController {
    events: usize,
    last_decrement: u16,
}

impl PressureController {
    /// Create a controller with no recorded events
    pub fn new() -> Self {
        Self {
            events: 0,
            last_decrement: BASE_DECREMENT,
        }
    }

    /// Record one pressure event
    pub fn record(&mut self) {
        self.events = self.events.saturating_add(1);
    }

    /// Record `count` pressure events at once
    pub fn record_many(&mut self, count: usize) {
        self.events = self.events.saturating_add(count);
    }

    /// Events recorded since the last reset
    pub fn events(&self) -> usize {
        self.events
    }

    /// Overwrite the event counter
    pub fn set_events(&mut self, events: usize) {
        self.events = events;
    }

    /// Reset the counter; returns the number of events it held
    pub fn reset(&mut self) -> usize {
        std::mem::take(&mut self.events)
    }

    /// Decrement applied by the most recent decay evaluation
    pub fn last_decrement(&self) -> u16 {
        self.last_decrement
    }

    /// Compute the decrement for this decay evaluation.
    ///
    /// `remaining` yields the current `decay_remaining` of every soft entry.
    pub fn decrement(&mut self, remaining: impl IntoIterator<Item = u16>) -> u16 {
        let mut decrement = BASE_DECREMENT;
        if self.events > 0 {
            decrement = decrement.saturating_add(pressure_adjustment(remaining));
        }
        self.last_decrement = decrement;
        decrement
    }
}

impl Default for PressureController {
    fn default() -> Self {
        Self::new()
    }
}

/// Half the average remaining budget, at least 1; 0 for an empty population
pub fn pressure_adjustment(remaining: impl IntoIterator<Item = u16>) -> u16 {
    let (sum, count) = remaining
        .into_iter()
        .fold((0u64, 0u64), |(sum, count), left| (sum + u64::from(left), count + 1));
    if count == 0 {
        return 0;
    }
    let half_average = (sum / count) / 2;
    u16::try_from(half_average).unwrap_or(u16::MAX).max(1)
}
