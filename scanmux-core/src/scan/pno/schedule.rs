use std::time::Duration;

use crate::error::{Result, ScanError};
use crate::scan::config::PnoConfig;
use crate::scan::timers::AlarmSpec;

/// One phase of the software PNO timer policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnoPhase {
    pub max_iterations: u32,
    pub base_interval_ms: u64,
    /// Interval grows linearly with the iteration count.
    pub backoff: bool,
    /// Inexact phases may be delayed by up to the configured margin.
    pub exact: bool,
}

impl PnoPhase {
    fn new(max_iterations: u32, base_interval_ms: u64, backoff: bool, exact: bool) -> Result<Self> {
        if max_iterations < 1 || base_interval_ms < 1 {
            return Err(ScanError::InvalidRequest(format!(
                "invalid software PNO phase: {max_iterations} iteration(s) every {base_interval_ms}ms"
            )));
        }
        Ok(Self {
            max_iterations,
            base_interval_ms,
            backoff,
            exact,
        })
    }
}

/// Mobility, fast and slow phases walked in order. Iteration zero means the
/// schedule has not been advanced yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwarePnoSchedule {
    phases: Vec<PnoPhase>,
    current: usize,
    iteration: u32,
    margin: Duration,
}

impl SoftwarePnoSchedule {
    /// Builds the three-phase schedule. The mobility phase runs at the
    /// caller's period.
    pub fn new(config: &PnoConfig, mobility_interval_ms: u64) -> Result<Self> {
        let phases = vec![
            PnoPhase::new(config.mobility_iterations, mobility_interval_ms, true, true)?,
            PnoPhase::new(config.fast_iterations, config.fast_timer_ms, false, true)?,
            PnoPhase::new(config.slow_iterations, config.slow_timer_ms, false, false)?,
        ];
        Ok(Self {
            phases,
            current: 0,
            iteration: 0,
            margin: Duration::from_millis(config.slow_timer_margin_ms),
        })
    }

    /// Advances one tick. Returns false once every phase is exhausted.
    pub fn next(&mut self) -> bool {
        let phase = self.phases[self.current];
        if phase.max_iterations > self.iteration {
            self.iteration += 1;
            true
        } else if self.current + 1 < self.phases.len() {
            self.current += 1;
            self.iteration = 1;
            true
        } else {
            false
        }
    }

    pub fn phase(&self) -> PnoPhase {
        self.phases[self.current]
    }

    pub fn phase_index(&self) -> usize {
        self.current
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn interval(&self) -> Duration {
        let phase = self.phase();
        let multiplier = if phase.backoff {
            u64::from(self.iteration)
        } else {
            1
        };
        Duration::from_millis(phase.base_interval_ms * multiplier)
    }

    /// Alarm for the current tick.
    pub fn alarm(&self) -> AlarmSpec {
        if self.phase().exact {
            AlarmSpec::exact(self.interval())
        } else {
            AlarmSpec::inexact(self.interval(), self.margin)
        }
    }

    /// Hard deadline paired with an inexact alarm.
    pub fn upper_bound(&self) -> Option<AlarmSpec> {
        (!self.phase().exact).then(|| AlarmSpec::exact(self.interval() + self.margin))
    }
}
