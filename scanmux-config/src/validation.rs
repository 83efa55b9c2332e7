//! Guard rails for configuration values.

use thiserror::Error;

use crate::models::service::ScanServiceConfig;

/// A configuration value the scheduler cannot run with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigGuardRailError {
    /// A counter, period or capacity is zero.
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    /// Background minimum period is above the maximum.
    #[error(
        "background.min_period_ms ({min}) must not exceed background.max_period_ms ({max})"
    )]
    InvertedPeriodBounds { min: u32, max: u32 },

    /// Neither band lists a channel.
    #[error("channel_plan has no 2.4 GHz or 5 GHz channels")]
    EmptyChannelPlan,
}

fn non_zero(value: u64, field: &'static str) -> Result<(), ConfigGuardRailError> {
    if value == 0 {
        Err(ConfigGuardRailError::Zero { field })
    } else {
        Ok(())
    }
}

/// Checks the values the schedulers divide by, iterate over or compare.
pub fn validate(config: &ScanServiceConfig) -> Result<(), ConfigGuardRailError> {
    let core = &config.core;

    non_zero(core.single.cached_results_max_age_ms, "single.cached_results_max_age_ms")?;

    let background = &core.background;
    non_zero(background.min_period_ms.into(), "background.min_period_ms")?;
    non_zero(background.max_period_ms.into(), "background.max_period_ms")?;
    if background.min_period_ms > background.max_period_ms {
        return Err(ConfigGuardRailError::InvertedPeriodBounds {
            min: background.min_period_ms,
            max: background.max_period_ms,
        });
    }

    let pno = &core.pno;
    non_zero(pno.mobility_iterations.into(), "pno.mobility_iterations")?;
    non_zero(pno.fast_iterations.into(), "pno.fast_iterations")?;
    non_zero(pno.slow_iterations.into(), "pno.slow_iterations")?;
    non_zero(pno.fast_timer_ms, "pno.fast_timer_ms")?;
    non_zero(pno.slow_timer_ms, "pno.slow_timer_ms")?;

    let plan = &core.channel_plan;
    if plan.band_24_ghz.is_empty() && plan.band_5_ghz.is_empty() {
        return Err(ConfigGuardRailError::EmptyChannelPlan);
    }

    non_zero(config.service.event_bus_capacity as u64, "service.event_bus_capacity")?;
    Ok(())
}
