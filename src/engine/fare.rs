use serde::Serialize;

use crate::config::Config;

/// Platform cut, applied to base + surge only. Tips pass through untaxed.
const PLATFORM_FEE_RATE: f64 = 0.15;

#[derive(Debug, Clone, Copy)]
pub struct FareRates {
    pub rate_per_mile_pence: i64,
    pub rate_per_hour_pence: i64,
    pub min_fare_pence: i64,
}

impl FareRates {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rate_per_mile_pence: config.rate_per_mile_pence,
            rate_per_hour_pence: config.rate_per_hour_pence,
            min_fare_pence: config.min_fare_pence,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct FareBreakdown {
    pub base_pence: i64,
    pub surge_pence: i64,
    pub tip_pence: i64,
    pub fee_pence: i64,
    pub net_pence: i64,
}

/// Computes a driver payout in integer pence. `multiplier` scales the
/// per-mile and per-hour rates and the minimum-fare floor alike, so a
/// zero-length job still pays `min_fare x multiplier`.
pub fn calculate(
    rates: &FareRates,
    distance_miles: f64,
    duration_hours: f64,
    surge_pence: i64,
    tip_pence: i64,
    multiplier: f64,
) -> FareBreakdown {
    let distance_pence = (distance_miles * rates.rate_per_mile_pence as f64 * multiplier).round();
    let duration_pence = (duration_hours * rates.rate_per_hour_pence as f64 * multiplier).round();
    let floor_pence = (rates.min_fare_pence as f64 * multiplier).round();

    let base_pence = (distance_pence as i64 + duration_pence as i64).max(floor_pence as i64);
    let fee_pence = (PLATFORM_FEE_RATE * (base_pence + surge_pence) as f64).round() as i64;
    let net_pence = base_pence + surge_pence + tip_pence - fee_pence;

    FareBreakdown {
        base_pence,
        surge_pence,
        tip_pence,
        fee_pence,
        net_pence,
    }
}
