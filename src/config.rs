use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub offer_ttl_minutes: i64,
    pub search_radius_miles: f64,
    pub driver_load_cap: usize,
    pub rate_per_mile_pence: i64,
    pub rate_per_hour_pence: i64,
    pub min_fare_pence: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            offer_ttl_minutes: parse_or_default("OFFER_TTL_MINUTES", 30)?,
            search_radius_miles: parse_or_default("SEARCH_RADIUS_MILES", 700.0)?,
            driver_load_cap: parse_or_default("DRIVER_LOAD_CAP", 3)?,
            rate_per_mile_pence: parse_or_default("RATE_PER_MILE_PENCE", 300)?,
            rate_per_hour_pence: parse_or_default("RATE_PER_HOUR_PENCE", 2_000)?,
            min_fare_pence: parse_or_default("MIN_FARE_PENCE", 1_500)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            offer_ttl_minutes: 30,
            search_radius_miles: 700.0,
            driver_load_cap: 3,
            rate_per_mile_pence: 300,
            rate_per_hour_pence: 2_000,
            min_fare_pence: 1_500,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
