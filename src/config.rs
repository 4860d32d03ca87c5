use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::clock::{self, Clock};

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub base_url: String,
    pub utc_offset_hours: i32,
    pub fixed_now: Option<NaiveDateTime>,
    pub library_loan_days: i64,
    pub library_fine_per_day: Decimal,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            base_url: "http://localhost:8000".to_string(),
            utc_offset_hours: 3,
            fixed_now: None,
            library_loan_days: 14,
            library_fine_per_day: Decimal::new(1000, 2),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            workspace: var("UNIERPD_WORKSPACE").map(PathBuf::from),
            base_url: var("UNIERPD_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            utc_offset_hours: try_load("UNIERPD_UTC_OFFSET_HOURS", defaults.utc_offset_hours),
            fixed_now: var("UNIERPD_NOW").and_then(|raw| {
                let parsed = clock::parse_timestamp(&raw);
                if parsed.is_none() {
                    warn!("Invalid UNIERPD_NOW value {raw:?}, using the system clock");
                }
                parsed
            }),
            library_loan_days: try_load("UNIERPD_LIBRARY_LOAN_DAYS", defaults.library_loan_days),
            library_fine_per_day: try_load(
                "UNIERPD_LIBRARY_FINE_PER_DAY",
                defaults.library_fine_per_day,
            ),
        }
    }

    pub fn clock(&self) -> Clock {
        match self.fixed_now {
            Some(t) => {
                info!(now = %t, "clock pinned");
                Clock::Fixed(t)
            }
            None => Clock::system(self.utc_offset_hours),
        }
    }

    pub fn attendance_link(&self, token: &str) -> String {
        format!("{}/attendance/mark/{}", self.base_url, token)
    }
}

/// Read before the subscriber exists, so it cannot log its own problems.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub filter: String,
    pub json: bool,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self {
            filter: var("UNIERPD_LOG").unwrap_or_else(|| "info".to_string()),
            json: var("UNIERPD_LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default {default}");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attendance_link_matches_deep_link_format() {
        let cfg = Config {
            base_url: "https://erp.example.ac.ke".to_string(),
            ..Config::default()
        };
        assert_eq!(
            cfg.attendance_link("abc123"),
            "https://erp.example.ac.ke/attendance/mark/abc123"
        );
    }

    #[test]
    fn defaults_follow_institution_settings() {
        let cfg = Config::default();
        assert_eq!(cfg.utc_offset_hours, 3);
        assert_eq!(cfg.library_fine_per_day.to_string(), "10.00");
    }
}
