use chrono::Duration;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a whole number, got '{value}'")]
    NotANumber { key: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Time-window rules applied to bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingRules {
    pub min_duration: Duration,
    pub max_duration: Duration,
    /// How far in the past a start time may lie before it is rejected.
    pub clock_skew: Duration,
}

impl Default for BookingRules {
    fn default() -> Self {
        BookingRules {
            min_duration: Duration::minutes(15),
            max_duration: Duration::hours(12),
            clock_skew: Duration::minutes(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Paging {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub booking: BookingRules,
    pub paging: Paging,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("club_backoffice.db"),
            booking: BookingRules::default(),
            paging: Paging::default(),
        }
    }
}

impl Config {
    /// Reads `CLUB_*` variables, falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let database_path = lookup("CLUB_DATABASE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let minutes = |key: &'static str, fallback: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse::<i64>()
                    .map(Duration::minutes)
                    .map_err(|_| ConfigError::NotANumber { key, value }),
                None => Ok(fallback),
            }
        };
        let booking = BookingRules {
            min_duration: minutes("CLUB_BOOKING_MIN_MINUTES", defaults.booking.min_duration)?,
            max_duration: minutes("CLUB_BOOKING_MAX_MINUTES", defaults.booking.max_duration)?,
            clock_skew: minutes("CLUB_BOOKING_SKEW_MINUTES", defaults.booking.clock_skew)?,
        };
        if booking.min_duration <= Duration::zero() || booking.max_duration < booking.min_duration {
            return Err(ConfigError::Invalid(
                "booking duration limits must satisfy 0 < min <= max".to_string(),
            ));
        }

        let count = |key: &'static str, fallback: u32| -> Result<u32, ConfigError> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ConfigError::NotANumber { key, value }),
                None => Ok(fallback),
            }
        };
        let paging = Paging {
            default_page_size: count("CLUB_PAGE_SIZE", defaults.paging.default_page_size)?,
            max_page_size: count("CLUB_MAX_PAGE_SIZE", defaults.paging.max_page_size)?,
        };
        if paging.default_page_size == 0 || paging.max_page_size < paging.default_page_size {
            return Err(ConfigError::Invalid(
                "page sizes must satisfy 0 < default <= max".to_string(),
            ));
        }

        Ok(Config {
            database_path,
            booking,
            paging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.booking, BookingRules::default());
        assert_eq!(config.paging.default_page_size, 10);
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("CLUB_DATABASE_PATH", "/tmp/club.db"),
            ("CLUB_BOOKING_MIN_MINUTES", "30"),
            ("CLUB_PAGE_SIZE", "25"),
        ]))
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/club.db"));
        assert_eq!(config.booking.min_duration, Duration::minutes(30));
        assert_eq!(config.paging.default_page_size, 25);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[("CLUB_BOOKING_MAX_MINUTES", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::NotANumber { key: "CLUB_BOOKING_MAX_MINUTES", .. }));
    }
}
