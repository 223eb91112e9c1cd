use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Booking policy knobs shared by the slot generator and the booking coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingRules {
    pub default_lookahead_days: u32,
    pub max_lookahead_days: u32,
    pub min_lead_minutes: i64,
    pub max_advance_booking_days: i64,
    pub lock_timeout_ms: u64,
    pub session_minutes: i64,
    /// Offset of the practice's wall clock from UTC. Slot dates and times are local to it.
    pub utc_offset_minutes: i32,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            default_lookahead_days: 7,
            max_lookahead_days: 28,
            min_lead_minutes: 30,
            max_advance_booking_days: 90,
            lock_timeout_ms: 2000,
            session_minutes: 50,
            utc_offset_minutes: 0,
        }
    }
}

/// Longest lead time or advance window accepted from configuration.
const MAX_POLICY_MINUTES: i64 = 366 * 24 * 60;
const MAX_POLICY_DAYS: i64 = 366;
const MAX_LOCK_TIMEOUT_MS: u64 = 60_000;
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

impl SchedulingRules {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let rules = Self {
            default_lookahead_days: env_or("BOOKING_LOOKAHEAD_DAYS", defaults.default_lookahead_days),
            max_lookahead_days: env_or("BOOKING_MAX_LOOKAHEAD_DAYS", defaults.max_lookahead_days),
            min_lead_minutes: env_or("BOOKING_MIN_LEAD_MINUTES", defaults.min_lead_minutes),
            max_advance_booking_days: env_or("BOOKING_MAX_ADVANCE_DAYS", defaults.max_advance_booking_days),
            lock_timeout_ms: env_or("BOOKING_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms),
            session_minutes: env_or("BOOKING_SESSION_MINUTES", defaults.session_minutes),
            utc_offset_minutes: env_or("BOOKING_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes),
        };

        rules.sanitized()
    }

    /// Replaces every out-of-range value with its default, logging a warning for each.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();

        let max_lookahead_days = in_range(
            "BOOKING_MAX_LOOKAHEAD_DAYS",
            self.max_lookahead_days,
            1..=MAX_POLICY_DAYS as u32,
            defaults.max_lookahead_days,
        );
        let default_lookahead_days = in_range(
            "BOOKING_LOOKAHEAD_DAYS",
            self.default_lookahead_days,
            1..=max_lookahead_days,
            defaults.default_lookahead_days.min(max_lookahead_days),
        );

        Self {
            default_lookahead_days,
            max_lookahead_days,
            min_lead_minutes: in_range(
                "BOOKING_MIN_LEAD_MINUTES",
                self.min_lead_minutes,
                0..=MAX_POLICY_MINUTES,
                defaults.min_lead_minutes,
            ),
            max_advance_booking_days: in_range(
                "BOOKING_MAX_ADVANCE_DAYS",
                self.max_advance_booking_days,
                0..=MAX_POLICY_DAYS,
                defaults.max_advance_booking_days,
            ),
            lock_timeout_ms: in_range(
                "BOOKING_LOCK_TIMEOUT_MS",
                self.lock_timeout_ms,
                0..=MAX_LOCK_TIMEOUT_MS,
                defaults.lock_timeout_ms,
            ),
            session_minutes: in_range(
                "BOOKING_SESSION_MINUTES",
                self.session_minutes,
                1..=24 * 60,
                defaults.session_minutes,
            ),
            utc_offset_minutes: in_range(
                "BOOKING_UTC_OFFSET_MINUTES",
                self.utc_offset_minutes,
                -MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES,
                defaults.utc_offset_minutes,
            ),
        }
    }

    pub fn min_lead(&self) -> Duration {
        Duration::minutes(self.min_lead_minutes)
    }

    pub fn session_length(&self) -> Duration {
        Duration::minutes(self.session_minutes)
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }

    /// Falls back to UTC when the configured offset is out of range.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!("UTC offset of {} minutes is out of range, using UTC", self.utc_offset_minutes);
            Utc.fix()
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub port: u16,
    pub completion_sweep_secs: u64,
    pub scheduling: SchedulingRules,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            port: env_or("PORT", 3000),
            completion_sweep_secs: env_or("COMPLETION_SWEEP_SECS", 60),
            scheduling: SchedulingRules::from_env(),
        };

        if !config.is_configured() {
            warn!("Schedule store not configured - falling back to in-memory storage");
        }

        config
    }

    /// True when a persistent schedule store is reachable by configuration.
    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn in_range<T>(key: &str, value: T, range: RangeInclusive<T>, default: T) -> T
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        value
    } else {
        warn!(
            "{} value {} is outside {}..={}, using default {}",
            key,
            value,
            range.start(),
            range.end(),
            default
        );
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let rules = SchedulingRules::default();

        assert_eq!(rules.default_lookahead_days, 7);
        assert_eq!(rules.min_lead_minutes, 30);
        assert!(rules.max_lookahead_days >= rules.default_lookahead_days);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("SHARED_CONFIG_TEST_GARBAGE", "not-a-number");
        let value: u32 = env_or("SHARED_CONFIG_TEST_GARBAGE", 42);
        assert_eq!(value, 42);

        env::set_var("SHARED_CONFIG_TEST_NUMBER", " 15 ");
        let value: i64 = env_or("SHARED_CONFIG_TEST_NUMBER", 30);
        assert_eq!(value, 15);
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let rules = SchedulingRules {
            utc_offset_minutes: 24 * 60,
            ..SchedulingRules::default()
        };

        assert_eq!(rules.utc_offset().local_minus_utc(), 0);

        let rules = SchedulingRules {
            utc_offset_minutes: 120,
            ..SchedulingRules::default()
        };
        assert_eq!(rules.utc_offset().local_minus_utc(), 7200);
    }

    #[test]
    fn test_sanitized_keeps_valid_rules() {
        let rules = SchedulingRules {
            min_lead_minutes: 0,
            max_advance_booking_days: 30,
            lock_timeout_ms: 0,
            ..SchedulingRules::default()
        };

        assert_eq!(rules.clone().sanitized(), rules);
    }

    #[test]
    fn test_negative_lead_falls_back_to_default() {
        let rules = SchedulingRules {
            min_lead_minutes: -120,
            ..SchedulingRules::default()
        }
        .sanitized();

        assert_eq!(rules.min_lead_minutes, 30);
    }

    #[test]
    fn test_huge_lead_falls_back_to_default() {
        let rules = SchedulingRules {
            min_lead_minutes: i64::MAX,
            ..SchedulingRules::default()
        }
        .sanitized();

        assert_eq!(rules.min_lead_minutes, 30);
        assert_eq!(rules.min_lead(), Duration::minutes(30));
    }

    #[test]
    fn test_negative_advance_window_falls_back_to_default() {
        let rules = SchedulingRules {
            max_advance_booking_days: -1,
            ..SchedulingRules::default()
        }
        .sanitized();

        assert_eq!(rules.max_advance_booking_days, 90);
    }

    #[test]
    fn test_zero_default_lookahead_falls_back_to_default() {
        let rules = SchedulingRules {
            default_lookahead_days: 0,
            ..SchedulingRules::default()
        }
        .sanitized();

        assert_eq!(rules.default_lookahead_days, 7);
    }

    #[test]
    fn test_default_lookahead_cannot_exceed_max() {
        let rules = SchedulingRules {
            default_lookahead_days: 7,
            max_lookahead_days: 3,
            ..SchedulingRules::default()
        }
        .sanitized();

        assert_eq!(rules.max_lookahead_days, 3);
        assert_eq!(rules.default_lookahead_days, 3);
    }

    #[test]
    fn test_zero_max_lookahead_falls_back_to_default() {
        let rules = SchedulingRules {
            max_lookahead_days: 0,
            ..SchedulingRules::default()
        }
        .sanitized();

        assert_eq!(rules.max_lookahead_days, 28);
        assert_eq!(rules.default_lookahead_days, 7);
    }

    #[test]
    fn test_session_lock_and_offset_bounds() {
        let rules = SchedulingRules {
            session_minutes: 0,
            lock_timeout_ms: u64::MAX,
            utc_offset_minutes: 24 * 60,
            ..SchedulingRules::default()
        }
        .sanitized();

        assert_eq!(rules.session_minutes, 50);
        assert_eq!(rules.lock_timeout_ms, 2000);
        assert_eq!(rules.utc_offset_minutes, 0);
    }

    #[test]
    fn test_unconfigured_store() {
        let config = AppConfig {
            supabase_url: String::new(),
            supabase_service_key: "key".to_string(),
            port: 3000,
            completion_sweep_secs: 60,
            scheduling: SchedulingRules::default(),
        };

        assert!(!config.is_configured());
    }
}
