//! Business-calendar arithmetic — resolves "which day is it" in the fixed
//! operating timezone, independent of host timezone.
//!
//! The day-key is the unit of idempotency for the daily batch, so date
//! extraction must be exact across DST transitions. The cutoff hour is
//! informational only; nothing gates on it.

use aivis_core::error::{AivisError, Result};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Calendar fixed to the business timezone.
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    tz: Tz,
    cutoff_hour: u32,
}

impl BusinessCalendar {
    /// Create a calendar for an IANA timezone name.
    pub fn new(tz_name: &str, cutoff_hour: u32) -> Result<Self> {
        let tz: Tz = tz_name
            .parse()
            .map_err(|_| AivisError::Config(format!("Unknown timezone: {tz_name}")))?;
        if cutoff_hour > 23 {
            return Err(AivisError::Config(format!(
                "Cutoff hour out of range: {cutoff_hour}"
            )));
        }
        Ok(Self { tz, cutoff_hour })
    }

    /// The calendar day-key (YYYY-MM-DD) for an instant, in the business
    /// timezone.
    pub fn day_key(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.tz).format("%Y-%m-%d").to_string()
    }

    /// Whether local time is at or past the daily cutoff hour.
    pub fn is_past_cutoff(&self, now: DateTime<Utc>) -> bool {
        now.with_timezone(&self.tz).hour() >= self.cutoff_hour
    }

    /// The next instant the cutoff hour occurs.
    pub fn next_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.tz);
        let mut date = local.date_naive();
        // Scan forward a couple of days; covers the case where today's
        // cutoff already passed and a DST gap swallowing the hour.
        for _ in 0..3 {
            if let Some(candidate) = self
                .tz
                .with_ymd_and_hms(date.year(), date.month(), date.day(), self.cutoff_hour, 0, 0)
                .earliest()
                && candidate > local
            {
                return candidate.with_timezone(&Utc);
            }
            date = date.succ_opt().unwrap_or(date);
        }
        // Unreachable for any valid cutoff hour; fall back to +24h.
        now + chrono::Duration::hours(24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal() -> BusinessCalendar {
        BusinessCalendar::new("America/New_York", 3).unwrap()
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        assert!(BusinessCalendar::new("Mars/Olympus_Mons", 3).is_err());
        assert!(BusinessCalendar::new("America/New_York", 24).is_err());
    }

    #[test]
    fn test_day_key_midnight_straddle() {
        // 02:00 UTC in June is 22:00 the previous day in New York (EDT).
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 2, 0, 0).unwrap();
        assert_eq!(cal().day_key(now), "2025-06-14");
        // 06:00 UTC is 02:00 local, already the 15th.
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 6, 0, 0).unwrap();
        assert_eq!(cal().day_key(now), "2025-06-15");
    }

    #[test]
    fn test_day_key_spring_forward() {
        // 2025-03-09: clocks jump 02:00 → 03:00 in New York.
        // 07:59 UTC lands at 03:59 EDT — still March 9.
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 7, 59, 0).unwrap();
        assert_eq!(cal().day_key(now), "2025-03-09");
        // Just before the jump: 06:59 UTC = 01:59 EST, same date.
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 6, 59, 0).unwrap();
        assert_eq!(cal().day_key(now), "2025-03-09");
    }

    #[test]
    fn test_day_key_fall_back() {
        // 2025-11-02: clocks fall back 02:00 → 01:00 in New York.
        // 08:01 UTC lands at 03:01 EST — November 2.
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 8, 1, 0).unwrap();
        assert_eq!(cal().day_key(now), "2025-11-02");
        // 05:30 UTC is 01:30 EDT (first pass through 1am), same date.
        let now = Utc.with_ymd_and_hms(2025, 11, 2, 5, 30, 0).unwrap();
        assert_eq!(cal().day_key(now), "2025-11-02");
    }

    #[test]
    fn test_cutoff_checks() {
        let c = cal();
        // 06:00 UTC in June = 02:00 EDT — before the 03:00 cutoff.
        let before = Utc.with_ymd_and_hms(2025, 6, 15, 6, 0, 0).unwrap();
        assert!(!c.is_past_cutoff(before));
        // 08:00 UTC = 04:00 EDT — past it.
        let after = Utc.with_ymd_and_hms(2025, 6, 15, 8, 0, 0).unwrap();
        assert!(c.is_past_cutoff(after));
    }

    #[test]
    fn test_next_cutoff_rolls_to_tomorrow() {
        let c = cal();
        // 04:00 EDT — today's cutoff already passed, next is tomorrow 03:00.
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 8, 0, 0).unwrap();
        let next = c.next_cutoff(now);
        assert_eq!(c.day_key(next), "2025-06-16");
        assert!(next > now);

        // 02:00 EDT — today's cutoff still ahead.
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 6, 0, 0).unwrap();
        let next = c.next_cutoff(now);
        assert_eq!(c.day_key(next), "2025-06-15");
    }
}
