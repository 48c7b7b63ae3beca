//! Capture Schedule
//!
//! Maps the wall-clock time of day to a capture interval. Evaluation is
//! first-match over an ordered rule list: the first rule whose exclusive
//! end time lies after the query time applies, otherwise the default
//! late-night interval does. Callers must supply the rules in
//! chronological order; the table does not reorder them.

use chrono::NaiveTime;
use std::time::Duration;

use super::util::conf;

/// One schedule slot: applies to all times strictly before its end time.
#[derive(Debug, Clone)]
pub struct ScheduleRule {
    pub end_time_exclusive: NaiveTime,
    pub interval: Duration,
}

/// Ordered rule list plus the fallback interval.
#[derive(Debug, Clone)]
pub struct ScheduleTable {
    rules: Vec<ScheduleRule>,
    default_interval: Duration,
}

impl ScheduleTable {
    pub fn new(rules: Vec<ScheduleRule>, default_interval: Duration) -> Self {
        Self {
            rules,
            default_interval,
        }
    }

    /// Build a table from the `[capture_schedule]` configuration section.
    /// Rules with an unparseable end time are skipped with a warning.
    pub fn from_conf(section: &conf::CaptureSchedule) -> Self {
        let mut rules = Vec::new();
        for rule in &section.rules {
            match parse_end_time(&rule.end_time_exclusive) {
                Some(end) => rules.push(ScheduleRule {
                    end_time_exclusive: end,
                    interval: Duration::from_secs_f64(rule.interval_seconds),
                }),
                None => log::warn!(
                    "Ignoring schedule rule with invalid end time '{}'",
                    rule.end_time_exclusive
                ),
            }
        }
        Self::new(
            rules,
            Duration::from_secs_f64(section.default_interval_seconds),
        )
    }

    /// Resolve the capture interval for the given time of day.
    ///
    /// # Arguments
    ///
    /// * `now` - The current wall-clock time of day.
    ///
    pub fn interval_for(&self, now: NaiveTime) -> Duration {
        for rule in &self.rules {
            if now < rule.end_time_exclusive {
                return rule.interval;
            }
        }
        self.default_interval
    }

    /// Human readable summary for the startup log.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .rules
            .iter()
            .map(|r| {
                format!(
                    "<{} ({:.1}s)",
                    r.end_time_exclusive.format("%H:%M"),
                    r.interval.as_secs_f64()
                )
            })
            .collect();
        parts.push(format!(
            "default ({:.1}s)",
            self.default_interval.as_secs_f64()
        ));
        parts.join(", ")
    }
}

/// Parse `HH:MM` or `HH:MM:SS` end times from the configuration.
fn parse_end_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ScheduleTable {
        ScheduleTable::new(
            vec![
                ScheduleRule {
                    end_time_exclusive: NaiveTime::from_hms_opt(4, 59, 0).unwrap(),
                    interval: Duration::from_secs(10),
                },
                ScheduleRule {
                    end_time_exclusive: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
                    interval: Duration::from_secs(2),
                },
            ],
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_first_match_wins() {
        let t = table();
        assert_eq!(
            t.interval_for(NaiveTime::from_hms_opt(3, 0, 0).unwrap()),
            Duration::from_secs(10)
        );
        assert_eq!(
            t.interval_for(NaiveTime::from_hms_opt(5, 0, 0).unwrap()),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let t = table();
        // Exactly at an end time the next rule applies.
        assert_eq!(
            t.interval_for(NaiveTime::from_hms_opt(4, 59, 0).unwrap()),
            Duration::from_secs(2)
        );
        // Exactly at the last end time the default applies.
        assert_eq!(
            t.interval_for(NaiveTime::from_hms_opt(23, 59, 0).unwrap()),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_empty_rules_fall_back_to_default() {
        let t = ScheduleTable::new(Vec::new(), Duration::from_secs_f64(2.5));
        assert_eq!(
            t.interval_for(NaiveTime::from_hms_opt(12, 0, 0).unwrap()),
            Duration::from_secs_f64(2.5)
        );
    }

    #[test]
    fn test_parse_end_time_formats() {
        assert_eq!(
            parse_end_time("05:00"),
            Some(NaiveTime::from_hms_opt(5, 0, 0).unwrap())
        );
        assert_eq!(
            parse_end_time("21:30:15"),
            Some(NaiveTime::from_hms_opt(21, 30, 15).unwrap())
        );
        assert_eq!(parse_end_time("25:00"), None);
    }
}
