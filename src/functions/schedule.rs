// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Next-run computation for scheduled functions.
//!
//! Schedules are five-field cron expressions evaluated in UTC, or one of the
//! `@daily`-style shorthands. A schedule that does not parse yields `None`,
//! which is reported to the function as `"next_run": null`.

use chrono::{DateTime, SecondsFormat, Utc};
use croner::Cron;
use serde_json::{Value, json};

/// `User-Agent` sent by the platform scheduler.
pub const SCHEDULER_USER_AGENT: &str = "Netlify Clockwork";

fn expand_shorthand(schedule: &str) -> &str {
    match schedule {
        "@yearly" | "@annually" => "0 0 1 1 *",
        "@monthly" => "0 0 1 * *",
        "@weekly" => "0 0 * * 0",
        "@daily" | "@midnight" => "0 0 * * *",
        "@hourly" => "0 * * * *",
        other => other,
    }
}

/// First run strictly after `now`.
pub fn next_run(schedule: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let cron = Cron::new(expand_shorthand(schedule.trim())).parse().ok()?;
    cron.find_next_occurrence(&now, false).ok()
}

/// Body sent to a scheduled function: `{"next_run": <iso-8601 | null>}`.
pub fn schedule_body(schedule: Option<&str>, now: DateTime<Utc>) -> Value {
    let next = schedule
        .and_then(|s| next_run(s, now))
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));
    json!({ "next_run": next })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_shorthands() {
        // 2024-12-31 is a Tuesday.
        let now = at(2024, 12, 31, 13, 45);
        assert_eq!(next_run("@yearly", now), Some(at(2025, 1, 1, 0, 0)));
        assert_eq!(next_run("@monthly", now), Some(at(2025, 1, 1, 0, 0)));
        assert_eq!(next_run("@weekly", now), Some(at(2025, 1, 5, 0, 0)));
        assert_eq!(next_run("@daily", now), Some(at(2025, 1, 1, 0, 0)));
        assert_eq!(next_run("@hourly", now), Some(at(2024, 12, 31, 14, 0)));
    }

    #[test]
    fn test_weekly_on_sunday_moves_a_full_week() {
        let sunday = at(2024, 6, 2, 0, 0);
        assert_eq!(next_run("@weekly", sunday), Some(at(2024, 6, 9, 0, 0)));
    }

    #[test]
    fn test_cron_expressions() {
        let now = at(2024, 1, 1, 10, 2);
        assert_eq!(next_run("*/5 * * * *", now), Some(at(2024, 1, 1, 10, 5)));
        assert_eq!(next_run("30 9 * * *", now), Some(at(2024, 1, 2, 9, 30)));
        // 2024-01-01 is a Monday; day 0 is Sunday.
        assert_eq!(next_run("0 12 * * 0", now), Some(at(2024, 1, 7, 12, 0)));

        // On a boundary the next run is the following one.
        assert_eq!(next_run("*/5 * * * *", at(2024, 1, 1, 10, 5)), Some(at(2024, 1, 1, 10, 10)));

        assert_eq!(
            schedule_body(Some("*/5 * * * *"), now),
            json!({ "next_run": "2024-01-01T10:05:00.000Z" })
        );
    }

    #[test]
    fn test_invalid_schedule_is_null() {
        let now = at(2024, 1, 1, 0, 0);
        assert_eq!(next_run("every five minutes", now), None);
        assert_eq!(next_run("61 * * * *", now), None);
        assert_eq!(schedule_body(Some("@sometimes"), now), json!({ "next_run": null }));
        assert_eq!(schedule_body(None, now), json!({ "next_run": null }));
        assert_eq!(
            schedule_body(Some("@daily"), now),
            json!({ "next_run": "2024-01-02T00:00:00.000Z" })
        );
    }
}
