// src/scheduler.rs
use std::future::Future;

use chrono::{Datelike, Duration, Local, NaiveDateTime, NaiveTime, Weekday};
use metrics::{counter, gauge};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeeklySchedule {
    pub day: Weekday,
    pub time: NaiveTime,
}

impl WeeklySchedule {
    pub fn new(day: Weekday, time: NaiveTime) -> Self {
        Self { day, time }
    }

    /// First occurrence of `day` at `time` strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        let ahead = (7 + i64::from(self.day.num_days_from_monday())
            - i64::from(today.weekday().num_days_from_monday()))
            % 7;
        let candidate = (today + Duration::days(ahead)).and_time(self.time);
        if candidate > now {
            candidate
        } else {
            candidate + Duration::days(7)
        }
    }
}

/// Sleep until each occurrence and run `job`, forever or until Ctrl-C.
/// A failing job is logged; the loop keeps going.
pub async fn run_weekly<F, Fut>(schedule: WeeklySchedule, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    info!(day = ?schedule.day, time = %schedule.time, "scheduler started");
    loop {
        let now = Local::now().naive_local();
        let next = schedule.next_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        gauge!("scheduler_next_run_timestamp_seconds").set(next.and_utc().timestamp() as f64);
        info!(next = %next, wait_secs = wait.as_secs(), "next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("scheduler stopped by user");
                return;
            }
        }

        counter!("scheduler_runs_total").increment(1);
        if job().await {
            info!("scheduled run completed");
        } else {
            error!("scheduled run completed with errors");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn monday_8() -> WeeklySchedule {
        WeeklySchedule::new(Weekday::Mon, NaiveTime::from_hms_opt(8, 0, 0).unwrap())
    }

    #[test]
    fn later_the_same_day() {
        // 2025-03-10 is a Monday
        assert_eq!(monday_8().next_after(at(2025, 3, 10, 7, 59)), at(2025, 3, 10, 8, 0));
    }

    #[test]
    fn exactly_at_or_after_the_slot_rolls_a_week() {
        assert_eq!(monday_8().next_after(at(2025, 3, 10, 8, 0)), at(2025, 3, 17, 8, 0));
        assert_eq!(monday_8().next_after(at(2025, 3, 10, 9, 0)), at(2025, 3, 17, 8, 0));
    }

    #[test]
    fn mid_week_goes_to_next_monday() {
        assert_eq!(monday_8().next_after(at(2025, 3, 13, 12, 0)), at(2025, 3, 17, 8, 0));
        let fri = WeeklySchedule::new(Weekday::Fri, NaiveTime::from_hms_opt(18, 30, 0).unwrap());
        assert_eq!(fri.next_after(at(2025, 3, 13, 12, 0)), at(2025, 3, 14, 18, 30));
    }
}
