use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::datetime::{days_between, format_month_day};
use crate::task::Schedule;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskText {
    pub primary: String,
    pub secondary: String,
}

/// Display strings for one row. `today` must be a midnight.
pub fn format_task_text<T: Schedule>(task: &T, today: DateTime<Utc>, show_start: bool) -> TaskText {
    let primary = task.text().to_string();

    if let Some(done) = task.completed_on() {
        let mut secondary = format!("Completed {}", format_month_day(done));
        let elapsed = days_between(done, today);
        // a completion ahead of today gets no suffix
        match elapsed.cmp(&0) {
            Ordering::Equal => secondary.push_str(" (today)"),
            Ordering::Greater => secondary.push_str(&format!(" ({} ago)", humanize_days(elapsed))),
            Ordering::Less => {}
        }
        return TaskText { primary, secondary };
    }

    let mut secondary = String::new();
    if show_start {
        let start = task.start();
        let label = format_month_day(start);
        let offset = days_between(today, start);
        let phrase = match offset.cmp(&0) {
            Ordering::Greater => format!("Starts {label} (in {})", humanize_days(offset)),
            Ordering::Equal => format!("Started {label} (today)"),
            Ordering::Less => format!("Started {label} ({} ago)", humanize_days(-offset)),
        };
        secondary.push_str(&phrase);
        secondary.push_str(", ");
    }

    let due = task.due();
    let label = format_month_day(due);
    let offset = days_between(today, due);
    let phrase = match offset.cmp(&0) {
        Ordering::Greater => format!("Due {label} (in {})", humanize_days(offset)),
        Ordering::Equal => format!("Due {label} (today)"),
        Ordering::Less => format!("Due {label} ({} ago)", humanize_days(-offset)),
    };
    secondary.push_str(&phrase);

    TaskText { primary, secondary }
}

/// Humanized distance for a positive number of whole days.
///
/// Wording never moves backwards as `days` grows.
pub fn humanize_days(days: i64) -> String {
    let days = days.max(1);

    if days == 1 {
        return "1 day".to_string();
    }
    if days < 30 {
        return format!("{days} days");
    }
    if days < 45 {
        return "about 1 month".to_string();
    }
    if days < 60 {
        return "about 2 months".to_string();
    }
    if days < 365 {
        let months = ((days as f64) / 30.0).round() as i64;
        return format!("{} months", months.clamp(2, 12));
    }

    let years = days / 365;
    let months_over = (days % 365) / 30;
    let unit = |n: i64| if n == 1 { "year" } else { "years" };
    if months_over < 3 {
        format!("about {years} {}", unit(years))
    } else if months_over < 9 {
        format!("over {years} {}", unit(years))
    } else {
        format!("almost {} years", years + 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};

    use super::{format_task_text, humanize_days};
    use crate::datetime::local_midnight;
    use crate::task::{Task, TaskType};

    fn day(m: u32, d: u32) -> DateTime<Utc> {
        local_midnight(NaiveDate::from_ymd_opt(2024, m, d).expect("valid date"))
    }

    fn task(start: DateTime<Utc>, due: DateTime<Utc>) -> Task {
        Task::new("t1", TaskType::Fertilize, "Feed peppers", start, due)
    }

    #[test]
    fn completed_today_says_today() {
        let today = day(6, 10);
        let mut t = task(day(6, 1), day(6, 12));
        t.completed_on = Some(today);
        let text = format_task_text(&t, today, false);
        assert_eq!(text.primary, "Feed peppers");
        assert_eq!(text.secondary, "Completed June 10 (today)");
        assert!(text.secondary.ends_with("(today)"));
    }

    #[test]
    fn completed_in_past_uses_distance() {
        let today = day(6, 10);
        let mut t = task(day(6, 1), day(6, 12));
        t.completed_on = Some(day(6, 7));
        let text = format_task_text(&t, today, true);
        assert_eq!(text.secondary, "Completed June 7 (3 days ago)");
    }

    #[test]
    fn completed_in_future_has_no_suffix() {
        let today = day(6, 10);
        let mut t = task(day(6, 1), day(6, 12));
        t.completed_on = Some(day(6, 11));
        let text = format_task_text(&t, today, false);
        assert_eq!(text.secondary, "Completed June 11");
    }

    #[test]
    fn open_task_without_start() {
        let today = day(6, 10);
        let text = format_task_text(&task(day(6, 1), day(6, 12)), today, false);
        assert_eq!(text.secondary, "Due June 12 (in 2 days)");

        let text = format_task_text(&task(day(6, 1), day(6, 10)), today, false);
        assert_eq!(text.secondary, "Due June 10 (today)");

        let text = format_task_text(&task(day(6, 1), day(6, 9)), today, false);
        assert_eq!(text.secondary, "Due June 9 (1 day ago)");
    }

    #[test]
    fn open_task_with_start() {
        let today = day(6, 10);

        let text = format_task_text(&task(day(7, 1), day(7, 5)), today, true);
        assert_eq!(text.secondary, "Starts July 1 (in 21 days), Due July 5 (in 25 days)");

        let text = format_task_text(&task(day(6, 10), day(6, 11)), today, true);
        assert_eq!(text.secondary, "Started June 10 (today), Due June 11 (in 1 day)");

        let text = format_task_text(&task(day(6, 8), day(6, 10)), today, true);
        assert_eq!(text.secondary, "Started June 8 (2 days ago), Due June 10 (today)");
    }

    #[test]
    fn humanized_wording() {
        assert_eq!(humanize_days(1), "1 day");
        assert_eq!(humanize_days(12), "12 days");
        assert_eq!(humanize_days(31), "about 1 month");
        assert_eq!(humanize_days(50), "about 2 months");
        assert_eq!(humanize_days(95), "3 months");
        assert_eq!(humanize_days(370), "about 1 year");
        assert_eq!(humanize_days(365 + 150), "over 1 year");
        assert_eq!(humanize_days(365 + 300), "almost 2 years");
        assert_eq!(humanize_days(3 * 365), "about 3 years");
    }

    #[test]
    fn humanized_distance_is_monotonic() {
        fn rank(days: i64) -> (i64, i64) {
            // (years-or-months magnitude, bucket) ordering of the phrase
            let phrase = humanize_days(days);
            let number: i64 = phrase
                .split_whitespace()
                .find_map(|word| word.parse().ok())
                .unwrap_or(0);
            if phrase.contains("year") {
                let nudge = if phrase.starts_with("about") {
                    0
                } else if phrase.starts_with("over") {
                    1
                } else {
                    -1
                };
                (3, number * 3 + nudge)
            } else if phrase.contains("month") {
                (2, number)
            } else {
                (1, number)
            }
        }

        let mut previous = rank(1);
        for days in 2..2000 {
            let current = rank(days);
            assert!(current >= previous, "{days} days went backwards");
            previous = current;
        }
    }
}
