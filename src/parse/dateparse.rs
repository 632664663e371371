use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use regex::Regex;

static REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)
^ # anchor to start of string

(?:
  (?: # date is in ISO format (yyyy-mm-dd)
    (\d{4})-(\d{1,2})-(\d{1,2})
  ) | (?: # date is a name referring to a day relative to the local date
    (yesterday | today | monday | tuesday | wednesday | thursday | friday | saturday | sunday)
  )
)

$ # anchor to end of string
",
    )
    .expect("Could not parse Regex")
});

/// Parses a calendar day as entered into one of the date fields.
///
/// Accepts ISO dates (`2024-01-01`, as sent by browser date pickers) as well as `today`,
/// `yesterday`, and weekday names, which refer to the most recent such day before `today`.
pub fn parse_date(date: &str, today: NaiveDate) -> Option<NaiveDate> {
    let captures = REGEX.captures(date.trim())?;

    if let Some(relation) = captures.get(4) {
        return parse_relative_date(relation.as_str(), today);
    }

    NaiveDate::from_ymd_opt(
        captures[1].parse().ok()?,
        captures[2].parse().ok()?,
        captures[3].parse().ok()?,
    )
}

fn parse_relative_date(relation: &str, today: NaiveDate) -> Option<NaiveDate> {
    match relation {
        day if day.eq_ignore_ascii_case("today") => Some(today),
        day if day.eq_ignore_ascii_case("yesterday") => today.pred_opt(),
        day => {
            let weekday: Weekday = day.parse().ok()?;
            find_last_day(today, weekday)
        }
    }
}

fn find_last_day(today: NaiveDate, day_of_week: Weekday) -> Option<NaiveDate> {
    let current_day = today.weekday();
    match current_day.days_since(day_of_week) {
        // don't allow user to specify "monday" on a monday,
        // as it is ambiguous if they mean today or last monday
        0 => None,
        n => Some(today - (Days::new(n as u64))),
    }
}
