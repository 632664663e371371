use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;

use super::parse_date;

static REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)
^ # anchor to start of string

(?:
  (?: # this week, last week
    (this|last) \s+ w(?:k|eek)
  ) | (?: # number of weeks back, counting the current week as 1
    (\d+) \s* w(?:k|eek|ks|eeks)?
  )
)

$ # anchor to end of string
",
    )
    .expect("Could not parse Regex")
});

/// Parses the start of a study week.
///
/// "this week" (or "1w") is the Monday of the current week, "last week" (or "2w") the Monday
/// before that, and so on.  Anything else is parsed as a plain date with [`parse_date`], and is
/// kept as given rather than moved back to a Monday.
pub fn parse_week_start(week: &str, today: NaiveDate) -> Option<NaiveDate> {
    let week = week.trim();
    let Some(captures) = REGEX.captures(week) else {
        return parse_date(week, today);
    };

    let count = match (captures.get(1), captures.get(2)) {
        (Some(relation), _) if relation.as_str().eq_ignore_ascii_case("this") => 0,
        (Some(_), _) => 1,
        (None, Some(count)) => count.as_str().parse::<u32>().ok()?.saturating_sub(1),
        (None, None) => return None,
    };

    let week_start = today - Days::new(today.weekday().num_days_from_monday().into());
    week_start.checked_sub_days(Days::new(u64::from(count) * 7))
}
