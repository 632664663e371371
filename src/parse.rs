// SPDX-License-Identifier: MPL-2.0

mod dateparse;
mod weekparse;

pub use dateparse::parse_date;
pub use weekparse::parse_week_start;
