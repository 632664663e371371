use std::fmt::{self, Display, Write};

use chrono::NaiveDate;

use crate::tracker::{Course, CourseId, CourseSummary, Milestone, MilestoneStatus, Timesheet};

/// Message shown at the top of the page after an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Success(String),
    /// The input was rejected and nothing was changed.
    Warning(String),
    Failure(String),
}

/// Everything shown for the selected course.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseDetails {
    pub course: Course,
    pub timesheets: Vec<Timesheet>,
    pub milestones: Vec<Milestone>,
    pub summary: CourseSummary,
}

pub struct Page<'a> {
    pub courses: &'a [(CourseId, String)],
    pub selected: Option<&'a CourseDetails>,
    pub notice: Option<&'a Notice>,
    pub today: NaiveDate,
}

const STYLE: &str = "
body { font-family: sans-serif; max-width: 60rem; margin: 2rem auto; padding: 0 1rem; }
table { border-collapse: collapse; }
th, td { border-bottom: 1px solid #ccc; padding: 0.25rem 0.75rem; text-align: left; }
form.inline { display: inline; }
.notice { padding: 0.5rem 1rem; border-radius: 0.25rem; }
.success { background: #e3f6e3; }
.warning { background: #fff4d6; }
.failure { background: #fde2e2; }
.selected { font-weight: bold; }
";

pub fn render_page(writer: &mut impl Write, page: &Page) -> fmt::Result {
    let title = match page.selected {
        Some(details) => format!("{} - Study Tracker", details.course.name),
        None => "Study Tracker".to_owned(),
    };
    render_header(writer, &title)?;
    writeln!(writer, "<h1>Study Tracker</h1>")?;
    if let Some(notice) = page.notice {
        render_notice(writer, notice)?;
    }

    render_course_list(writer, page.courses, page.selected.map(|d| d.course.id))?;
    render_new_course_form(writer)?;
    if let Some(details) = page.selected {
        render_course(writer, details, page.today)?;
    }

    render_footer(writer)
}

pub fn render_not_found(writer: &mut impl Write, message: &str) -> fmt::Result {
    render_header(writer, "Not found - Study Tracker")?;
    writeln!(writer, "<h1>Not found</h1>")?;
    writeln!(writer, "<p>{}</p>", escape(message))?;
    writeln!(writer, "<p><a href=\"/\">Back to all courses</a></p>")?;
    render_footer(writer)
}

/// Page shown when the store can't be read at all.
pub fn render_failure(writer: &mut impl Write) -> fmt::Result {
    render_header(writer, "Error - Study Tracker")?;
    writeln!(writer, "<h1>Something went wrong</h1>")?;
    writeln!(
        writer,
        "<p>The study database could not be read.  Check the log for details.</p>"
    )?;
    render_footer(writer)
}

fn render_header(writer: &mut impl Write, title: &str) -> fmt::Result {
    writeln!(writer, "<!DOCTYPE html>")?;
    writeln!(writer, "<html lang=\"en\">")?;
    writeln!(writer, "<head>")?;
    writeln!(writer, "<meta charset=\"utf-8\">")?;
    writeln!(writer, "<title>{}</title>", escape(title))?;
    writeln!(writer, "<style>{STYLE}</style>")?;
    writeln!(writer, "</head>")?;
    writeln!(writer, "<body>")
}

fn render_footer(writer: &mut impl Write) -> fmt::Result {
    writeln!(writer, "</body>")?;
    writeln!(writer, "</html>")
}

fn render_notice(writer: &mut impl Write, notice: &Notice) -> fmt::Result {
    let (class, message) = match notice {
        Notice::Success(message) => ("success", message),
        Notice::Warning(message) => ("warning", message),
        Notice::Failure(message) => ("failure", message),
    };
    writeln!(
        writer,
        "<p class=\"notice {class}\" role=\"status\">{}</p>",
        escape(message)
    )
}

fn render_course_list(
    writer: &mut impl Write,
    courses: &[(CourseId, String)],
    selected: Option<CourseId>,
) -> fmt::Result {
    writeln!(writer, "<h2>Courses</h2>")?;
    if courses.is_empty() {
        return writeln!(writer, "<p>No courses yet.</p>");
    }

    writeln!(writer, "<ul>")?;
    for (id, name) in courses {
        let class = if Some(*id) == selected {
            " class=\"selected\""
        } else {
            ""
        };
        writeln!(
            writer,
            "<li{class}><a href=\"/?course={id}\">{}</a></li>",
            escape(name)
        )?;
    }
    writeln!(writer, "</ul>")
}

fn render_new_course_form(writer: &mut impl Write) -> fmt::Result {
    writeln!(writer, "<h2>Add a new course</h2>")?;
    writeln!(writer, "<form method=\"post\" action=\"/courses\">")?;
    writeln!(
        writer,
        "<label>Course name <input name=\"name\" required></label>"
    )?;
    writeln!(
        writer,
        "<label>Start date <input type=\"date\" name=\"start_date\" required></label>"
    )?;
    writeln!(
        writer,
        "<label>Duration (weeks) <input type=\"number\" name=\"duration_weeks\" min=\"1\" value=\"1\" required></label>"
    )?;
    writeln!(
        writer,
        "<label>Exam date <input type=\"date\" name=\"exam_date\" required></label>"
    )?;
    writeln!(writer, "<button type=\"submit\">Create course</button>")?;
    writeln!(writer, "</form>")
}

fn render_course(writer: &mut impl Write, details: &CourseDetails, today: NaiveDate) -> fmt::Result {
    let course = &details.course;
    writeln!(writer, "<h2>{}</h2>", escape(&course.name))?;
    writeln!(writer, "<dl>")?;
    writeln!(writer, "<dt>Start date</dt><dd>{}</dd>", course.start_date)?;
    writeln!(writer, "<dt>Duration</dt><dd>{} week(s)</dd>", course.duration_weeks)?;
    if let Some(end_date) = course.end_date() {
        writeln!(writer, "<dt>Study period ends</dt><dd>{end_date}</dd>")?;
    }
    writeln!(
        writer,
        "<dt>Exam date</dt><dd>{} ({})</dd>",
        course.exam_date,
        exam_countdown(course.days_until_exam(today))
    )?;
    writeln!(writer, "</dl>")?;

    render_summary(writer, &details.summary)?;
    render_timesheets(writer, course.id, &details.timesheets, details.summary.total_hours)?;
    render_milestones(writer, course.id, &details.milestones)?;

    writeln!(
        writer,
        "<form method=\"post\" action=\"/courses/{}/delete\" onsubmit=\"return confirm('Delete this course with all its timesheets and milestones?')\">",
        course.id
    )?;
    writeln!(writer, "<button type=\"submit\">Delete course</button>")?;
    writeln!(writer, "</form>")
}

fn render_summary(writer: &mut impl Write, summary: &CourseSummary) -> fmt::Result {
    writeln!(
        writer,
        "<p>{} hour(s) logged over {} week(s), {} week(s) completed, {} of {} milestone(s) completed.</p>",
        hours_to_string(summary.total_hours),
        summary.weeks_logged,
        summary.weeks_completed,
        summary.milestones_completed,
        summary.milestones_total,
    )
}

fn render_timesheets(
    writer: &mut impl Write,
    course_id: CourseId,
    timesheets: &[Timesheet],
    total_hours: f64,
) -> fmt::Result {
    writeln!(writer, "<h3>Weekly timesheets</h3>")?;
    if timesheets.is_empty() {
        writeln!(writer, "<p>No weeks logged yet.</p>")?;
    } else {
        writeln!(writer, "<table>")?;
        writeln!(
            writer,
            "<tr><th>Week starting</th><th>Hours</th><th>Topics covered</th><th>Completed</th></tr>"
        )?;
        for timesheet in timesheets {
            writeln!(
                writer,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                timesheet.week_start,
                hours_to_string(timesheet.hours),
                escape(&timesheet.topics_covered),
                if timesheet.completed { "yes" } else { "no" },
            )?;
        }
        writeln!(
            writer,
            "<tr><th>Total</th><th>{}</th><th></th><th></th></tr>",
            hours_to_string(total_hours)
        )?;
        writeln!(writer, "</table>")?;
    }

    writeln!(
        writer,
        "<form method=\"post\" action=\"/courses/{course_id}/timesheets\">"
    )?;
    writeln!(
        writer,
        "<label>Week starting <input name=\"week_start\" placeholder=\"2024-01-01 or this week\" required></label>"
    )?;
    writeln!(
        writer,
        "<label>Hours <input type=\"number\" name=\"hours\" min=\"0\" step=\"0.25\" value=\"0\" required></label>"
    )?;
    writeln!(
        writer,
        "<label>Topics covered <input name=\"topics\" required></label>"
    )?;
    writeln!(
        writer,
        "<label><input type=\"checkbox\" name=\"completed\"> Week completed</label>"
    )?;
    writeln!(writer, "<button type=\"submit\">Log week</button>")?;
    writeln!(writer, "</form>")
}

fn render_milestones(
    writer: &mut impl Write,
    course_id: CourseId,
    milestones: &[Milestone],
) -> fmt::Result {
    writeln!(writer, "<h3>Milestones</h3>")?;
    if milestones.is_empty() {
        writeln!(writer, "<p>No milestones yet.</p>")?;
    } else {
        writeln!(writer, "<ul>")?;
        for milestone in milestones {
            write!(
                writer,
                "<li>{} <em>{}</em>",
                escape(&milestone.text),
                milestone.status
            )?;
            if milestone.status == MilestoneStatus::Pending {
                write!(
                    writer,
                    " <form class=\"inline\" method=\"post\" action=\"/milestones/{}/status\">\
                     <input type=\"hidden\" name=\"course\" value=\"{course_id}\">\
                     <input type=\"hidden\" name=\"status\" value=\"{}\">\
                     <button type=\"submit\">Mark completed</button></form>",
                    milestone.id,
                    MilestoneStatus::Completed,
                )?;
            }
            writeln!(writer, "</li>")?;
        }
        writeln!(writer, "</ul>")?;
    }

    writeln!(
        writer,
        "<form method=\"post\" action=\"/courses/{course_id}/milestones\">"
    )?;
    writeln!(
        writer,
        "<label>New milestone <input name=\"text\" required></label>"
    )?;
    writeln!(writer, "<button type=\"submit\">Add milestone</button>")?;
    writeln!(writer, "</form>")
}

fn exam_countdown(days: i64) -> String {
    match days {
        0 => "today".to_owned(),
        1 => "tomorrow".to_owned(),
        d if d > 1 => format!("in {d} days"),
        -1 => "yesterday".to_owned(),
        d => format!("{} days ago", -d),
    }
}

fn hours_to_string(hours: f64) -> String {
    let buf = format!("{hours:.2}");
    buf.trim_end_matches('0').trim_end_matches('.').to_owned()
}

fn escape(text: &str) -> Escaped<'_> {
    Escaped(text)
}

struct Escaped<'a>(&'a str);

impl Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                '\'' => f.write_str("&#39;")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}
