//! The browser interface.
//!
//! Every form posts to one of the action routes, which performs a single repository call and
//! then redirects back to `/` with the affected course selected.  The page handler re-reads the
//! store on every request, so what is shown always reflects the database.  Rejected input is
//! answered by rendering the page directly with a warning instead of redirecting.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context as _, Result};
use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::parse::{parse_date, parse_week_start};
use crate::render::{render_failure, render_not_found, render_page, CourseDetails, Notice, Page};
use crate::tracker::{
    self, Conn, CourseId, CourseSummary, MilestoneId, MilestoneStatus, TimesheetId, Tracker,
};

/// Shared state of the server: the one open connection to the study database.
#[derive(Clone)]
pub struct AppState {
    conn: Arc<Mutex<Conn>>,
}

impl AppState {
    pub fn new(conn: Conn) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Conn> {
        // a panic while holding the lock leaves the connection itself usable
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `action` against the repository on the blocking thread pool, since every diesel
    /// call blocks until SQLite is done.
    async fn with_repo<F>(&self, action: F) -> Response
    where
        F: FnOnce(&mut Tracker) -> Response + Send + 'static,
    {
        let state = self.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = state.lock();
            action(&mut Tracker::new(&mut conn))
        })
        .await;

        match result {
            Ok(response) => response,
            Err(err) => {
                log::error!("Request could not be completed: {err}");
                failure_response()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/courses", post(create_course))
        .route("/courses/{id}/delete", post(delete_course))
        .route("/courses/{id}/timesheets", post(log_timesheet))
        .route("/courses/{id}/milestones", post(add_milestone))
        .route("/milestones/{id}/status", post(update_milestone_status))
        .with_state(state)
}

/// Serves the interface until Ctrl-C is pressed.
///
/// The connection is closed once the server has shut down.
pub async fn serve(conn: Conn, listen_address: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_address)
        .await
        .with_context(|| format!("could not listen on {listen_address}"))?;
    log::info!(
        "Study tracker is available at http://{}/",
        listener.local_addr()?
    );

    axum::serve(listener, router(AppState::new(conn)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("web server failed")?;

    log::info!("Study tracker shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("Could not listen for Ctrl-C, shutting down: {err}");
    }
}

/// Short confirmation shown after a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    CourseCreated,
    CourseDeleted,
    TimesheetLogged,
    MilestoneAdded,
    MilestoneUpdated,
}

impl Flash {
    const ALL: [Flash; 5] = [
        Flash::CourseCreated,
        Flash::CourseDeleted,
        Flash::TimesheetLogged,
        Flash::MilestoneAdded,
        Flash::MilestoneUpdated,
    ];

    /// Unknown values are ignored rather than failing the whole page.
    fn from_query(value: &str) -> Option<Flash> {
        Flash::ALL.into_iter().find(|flash| flash.as_str() == value)
    }

    fn as_str(self) -> &'static str {
        match self {
            Flash::CourseCreated => "course-created",
            Flash::CourseDeleted => "course-deleted",
            Flash::TimesheetLogged => "timesheet-logged",
            Flash::MilestoneAdded => "milestone-added",
            Flash::MilestoneUpdated => "milestone-updated",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Flash::CourseCreated => "Course created.",
            Flash::CourseDeleted => "Course deleted along with its timesheets and milestones.",
            Flash::TimesheetLogged => "Week logged.",
            Flash::MilestoneAdded => "Milestone added.",
            Flash::MilestoneUpdated => "Milestone updated.",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub course: Option<CourseId>,
    pub notice: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewCourse {
    pub name: String,
    pub start_date: String,
    pub duration_weeks: String,
    pub exam_date: String,
}

#[derive(Debug, Deserialize)]
pub struct NewTimesheet {
    pub week_start: String,
    pub hours: String,
    pub topics: String,
    /// Checkboxes are only sent when ticked.
    pub completed: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewMilestone {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub course: CourseId,
    pub status: String,
}

async fn index(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Response {
    let notice = query
        .notice
        .as_deref()
        .and_then(Flash::from_query)
        .map(|flash| Notice::Success(flash.message().to_owned()));
    state
        .with_repo(move |repo| page_response(repo, StatusCode::OK, query.course, notice))
        .await
}

async fn create_course(State(state): State<AppState>, Form(form): Form<NewCourse>) -> Response {
    state
        .with_repo(move |repo| {
            let today = today();
            let result = (|| -> tracker::Result<CourseId> {
                let name = required("course name", &form.name)?;
                let start_date = date_field("start date", &form.start_date, today)?;
                let duration_weeks = required("duration", &form.duration_weeks)?
                    .parse::<i32>()
                    .map_err(|_| invalid("duration", &form.duration_weeks))?;
                let exam_date = date_field("exam date", &form.exam_date, today)?;
                repo.add_course(name, start_date, duration_weeks, exam_date)
            })();

            match result {
                Ok(id) => redirect(Some(id), Flash::CourseCreated),
                Err(err) => error_response(repo, None, err),
            }
        })
        .await
}

async fn delete_course(State(state): State<AppState>, Path(id): Path<CourseId>) -> Response {
    state
        .with_repo(move |repo| match repo.delete_course(id) {
            Ok(_) => redirect(None, Flash::CourseDeleted),
            Err(err) => error_response(repo, Some(id), err),
        })
        .await
}

async fn log_timesheet(
    State(state): State<AppState>,
    Path(id): Path<CourseId>,
    Form(form): Form<NewTimesheet>,
) -> Response {
    state
        .with_repo(move |repo| {
            let today = today();
            let result = (|| -> tracker::Result<TimesheetId> {
                let week_start = required("week start", &form.week_start)?;
                let week_start = parse_week_start(week_start, today).ok_or_else(|| {
                    tracker::Error::Validation(format!(
                        "could not understand week start {week_start:?}, use a date like 2024-01-01 or \"this week\""
                    ))
                })?;
                let hours = required("hours", &form.hours)?
                    .parse::<f64>()
                    .map_err(|_| invalid("hours", &form.hours))?;
                let topics = required("topics covered", &form.topics)?;
                repo.log_timesheet(id, week_start, hours, topics, form.completed.is_some())
            })();

            match result {
                Ok(_) => redirect(Some(id), Flash::TimesheetLogged),
                Err(err) => error_response(repo, Some(id), err),
            }
        })
        .await
}

async fn add_milestone(
    State(state): State<AppState>,
    Path(id): Path<CourseId>,
    Form(form): Form<NewMilestone>,
) -> Response {
    state
        .with_repo(move |repo| {
            let result =
                required("milestone", &form.text).and_then(|text| repo.add_milestone(id, text));
            match result {
                Ok(_) => redirect(Some(id), Flash::MilestoneAdded),
                Err(err) => error_response(repo, Some(id), err),
            }
        })
        .await
}

async fn update_milestone_status(
    State(state): State<AppState>,
    Path(id): Path<MilestoneId>,
    Form(form): Form<StatusChange>,
) -> Response {
    state
        .with_repo(move |repo| {
            let result = form
                .status
                .parse::<MilestoneStatus>()
                .map_err(tracker::Error::from)
                .and_then(|status| repo.update_milestone_status(id, status));
            match result {
                // the form only says which page it was sent from, the milestone knows its course
                Ok(milestone) => redirect(Some(milestone.course_id), Flash::MilestoneUpdated),
                Err(err) => error_response(repo, Some(form.course), err),
            }
        })
        .await
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn required<'a>(field: &str, value: &'a str) -> tracker::Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(tracker::Error::Validation(format!("please fill in the {field}")));
    }
    Ok(value)
}

fn invalid(field: &str, value: &str) -> tracker::Error {
    tracker::Error::Validation(format!("{value:?} is not a valid {field}"))
}

fn date_field(field: &str, value: &str, today: NaiveDate) -> tracker::Result<NaiveDate> {
    let value = required(field, value)?;
    parse_date(value, today).ok_or_else(|| invalid(field, value))
}

fn redirect(course: Option<CourseId>, flash: Flash) -> Response {
    let location = match course {
        Some(id) => format!("/?course={id}&notice={}", flash.as_str()),
        None => format!("/?notice={}", flash.as_str()),
    };
    Redirect::to(&location).into_response()
}

fn error_response(
    repo: &mut Tracker,
    selected: Option<CourseId>,
    err: tracker::Error,
) -> Response {
    match err {
        tracker::Error::Validation(message) => {
            log::debug!("Rejected input: {message}");
            page_response(
                repo,
                StatusCode::UNPROCESSABLE_ENTITY,
                selected,
                Some(Notice::Warning(capitalize(&message))),
            )
        }
        tracker::Error::Constraint(message) => {
            log::warn!("Write refused by the database: {message}");
            // most likely the course was deleted in the meantime, so don't try to show it
            page_response(
                repo,
                StatusCode::CONFLICT,
                None,
                Some(Notice::Warning(
                    "That change conflicts with the stored data, the course may have been deleted."
                        .into(),
                )),
            )
        }
        err @ tracker::Error::NotFound { .. } => not_found_response(&err.to_string()),
        err @ (tracker::Error::Connection(_) | tracker::Error::Query(_)) => {
            log::error!("{err}");
            page_response(
                repo,
                StatusCode::INTERNAL_SERVER_ERROR,
                selected,
                Some(Notice::Failure(
                    "Something went wrong and nothing was saved.  Check the log for details."
                        .into(),
                )),
            )
        }
    }
}

fn page_response(
    repo: &mut Tracker,
    status: StatusCode,
    selected: Option<CourseId>,
    notice: Option<Notice>,
) -> Response {
    match load_page(repo, selected, notice.as_ref()) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err @ tracker::Error::NotFound { .. }) => not_found_response(&err.to_string()),
        Err(err) => {
            log::error!("Could not load page: {err}");
            failure_response()
        }
    }
}

fn failure_response() -> Response {
    let mut html = String::new();
    let _ = render_failure(&mut html);
    (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response()
}

fn not_found_response(message: &str) -> Response {
    let mut html = String::new();
    let _ = render_not_found(&mut html, &capitalize(message));
    (StatusCode::NOT_FOUND, Html(html)).into_response()
}

fn load_page(
    repo: &mut Tracker,
    selected: Option<CourseId>,
    notice: Option<&Notice>,
) -> tracker::Result<String> {
    let courses = repo.list_courses()?;
    let details = selected
        .map(|id| -> tracker::Result<CourseDetails> {
            let course = repo.get_course(id)?;
            let timesheets = repo.list_timesheets(id)?;
            let milestones = repo.list_milestones(id)?;
            let summary = CourseSummary::from_rows(&timesheets, &milestones);
            Ok(CourseDetails {
                course,
                timesheets,
                milestones,
                summary,
            })
        })
        .transpose()?;

    let mut html = String::new();
    // writing into a String can't fail
    let _ = render_page(
        &mut html,
        &Page {
            courses: &courses,
            selected: details.as_ref(),
            notice,
            today: today(),
        },
    );
    Ok(html)
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
