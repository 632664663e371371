use chrono::{Days, NaiveDate};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

mod db;
mod schema;

pub use db::{
    establish_connection, Conn, Course, DeletedRows, Milestone, MilestoneStatus, Timesheet,
    UnknownStatus,
};

pub type CourseId = i32;
pub type TimesheetId = i32;
pub type MilestoneId = i32;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database could not be opened or brought up to date.
    #[error("could not open the study database: {0}")]
    Connection(String),

    /// The input was rejected before anything was written.
    #[error("{0}")]
    Validation(String),

    #[error("no {entity} found with id {id}")]
    NotFound { entity: &'static str, id: i32 },

    /// The database refused the write, e.g. a timesheet for a course that doesn't exist.
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("database query failed: {0}")]
    Query(DieselError),
}

impl From<DieselError> for Error {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::CheckViolation
                | DatabaseErrorKind::NotNullViolation,
                info,
            ) => Error::Constraint(info.message().to_owned()),
            err => Error::Query(err),
        }
    }
}

impl From<diesel::ConnectionError> for Error {
    fn from(err: diesel::ConnectionError) -> Self {
        Error::Connection(err.to_string())
    }
}

impl From<UnknownStatus> for Error {
    fn from(err: UnknownStatus) -> Self {
        Error::Validation(err.to_string())
    }
}

impl Course {
    /// The day after the last day of the study period.
    pub fn end_date(&self) -> Option<NaiveDate> {
        let days = u64::try_from(self.duration_weeks).ok()? * 7;
        self.start_date.checked_add_days(Days::new(days))
    }

    /// Negative once the exam has passed.
    pub fn days_until_exam(&self, today: NaiveDate) -> i64 {
        (self.exam_date - today).num_days()
    }
}

/// Aggregates over a course's timesheets and milestones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CourseSummary {
    pub total_hours: f64,
    pub weeks_logged: usize,
    pub weeks_completed: usize,
    pub milestones_total: usize,
    pub milestones_completed: usize,
}

impl CourseSummary {
    pub fn from_rows(timesheets: &[Timesheet], milestones: &[Milestone]) -> Self {
        Self {
            total_hours: timesheets.iter().map(|t| t.hours).sum(),
            weeks_logged: timesheets.len(),
            weeks_completed: timesheets.iter().filter(|t| t.completed).count(),
            milestones_total: milestones.len(),
            milestones_completed: milestones
                .iter()
                .filter(|m| m.status == MilestoneStatus::Completed)
                .count(),
        }
    }
}

/// Repository over an open study database.
///
/// Every method validates its input first, then runs a single parameterised statement (or, for
/// [`Tracker::delete_course`] and [`Tracker::update_milestone_status`], a single transaction).
pub struct Tracker<'a> {
    db: &'a mut Conn,
}

impl<'a> Tracker<'a> {
    pub fn new(db: &'a mut Conn) -> Self {
        Self { db }
    }

    pub fn add_course(
        &mut self,
        name: &str,
        start_date: NaiveDate,
        duration_weeks: i32,
        exam_date: NaiveDate,
    ) -> Result<CourseId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("course name must not be empty".into()));
        }
        if duration_weeks < 1 {
            return Err(Error::Validation(format!(
                "duration must be at least one week, got {duration_weeks}"
            )));
        }

        let id = db::insert_course(self.db, name, start_date, duration_weeks, exam_date)?;
        log::info!("Added course {name} ({id}) starting at {start_date} for {duration_weeks} week(s)");
        Ok(id)
    }

    pub fn list_courses(&mut self) -> Result<Vec<(CourseId, String)>> {
        db::query_course_names(self.db)
    }

    pub fn get_course(&mut self, course_id: CourseId) -> Result<Course> {
        db::get_course(self.db, course_id)?.ok_or(Error::NotFound {
            entity: "course",
            id: course_id,
        })
    }

    pub fn delete_course(&mut self, course_id: CourseId) -> Result<DeletedRows> {
        let deleted = db::delete_course_cascade(self.db, course_id)?;
        log::info!(
            "Deleted course {course_id} with {} timesheet(s) and {} milestone(s)",
            deleted.timesheets,
            deleted.milestones
        );
        Ok(deleted)
    }

    pub fn log_timesheet(
        &mut self,
        course_id: CourseId,
        week_start: NaiveDate,
        hours: f64,
        topics: &str,
        completed: bool,
    ) -> Result<TimesheetId> {
        if !hours.is_finite() || hours < 0.0 {
            return Err(Error::Validation(format!(
                "hours must be a non-negative number, got {hours}"
            )));
        }
        let topics = topics.trim();
        if topics.is_empty() {
            return Err(Error::Validation("topics covered must not be empty".into()));
        }

        let id = db::insert_timesheet(self.db, course_id, week_start, hours, topics, completed)?;
        log::info!("Logged {hours} hour(s) for course {course_id} in week of {week_start}");
        Ok(id)
    }

    pub fn list_timesheets(&mut self, course_id: CourseId) -> Result<Vec<Timesheet>> {
        db::query_timesheets(self.db, course_id)
    }

    pub fn add_milestone(&mut self, course_id: CourseId, text: &str) -> Result<MilestoneId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Validation("milestone must not be empty".into()));
        }

        let id = db::insert_milestone(self.db, course_id, text)?;
        log::info!("Added milestone {id} to course {course_id}");
        Ok(id)
    }

    pub fn list_milestones(&mut self, course_id: CourseId) -> Result<Vec<Milestone>> {
        db::query_milestones(self.db, course_id)
    }

    pub fn update_milestone_status(
        &mut self,
        milestone_id: MilestoneId,
        status: MilestoneStatus,
    ) -> Result<Milestone> {
        let milestone = db::set_milestone_status(self.db, milestone_id, status)?;
        log::info!("Milestone {milestone_id} is now {status}");
        Ok(milestone)
    }

    pub fn course_summary(&mut self, course_id: CourseId) -> Result<CourseSummary> {
        let timesheets = self.list_timesheets(course_id)?;
        let milestones = self.list_milestones(course_id)?;
        Ok(CourseSummary::from_rows(&timesheets, &milestones))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn memory() -> Conn {
        establish_connection(":memory:").unwrap()
    }

    fn algorithms(tracker: &mut Tracker) -> CourseId {
        tracker
            .add_course("Algorithms", date(2024, 1, 1), 8, date(2024, 3, 1))
            .unwrap()
    }

    #[test]
    fn added_course_is_listed_exactly_once() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        tracker
            .add_course("Databases", date(2024, 2, 1), 4, date(2024, 3, 15))
            .unwrap();

        let courses = tracker.list_courses().unwrap();
        assert_eq!(courses.iter().filter(|(cid, _)| *cid == id).count(), 1);
        assert_eq!(courses[0], (id, "Algorithms".to_owned()));
        assert_eq!(courses.len(), 2);
    }

    #[test]
    fn rejects_empty_course_name() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let result = tracker.add_course("   ", date(2024, 1, 1), 8, date(2024, 3, 1));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(tracker.list_courses().unwrap().is_empty());
    }

    #[test]
    fn rejects_zero_week_course() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let result = tracker.add_course("Algorithms", date(2024, 1, 1), 0, date(2024, 3, 1));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn get_course_returns_all_fields() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        let course = tracker.get_course(id).unwrap();
        assert_eq!(
            course,
            Course {
                id,
                name: "Algorithms".into(),
                start_date: date(2024, 1, 1),
                duration_weeks: 8,
                exam_date: date(2024, 3, 1),
            }
        );
        assert_eq!(course.end_date(), Some(date(2024, 2, 26)));
        assert_eq!(course.days_until_exam(date(2024, 2, 20)), 10);
        assert_eq!(course.days_until_exam(date(2024, 3, 2)), -1);
    }

    #[test]
    fn get_missing_course_is_not_found() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        assert!(matches!(
            tracker.get_course(42),
            Err(Error::NotFound {
                entity: "course",
                id: 42
            })
        ));
    }

    #[test]
    fn logged_timesheet_matches_inputs() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        let timesheet_id = tracker
            .log_timesheet(id, date(2024, 1, 1), 5.0, "Big-O", true)
            .unwrap();

        let timesheets = tracker.list_timesheets(id).unwrap();
        assert_eq!(
            timesheets,
            vec![Timesheet {
                id: timesheet_id,
                course_id: id,
                week_start: date(2024, 1, 1),
                hours: 5.0,
                topics_covered: "Big-O".into(),
                completed: true,
            }]
        );
        let total: f64 = timesheets.iter().map(|t| t.hours).sum();
        assert_eq!(total, 5.0);
        assert_eq!(tracker.course_summary(id).unwrap().total_hours, 5.0);
    }

    #[test]
    fn timesheets_are_ordered_by_week_start() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        tracker.log_timesheet(id, date(2024, 1, 15), 2.0, "Graphs", false).unwrap();
        tracker.log_timesheet(id, date(2024, 1, 1), 5.0, "Big-O", true).unwrap();
        tracker.log_timesheet(id, date(2024, 1, 8), 3.5, "Sorting", true).unwrap();

        let weeks = tracker
            .list_timesheets(id)
            .unwrap()
            .into_iter()
            .map(|t| t.week_start)
            .collect::<Vec<_>>();
        assert_eq!(weeks, vec![date(2024, 1, 1), date(2024, 1, 8), date(2024, 1, 15)]);
    }

    #[test]
    fn duplicate_weeks_are_allowed() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        tracker.log_timesheet(id, date(2024, 1, 1), 1.0, "Big-O", false).unwrap();
        tracker.log_timesheet(id, date(2024, 1, 1), 2.0, "Big-Theta", true).unwrap();
        assert_eq!(tracker.list_timesheets(id).unwrap().len(), 2);
    }

    #[test]
    fn negative_hours_are_rejected_without_writing() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        let result = tracker.log_timesheet(id, date(2024, 1, 1), -1.0, "Big-O", false);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(tracker.list_timesheets(id).unwrap().is_empty());
    }

    #[test]
    fn empty_topics_are_rejected() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        let result = tracker.log_timesheet(id, date(2024, 1, 1), 1.0, "", false);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn timesheet_for_missing_course_violates_constraint() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let result = tracker.log_timesheet(99, date(2024, 1, 1), 1.0, "Big-O", false);
        assert!(matches!(result, Err(Error::Constraint(_))));
    }

    #[test]
    fn milestones_start_pending_and_complete_individually() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        let first = tracker.add_milestone(id, "Finish Chapter 1").unwrap();
        let second = tracker.add_milestone(id, "Finish Chapter 2").unwrap();

        let milestones = tracker.list_milestones(id).unwrap();
        assert!(milestones.iter().all(|m| m.status == MilestoneStatus::Pending));
        assert_eq!(milestones[0].text, "Finish Chapter 1");

        tracker
            .update_milestone_status(first, MilestoneStatus::Completed)
            .unwrap();
        let statuses = tracker
            .list_milestones(id)
            .unwrap()
            .into_iter()
            .map(|m| (m.id, m.status))
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                (first, MilestoneStatus::Completed),
                (second, MilestoneStatus::Pending)
            ]
        );
    }

    #[test]
    fn completing_a_milestone_twice_is_idempotent() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        let milestone = tracker.add_milestone(id, "Finish Chapter 1").unwrap();

        tracker
            .update_milestone_status(milestone, MilestoneStatus::Completed)
            .unwrap();
        let once = tracker.list_milestones(id).unwrap();
        tracker
            .update_milestone_status(milestone, MilestoneStatus::Completed)
            .unwrap();
        assert_eq!(tracker.list_milestones(id).unwrap(), once);
    }

    #[test]
    fn completed_milestone_cannot_be_reopened() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        let milestone = tracker.add_milestone(id, "Finish Chapter 1").unwrap();

        let updated = tracker
            .update_milestone_status(milestone, MilestoneStatus::Completed)
            .unwrap();
        assert_eq!(updated.status, MilestoneStatus::Completed);
        assert_eq!(updated.course_id, id);

        let result = tracker.update_milestone_status(milestone, MilestoneStatus::Pending);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(
            tracker.list_milestones(id).unwrap()[0].status,
            MilestoneStatus::Completed
        );
    }

    #[test]
    fn pending_milestone_can_be_set_pending_again() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        let milestone = tracker.add_milestone(id, "Finish Chapter 1").unwrap();
        let updated = tracker
            .update_milestone_status(milestone, MilestoneStatus::Pending)
            .unwrap();
        assert_eq!(updated.status, MilestoneStatus::Pending);
    }

    #[test]
    fn updating_missing_milestone_is_not_found() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let result = tracker.update_milestone_status(7, MilestoneStatus::Completed);
        assert!(matches!(
            result,
            Err(Error::NotFound {
                entity: "milestone",
                id: 7
            })
        ));
    }

    #[test]
    fn deleting_course_removes_dependents() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        let other = tracker
            .add_course("Databases", date(2024, 2, 1), 4, date(2024, 3, 15))
            .unwrap();
        tracker.log_timesheet(id, date(2024, 1, 1), 5.0, "Big-O", true).unwrap();
        tracker.log_timesheet(id, date(2024, 1, 8), 2.0, "Sorting", false).unwrap();
        tracker.add_milestone(id, "Finish Chapter 1").unwrap();
        tracker.add_milestone(other, "Normal forms").unwrap();

        let deleted = tracker.delete_course(id).unwrap();
        assert_eq!(
            deleted,
            DeletedRows {
                timesheets: 2,
                milestones: 1
            }
        );
        assert!(tracker.list_timesheets(id).unwrap().is_empty());
        assert!(tracker.list_milestones(id).unwrap().is_empty());
        assert_eq!(tracker.list_courses().unwrap(), vec![(other, "Databases".to_owned())]);
        assert_eq!(tracker.list_milestones(other).unwrap().len(), 1);
    }

    #[test]
    fn deleting_missing_course_is_not_found() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        assert!(matches!(
            tracker.delete_course(3),
            Err(Error::NotFound { entity: "course", .. })
        ));
    }

    #[test]
    fn summary_counts_completed_weeks_and_milestones() {
        let mut conn = memory();
        let mut tracker = Tracker::new(&mut conn);
        let id = algorithms(&mut tracker);
        tracker.log_timesheet(id, date(2024, 1, 1), 5.0, "Big-O", true).unwrap();
        tracker.log_timesheet(id, date(2024, 1, 8), 2.5, "Sorting", false).unwrap();
        let milestone = tracker.add_milestone(id, "Finish Chapter 1").unwrap();
        tracker.add_milestone(id, "Finish Chapter 2").unwrap();
        tracker
            .update_milestone_status(milestone, MilestoneStatus::Completed)
            .unwrap();

        assert_eq!(
            tracker.course_summary(id).unwrap(),
            CourseSummary {
                total_hours: 7.5,
                weeks_logged: 2,
                weeks_completed: 1,
                milestones_total: 2,
                milestones_completed: 1,
            }
        );
    }

    #[test]
    fn milestone_status_parses_case_insensitively() {
        assert_eq!("Completed".parse(), Ok(MilestoneStatus::Completed));
        assert_eq!(" pending ".parse(), Ok(MilestoneStatus::Pending));
        assert_eq!(
            "done".parse::<MilestoneStatus>(),
            Err(UnknownStatus("done".into()))
        );
    }
}
