use std::fs::create_dir_all;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use diesel::backend::Backend;
use diesel::connection::SimpleConnection;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_query;
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{Connection, SqliteConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use super::{Error, Result};

pub struct Conn(SqliteConnection);

impl Drop for Conn {
    fn drop(&mut self) {
        // if this fails, we don't really care at this point
        // the goal is just to have the optimize pragma run when the program
        // ends, so that it can potentially update some of the tables based on
        // the queries used during this session.
        // See: https://sqlite.org/pragma.html#pragma_optimize
        let _ = sql_query("PRAGMA optimize;").execute(&mut self.0);
    }
}

pub fn establish_connection(database_url: impl AsRef<Path>) -> Result<Conn> {
    let database_url = database_url.as_ref();

    // The database and potentially its parent folders may not yet exist.  SQLite can handle
    // creating the file fine, but we need to make sure all of the parent folders also exist.
    if let Some(parent) = database_url.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).map_err(|err| {
            Error::Connection(format!("could not create directory {parent:?}: {err}"))
        })?;
    }

    // SQLite only accepts utf-8 or utf-16 paths, so a non-utf-8 path is converted lossily here.
    // See: https://github.com/diesel-rs/diesel/discussions/3069
    let database_url = database_url.to_string_lossy();

    log::trace!("Connecting to SQLite DB at {database_url}");
    let mut conn = SqliteConnection::establish(&database_url)?;
    // batch_execute runs every statement; sql_query would stop after the first pragma
    conn.batch_execute(
        "PRAGMA application_id = 0x5374756b;
        PRAGMA foreign_keys = TRUE;
        PRAGMA ignore_check_constraints = FALSE;",
    )?;
    log::trace!("Connection to SQLite DB successful");
    run_migrations(&mut conn)?;
    Ok(Conn(conn))
}

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

fn run_migrations(db: &mut SqliteConnection) -> Result<()> {
    let migrated = match db.run_pending_migrations(MIGRATIONS) {
        Ok(migrations) => migrations.len(),
        Err(err) => {
            log::error!("Migration failed: {err}");
            return Err(Error::Connection(
                "could not update database to the latest version".into(),
            ));
        }
    };

    if migrated > 0 {
        // a migration has occurred, so the data may be in a different format to when the last
        // analysis was done.  Run optimize now to update that analysis.
        // See: https://sqlite.org/pragma.html#pragma_optimize
        sql_query("PRAGMA optimize;").execute(db)?;
        log::trace!("Ran {migrated} migration(s) to update SQLite DB schema to latest version");
    }

    Ok(())
}

/// Progress of a single milestone.
///
/// Stored as the text `pending` or `completed`; the schema rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum MilestoneStatus {
    #[default]
    Pending,
    Completed,
}

impl MilestoneStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown milestone status {0:?}, expected \"pending\" or \"completed\"")]
pub struct UnknownStatus(pub String);

impl FromStr for MilestoneStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            s if s.eq_ignore_ascii_case("pending") => Ok(MilestoneStatus::Pending),
            s if s.eq_ignore_ascii_case("completed") => Ok(MilestoneStatus::Completed),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

impl ToSql<Text, Sqlite> for MilestoneStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for MilestoneStatus {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(value.parse()?)
    }
}

#[derive(Queryable, Identifiable, Selectable, Debug, PartialEq, Clone)]
#[diesel(table_name = super::schema::courses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Course {
    pub id: i32,
    pub name: String,
    pub start_date: NaiveDate,
    pub duration_weeks: i32,
    pub exam_date: NaiveDate,
}

#[derive(Queryable, Identifiable, Selectable, Associations, Debug, PartialEq, Clone)]
#[diesel(table_name = super::schema::timesheets)]
#[diesel(belongs_to(Course))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Timesheet {
    pub id: i32,
    pub course_id: i32,
    pub week_start: NaiveDate,
    pub hours: f64,
    pub topics_covered: String,
    pub completed: bool,
}

#[derive(Queryable, Identifiable, Selectable, Associations, Debug, PartialEq, Clone)]
#[diesel(table_name = super::schema::milestones)]
#[diesel(belongs_to(Course))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Milestone {
    pub id: i32,
    pub course_id: i32,
    #[diesel(column_name = milestone_text)]
    pub text: String,
    pub status: MilestoneStatus,
}

pub fn insert_course(
    conn: &mut Conn,
    name: &str,
    start_date: NaiveDate,
    duration_weeks: i32,
    exam_date: NaiveDate,
) -> Result<i32> {
    use super::schema::courses;
    let id = diesel::insert_into(courses::table)
        .values((
            courses::name.eq(name),
            courses::start_date.eq(start_date),
            courses::duration_weeks.eq(duration_weeks),
            courses::exam_date.eq(exam_date),
        ))
        .returning(courses::id)
        .get_result(&mut conn.0)?;
    Ok(id)
}

pub fn query_course_names(conn: &mut Conn) -> Result<Vec<(i32, String)>> {
    use super::schema::courses;
    Ok(courses::table
        .select((courses::id, courses::name))
        .order(courses::id)
        .load(&mut conn.0)?)
}

pub fn get_course(conn: &mut Conn, course_id: i32) -> Result<Option<Course>> {
    use super::schema::courses;
    Ok(courses::table
        .filter(courses::id.eq(course_id))
        .select(Course::as_select())
        .get_result(&mut conn.0)
        .optional()?)
}

/// Row counts removed by [`delete_course_cascade`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct DeletedRows {
    pub timesheets: usize,
    pub milestones: usize,
}

/// Removes a course along with its timesheets and milestones.
///
/// The schema declares no `ON DELETE CASCADE`, so the dependent rows are removed first, all
/// within a single transaction.  If the course itself doesn't exist, the transaction is rolled
/// back and [`Error::NotFound`] is returned.
pub fn delete_course_cascade(conn: &mut Conn, course_id: i32) -> Result<DeletedRows> {
    use super::schema::courses;
    use super::schema::milestones;
    use super::schema::timesheets;

    conn.0.transaction::<_, Error, _>(|conn| {
        let timesheets = diesel::delete(timesheets::table.filter(timesheets::course_id.eq(course_id)))
            .execute(conn)?;
        let milestones = diesel::delete(milestones::table.filter(milestones::course_id.eq(course_id)))
            .execute(conn)?;
        let count = diesel::delete(courses::table.filter(courses::id.eq(course_id))).execute(conn)?;
        if count < 1 {
            return Err(Error::NotFound {
                entity: "course",
                id: course_id,
            });
        }
        Ok(DeletedRows {
            timesheets,
            milestones,
        })
    })
}

pub fn insert_timesheet(
    conn: &mut Conn,
    course_id: i32,
    week_start: NaiveDate,
    hours: f64,
    topics_covered: &str,
    completed: bool,
) -> Result<i32> {
    use super::schema::timesheets;
    let id = diesel::insert_into(timesheets::table)
        .values((
            timesheets::course_id.eq(course_id),
            timesheets::week_start.eq(week_start),
            timesheets::hours.eq(hours),
            timesheets::topics_covered.eq(topics_covered),
            timesheets::completed.eq(completed),
        ))
        .returning(timesheets::id)
        .get_result(&mut conn.0)?;
    Ok(id)
}

pub fn query_timesheets(conn: &mut Conn, course_id: i32) -> Result<Vec<Timesheet>> {
    use super::schema::timesheets;
    Ok(timesheets::table
        .filter(timesheets::course_id.eq(course_id))
        .order((timesheets::week_start, timesheets::id))
        .select(Timesheet::as_select())
        .load(&mut conn.0)?)
}

pub fn insert_milestone(conn: &mut Conn, course_id: i32, text: &str) -> Result<i32> {
    use super::schema::milestones;
    let id = diesel::insert_into(milestones::table)
        .values((
            milestones::course_id.eq(course_id),
            milestones::milestone_text.eq(text),
            milestones::status.eq(MilestoneStatus::Pending),
        ))
        .returning(milestones::id)
        .get_result(&mut conn.0)?;
    Ok(id)
}

pub fn query_milestones(conn: &mut Conn, course_id: i32) -> Result<Vec<Milestone>> {
    use super::schema::milestones;
    Ok(milestones::table
        .filter(milestones::course_id.eq(course_id))
        .order(milestones::id)
        .select(Milestone::as_select())
        .load(&mut conn.0)?)
}

/// Moves a milestone to `status` and returns the updated row.
///
/// Progress only goes forward: a completed milestone can't be set back to pending, although
/// completing it again is accepted and leaves it unchanged.
pub fn set_milestone_status(
    conn: &mut Conn,
    milestone_id: i32,
    status: MilestoneStatus,
) -> Result<Milestone> {
    use super::schema::milestones;

    conn.0.transaction::<_, Error, _>(|conn| {
        let current = milestones::table
            .filter(milestones::id.eq(milestone_id))
            .select(milestones::status)
            .get_result::<MilestoneStatus>(conn)
            .optional()?
            .ok_or(Error::NotFound {
                entity: "milestone",
                id: milestone_id,
            })?;
        if current == MilestoneStatus::Completed && status == MilestoneStatus::Pending {
            return Err(Error::Validation(format!(
                "milestone {milestone_id} is already completed and can't be reopened"
            )));
        }

        let milestone = diesel::update(milestones::table.filter(milestones::id.eq(milestone_id)))
            .set(milestones::status.eq(status))
            .returning(Milestone::as_returning())
            .get_result(conn)?;
        Ok(milestone)
    })
}
