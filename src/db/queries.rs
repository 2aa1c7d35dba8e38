use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::job::{Job, JobStatus};
use crate::models::user::UserIdentity;

const JOB_COLUMNS: &str = "id, owner_user_id, requested_by, original_name, stored_path, \
                           status, claimed_by, created_at, claimed_at, completed_at, failure_reason";

fn job_from_row(row: &SqliteRow) -> Result<Job, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::parse(&status_str).unwrap_or(JobStatus::Queued);

    Ok(Job {
        id: row.try_get("id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        requested_by: row.try_get("requested_by")?,
        original_name: row.try_get("original_name")?,
        stored_path: row.try_get("stored_path")?,
        status,
        claimed_by: row.try_get("claimed_by")?,
        created_at: row.try_get("created_at")?,
        claimed_at: row.try_get("claimed_at")?,
        completed_at: row.try_get("completed_at")?,
        failure_reason: row.try_get("failure_reason")?,
    })
}

/// Insert a new job in `queued` state. The artifact must already be
/// durable at `stored_path` before this is called.
pub async fn insert_job(
    pool: &SqlitePool,
    owner_user_id: i64,
    requested_by: &str,
    original_name: &str,
    stored_path: &str,
) -> Result<Job, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO jobs (owner_user_id, requested_by, original_name, stored_path, status, created_at)
        VALUES (?1, ?2, ?3, ?4, 'queued', ?5)
        RETURNING {JOB_COLUMNS}
        "#,
    ))
    .bind(owner_user_id)
    .bind(requested_by)
    .bind(original_name)
    .bind(stored_path)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &SqlitePool, job_id: i64) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// List a user's own jobs, most recent first.
pub async fn list_jobs_for_owner(
    pool: &SqlitePool,
    owner_user_id: i64,
    limit: i64,
) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE owner_user_id = ?1
        ORDER BY id DESC
        LIMIT ?2
        "#,
    ))
    .bind(owner_user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Atomically claim the oldest queued job for `agent_id`.
///
/// A single conditional UPDATE selects the oldest `queued` row and
/// flips it to `claimed` in one statement, so two concurrent claimants
/// can never both win the same job. Returns `None` when the queue is
/// empty.
pub async fn claim_next(pool: &SqlitePool, agent_id: &str) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE jobs
        SET status = 'claimed', claimed_by = ?1, claimed_at = ?2
        WHERE id = (SELECT id FROM jobs WHERE status = 'queued' ORDER BY id ASC LIMIT 1)
          AND status = 'queued'
        RETURNING {JOB_COLUMNS}
        "#,
    ))
    .bind(agent_id)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Transition a job from `claimed` to `done`, guarded on the claiming
/// agent. Returns the stored artifact path when the transition won, or
/// `None` when the precondition did not hold.
pub async fn mark_done(
    pool: &SqlitePool,
    job_id: i64,
    agent_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'done', completed_at = ?1
        WHERE id = ?2 AND status = 'claimed' AND claimed_by = ?3
        RETURNING stored_path
        "#,
    )
    .bind(Utc::now())
    .bind(job_id)
    .bind(agent_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| r.try_get("stored_path")).transpose()
}

/// Transition a job from `claimed` to `failed`, guarded on the
/// claiming agent. Returns true when the transition won.
pub async fn mark_failed(
    pool: &SqlitePool,
    job_id: i64,
    agent_id: &str,
    reason: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed', completed_at = ?1, failure_reason = ?2
        WHERE id = ?3 AND status = 'claimed' AND claimed_by = ?4
        "#,
    )
    .bind(Utc::now())
    .bind(reason)
    .bind(job_id)
    .bind(agent_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Number of jobs currently waiting to be claimed.
pub async fn queued_count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM jobs WHERE status = 'queued'")
        .fetch_one(pool)
        .await?;
    row.try_get("n")
}

/// Look up a user together with their credential hash.
pub async fn find_user_with_hash(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<(UserIdentity, String)>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, username, team_name, password_hash FROM users WHERE username = ?1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => {
            let identity = UserIdentity {
                id: r.try_get("id")?,
                username: r.try_get("username")?,
                team_name: r.try_get("team_name")?,
            };
            let hash: String = r.try_get("password_hash")?;
            Ok(Some((identity, hash)))
        }
        None => Ok(None),
    }
}

/// Look up a user by username.
pub async fn find_user(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<UserIdentity>, sqlx::Error> {
    Ok(find_user_with_hash(pool, username)
        .await?
        .map(|(identity, _)| identity))
}

/// Insert a user row; used by startup seeding.
pub async fn insert_user(
    pool: &SqlitePool,
    username: &str,
    team_name: &str,
    password_hash: &str,
) -> Result<UserIdentity, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO users (username, team_name, password_hash, created_at)
        VALUES (?1, ?2, ?3, ?4)
        RETURNING id, username, team_name
        "#,
    )
    .bind(username)
    .bind(team_name)
    .bind(password_hash)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(UserIdentity {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        team_name: row.try_get("team_name")?,
    })
}
