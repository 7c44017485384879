use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use jobwinner_core::{
    Interview, JobApplication, Offer, RecordId, INTERVIEW_STATUS_EXPIRED,
    TERMINAL_INTERVIEW_STATUSES,
};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use crate::{
    normalize_search_term, ChildRepository, InterviewStore, JobApplicationStore, Repository,
    StoreError,
};

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PgStoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Postgres-backed record store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &PgStoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await?;
        debug!(max_connections = config.max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

/// `%term%` with LIKE metacharacters escaped so they match literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

const JOB_APPLICATION_COLUMNS: &str =
    "id, company_name, job_title, salary_range, job_url, applied_date, description, note, status";
const INTERVIEW_COLUMNS: &str =
    "id, job_application_id, interview_date, interviewer, description, status";
const OFFER_COLUMNS: &str = "id, job_application_id, offer_date, salary_offered, description";

fn job_application_from_row(row: &PgRow) -> Result<JobApplication, sqlx::Error> {
    Ok(JobApplication {
        id: Some(row.try_get("id")?),
        company_name: row.try_get("company_name")?,
        job_title: row.try_get("job_title")?,
        salary_range: row.try_get("salary_range")?,
        job_url: row.try_get("job_url")?,
        applied_date: row.try_get("applied_date")?,
        description: row.try_get("description")?,
        note: row.try_get("note")?,
        status: row.try_get("status")?,
    })
}

fn interview_from_row(row: &PgRow) -> Result<Interview, sqlx::Error> {
    Ok(Interview {
        id: Some(row.try_get("id")?),
        job_application_id: row.try_get("job_application_id")?,
        interview_date: row.try_get("interview_date")?,
        interviewer: row.try_get("interviewer")?,
        description: row.try_get("description")?,
        status: row.try_get("status")?,
    })
}

fn offer_from_row(row: &PgRow) -> Result<Offer, sqlx::Error> {
    Ok(Offer {
        id: Some(row.try_get("id")?),
        job_application_id: row.try_get("job_application_id")?,
        offer_date: row.try_get("offer_date")?,
        salary_offered: row.try_get("salary_offered")?,
        description: row.try_get("description")?,
    })
}

fn map_rows<T>(
    rows: Vec<PgRow>,
    map: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> Result<Vec<T>, StoreError> {
    rows.iter()
        .map(|row| map(row).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl Repository<JobApplication> for PgStore {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<JobApplication>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_APPLICATION_COLUMNS} FROM job_application WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(job_application_from_row).transpose()?)
    }

    async fn find_all(&self) -> Result<Vec<JobApplication>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_APPLICATION_COLUMNS} FROM job_application ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, job_application_from_row)
    }

    async fn save(&self, record: JobApplication) -> Result<JobApplication, StoreError> {
        let row = match record.id {
            None => {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO job_application
                        (company_name, job_title, salary_range, job_url, applied_date, description, note, status)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING {JOB_APPLICATION_COLUMNS}
                    "#
                ))
                .bind(&record.company_name)
                .bind(&record.job_title)
                .bind(&record.salary_range)
                .bind(&record.job_url)
                .bind(record.applied_date)
                .bind(&record.description)
                .bind(&record.note)
                .bind(&record.status)
                .fetch_one(&self.pool)
                .await?
            }
            Some(id) => sqlx::query(&format!(
                r#"
                UPDATE job_application
                   SET company_name = $2,
                       job_title = $3,
                       salary_range = $4,
                       job_url = $5,
                       applied_date = $6,
                       description = $7,
                       note = $8,
                       status = $9
                 WHERE id = $1
             RETURNING {JOB_APPLICATION_COLUMNS}
                "#
            ))
            .bind(id)
            .bind(&record.company_name)
            .bind(&record.job_title)
            .bind(&record.salary_range)
            .bind(&record.job_url)
            .bind(record.applied_date)
            .bind(&record.description)
            .bind(&record.note)
            .bind(&record.status)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::Missing {
                kind: "job_application",
                id,
            })?,
        };
        Ok(job_application_from_row(&row)?)
    }

    async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM job_application WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl JobApplicationStore for PgStore {
    async fn search(&self, term: &str) -> Result<Vec<JobApplication>, StoreError> {
        let pattern = normalize_search_term(term).map(|t| like_pattern(&t));
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_APPLICATION_COLUMNS}
              FROM job_application
             WHERE $1::text IS NULL
                OR company_name ILIKE $1 ESCAPE '\'
                OR job_title ILIKE $1 ESCAPE '\'
                OR description ILIKE $1 ESCAPE '\'
                OR note ILIKE $1 ESCAPE '\'
                OR status ILIKE $1 ESCAPE '\'
             ORDER BY id
            "#
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, job_application_from_row)
    }
}

#[async_trait]
impl Repository<Interview> for PgStore {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Interview>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {INTERVIEW_COLUMNS} FROM interview WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(interview_from_row).transpose()?)
    }

    async fn find_all(&self) -> Result<Vec<Interview>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {INTERVIEW_COLUMNS} FROM interview ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        map_rows(rows, interview_from_row)
    }

    async fn save(&self, record: Interview) -> Result<Interview, StoreError> {
        let row = match record.id {
            None => {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO interview
                        (job_application_id, interview_date, interviewer, description, status)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING {INTERVIEW_COLUMNS}
                    "#
                ))
                .bind(record.job_application_id)
                .bind(record.interview_date)
                .bind(&record.interviewer)
                .bind(&record.description)
                .bind(&record.status)
                .fetch_one(&self.pool)
                .await?
            }
            Some(id) => sqlx::query(&format!(
                r#"
                UPDATE interview
                   SET job_application_id = $2,
                       interview_date = $3,
                       interviewer = $4,
                       description = $5,
                       status = $6
                 WHERE id = $1
             RETURNING {INTERVIEW_COLUMNS}
                "#
            ))
            .bind(id)
            .bind(record.job_application_id)
            .bind(record.interview_date)
            .bind(&record.interviewer)
            .bind(&record.description)
            .bind(&record.status)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::Missing {
                kind: "interview",
                id,
            })?,
        };
        Ok(interview_from_row(&row)?)
    }

    async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM interview WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ChildRepository<Interview> for PgStore {
    async fn find_all_by_parent_id(
        &self,
        job_application_id: RecordId,
    ) -> Result<Vec<Interview>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {INTERVIEW_COLUMNS} FROM interview WHERE job_application_id = $1 ORDER BY id"
        ))
        .bind(job_application_id)
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, interview_from_row)
    }
}

#[async_trait]
impl InterviewStore for PgStore {
    async fn expire_overdue(&self, today: NaiveDate) -> Result<u64, StoreError> {
        let terminal: Vec<String> = TERMINAL_INTERVIEW_STATUSES
            .iter()
            .map(ToString::to_string)
            .collect();
        let result = sqlx::query(
            r#"
            UPDATE interview
               SET status = $1
             WHERE interview_date < $2
               AND (status IS NULL OR NOT (status = ANY($3)))
            "#,
        )
        .bind(INTERVIEW_STATUS_EXPIRED)
        .bind(today)
        .bind(terminal)
        .execute(&self.pool)
        .await?;
        debug!(%today, rows = result.rows_affected(), "interview expiry update applied");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Repository<Offer> for PgStore {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Offer>, StoreError> {
        let row = sqlx::query(&format!("SELECT {OFFER_COLUMNS} FROM offer WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(offer_from_row).transpose()?)
    }

    async fn find_all(&self) -> Result<Vec<Offer>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {OFFER_COLUMNS} FROM offer ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        map_rows(rows, offer_from_row)
    }

    async fn save(&self, record: Offer) -> Result<Offer, StoreError> {
        let row = match record.id {
            None => {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO offer (job_application_id, offer_date, salary_offered, description)
                    VALUES ($1, $2, $3, $4)
                    RETURNING {OFFER_COLUMNS}
                    "#
                ))
                .bind(record.job_application_id)
                .bind(record.offer_date)
                .bind(&record.salary_offered)
                .bind(&record.description)
                .fetch_one(&self.pool)
                .await?
            }
            Some(id) => sqlx::query(&format!(
                r#"
                UPDATE offer
                   SET job_application_id = $2,
                       offer_date = $3,
                       salary_offered = $4,
                       description = $5
                 WHERE id = $1
             RETURNING {OFFER_COLUMNS}
                "#
            ))
            .bind(id)
            .bind(record.job_application_id)
            .bind(record.offer_date)
            .bind(&record.salary_offered)
            .bind(&record.description)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::Missing { kind: "offer", id })?,
        };
        Ok(offer_from_row(&row)?)
    }

    async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM offer WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ChildRepository<Offer> for PgStore {
    async fn find_all_by_parent_id(
        &self,
        job_application_id: RecordId,
    ) -> Result<Vec<Offer>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {OFFER_COLUMNS} FROM offer WHERE job_application_id = $1 ORDER BY id"
        ))
        .bind(job_application_id)
        .fetch_all(&self.pool)
        .await?;
        map_rows(rows, offer_from_row)
    }
}
