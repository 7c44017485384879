//! Record store contracts for jobwinner plus the in-memory and postgres backends.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use jobwinner_core::{
    ChildRecord, Interview, JobApplication, Offer, Record, RecordId, INTERVIEW_STATUS_EXPIRED,
};
use thiserror::Error;
use tokio::sync::RwLock;

mod postgres;

pub use postgres::{PgStore, PgStoreConfig};

pub const CRATE_NAME: &str = "jobwinner-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("{kind} {id} vanished before it could be saved")]
    Missing { kind: &'static str, id: RecordId },
    #[error("no {kind} ids left to assign")]
    IdsExhausted { kind: &'static str },
}

/// Record-oriented CRUD for one record kind.
#[async_trait]
pub trait Repository<R: Record>: Send + Sync {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<R>, StoreError>;

    /// Every record, in the store's native order (ascending id).
    async fn find_all(&self) -> Result<Vec<R>, StoreError>;

    /// Inserts when `record` has no id, otherwise overwrites the stored row.
    /// The returned record always carries its id.
    async fn save(&self, record: R) -> Result<R, StoreError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: RecordId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ChildRepository<R: ChildRecord>: Repository<R> {
    async fn find_all_by_parent_id(
        &self,
        job_application_id: RecordId,
    ) -> Result<Vec<R>, StoreError>;
}

#[async_trait]
pub trait JobApplicationStore: Repository<JobApplication> {
    /// Case-insensitive substring match over company name, job title,
    /// description, note and status. A blank term matches every application.
    async fn search(&self, term: &str) -> Result<Vec<JobApplication>, StoreError>;
}

#[async_trait]
pub trait InterviewStore: ChildRepository<Interview> {
    /// Single atomic conditional update: every interview dated before `today`
    /// whose status is not terminal becomes expired. Returns rows affected.
    async fn expire_overdue(&self, today: NaiveDate) -> Result<u64, StoreError>;
}

pub trait OfferStore: ChildRepository<Offer> {}

impl<T: ChildRepository<Offer>> OfferStore for T {}

/// Store handles shared by the services, built once at startup.
#[derive(Clone)]
pub struct Stores {
    pub job_applications: Arc<dyn JobApplicationStore>,
    pub interviews: Arc<dyn InterviewStore>,
    pub offers: Arc<dyn OfferStore>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            job_applications: store.clone(),
            interviews: store.clone(),
            offers: store,
        }
    }

    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            job_applications: store.clone(),
            interviews: store.clone(),
            offers: store,
        }
    }
}

/// Trimmed search term, or `None` when the term should match everything.
pub fn normalize_search_term(term: &str) -> Option<String> {
    let term = term.trim();
    if term.is_empty() {
        None
    } else {
        Some(term.to_string())
    }
}

fn matches_search_term(application: &JobApplication, needle_lower: &str) -> bool {
    [
        &application.company_name,
        &application.job_title,
        &application.description,
        &application.note,
        &application.status,
    ]
    .into_iter()
    .flatten()
    .any(|value| value.to_lowercase().contains(needle_lower))
}

#[derive(Debug)]
struct Table<R> {
    next_id: RecordId,
    rows: BTreeMap<RecordId, R>,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<R: Record> Table<R> {
    fn save(&mut self, mut record: R) -> Result<R, StoreError> {
        match record.id() {
            Some(id) => {
                let slot = self.rows.get_mut(&id).ok_or(StoreError::Missing { kind: R::KIND, id })?;
                *slot = record.clone();
            }
            None => {
                let id = self.next_id;
                self.next_id = id
                    .checked_add(1)
                    .ok_or(StoreError::IdsExhausted { kind: R::KIND })?;
                record.assign_id(id);
                self.rows.insert(id, record.clone());
            }
        }
        Ok(record)
    }
}

/// Process-local store. Each table sits behind its own lock, so bulk updates
/// run inside one write-lock critical section and are atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    job_applications: RwLock<Table<JobApplication>>,
    interviews: RwLock<Table<Interview>>,
    offers: RwLock<Table<Offer>>,
}

macro_rules! memory_repository {
    ($record:ty, $table:ident) => {
        #[async_trait]
        impl Repository<$record> for MemoryStore {
            async fn find_by_id(&self, id: RecordId) -> Result<Option<$record>, StoreError> {
                Ok(self.$table.read().await.rows.get(&id).cloned())
            }

            async fn find_all(&self) -> Result<Vec<$record>, StoreError> {
                Ok(self.$table.read().await.rows.values().cloned().collect())
            }

            async fn save(&self, record: $record) -> Result<$record, StoreError> {
                self.$table.write().await.save(record)
            }

            async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
                Ok(self.$table.write().await.rows.remove(&id).is_some())
            }
        }
    };
}

macro_rules! memory_child_repository {
    ($record:ty, $table:ident) => {
        #[async_trait]
        impl ChildRepository<$record> for MemoryStore {
            async fn find_all_by_parent_id(
                &self,
                job_application_id: RecordId,
            ) -> Result<Vec<$record>, StoreError> {
                Ok(self
                    .$table
                    .read()
                    .await
                    .rows
                    .values()
                    .filter(|r| r.job_application_id() == job_application_id)
                    .cloned()
                    .collect())
            }
        }
    };
}

memory_repository!(JobApplication, job_applications);
memory_repository!(Interview, interviews);
memory_repository!(Offer, offers);
memory_child_repository!(Interview, interviews);
memory_child_repository!(Offer, offers);

#[async_trait]
impl JobApplicationStore for MemoryStore {
    async fn search(&self, term: &str) -> Result<Vec<JobApplication>, StoreError> {
        let table = self.job_applications.read().await;
        let Some(term) = normalize_search_term(term) else {
            return Ok(table.rows.values().cloned().collect());
        };
        let needle = term.to_lowercase();
        Ok(table
            .rows
            .values()
            .filter(|a| matches_search_term(a, &needle))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn expire_overdue(&self, today: NaiveDate) -> Result<u64, StoreError> {
        let mut table = self.interviews.write().await;
        let mut affected = 0u64;
        for interview in table.rows.values_mut() {
            if interview.is_overdue(today) {
                interview.status = Some(INTERVIEW_STATUS_EXPIRED.to_string());
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwinner_core::INTERVIEW_STATUS_SCHEDULED;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn application(company: &str, title: &str) -> JobApplication {
        JobApplication {
            company_name: Some(company.into()),
            job_title: Some(title.into()),
            status: Some("applied".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn save_assigns_sequential_ids_and_updates_in_place() {
        let store = MemoryStore::default();
        let first = store.save(application("Acme", "QA")).await.unwrap();
        let second = store.save(application("Globex", "SRE")).await.unwrap();
        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));

        let mut changed = first.clone();
        changed.job_title = Some("QA Lead".into());
        let saved = store.save(changed).await.unwrap();
        assert_eq!(saved.id, Some(1));

        let all = Repository::<JobApplication>::find_all(&store).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].job_title.as_deref(), Some("QA Lead"));
    }

    #[tokio::test]
    async fn save_with_unknown_id_does_not_insert() {
        let store = MemoryStore::default();
        let err = store
            .save(JobApplication {
                id: Some(42),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { kind: "job_application", id: 42 }));
        let all = Repository::<JobApplication>::find_all(&store).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_was_removed() {
        let store = MemoryStore::default();
        let saved = store.save(application("Acme", "QA")).await.unwrap();
        let id = saved.id.unwrap();
        assert!(Repository::<JobApplication>::delete(&store, id).await.unwrap());
        assert!(!Repository::<JobApplication>::delete(&store, id).await.unwrap());
        let found = Repository::<JobApplication>::find_by_id(&store, id).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn children_are_filtered_by_parent() {
        let store = MemoryStore::default();
        for parent in [1, 2, 1] {
            store
                .save(Offer {
                    job_application_id: parent,
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        let offers = ChildRepository::<Offer>::find_all_by_parent_id(&store, 1).await.unwrap();
        assert_eq!(offers.iter().map(|o| o.id).collect::<Vec<_>>(), vec![Some(1), Some(3)]);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_blank_matches_all() {
        let store = MemoryStore::default();
        store.save(application("Acme", "QA")).await.unwrap();
        store.save(application("Globex", "Platform engineer")).await.unwrap();

        let hits = store.search("acme").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].company_name.as_deref(), Some("Acme"));

        assert_eq!(store.search("ENGINEER").await.unwrap().len(), 1);
        assert!(store.search("initech").await.unwrap().is_empty());
        assert_eq!(store.search("").await.unwrap().len(), 2);
        assert_eq!(store.search("   ").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn expire_overdue_is_idempotent() {
        let store = MemoryStore::default();
        let today = day(2024, 9, 10);
        for (date, status) in [
            (Some(day(2024, 9, 9)), Some(INTERVIEW_STATUS_SCHEDULED)),
            (Some(day(2024, 9, 1)), None),
            (Some(day(2024, 9, 1)), Some(INTERVIEW_STATUS_EXPIRED)),
            (Some(day(2024, 9, 11)), Some(INTERVIEW_STATUS_SCHEDULED)),
            (None, Some(INTERVIEW_STATUS_SCHEDULED)),
        ] {
            store
                .save(Interview {
                    job_application_id: 1,
                    interview_date: date,
                    status: status.map(str::to_string),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        assert_eq!(store.expire_overdue(today).await.unwrap(), 2);
        assert_eq!(store.expire_overdue(today).await.unwrap(), 0);

        let statuses: Vec<Option<String>> = Repository::<Interview>::find_all(&store)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                Some("expired".to_string()),
                Some("expired".to_string()),
                Some("expired".to_string()),
                Some("scheduled".to_string()),
                Some("scheduled".to_string()),
            ]
        );
    }

    #[test]
    fn insert_fails_once_ids_run_out() {
        let mut table = Table::<Offer> {
            next_id: RecordId::MAX,
            rows: BTreeMap::new(),
        };
        let err = table.save(Offer::default()).unwrap_err();
        assert!(matches!(err, StoreError::IdsExhausted { kind: "offer" }));
        assert!(table.rows.is_empty());
        assert_eq!(table.next_id, RecordId::MAX);
    }

    #[test]
    fn blank_search_terms_normalize_to_match_all() {
        assert_eq!(normalize_search_term(""), None);
        assert_eq!(normalize_search_term(" \t"), None);
        assert_eq!(normalize_search_term(" Acme "), Some("Acme".to_string()));
    }
}
