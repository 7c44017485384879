//! Core domain model for jobwinner: job applications and the interviews and
//! offers that reference them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "jobwinner-core";

/// Store-assigned identity shared by every record kind.
pub type RecordId = i32;

pub const INTERVIEW_STATUS_SCHEDULED: &str = "scheduled";
pub const INTERVIEW_STATUS_EXPIRED: &str = "expired";

/// Statuses past which the lifecycle sweeper never touches an interview again.
pub const TERMINAL_INTERVIEW_STATUSES: &[&str] = &[INTERVIEW_STATUS_EXPIRED];

pub fn is_terminal_interview_status(status: Option<&str>) -> bool {
    status.is_some_and(|s| TERMINAL_INTERVIEW_STATUSES.contains(&s))
}

/// A persisted record kind. `id` is `None` only before the first save.
pub trait Record: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn id(&self) -> Option<RecordId>;

    /// Only stores call this, when assigning identity on insert.
    fn assign_id(&mut self, id: RecordId);
}

/// Field-wise full overwrite. Every mutable attribute is replaced by the
/// incoming value, absent values included. Identity is never touched.
pub trait Merge {
    fn merge_from(&mut self, incoming: Self);
}

/// A record that references a parent [`JobApplication`].
pub trait ChildRecord: Record {
    fn job_application_id(&self) -> RecordId;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobApplication {
    pub id: Option<RecordId>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub salary_range: Option<String>,
    pub job_url: Option<String>,
    pub applied_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub note: Option<String>,
    pub status: Option<String>,
}

/// Client payload for creating a job application.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobApplicationInput {
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub salary_range: Option<String>,
    pub job_url: Option<String>,
    pub applied_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub note: Option<String>,
    pub status: Option<String>,
}

impl From<JobApplicationInput> for JobApplication {
    fn from(input: JobApplicationInput) -> Self {
        Self {
            id: None,
            company_name: input.company_name,
            job_title: input.job_title,
            salary_range: input.salary_range,
            job_url: input.job_url,
            applied_date: input.applied_date,
            description: input.description,
            note: input.note,
            status: input.status,
        }
    }
}

impl Record for JobApplication {
    const KIND: &'static str = "job_application";

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }
}

impl Merge for JobApplication {
    fn merge_from(&mut self, incoming: Self) {
        let JobApplication {
            id: _,
            company_name,
            job_title,
            salary_range,
            job_url,
            applied_date,
            description,
            note,
            status,
        } = incoming;
        self.company_name = company_name;
        self.job_title = job_title;
        self.salary_range = salary_range;
        self.job_url = job_url;
        self.applied_date = applied_date;
        self.description = description;
        self.note = note;
        self.status = status;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: Option<RecordId>,
    pub job_application_id: RecordId,
    pub interview_date: Option<NaiveDate>,
    pub interviewer: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewInput {
    pub job_application_id: RecordId,
    pub interview_date: Option<NaiveDate>,
    pub interviewer: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

impl From<InterviewInput> for Interview {
    fn from(input: InterviewInput) -> Self {
        Self {
            id: None,
            job_application_id: input.job_application_id,
            interview_date: input.interview_date,
            interviewer: input.interviewer,
            description: input.description,
            status: input.status,
        }
    }
}

impl Interview {
    /// Whether the sweeper would expire this interview on `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.interview_date.is_some_and(|date| date < today)
            && !is_terminal_interview_status(self.status.as_deref())
    }
}

impl Record for Interview {
    const KIND: &'static str = "interview";

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }
}

impl ChildRecord for Interview {
    fn job_application_id(&self) -> RecordId {
        self.job_application_id
    }
}

impl Merge for Interview {
    fn merge_from(&mut self, incoming: Self) {
        let Interview {
            id: _,
            job_application_id,
            interview_date,
            interviewer,
            description,
            status,
        } = incoming;
        self.job_application_id = job_application_id;
        self.interview_date = interview_date;
        self.interviewer = interviewer;
        self.description = description;
        self.status = status;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: Option<RecordId>,
    pub job_application_id: RecordId,
    pub offer_date: Option<NaiveDate>,
    pub salary_offered: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferInput {
    pub job_application_id: RecordId,
    pub offer_date: Option<NaiveDate>,
    pub salary_offered: Option<String>,
    pub description: Option<String>,
}

impl From<OfferInput> for Offer {
    fn from(input: OfferInput) -> Self {
        Self {
            id: None,
            job_application_id: input.job_application_id,
            offer_date: input.offer_date,
            salary_offered: input.salary_offered,
            description: input.description,
        }
    }
}

impl Record for Offer {
    const KIND: &'static str = "offer";

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }
}

impl ChildRecord for Offer {
    fn job_application_id(&self) -> RecordId {
        self.job_application_id
    }
}

impl Merge for Offer {
    fn merge_from(&mut self, incoming: Self) {
        let Offer {
            id: _,
            job_application_id,
            offer_date,
            salary_offered,
            description,
        } = incoming;
        self.job_application_id = job_application_id;
        self.offer_date = offer_date;
        self.salary_offered = salary_offered;
        self.description = description;
    }
}

/// Read-side view of a child record with its resolved parent. The parent only
/// exists on this wrapper, so it can never reach a store write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithJobApplication<C> {
    #[serde(flatten)]
    pub record: C,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_application: Option<JobApplication>,
}

impl<C> WithJobApplication<C> {
    pub fn detached(record: C) -> Self {
        Self {
            record,
            job_application: None,
        }
    }

    pub fn attached(record: C, job_application: JobApplication) -> Self {
        Self {
            record,
            job_application: Some(job_application),
        }
    }

    pub fn into_record(self) -> C {
        self.record
    }
}

pub type InterviewWithJobApplication = WithJobApplication<Interview>;
pub type OfferWithJobApplication = WithJobApplication<Offer>;
