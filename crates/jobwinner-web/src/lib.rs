//! Axum JSON gateway mapping HTTP requests onto the jobwinner services.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jobwinner_core::{
    Interview, InterviewInput, InterviewWithJobApplication, JobApplication, JobApplicationInput,
    Offer, OfferInput, OfferWithJobApplication, RecordId,
};
use jobwinner_service::Services;
use jobwinner_storage::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, Instrument};

pub const CRATE_NAME: &str = "jobwinner-web";

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

/// Store failures surface as a 500 with a JSON error body. Missing records
/// never get here: they are `null` results.
#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "request failed");
        let body = Json(json!({ "error": self.0.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize, Default)]
struct SearchQuery {
    #[serde(default)]
    term: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpireResponse {
    pub expired: u64,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route(
            "/job-applications",
            get(list_job_applications_handler)
                .post(add_job_application_handler)
                .put(update_job_application_handler),
        )
        .route("/job-applications/search", get(search_job_applications_handler))
        .route(
            "/job-applications/{id}",
            get(get_job_application_handler).delete(delete_job_application_handler),
        )
        .route(
            "/job-applications/{id}/interviews",
            get(interviews_for_job_application_handler),
        )
        .route(
            "/job-applications/{id}/offers",
            get(offers_for_job_application_handler),
        )
        .route(
            "/interviews",
            get(list_interviews_handler)
                .post(add_interview_handler)
                .put(update_interview_handler),
        )
        .route("/interviews/expire", post(expire_interviews_handler))
        .route(
            "/interviews/{id}",
            get(get_interview_handler).delete(delete_interview_handler),
        )
        .route(
            "/offers",
            get(list_offers_handler)
                .post(add_offer_handler)
                .put(update_offer_handler),
        )
        .route(
            "/offers/{id}",
            get(get_offer_handler).delete(delete_offer_handler),
        )
        .layer(middleware::from_fn(trace_request))
        .with_state(Arc::new(state))
}

pub async fn serve(
    port: u16,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn trace_request(req: Request, next: Next) -> Response {
    let span = info_span!("http_request", method = %req.method(), path = %req.uri().path());
    async move {
        let resp = next.run(req).await;
        debug!(status = resp.status().as_u16(), "request handled");
        resp
    }
    .instrument(span)
    .await
}

async fn healthz_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_job_applications_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<JobApplication>> {
    Ok(Json(state.services.job_applications.list_job_applications().await?))
}

async fn add_job_application_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<JobApplicationInput>,
) -> ApiResult<JobApplication> {
    Ok(Json(state.services.job_applications.add_job_application(input).await?))
}

async fn update_job_application_handler(
    State(state): State<Arc<AppState>>,
    Json(job_application): Json<JobApplication>,
) -> ApiResult<Option<JobApplication>> {
    Ok(Json(
        state
            .services
            .job_applications
            .update_job_application(job_application)
            .await?,
    ))
}

async fn search_job_applications_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<JobApplication>> {
    Ok(Json(
        state
            .services
            .job_applications
            .search_job_applications(&query.term)
            .await?,
    ))
}

async fn get_job_application_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Option<JobApplication>> {
    Ok(Json(state.services.job_applications.get_job_application(id).await?))
}

async fn delete_job_application_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Option<JobApplication>> {
    Ok(Json(state.services.job_applications.delete_job_application(id).await?))
}

async fn interviews_for_job_application_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Vec<Interview>> {
    Ok(Json(
        state
            .services
            .interviews
            .list_interviews_by_job_application(id)
            .await?,
    ))
}

async fn offers_for_job_application_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Vec<Offer>> {
    Ok(Json(state.services.offers.list_offers_by_job_application(id).await?))
}

async fn list_interviews_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<InterviewWithJobApplication>> {
    Ok(Json(state.services.interviews.list_interviews().await?))
}

async fn add_interview_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<InterviewInput>,
) -> ApiResult<Interview> {
    Ok(Json(state.services.interviews.add_interview(input).await?))
}

async fn update_interview_handler(
    State(state): State<Arc<AppState>>,
    Json(interview): Json<Interview>,
) -> ApiResult<Option<Interview>> {
    Ok(Json(state.services.interviews.update_interview(interview).await?))
}

async fn expire_interviews_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<ExpireResponse> {
    let expired = state.services.interviews.expire_overdue_interviews().await?;
    Ok(Json(ExpireResponse { expired }))
}

async fn get_interview_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Option<InterviewWithJobApplication>> {
    Ok(Json(state.services.interviews.get_interview(id).await?))
}

async fn delete_interview_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Option<Interview>> {
    Ok(Json(state.services.interviews.delete_interview(id).await?))
}

async fn list_offers_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<OfferWithJobApplication>> {
    Ok(Json(state.services.offers.list_offers().await?))
}

async fn add_offer_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<OfferInput>,
) -> ApiResult<Offer> {
    Ok(Json(state.services.offers.add_offer(input).await?))
}

async fn update_offer_handler(
    State(state): State<Arc<AppState>>,
    Json(offer): Json<Offer>,
) -> ApiResult<Option<Offer>> {
    Ok(Json(state.services.offers.update_offer(offer).await?))
}

async fn get_offer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Option<OfferWithJobApplication>> {
    Ok(Json(state.services.offers.get_offer(id).await?))
}

async fn delete_offer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Option<Offer>> {
    Ok(Json(state.services.offers.delete_offer(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Method};
    use chrono::{Days, Utc};
    use http_body_util::BodyExt;
    use jobwinner_storage::{JobApplicationStore, MemoryStore, Repository, Stores};
    use tower::ServiceExt;

    fn test_app() -> Router {
        app(AppState::new(Services::in_memory()))
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };
        let resp = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn handler_smoke_healthz() {
        let (status, body) = call(&test_app(), Method::GET, "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn job_application_crud_over_http() {
        let app = test_app();
        let (status, created) = call(
            &app,
            Method::POST,
            "/job-applications",
            Some(json!({ "companyName": "Acme", "jobTitle": "QA", "status": "applied" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_i64().unwrap();

        let (_, updated) = call(
            &app,
            Method::PUT,
            "/job-applications",
            Some(json!({ "id": id, "companyName": "Acme", "status": "offer" })),
        )
        .await;
        assert_eq!(updated["status"], "offer");
        assert_eq!(updated["jobTitle"], serde_json::Value::Null);

        let (_, hits) = call(&app, Method::GET, "/job-applications/search?term=acme", None).await;
        assert_eq!(hits.as_array().unwrap().len(), 1);

        let uri = format!("/job-applications/{id}");
        let (_, deleted) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(deleted["id"], id);

        let (status, missing) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(missing.is_null());
    }

    #[tokio::test]
    async fn update_of_missing_record_is_null_not_error() {
        let app = test_app();
        let (status, body) = call(
            &app,
            Method::PUT,
            "/offers",
            Some(json!({ "id": 41, "jobApplicationId": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());

        let (status, body) = call(&app, Method::DELETE, "/interviews/41", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn interviews_attach_parent_and_expire() {
        let app = test_app();
        let (_, parent) = call(
            &app,
            Method::POST,
            "/job-applications",
            Some(json!({ "companyName": "Acme" })),
        )
        .await;
        let yesterday = Utc::now().date_naive().checked_sub_days(Days::new(1)).unwrap();
        let (_, interview) = call(
            &app,
            Method::POST,
            "/interviews",
            Some(json!({
                "jobApplicationId": parent["id"],
                "interviewDate": yesterday.to_string(),
                "status": "scheduled"
            })),
        )
        .await;
        call(
            &app,
            Method::POST,
            "/interviews",
            Some(json!({ "jobApplicationId": 999, "status": "scheduled" })),
        )
        .await;

        let (_, listed) = call(&app, Method::GET, "/interviews", None).await;
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["jobApplication"]["companyName"], "Acme");
        assert!(listed[1].get("jobApplication").is_none());

        let (_, expired) = call(&app, Method::POST, "/interviews/expire", None).await;
        assert_eq!(expired["expired"], 1);
        let (_, expired) = call(&app, Method::POST, "/interviews/expire", None).await;
        assert_eq!(expired["expired"], 0);

        let uri = format!("/interviews/{}", interview["id"]);
        let (_, fetched) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(fetched["status"], "expired");

        let (_, by_parent) = call(
            &app,
            Method::GET,
            &format!("/job-applications/{}/interviews", parent["id"]),
            None,
        )
        .await;
        assert_eq!(by_parent.as_array().unwrap().len(), 1);
    }

    /// Job application store whose database is unreachable.
    struct DatabaseDown;

    #[async_trait]
    impl Repository<JobApplication> for DatabaseDown {
        async fn find_by_id(&self, _id: RecordId) -> Result<Option<JobApplication>, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }

        async fn find_all(&self) -> Result<Vec<JobApplication>, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }

        async fn save(&self, _record: JobApplication) -> Result<JobApplication, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }

        async fn delete(&self, _id: RecordId) -> Result<bool, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
    }

    #[async_trait]
    impl JobApplicationStore for DatabaseDown {
        async fn search(&self, _term: &str) -> Result<Vec<JobApplication>, StoreError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
    }

    #[tokio::test]
    async fn store_failures_become_500_with_error_body() {
        let memory = Arc::new(MemoryStore::default());
        let app = app(AppState::new(Services::new(Stores {
            job_applications: Arc::new(DatabaseDown),
            interviews: memory.clone(),
            offers: memory,
        })));

        let (status, body) = call(&app, Method::GET, "/job-applications", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("database error"));

        // a child read fails too once it needs its parent
        call(
            &app,
            Method::POST,
            "/offers",
            Some(json!({ "jobApplicationId": 1, "salaryOffered": "90k" })),
        )
        .await;
        let (status, body) = call(&app, Method::GET, "/offers/1", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }
}
