//! HTTP API for the SCD engine.
//!
//! Every entity collection exposes latest, historical and as-of reads plus
//! versioned writes under `/api/v1/<collection>`. Engine calls run on the
//! blocking thread pool; engine errors map onto HTTP statuses in
//! [`ServerError::status`].

pub mod config;
pub mod error;
pub mod handler;
pub mod resource;
pub mod router;
pub mod server;

pub use config::{DatabaseConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use resource::{contractor_job_uids, list_query, parse_timestamp, ListFilter, Resource};
pub use router::build_router;
pub use server::ScdServer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use scd_engine::Engine;
    use scd_models::tables;
    use scd_store::InMemoryStore;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    fn app() -> Router {
        build_router(Engine::new(Arc::new(InMemoryStore::with_schema(&tables()))))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn job(key: &str, contractor: &str, rate: f64) -> Value {
        json!({
            "business_key": key,
            "status": "active",
            "rate": rate,
            "title": "Backend developer",
            "company_id": "company-acme",
            "contractor_id": contractor,
        })
    }

    // -----------------------------------------------------------------------
    // Health
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint() {
        let (status, body) = call(&app(), Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "memory");
    }

    // -----------------------------------------------------------------------
    // Versioned writes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn job_lifecycle() {
        let app = app();
        let (status, body) =
            call(&app, Method::POST, "/api/v1/jobs", Some(job("job-1", "alice", 50.0))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["version"], 1);
        assert!(body["data"]["valid_to"].is_null());

        let (status, body) =
            call(&app, Method::PATCH, "/api/v1/jobs/job-1", Some(json!({"rate": 60.0}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["version"], 2);
        assert_eq!(body["data"]["rate"], 60.0);
        assert_eq!(body["data"]["title"], "Backend developer");

        let (_, body) = call(&app, Method::GET, "/api/v1/jobs/job-1", None).await;
        assert_eq!(body["data"]["rate"], 60.0);

        let (status, body) = call(&app, Method::GET, "/api/v1/jobs/job-1/versions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["data"][0]["rate"], 50.0);
        assert_eq!(body["data"][0]["valid_to"], body["data"][1]["valid_from"]);

        let (status, body) = call(&app, Method::GET, "/api/v1/jobs/job-1/versions/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["rate"], 50.0);

        let (status, _) = call(&app, Method::DELETE, "/api/v1/jobs/job-1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = call(&app, Method::GET, "/api/v1/jobs/job-1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("job-1"));
        let (status, body) = call(&app, Method::GET, "/api/v1/jobs/job-1/versions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn write_errors_map_to_statuses() {
        let app = app();
        call(&app, Method::POST, "/api/v1/jobs", Some(job("job-1", "alice", 50.0))).await;

        let (status, _) =
            call(&app, Method::POST, "/api/v1/jobs", Some(job("job-1", "alice", 55.0))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) =
            call(&app, Method::POST, "/api/v1/jobs", Some(job("job-2", "alice", -5.0))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) =
            call(&app, Method::PATCH, "/api/v1/jobs/job-1", Some(json!({"rate": "lots"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) =
            call(&app, Method::PATCH, "/api/v1/jobs/job-1", Some(json!({"version": 9}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call(&app, Method::PATCH, "/api/v1/jobs/ghost", Some(json!({"rate": 1.0}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let mut missing_key = job("x", "alice", 1.0);
        missing_key.as_object_mut().unwrap().remove("business_key");
        let (status, _) = call(&app, Method::POST, "/api/v1/jobs", Some(missing_key)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::DELETE, "/api/v1/jobs/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::GET, "/api/v1/jobs/job-1/versions/0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // The failed writes left exactly one version behind.
        let (_, body) = call(&app, Method::GET, "/api/v1/jobs/job-1/versions", None).await;
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn dependent_rows_need_existing_references() {
        let app = app();
        let (_, body) =
            call(&app, Method::POST, "/api/v1/jobs", Some(job("job-1", "alice", 60.0))).await;
        let job_uid = body["data"]["surrogate_key"].clone();

        let timelog = json!({
            "business_key": "tl-1",
            "duration": 5_400_000,
            "time_start": 1_704_067_200,
            "time_end": 1_704_072_600,
            "type": "captured",
            "job_uid": job_uid,
        });
        let (status, body) = call(&app, Method::POST, "/api/v1/timelogs", Some(timelog)).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let timelog_uid = body["data"]["surrogate_key"].clone();

        let payment = json!({
            "business_key": "pay-1",
            "job_uid": job_uid,
            "timelog_uid": timelog_uid,
            "amount": 90.0,
            "status": "not-paid",
        });
        let (status, _) = call(&app, Method::POST, "/api/v1/payments", Some(payment.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let mut orphan = payment;
        orphan["business_key"] = json!("pay-2");
        orphan["job_uid"] = json!("0190a0b0-0000-7000-8000-000000000000");
        let (status, _) = call(&app, Method::POST, "/api/v1/payments", Some(orphan)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    // -----------------------------------------------------------------------
    // Listings
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn list_filters() {
        let app = app();
        call(&app, Method::POST, "/api/v1/jobs", Some(job("job-1", "alice", 50.0))).await;
        call(&app, Method::POST, "/api/v1/jobs", Some(job("job-2", "bob", 40.0))).await;
        call(&app, Method::PATCH, "/api/v1/jobs/job-2", Some(json!({"status": "paused"}))).await;

        let (_, body) = call(&app, Method::GET, "/api/v1/jobs", None).await;
        assert_eq!(body["count"], 2);

        let (_, body) = call(&app, Method::GET, "/api/v1/jobs?status=paused", None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["business_key"], "job-2");

        let (_, body) = call(&app, Method::GET, "/api/v1/jobs?contractor=alice&limit=1", None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["contractor_id"], "alice");

        let (_, body) = call(&app, Method::GET, "/api/v1/jobs?company=nobody", None).await;
        assert_eq!(body["count"], 0);

        let (_, body) = call(
            &app,
            Method::GET,
            "/api/v1/jobs?as_of=2000-01-01T00:00:00Z",
            None,
        )
        .await;
        assert_eq!(body["count"], 0);

        let (status, _) = call(&app, Method::GET, "/api/v1/jobs?as_of=soon", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, Method::GET, "/api/v1/timelogs?company=acme", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            call(&app, Method::GET, "/api/v1/payments?contractor=alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }
}
