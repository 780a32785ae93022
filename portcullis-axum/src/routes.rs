use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use portcullis::Portcullis;
use portcullis_core::{Decision, repositories::AttemptLogRepository};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::{ApiError, Result},
    provider::{DispatchContext, OtpProvider},
    types::*,
};

/// Shared state for the OTP endpoint.
pub struct OtpState<R: AttemptLogRepository, P: OtpProvider> {
    pub portcullis: Arc<Portcullis<R>>,
    pub provider: Arc<P>,
    pub failure_policy: FailurePolicy,
}

impl<R: AttemptLogRepository, P: OtpProvider> Clone for OtpState<R, P> {
    fn clone(&self) -> Self {
        Self {
            portcullis: Arc::clone(&self.portcullis),
            provider: Arc::clone(&self.provider),
            failure_policy: self.failure_policy,
        }
    }
}

pub fn create_router<R, P>(state: OtpState<R, P>) -> Router
where
    R: AttemptLogRepository,
    P: OtpProvider,
{
    Router::new()
        .route("/otp", post(otp_handler::<R, P>))
        .route("/health", get(health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn otp_handler<R, P>(
    State(state): State<OtpState<R, P>>,
    connection: ConnectionInfo,
    Json(payload): Json<OtpRequest>,
) -> Result<Response>
where
    R: AttemptLogRepository,
    P: OtpProvider,
{
    let ip = payload
        .client_ip
        .clone()
        .or_else(|| connection.ip.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let email = payload.email.as_str();

    tracing::info!(action = ?payload.action, email = %email, ip = %ip, "OTP security check");

    match state.portcullis.check(email, &ip).await {
        Ok(Decision::Allowed) => {}
        Ok(decision) => return Err(ApiError::rate_limited(&decision)),
        Err(e) => match state.failure_policy {
            FailurePolicy::FailOpen => {
                tracing::warn!(error = %e, "Attempt log unavailable; failing open");
            }
            FailurePolicy::FailClosed => {
                tracing::error!(error = %e, "Attempt log unavailable; failing closed");
                return Err(ApiError::StorageUnavailable);
            }
        },
    }

    match payload.action {
        OtpAction::Send => {
            if let Err(e) = state.portcullis.validate_email(email) {
                record_failure(&state, email, &ip, "invalid_email").await;
                return Err(ApiError::invalid_email(&e));
            }

            let meta = DispatchContext {
                ip_address: ip.clone(),
                user_agent: payload.user_agent.clone().or(connection.user_agent),
            };
            if let Err(e) = state.provider.send_code(email, &meta).await {
                tracing::error!(error = %e, email = %email, "Failed to send verification code");
                record_failure(&state, email, &ip, "send_failed").await;
                return Err(ApiError::SendFailed);
            }

            record_success(&state, email, &ip, "otp_sent").await;
            Ok(Json(MessageResponse {
                success: true,
                message: "Verification code sent".to_string(),
            })
            .into_response())
        }
        OtpAction::Verify => {
            let Some(token) = payload.token.as_deref().filter(|t| !t.is_empty()) else {
                record_failure(&state, email, &ip, "missing_token").await;
                return Err(ApiError::BadRequest(
                    "Verification code is required".to_string(),
                ));
            };

            match state.provider.verify_code(email, token).await {
                Err(e) => {
                    tracing::error!(error = %e, email = %email, "Failed to verify code");
                    record_failure(&state, email, &ip, "verify_failed").await;
                    Err(ApiError::VerifyFailed)
                }
                Ok(session) => {
                    record_success(&state, email, &ip, "otp_verified").await;
                    Ok(Json(VerifyResponse {
                        success: true,
                        session,
                    })
                    .into_response())
                }
            }
        }
    }
}

/// Best-effort failure recording: once the decision has been made, a log
/// write error must not turn into a client-facing failure.
async fn record_failure<R, P>(state: &OtpState<R, P>, email: &str, ip: &str, reason: &str)
where
    R: AttemptLogRepository,
    P: OtpProvider,
{
    if let Err(e) = state.portcullis.record_failure(email, ip, reason).await {
        tracing::warn!(error = %e, reason = %reason, "Failed to record attempt");
    }
}

async fn record_success<R, P>(state: &OtpState<R, P>, email: &str, ip: &str, action: &str)
where
    R: AttemptLogRepository,
    P: OtpProvider,
{
    if let Err(e) = state.portcullis.record_success(email, ip, action).await {
        tracing::warn!(error = %e, action = %action, "Failed to record attempt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode};
    use chrono::{DateTime, Utc};
    use http_body_util::BodyExt;
    use portcullis_core::{
        Error,
        attempt::{AttemptOutcome, AttemptRecord, NewAttempt},
        error::StorageError,
    };
    use serde_json::{Value, json};
    use std::result::Result;
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct MockRepo {
        records: Mutex<Vec<AttemptRecord>>,
    }

    impl MockRepo {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
            }
        }

        fn reasons(&self) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.reason.clone())
                .collect()
        }
    }

    #[async_trait]
    impl AttemptLogRepository for MockRepo {
        async fn record_attempt(&self, attempt: &NewAttempt) -> Result<AttemptRecord, Error> {
            let mut records = self.records.lock().unwrap();
            let record = AttemptRecord {
                id: records.len() as i64 + 1,
                email: attempt.email.clone(),
                ip_address: attempt.ip_address.clone(),
                outcome: attempt.outcome,
                reason: attempt.reason.clone(),
                attempted_at: attempt.attempted_at,
                blocked_until: attempt.blocked_until,
            };
            records.push(record.clone());
            Ok(record)
        }

        async fn count_by_email(&self, email: &str, since: DateTime<Utc>) -> Result<u64, Error> {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .filter(|r| r.email == email && r.attempted_at >= since)
                .count() as u64)
        }

        async fn count_by_ip(&self, ip_address: &str, since: DateTime<Utc>) -> Result<u64, Error> {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .filter(|r| r.ip_address == ip_address && r.attempted_at >= since)
                .count() as u64)
        }

        async fn count_by_pair(
            &self,
            email: &str,
            ip_address: &str,
            since: DateTime<Utc>,
        ) -> Result<u64, Error> {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .filter(|r| {
                    r.email == email && r.ip_address == ip_address && r.attempted_at >= since
                })
                .count() as u64)
        }

        async fn active_block(
            &self,
            email: &str,
            ip_address: &str,
            at: DateTime<Utc>,
        ) -> Result<Option<DateTime<Utc>>, Error> {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .filter(|r| r.email == email || r.ip_address == ip_address)
                .filter_map(|r| r.blocked_until)
                .filter(|b| *b >= at)
                .max())
        }

        async fn cleanup_old_attempts(&self, before: DateTime<Utc>) -> Result<u64, Error> {
            let mut records = self.records.lock().unwrap();
            let before_len = records.len();
            records.retain(|r| r.attempted_at >= before);
            Ok((before_len - records.len()) as u64)
        }
    }

    /// Repository whose store is unreachable.
    struct UnreachableRepo;

    #[async_trait]
    impl AttemptLogRepository for UnreachableRepo {
        async fn record_attempt(&self, _attempt: &NewAttempt) -> Result<AttemptRecord, Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }

        async fn count_by_email(&self, _email: &str, _since: DateTime<Utc>) -> Result<u64, Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }

        async fn count_by_ip(&self, _ip_address: &str, _since: DateTime<Utc>) -> Result<u64, Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }

        async fn count_by_pair(
            &self,
            _email: &str,
            _ip_address: &str,
            _since: DateTime<Utc>,
        ) -> Result<u64, Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }

        async fn active_block(
            &self,
            _email: &str,
            _ip_address: &str,
            _at: DateTime<Utc>,
        ) -> Result<Option<DateTime<Utc>>, Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }

        async fn cleanup_old_attempts(&self, _before: DateTime<Utc>) -> Result<u64, Error> {
            Err(StorageError::Connection("connection refused".to_string()).into())
        }
    }

    struct MockProvider {
        fail_send: bool,
    }

    impl MockProvider {
        fn new() -> Self {
            Self { fail_send: false }
        }

        fn failing_send() -> Self {
            Self { fail_send: true }
        }
    }

    #[async_trait]
    impl OtpProvider for MockProvider {
        async fn send_code(&self, _email: &str, _meta: &DispatchContext) -> Result<(), ProviderError> {
            if self.fail_send {
                Err(ProviderError::Send("smtp unavailable".to_string()))
            } else {
                Ok(())
            }
        }

        async fn verify_code(&self, email: &str, token: &str) -> Result<Value, ProviderError> {
            if token == "123456" {
                Ok(json!({ "user": { "email": email } }))
            } else {
                Err(ProviderError::Verify)
            }
        }
    }

    fn app<R: AttemptLogRepository>(repo: Arc<R>, provider: MockProvider) -> Router {
        app_with_policy(repo, provider, FailurePolicy::FailOpen)
    }

    fn app_with_policy<R: AttemptLogRepository>(
        repo: Arc<R>,
        provider: MockProvider,
        failure_policy: FailurePolicy,
    ) -> Router {
        create_router(OtpState {
            portcullis: Arc::new(Portcullis::new(repo)),
            provider: Arc::new(provider),
            failure_policy,
        })
    }

    async fn post_otp(app: Router, body: Value) -> (StatusCode, HeaderMap, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/otp")
            .header("content-type", "application/json")
            .header("origin", "https://app.example.ch")
            .header("x-forwarded-for", "198.51.100.9")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    #[tokio::test]
    async fn test_send_success_records_attempt() {
        let repo = Arc::new(MockRepo::new());
        let app = app(repo.clone(), MockProvider::new());

        let (status, _, body) = post_otp(
            app,
            json!({ "email": "user@praxis.ch", "action": "send" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["message"], json!("Verification code sent"));
        assert_eq!(repo.reasons(), vec!["otp_sent"]);

        let records = repo.records.lock().unwrap();
        assert_eq!(records[0].outcome, AttemptOutcome::Success);
        assert_eq!(records[0].ip_address, "198.51.100.9");
    }

    #[tokio::test]
    async fn test_rate_limited_send_returns_429_with_retry_metadata() {
        let repo = Arc::new(MockRepo::new());
        let now = Utc::now();
        for i in 0..5 {
            repo.record_attempt(&NewAttempt {
                email: "user@praxis.ch".to_string(),
                ip_address: format!("10.0.0.{i}"),
                outcome: AttemptOutcome::Failure,
                reason: "verify_failed".to_string(),
                attempted_at: now,
                blocked_until: None,
            })
            .await
            .unwrap();
        }
        let app = app(repo.clone(), MockProvider::new());

        let (status, headers, body) = post_otp(
            app,
            json!({ "email": "user@praxis.ch", "action": "send" }),
        )
        .await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers.get("retry-after").unwrap(), "600");
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(body["retry_after"], json!(600));
        assert!(body["blocked_until"].is_string());
        assert_eq!(
            body["error"],
            json!("Too many attempts for this email address. Please try again in 10 minutes.")
        );

        // The denial appended the block record
        assert!(repo.reasons().contains(&"email_rate_limit".to_string()));
    }

    #[tokio::test]
    async fn test_blocked_domain_returns_400_and_records_failure() {
        let repo = Arc::new(MockRepo::new());
        let app = app(repo.clone(), MockProvider::new());

        let (status, _, body) = post_otp(
            app,
            json!({ "email": "user@test.com", "action": "send" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            json!("Test email domains are not allowed. Please use your real email address.")
        );
        assert_eq!(repo.reasons(), vec!["invalid_email"]);
    }

    #[tokio::test]
    async fn test_send_provider_failure_returns_500() {
        let repo = Arc::new(MockRepo::new());
        let app = app(repo.clone(), MockProvider::failing_send());

        let (status, _, body) = post_otp(
            app,
            json!({ "email": "user@praxis.ch", "action": "send" }),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], json!("Failed to send verification code"));
        assert_eq!(repo.reasons(), vec!["send_failed"]);
    }

    #[tokio::test]
    async fn test_verify_without_token_returns_400() {
        let repo = Arc::new(MockRepo::new());
        let app = app(repo.clone(), MockProvider::new());

        let (status, _, body) = post_otp(
            app,
            json!({ "email": "user@praxis.ch", "action": "verify" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Verification code is required"));
        assert_eq!(repo.reasons(), vec!["missing_token"]);
    }

    #[tokio::test]
    async fn test_verify_wrong_token_returns_400() {
        let repo = Arc::new(MockRepo::new());
        let app = app(repo.clone(), MockProvider::new());

        let (status, _, body) = post_otp(
            app,
            json!({ "email": "user@praxis.ch", "action": "verify", "token": "000000" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Invalid or expired verification code"));
        assert_eq!(repo.reasons(), vec!["verify_failed"]);
    }

    #[tokio::test]
    async fn test_verify_success_returns_provider_payload() {
        let repo = Arc::new(MockRepo::new());
        let app = app(repo.clone(), MockProvider::new());

        let (status, _, body) = post_otp(
            app,
            json!({ "email": "user@praxis.ch", "action": "verify", "token": "123456" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["session"]["user"]["email"], json!("user@praxis.ch"));
        assert_eq!(repo.reasons(), vec!["otp_verified"]);
    }

    #[tokio::test]
    async fn test_fail_open_allows_action_when_store_is_down() {
        let app = app_with_policy(
            Arc::new(UnreachableRepo),
            MockProvider::new(),
            FailurePolicy::FailOpen,
        );

        let (status, _, body) = post_otp(
            app,
            json!({ "email": "user@praxis.ch", "action": "send" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
    }

    #[tokio::test]
    async fn test_fail_closed_denies_when_store_is_down() {
        let app = app_with_policy(
            Arc::new(UnreachableRepo),
            MockProvider::new(),
            FailurePolicy::FailClosed,
        );

        let (status, _, body) = post_otp(
            app,
            json!({ "email": "user@praxis.ch", "action": "send" }),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], json!("Service temporarily unavailable"));
    }

    #[tokio::test]
    async fn test_preflight_options_is_answered() {
        let app = app(Arc::new(MockRepo::new()), MockProvider::new());

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/otp")
            .header("origin", "https://app.example.ch")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_body_client_ip_takes_precedence_over_headers() {
        let repo = Arc::new(MockRepo::new());
        let app = app(repo.clone(), MockProvider::new());

        let (status, _, _) = post_otp(
            app,
            json!({ "email": "user@praxis.ch", "action": "send", "clientIP": "203.0.113.77" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let records = repo.records.lock().unwrap();
        assert_eq!(records[0].ip_address, "203.0.113.77");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app(Arc::new(MockRepo::new()), MockProvider::new());

        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], json!("healthy"));
    }
}
