use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};

use crate::dto::test_dto::{
    PublicTest, PublicTestEnvelope, StartTestResponse, SubmitTestRequest, SubmitTestResponse,
};
use crate::error::{Error, Result};
use crate::middleware::auth::USER_ID_HEADER;
use crate::services::{attempt_service::AttemptService, test_service::TestService};

/// What a test-taking session needs from the backend. Implementations are
/// bound to a single user.
#[async_trait]
pub trait AttemptApi: Send + Sync {
    async fn fetch_test(&self, test_id: i64) -> Result<PublicTest>;

    async fn start_or_resume(&self, test_id: i64) -> Result<StartTestResponse>;

    /// Idempotent per attempt; safe to retry after a failure.
    async fn submit(&self, request: &SubmitTestRequest) -> Result<SubmitTestResponse>;
}

#[derive(Clone)]
pub struct HttpAttemptClient {
    http: Client,
    base_url: String,
    user_id: i64,
}

impl HttpAttemptClient {
    pub fn new(base_url: impl Into<String>, user_id: i64) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self::with_client(http, base_url, user_id))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, user_id: i64) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            user_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl AttemptApi for HttpAttemptClient {
    async fn fetch_test(&self, test_id: i64) -> Result<PublicTest> {
        let resp = self
            .http
            .get(self.url(&format!("/api/tests/{}/questions", test_id)))
            .send()
            .await?;
        let envelope: PublicTestEnvelope = decode(resp).await?;
        Ok(envelope.test)
    }

    async fn start_or_resume(&self, test_id: i64) -> Result<StartTestResponse> {
        let resp = self
            .http
            .post(self.url(&format!("/api/tests/start/{}", test_id)))
            .header(USER_ID_HEADER, self.user_id.to_string())
            .send()
            .await?;
        decode(resp).await
    }

    async fn submit(&self, request: &SubmitTestRequest) -> Result<SubmitTestResponse> {
        let resp = self
            .http
            .post(self.url("/api/tests/submit"))
            .header(USER_ID_HEADER, self.user_id.to_string())
            .json(request)
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);

    Err(match status {
        StatusCode::BAD_REQUEST => Error::BadRequest(message),
        StatusCode::UNAUTHORIZED => Error::Unauthorized(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::CONFLICT => Error::Conflict(message),
        other => Error::Internal(format!("Backend returned {}: {}", other, message)),
    })
}

/// In-process implementation over the services, for embedding the session
/// next to the backend.
#[derive(Clone)]
pub struct LocalAttemptApi {
    tests: TestService,
    attempts: AttemptService,
    user_id: i64,
}

impl LocalAttemptApi {
    pub fn new(tests: TestService, attempts: AttemptService, user_id: i64) -> Self {
        Self {
            tests,
            attempts,
            user_id,
        }
    }
}

#[async_trait]
impl AttemptApi for LocalAttemptApi {
    async fn fetch_test(&self, test_id: i64) -> Result<PublicTest> {
        self.tests.public_test(test_id).await
    }

    async fn start_or_resume(&self, test_id: i64) -> Result<StartTestResponse> {
        let started = self.attempts.start_or_resume(self.user_id, test_id).await?;
        Ok(started.into())
    }

    async fn submit(&self, request: &SubmitTestRequest) -> Result<SubmitTestResponse> {
        let finalized = self.attempts.submit_answers(self.user_id, request).await?;
        Ok(finalized.into())
    }
}
