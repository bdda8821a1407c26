use std::time::Duration;

use async_trait::async_trait;
use leaklens_batch::{Credential, CredentialClassifier};
use leaklens_common::error::{LeakLensError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct LookupRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LookupResponse {
    is_leaked: bool,
}

/// Forwards each credential to an HTTP breach-lookup service.
///
/// The service takes `POST {endpoint}` with `{ username, password }` and answers
/// `{ is_leaked }`; `GET {endpoint}/health` reports reachability.
pub struct HttpClassifier {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CredentialClassifier for HttpClassifier {
    async fn classify(&self, credential: &Credential) -> Result<bool> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&LookupRequest {
                username: &credential.username,
                password: &credential.password,
            })
            .send()
            .await
            .map_err(|err| {
                LeakLensError::Classifier(format!("lookup request to {} failed: {err}", self.endpoint))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeakLensError::Classifier(format!(
                "lookup service {} returned status {status}",
                self.endpoint
            )));
        }

        let body: LookupResponse = response.json().await.map_err(|err| {
            LeakLensError::Classifier(format!("invalid lookup response: {err}"))
        })?;
        debug!(leaked = body.is_leaked, "credential classified");
        Ok(body.is_leaked)
    }

    async fn check_connection(&self) -> Result<()> {
        let url = format!("{}/health", self.endpoint);
        let response = self.client.get(&url).send().await.map_err(|err| {
            LeakLensError::Upstream(format!("lookup service unreachable: {err}"))
        })?;
        if !response.status().is_success() {
            return Err(LeakLensError::Upstream(format!(
                "lookup service health returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        Json, Router,
        http::StatusCode,
        routing::{get, post},
    };
    use leaklens_batch::{Credential, CredentialClassifier};
    use serde_json::{Value, json};

    use super::HttpClassifier;

    async fn lookup(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
        match body["username"].as_str() {
            Some("down") => Err(StatusCode::SERVICE_UNAVAILABLE),
            Some(username) => Ok(Json(json!({ "is_leaked": username.starts_with("leak") }))),
            None => Err(StatusCode::BAD_REQUEST),
        }
    }

    async fn serve_mock() -> String {
        let app = Router::new()
            .route("/check", post(lookup))
            .route("/check/health", get(|| async { StatusCode::OK }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/check")
    }

    #[tokio::test]
    async fn classifies_through_lookup_service() {
        let classifier = HttpClassifier::new(serve_mock().await, Duration::from_secs(2));

        assert!(classifier.classify(&Credential::new("leak@example.com", "pw")).await.unwrap());
        assert!(!classifier.classify(&Credential::new("ok@example.com", "pw")).await.unwrap());

        let err = classifier
            .classify(&Credential::new("down", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "EXTERNAL_SERVICE_ERROR");
        classifier.check_connection().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_service_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let classifier = HttpClassifier::new(format!("http://{addr}/check/"), Duration::from_millis(500));
        assert_eq!(classifier.endpoint(), format!("http://{addr}/check"));
        assert!(classifier.check_connection().await.is_err());
        assert!(classifier.classify(&Credential::new("a", "b")).await.is_err());
    }
}
