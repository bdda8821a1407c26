use std::time::Duration;

use async_trait::async_trait;
use leaklens_common::types::{
    ApiStatusResponse, BatchAccepted, BatchSnapshot, ErrorResponse, SingleCheckRequest,
    SingleCheckResponse,
};
use reqwest::{
    StatusCode,
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ClientError, ClientResult, DECODE_ERROR, FILE_TOO_LARGE};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const INPUT_TYPE: &str = "email_pass";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The two calls the polling controller needs from the server.
#[async_trait]
pub trait BatchApi: Send + Sync {
    async fn upload_batch(&self, file_name: &str, contents: Vec<u8>) -> ClientResult<BatchAccepted>;
    async fn batch_status(&self, job_id: &str) -> ClientResult<BatchSnapshot>;
}

#[derive(Clone)]
pub struct HttpApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn check_single(
        &self,
        username: &str,
        password: &str,
    ) -> ClientResult<SingleCheckResponse> {
        let request = SingleCheckRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .post(self.url("/api/v1/check/single"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        read_response(response).await
    }

    pub async fn api_status(&self) -> ClientResult<ApiStatusResponse> {
        let response = self
            .client
            .get(self.url("/api/v1/status"))
            .send()
            .await
            .map_err(transport_error)?;
        read_response(response).await
    }

    pub async fn delete_batch(&self, job_id: &str) -> ClientResult<BatchAccepted> {
        let response = self
            .client
            .delete(self.url(&format!("/api/v1/check/batch/{job_id}")))
            .send()
            .await
            .map_err(transport_error)?;
        read_response(response).await
    }
}

#[async_trait]
impl BatchApi for HttpApiClient {
    async fn upload_batch(&self, file_name: &str, contents: Vec<u8>) -> ClientResult<BatchAccepted> {
        if contents.len() > MAX_UPLOAD_BYTES {
            return Err(ClientError::new(
                format!(
                    "file is {} bytes; the limit is {MAX_UPLOAD_BYTES} bytes",
                    contents.len()
                ),
                FILE_TOO_LARGE,
            ));
        }

        debug!(file_name, bytes = contents.len(), "uploading credential batch");
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("text/plain")
            .map_err(transport_error)?;
        let form = Form::new().part("file", part).text("inputType", INPUT_TYPE);

        let response = self
            .client
            .post(self.url("/api/v1/check/batch"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        read_response(response).await
    }

    async fn batch_status(&self, job_id: &str) -> ClientResult<BatchSnapshot> {
        let response = self
            .client
            .get(self.url(&format!("/api/v1/check/batch/{job_id}/status")))
            .send()
            .await
            .map_err(transport_error)?;
        read_response(response).await
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    ClientError::network(format!("request failed: {err}"))
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
    let status = response.status();
    let body = response.bytes().await.map_err(transport_error)?;
    decode_body(status, &body)
}

/// The single place where a response body becomes a value or a `ClientError`.
pub fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> ClientResult<T> {
    if status.is_success() {
        return serde_json::from_slice(body).map_err(|err| {
            ClientError::new(format!("unexpected response body: {err}"), DECODE_ERROR)
        });
    }

    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(error) => Err(error.into()),
        Err(_) => Err(ClientError::new(
            format!("server returned status {status}"),
            format!("HTTP_{}", status.as_u16()),
        )),
    }
}
