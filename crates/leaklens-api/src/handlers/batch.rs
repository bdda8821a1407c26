use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use leaklens_batch::parser::parse_credentials;
use leaklens_common::types::{BatchAccepted, BatchSnapshot};

use crate::{LeakLensSys, handlers::ApiError};

const SUPPORTED_INPUT_TYPE: &str = "email_pass";

/// Accepts a multipart upload, creates the job and starts processing it in the background.
pub async fn submit_batch(
    State(sys): State<Arc<LeakLensSys>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BatchAccepted>), ApiError> {
    let mut file_bytes = None;
    let mut input_type = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::invalid_input(format!("error reading multipart form: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::invalid_input(format!("failed to read file: {err}")))?;
                file_bytes = Some(bytes);
            }
            "inputType" | "input_type" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| ApiError::invalid_input(format!("invalid input type: {err}")))?;
                input_type = Some(value);
            }
            _ => {}
        }
    }

    if let Some(input_type) = input_type.as_deref().map(str::trim)
        && !input_type.is_empty()
        && input_type != SUPPORTED_INPUT_TYPE
    {
        return Err(ApiError::invalid_input(format!(
            "unsupported input type: {input_type}"
        )));
    }

    let file_bytes = file_bytes.ok_or_else(|| ApiError::invalid_input("no file provided"))?;
    let credentials = parse_credentials(&file_bytes, sys.config())?;
    let job_id = sys.store().create(credentials)?;
    sys.processor().spawn(job_id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchAccepted {
            job_id,
            message: "Batch job started successfully".to_string(),
        }),
    ))
}

pub async fn batch_status(
    State(sys): State<Arc<LeakLensSys>>,
    Path(job_id): Path<String>,
) -> Result<Json<BatchSnapshot>, ApiError> {
    Ok(Json(sys.store().get(&job_id)?))
}

pub async fn delete_batch(
    State(sys): State<Arc<LeakLensSys>>,
    Path(job_id): Path<String>,
) -> Result<Json<BatchAccepted>, ApiError> {
    sys.store().remove(&job_id)?;
    Ok(Json(BatchAccepted {
        job_id,
        message: "Job successfully deleted".to_string(),
    }))
}
