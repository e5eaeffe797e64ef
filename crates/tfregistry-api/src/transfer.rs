//! Asset transfer handlers
//!
//! The token alone decides which object is read or written. The file name
//! segment of download URLs is cosmetic and never used for resolution.

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName},
    response::{IntoResponse, Response},
};
use tfregistry_storage::{
    chunk::{CHUNK_NUMBER_HEADER, FILE_NAME_HEADER, TOTAL_CHUNKS_HEADER},
    ChunkInfo, ChunkOutcome, TransferGrant,
};
use tokio_util::io::ReaderStream;
use tracing::{info, instrument, warn};

use crate::error::{ApiError, ApiResult};
use crate::handlers::AppState;
use crate::responses::UploadResponse;

/// Store a whole object, or one chunk when the chunk headers are present
#[instrument(skip_all)]
pub async fn upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<UploadResponse> {
    let local = state.local_storage()?;
    let grant = local.authorize_upload(&token).map_err(|e| {
        warn!(error = %e, "Rejected upload token");
        ApiError::from(e)
    })?;
    let ctx = state.context();
    let path = grant.path.to_string();

    let response = match chunk_info(&headers)? {
        Some(chunk) => match local.put_chunk(&ctx, &grant, &chunk, &body).await? {
            ChunkOutcome::Pending { received, total } => UploadResponse::Pending {
                path,
                received,
                total,
            },
            ChunkOutcome::Assembled { bytes } => {
                info!(path = %path, bytes, "Chunked upload assembled");
                UploadResponse::Assembled { path, bytes }
            }
            ChunkOutcome::AlreadyAssembled => UploadResponse::AlreadyAssembled { path },
        },
        None => {
            let bytes = local.put_object(&ctx, &grant.path, &body).await?;
            UploadResponse::Stored { path, bytes }
        }
    };

    Ok(response)
}

/// Stream an object
#[instrument(skip_all)]
pub async fn download(
    State(state): State<AppState>,
    Path((token, _file)): Path<(String, String)>,
) -> ApiResult<Response> {
    let local = state.local_storage()?;
    let grant = authorize_download(&state, &token)?;
    let ctx = state.context();

    let (file, len) = local.open_object(&ctx, &grant.path).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((object_headers(&grant, len), body).into_response())
}

/// Object headers without the body
#[instrument(skip_all)]
pub async fn head(
    State(state): State<AppState>,
    Path((token, _file)): Path<(String, String)>,
) -> ApiResult<Response> {
    let local = state.local_storage()?;
    let grant = authorize_download(&state, &token)?;
    let ctx = state.context();

    let len = local.object_len(&ctx, &grant.path).await?;
    Ok(object_headers(&grant, len).into_response())
}

fn authorize_download(state: &AppState, token: &str) -> ApiResult<TransferGrant> {
    state.local_storage()?.authorize_download(token).map_err(|e| {
        warn!(error = %e, "Rejected download token");
        ApiError::from(e)
    })
}

fn object_headers(grant: &TransferGrant, len: u64) -> [(HeaderName, String); 3] {
    [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_LENGTH, len.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", grant.path.file_name()),
        ),
    ]
}

/// Chunk metadata, when the request is part of a chunked upload
fn chunk_info(headers: &HeaderMap) -> ApiResult<Option<ChunkInfo>> {
    let number = header_text(headers, CHUNK_NUMBER_HEADER)?;
    let total = header_text(headers, TOTAL_CHUNKS_HEADER)?;
    let file_name = header_text(headers, FILE_NAME_HEADER)?;

    match (number, total, file_name) {
        (None, None, None) => Ok(None),
        (Some(number), Some(total), Some(file_name)) => {
            Ok(Some(ChunkInfo::from_headers(number, total, file_name)?))
        }
        _ => Err(ApiError::bad_request(format!(
            "chunked uploads need all of {}, {} and {}",
            CHUNK_NUMBER_HEADER, TOTAL_CHUNKS_HEADER, FILE_NAME_HEADER
        ))),
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> ApiResult<Option<&'a str>> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::bad_request(format!("{} is not valid text", name)))
        })
        .transpose()
}
