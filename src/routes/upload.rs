use axum::extract::{Json, Multipart, State};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::policy::Action;
use crate::state::AppState;
use crate::storage::StoredFile;

const FILE_FIELD: &str = "file";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
const NO_FILE: &str = "Niciun fișier furnizat";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: &'static str,
    pub file_url: String,
    pub file_type: String,
}

struct UploadedFile {
    name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Stores a single multipart `file` part and returns where it can be fetched.
/// The role check runs before the body is consumed.
pub async fn upload_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    user.authorize(Action::UploadFile)?;

    let mut upload: Option<UploadedFile> = None;
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        warn!(error = %err, "invalid multipart data");
        AppError::bad_request("Datele formularului nu sunt valide")
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .map(str::to_string)
            .filter(|value| !value.is_empty());
        let bytes = field.bytes().await.map_err(|err| {
            warn!(error = %err, "failed to read file bytes");
            AppError::bad_request("Fișierul nu a putut fi citit")
        })?;

        upload = Some(UploadedFile {
            name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    let Some(upload) = upload.filter(|upload| !upload.bytes.is_empty()) else {
        return Err(AppError::bad_request(NO_FILE));
    };

    let key = object_key(Uuid::new_v4(), &upload.name);
    let file_type = resolve_file_type(upload.content_type, &upload.name);
    let size = upload.bytes.len();

    state
        .files
        .store(StoredFile {
            key: key.clone(),
            bytes: upload.bytes,
            content_type: file_type.clone(),
            content_disposition: inline_content_disposition(&upload.name),
        })
        .await
        .map_err(|err| {
            error!(error = ?err, key = %key, "failed to store uploaded file");
            AppError::internal(err)
        })?;

    info!(
        key = %key,
        size,
        file_type = %file_type,
        uploader_id = %user.user_id,
        "file uploaded"
    );

    Ok(Json(UploadResponse {
        message: "Fișier încărcat cu succes",
        file_url: state.file_url(&key),
        file_type,
    }))
}

/// `<id>-<name>` with every run of whitespace in the name collapsed to `_`.
fn object_key(id: Uuid, file_name: &str) -> String {
    let mut sanitized = String::with_capacity(file_name.len());
    let mut in_whitespace = false;
    for ch in file_name.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                sanitized.push('_');
            }
            in_whitespace = true;
        } else {
            sanitized.push(ch);
            in_whitespace = false;
        }
    }
    format!("{id}-{sanitized}")
}

fn resolve_file_type(declared: Option<String>, file_name: &str) -> String {
    declared
        .or_else(|| {
            mime_guess::from_path(file_name)
                .first()
                .map(|mime| mime.essence_str().to_string())
        })
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}"
    ))
}
