use std::collections::HashMap;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use diesel::{pg::Pg, prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::to_iso;
use super::users::{load_user_summaries, non_blank, UserSummaryResponse};
use crate::auth::AuthenticatedUser;
use crate::enums::DocumentCategory;
use crate::error::{AppError, AppResult};
use crate::models::{Document, NewDocument, NewUserDocument};
use crate::policy::{Action, DocumentVisibility};
use crate::schema::{documents, user_documents, users};
use crate::state::AppState;
use crate::utils::json::AppJson;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub category: Option<String>,
    pub user_ids: Option<Vec<Uuid>>,
}

#[derive(Deserialize)]
pub struct DocumentListQuery {
    pub category: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub file_url: String,
    pub file_type: String,
    pub category: DocumentCategory,
    pub uploader_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<UserSummaryResponse>,
    /// Only shown to roles that bypass the grant filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_user_ids: Option<Vec<Uuid>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct DocumentEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub document: DocumentResponse,
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentResponse>,
}

pub async fn create_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<AppJson<CreateDocumentRequest>, AppError>,
) -> AppResult<(StatusCode, Json<DocumentEnvelope>)> {
    user.authorize(Action::CreateDocument)?;
    let AppJson(payload) = payload?;

    let (Some(title), Some(file_url), Some(file_type), Some(category)) = (
        non_blank(payload.title),
        non_blank(payload.file_url),
        non_blank(payload.file_type),
        non_blank(payload.category),
    ) else {
        return Err(AppError::bad_request(
            "Titlul, URL-ul fișierului, tipul fișierului și categoria sunt obligatorii",
        ));
    };
    let category = parse_category(&category)?;

    let mut grantees = payload.user_ids.unwrap_or_default();
    grantees.sort();
    grantees.dedup();

    let new_document = NewDocument {
        id: Uuid::new_v4(),
        title,
        description: payload
            .description
            .map(|value| value.trim().to_string())
            .unwrap_or_default(),
        file_url,
        file_type,
        category,
        uploader_id: user.user_id,
    };

    let mut conn = state.db()?;
    let document = conn.transaction::<Document, AppError, _>(|conn| {
        if !grantees.is_empty() {
            let known: i64 = users::table
                .filter(users::id.eq_any(&grantees))
                .count()
                .get_result(conn)?;
            if known as usize != grantees.len() {
                return Err(AppError::bad_request(
                    "Unul sau mai mulți utilizatori nu există",
                ));
            }
        }

        diesel::insert_into(documents::table)
            .values(&new_document)
            .execute(conn)?;

        let grants: Vec<NewUserDocument> = grantees
            .iter()
            .map(|user_id| NewUserDocument {
                user_id: *user_id,
                document_id: new_document.id,
            })
            .collect();
        if !grants.is_empty() {
            diesel::insert_into(user_documents::table)
                .values(&grants)
                .execute(conn)?;
        }

        Ok(documents::table.find(new_document.id).first(conn)?)
    })?;

    let mut uploaders = load_user_summaries(&mut conn, [document.uploader_id])?;
    info!(
        document_id = %document.id,
        category = %document.category,
        grants = grantees.len(),
        uploader_id = %user.user_id,
        "document created"
    );

    let uploader = uploaders.remove(&document.uploader_id);
    Ok((
        StatusCode::CREATED,
        Json(DocumentEnvelope {
            message: Some("Document încărcat cu succes"),
            document: to_document_response(document, uploader, Some(grantees)),
        }),
    ))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<DocumentListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentListResponse>> {
    user.authorize(Action::ListDocuments)?;

    let category = params
        .category
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(parse_category)
        .transpose()?;

    let mut conn = state.db()?;
    let visibility = user.document_visibility();

    let mut docs_query = documents::table.into_boxed();
    if let Some(category) = category {
        docs_query = docs_query.filter(documents::category.eq(category));
    }
    docs_query = restrict_to_visible(&mut conn, docs_query, visibility)?;

    let docs: Vec<Document> = docs_query
        .order(documents::created_at.desc())
        .load(&mut conn)?;

    let document_ids: Vec<Uuid> = docs.iter().map(|doc| doc.id).collect();
    let mut grants = match visibility {
        DocumentVisibility::All => Some(load_grants(&mut conn, &document_ids)?),
        DocumentVisibility::UnrestrictedOrGrantedTo(_) => None,
    };
    let uploaders = load_user_summaries(&mut conn, docs.iter().map(|doc| doc.uploader_id))?;

    let documents = docs
        .into_iter()
        .map(|doc| {
            let uploader = uploaders.get(&doc.uploader_id).cloned();
            let access = grants
                .as_mut()
                .map(|grants| grants.remove(&doc.id).unwrap_or_default());
            to_document_response(doc, uploader, access)
        })
        .collect();

    Ok(Json(DocumentListResponse { documents }))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentEnvelope>> {
    user.authorize(Action::ListDocuments)?;

    let mut conn = state.db()?;
    let document: Document = documents::table.find(document_id).first(&mut conn)?;
    let grantees = load_grants(&mut conn, &[document_id])?
        .remove(&document_id)
        .unwrap_or_default();

    let visibility = user.document_visibility();
    if !visibility.permits(&grantees) {
        return Err(AppError::not_found());
    }

    let access = match visibility {
        DocumentVisibility::All => Some(grantees),
        DocumentVisibility::UnrestrictedOrGrantedTo(_) => None,
    };
    let uploader = load_user_summaries(&mut conn, [document.uploader_id])?
        .remove(&document.uploader_id);

    Ok(Json(DocumentEnvelope {
        message: None,
        document: to_document_response(document, uploader, access),
    }))
}

/// Narrows a document query to what `visibility` allows. A document without
/// grant rows is unrestricted; one with grant rows is limited to its grantees.
fn restrict_to_visible<'a>(
    conn: &mut PgConnection,
    query: documents::BoxedQuery<'a, Pg>,
    visibility: DocumentVisibility,
) -> AppResult<documents::BoxedQuery<'a, Pg>> {
    match visibility {
        DocumentVisibility::All => Ok(query),
        DocumentVisibility::UnrestrictedOrGrantedTo(user_id) => {
            let restricted: Vec<Uuid> = user_documents::table
                .select(user_documents::document_id)
                .distinct()
                .load(conn)?;
            let granted: Vec<Uuid> = user_documents::table
                .filter(user_documents::user_id.eq(user_id))
                .select(user_documents::document_id)
                .load(conn)?;

            Ok(query.filter(
                documents::id
                    .ne_all(restricted)
                    .or(documents::id.eq_any(granted)),
            ))
        }
    }
}

fn load_grants(
    conn: &mut PgConnection,
    document_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<Uuid>>> {
    if document_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, Uuid)> = user_documents::table
        .filter(user_documents::document_id.eq_any(document_ids))
        .select((user_documents::document_id, user_documents::user_id))
        .order((user_documents::document_id, user_documents::user_id))
        .load(conn)?;

    let mut grants: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (document_id, user_id) in rows {
        grants.entry(document_id).or_default().push(user_id);
    }
    Ok(grants)
}

fn parse_category(raw: &str) -> AppResult<DocumentCategory> {
    raw.parse().map_err(|_| {
        AppError::bad_request("Categoria trebuie să fie HR, ADMINISTRATIVE, FORM sau OTHER")
    })
}

fn to_document_response(
    doc: Document,
    uploader: Option<UserSummaryResponse>,
    access_user_ids: Option<Vec<Uuid>>,
) -> DocumentResponse {
    DocumentResponse {
        id: doc.id,
        title: doc.title,
        description: doc.description,
        file_url: doc.file_url,
        file_type: doc.file_type,
        category: doc.category,
        uploader_id: doc.uploader_id,
        uploader,
        access_user_ids,
        created_at: to_iso(doc.created_at),
        updated_at: to_iso(doc.updated_at),
    }
}
