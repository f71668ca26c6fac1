use axum::extract::{Json, State};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use super::to_iso;
use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::Form;
use crate::policy::Action;
use crate::schema::forms;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct FormListResponse {
    pub forms: Vec<FormResponse>,
}

pub async fn list_forms(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<FormListResponse>> {
    user.authorize(Action::ListForms)?;

    let mut conn = state.db()?;
    let rows: Vec<Form> = forms::table
        .order(forms::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(FormListResponse {
        forms: rows
            .into_iter()
            .map(|form| FormResponse {
                id: form.id,
                title: form.title,
                created_at: to_iso(form.created_at),
                updated_at: to_iso(form.updated_at),
            })
            .collect(),
    }))
}
