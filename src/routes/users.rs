use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::{
    dsl::exists,
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
    PgConnection,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::to_iso;
use crate::{
    auth::{password, AuthenticatedUser},
    enums::Role,
    error::{AppError, AppResult},
    models::{NewUser, User, UserSummary},
    policy::Action,
    schema::users,
    state::AppState,
    utils::json::AppJson,
};

const DUPLICATE_EMAIL: &str = "Există deja un utilizator cu acest email";

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct UserChangeset {
    name: Option<String>,
    email: Option<String>,
    password_hash: Option<String>,
    role: Option<Role>,
    updated_at: NaiveDateTime,
}

/// A user as the API exposes it; the password hash never leaves the server.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: to_iso(user.created_at),
            updated_at: to_iso(user.updated_at),
        }
    }
}

/// Who uploaded a document, raised a ticket, or is handling it.
#[derive(Serialize, Clone)]
pub struct UserSummaryResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<UserSummary> for UserSummaryResponse {
    fn from(summary: UserSummary) -> Self {
        Self {
            id: summary.id,
            name: summary.name,
            email: summary.email,
        }
    }
}

#[derive(Serialize)]
pub struct UserEnvelope {
    pub message: &'static str,
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
}

pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<AppJson<CreateUserRequest>, AppError>,
) -> AppResult<(StatusCode, Json<UserEnvelope>)> {
    user.authorize(Action::CreateUser)?;
    let AppJson(payload) = payload?;

    let (Some(name), Some(email), Some(password), Some(role)) = (
        non_blank(payload.name),
        non_blank(payload.email),
        payload.password.filter(|value| !value.is_empty()),
        non_blank(payload.role),
    ) else {
        return Err(AppError::bad_request("Toate câmpurile sunt obligatorii"));
    };

    let email = normalize_email(&email)?;
    let role = parse_role(&role)?;

    let mut conn = state.db()?;
    ensure_email_available(&mut conn, &email, None)?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash: password::hash_password(&password)?,
        role,
    };

    match diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request(DUPLICATE_EMAIL));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let created: User = users::table.find(new_user.id).first(&mut conn)?;
    info!(
        user_id = %created.id,
        role = %created.role,
        created_by = %user.user_id,
        "user created"
    );

    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope {
            message: "Utilizator creat cu succes",
            user: created.into(),
        }),
    ))
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UserListResponse>> {
    user.authorize(Action::ListUsers)?;

    let mut conn = state.db()?;
    let rows: Vec<User> = users::table
        .order(users::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(UserListResponse {
        users: rows.into_iter().map(UserResponse::from).collect(),
    }))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    user: AuthenticatedUser,
    payload: Result<AppJson<UpdateUserRequest>, AppError>,
) -> AppResult<Json<UserEnvelope>> {
    user.authorize(Action::UpdateUser)?;
    let AppJson(payload) = payload?;

    let mut conn = state.db()?;
    let existing: User = users::table.find(user_id).first(&mut conn)?;

    let name = match payload.name {
        Some(value) => {
            let name = non_blank(Some(value))
                .ok_or_else(|| AppError::bad_request("Numele nu poate fi gol"))?;
            Some(name)
        }
        None => None,
    };

    let email = match payload.email {
        Some(value) => {
            let email = normalize_email(&value)?;
            if email != existing.email {
                ensure_email_available(&mut conn, &email, Some(user_id))?;
            }
            Some(email)
        }
        None => None,
    };

    let password_hash = match payload.password {
        Some(value) if value.is_empty() => {
            return Err(AppError::bad_request("Parola nu poate fi goală"));
        }
        Some(value) => Some(password::hash_password(&value)?),
        None => None,
    };

    let role = payload.role.as_deref().map(parse_role).transpose()?;

    let changeset = UserChangeset {
        name,
        email,
        password_hash,
        role,
        updated_at: Utc::now().naive_utc(),
    };

    match diesel::update(users::table.find(user_id))
        .set(&changeset)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request(DUPLICATE_EMAIL));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let updated: User = users::table.find(user_id).first(&mut conn)?;
    info!(
        user_id = %updated.id,
        role = %updated.role,
        updated_by = %user.user_id,
        "user updated"
    );

    Ok(Json(UserEnvelope {
        message: "Utilizator actualizat cu succes",
        user: updated.into(),
    }))
}

pub(crate) fn load_user_summaries(
    conn: &mut PgConnection,
    user_ids: impl IntoIterator<Item = Uuid>,
) -> AppResult<HashMap<Uuid, UserSummaryResponse>> {
    let mut ids: Vec<Uuid> = user_ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<UserSummary> = users::table
        .filter(users::id.eq_any(&ids))
        .select((users::id, users::name, users::email))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|row| (row.id, UserSummaryResponse::from(row)))
        .collect())
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && !domain.is_empty())
        .unwrap_or(false);
    if !valid {
        return Err(AppError::bad_request("Adresa de email nu este validă"));
    }
    Ok(email)
}

fn parse_role(raw: &str) -> AppResult<Role> {
    raw.parse()
        .map_err(|_| AppError::bad_request("Rolul trebuie să fie ADMIN, MANAGER sau WORKER"))
}

fn ensure_email_available(
    conn: &mut PgConnection,
    email: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let same_email = users::table.filter(users::email.eq(email));
    let taken: bool = match except {
        Some(user_id) => diesel::select(exists(same_email.filter(users::id.ne(user_id))))
            .get_result(conn)?,
        None => diesel::select(exists(same_email)).get_result(conn)?,
    };
    if taken {
        return Err(AppError::bad_request(DUPLICATE_EMAIL));
    }
    Ok(())
}
