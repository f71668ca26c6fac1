use std::collections::HashMap;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use chrono::{NaiveDateTime, Utc};
use diesel::{pg::Pg, prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::to_iso;
use super::users::{load_user_summaries, non_blank, UserSummaryResponse};
use crate::auth::AuthenticatedUser;
use crate::enums::{Role, TicketPriority, TicketStatus};
use crate::error::{AppError, AppResult};
use crate::models::{NewTicket, Ticket, User};
use crate::policy::{self, Action, TicketVisibility};
use crate::schema::{tickets, users};
use crate::state::AppState;
use crate::utils::json::{classify_nullable, AppJson, NullableValue};

#[derive(Deserialize)]
pub struct CreateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketListQuery {
    pub user_id: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = tickets)]
struct TicketChangeset {
    status: Option<TicketStatus>,
    assignee_id: Option<Option<Uuid>>,
    updated_at: NaiveDateTime,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub creator_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub creator: Option<UserSummaryResponse>,
    pub assignee: Option<UserSummaryResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct TicketEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub ticket: TicketResponse,
}

#[derive(Serialize)]
pub struct TicketListResponse {
    pub tickets: Vec<TicketResponse>,
}

pub async fn create_ticket(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    AppJson(payload): AppJson<CreateTicketRequest>,
) -> AppResult<(StatusCode, Json<TicketEnvelope>)> {
    user.authorize(Action::CreateTicket)?;

    let (Some(title), Some(description)) = (non_blank(payload.title), non_blank(payload.description))
    else {
        return Err(AppError::bad_request("Titlul și descrierea sunt obligatorii"));
    };

    let priority = match non_blank(payload.priority) {
        Some(raw) => raw.parse().map_err(|_| {
            AppError::bad_request("Prioritatea trebuie să fie LOW, MEDIUM, HIGH sau URGENT")
        })?,
        None => TicketPriority::default(),
    };

    let new_ticket = NewTicket {
        id: Uuid::new_v4(),
        title,
        description,
        priority,
        status: TicketStatus::default(),
        creator_id: user.user_id,
    };

    let mut conn = state.db()?;
    diesel::insert_into(tickets::table)
        .values(&new_ticket)
        .execute(&mut conn)?;
    let ticket: Ticket = tickets::table.find(new_ticket.id).first(&mut conn)?;

    info!(
        ticket_id = %ticket.id,
        priority = %ticket.priority,
        creator_id = %user.user_id,
        "ticket created"
    );

    let response = with_people(&mut conn, ticket)?;
    Ok((
        StatusCode::CREATED,
        Json(TicketEnvelope {
            message: Some("Ticket creat cu succes"),
            ticket: response,
        }),
    ))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Query(params): Query<TicketListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<TicketListResponse>> {
    user.authorize(Action::ListTickets)?;

    // Workers only ever see their own tickets, so their filter is not read.
    let requested_creator = match user.role {
        Role::Worker => None,
        Role::Admin | Role::Manager => params
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| {
                Uuid::parse_str(value).map_err(|_| {
                    AppError::bad_request("Identificatorul utilizatorului nu este valid")
                })
            })
            .transpose()?,
    };

    let visibility = user.ticket_visibility(requested_creator);
    let mut conn = state.db()?;
    let rows: Vec<Ticket> = restrict_to_visible(tickets::table.into_boxed(), visibility)
        .order(tickets::created_at.desc())
        .load(&mut conn)?;

    let people = load_user_summaries(
        &mut conn,
        rows.iter()
            .flat_map(|ticket| std::iter::once(ticket.creator_id).chain(ticket.assignee_id)),
    )?;

    Ok(Json(TicketListResponse {
        tickets: rows
            .into_iter()
            .map(|ticket| to_ticket_response(ticket, &people))
            .collect(),
    }))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<TicketEnvelope>> {
    user.authorize(Action::ListTickets)?;

    let mut conn = state.db()?;
    let ticket: Ticket = tickets::table.find(ticket_id).first(&mut conn)?;
    if !user
        .ticket_visibility(None)
        .permits(ticket.creator_id, ticket.assignee_id)
    {
        return Err(AppError::not_found());
    }

    Ok(Json(TicketEnvelope {
        message: None,
        ticket: with_people(&mut conn, ticket)?,
    }))
}

pub async fn update_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    user: AuthenticatedUser,
    body: Result<AppJson<Value>, AppError>,
) -> AppResult<Json<TicketEnvelope>> {
    user.authorize(Action::UpdateTicket)?;
    let AppJson(body) = body?;

    let status = match classify_nullable("status", body.get("status"))
        .map_err(AppError::bad_request)?
    {
        NullableValue::Omitted => None,
        NullableValue::Null => return Err(AppError::bad_request("Statusul nu poate fi gol")),
        NullableValue::String(raw) => Some(raw.parse::<TicketStatus>().map_err(|_| {
            AppError::bad_request("Statusul trebuie să fie OPEN, IN_PROGRESS, RESOLVED sau CLOSED")
        })?),
    };

    let assignee_class =
        classify_nullable("assigneeId", body.get("assigneeId")).map_err(AppError::bad_request)?;

    let mut conn = state.db()?;
    let existing: Ticket = tickets::table.find(ticket_id).first(&mut conn)?;

    let assignee_id = match assignee_class {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::String(raw) => {
            let assignee_id = Uuid::parse_str(raw.trim())
                .map_err(|_| AppError::bad_request(UNKNOWN_ASSIGNEE))?;
            let assignee: User = users::table
                .find(assignee_id)
                .first(&mut conn)
                .optional()?
                .ok_or_else(|| AppError::bad_request(UNKNOWN_ASSIGNEE))?;
            if !policy::authorize(assignee.role, Action::UpdateTicket).is_allowed() {
                return Err(AppError::bad_request(
                    "Ticket-urile pot fi atribuite doar administratorilor sau managerilor",
                ));
            }
            Some(Some(assignee.id))
        }
    };

    if status.is_none() && assignee_id.is_none() {
        return Ok(Json(TicketEnvelope {
            message: None,
            ticket: with_people(&mut conn, existing)?,
        }));
    }

    diesel::update(tickets::table.find(ticket_id))
        .set(&TicketChangeset {
            status,
            assignee_id,
            updated_at: Utc::now().naive_utc(),
        })
        .execute(&mut conn)?;
    let ticket: Ticket = tickets::table.find(ticket_id).first(&mut conn)?;

    info!(
        ticket_id = %ticket.id,
        status = %ticket.status,
        assignee_id = ?ticket.assignee_id,
        updated_by = %user.user_id,
        "ticket updated"
    );

    Ok(Json(TicketEnvelope {
        message: Some("Ticket actualizat cu succes"),
        ticket: with_people(&mut conn, ticket)?,
    }))
}

const UNKNOWN_ASSIGNEE: &str = "Utilizatorul atribuit nu există";

fn restrict_to_visible<'a>(
    query: tickets::BoxedQuery<'a, Pg>,
    visibility: TicketVisibility,
) -> tickets::BoxedQuery<'a, Pg> {
    match visibility {
        TicketVisibility::All => query,
        TicketVisibility::CreatedBy(user_id) => query.filter(tickets::creator_id.eq(user_id)),
        TicketVisibility::AssignedToOrUnassigned(user_id) => query.filter(
            tickets::assignee_id
                .eq(user_id)
                .or(tickets::assignee_id.is_null()),
        ),
    }
}

fn with_people(conn: &mut PgConnection, ticket: Ticket) -> AppResult<TicketResponse> {
    let people = load_user_summaries(
        conn,
        std::iter::once(ticket.creator_id).chain(ticket.assignee_id),
    )?;
    Ok(to_ticket_response(ticket, &people))
}

fn to_ticket_response(
    ticket: Ticket,
    people: &HashMap<Uuid, UserSummaryResponse>,
) -> TicketResponse {
    TicketResponse {
        id: ticket.id,
        title: ticket.title,
        description: ticket.description,
        priority: ticket.priority,
        status: ticket.status,
        creator_id: ticket.creator_id,
        assignee_id: ticket.assignee_id,
        creator: people.get(&ticket.creator_id).cloned(),
        assignee: ticket
            .assignee_id
            .and_then(|assignee_id| people.get(&assignee_id).cloned()),
        created_at: to_iso(ticket.created_at),
        updated_at: to_iso(ticket.updated_at),
    }
}
