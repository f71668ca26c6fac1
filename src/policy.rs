//! Role-based authorization and row visibility.
//!
//! Everything in here is a pure function of its inputs. Handlers translate
//! the visibility values into query filters; the `permits` methods evaluate
//! the same rules against rows that are already in memory.

use uuid::Uuid;

use crate::enums::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateUser,
    UpdateUser,
    ListUsers,
    CreateDocument,
    ListDocuments,
    CreateTicket,
    ListTickets,
    UpdateTicket,
    UploadFile,
    ListForms,
}

impl Action {
    pub const ALL: &'static [Action] = &[
        Action::CreateUser,
        Action::UpdateUser,
        Action::ListUsers,
        Action::CreateDocument,
        Action::ListDocuments,
        Action::CreateTicket,
        Action::ListTickets,
        Action::UpdateTicket,
        Action::UploadFile,
        Action::ListForms,
    ];

    /// Message returned to a caller whose role may not perform the action.
    pub fn denial_message(self) -> &'static str {
        match self {
            Action::CreateUser => "Nu ai permisiunea de a crea utilizatori",
            Action::UpdateUser => "Nu ai permisiunea de a modifica utilizatori",
            Action::ListUsers => "Nu ai permisiunea de a vedea utilizatorii",
            Action::CreateDocument => "Nu ai permisiunea de a încărca documente",
            Action::UploadFile => "Nu ai permisiunea de a încărca fișiere",
            Action::UpdateTicket => "Nu ai permisiunea de a modifica ticket-uri",
            Action::ListDocuments
            | Action::CreateTicket
            | Action::ListTickets
            | Action::ListForms => "Nu ai permisiunea de a efectua această acțiune",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

pub fn authorize(role: Role, action: Action) -> Decision {
    let allowed = match action {
        Action::CreateUser | Action::UpdateUser => is_admin(role),
        Action::ListUsers
        | Action::CreateDocument
        | Action::UpdateTicket
        | Action::UploadFile => is_staff(role),
        // Workers are narrowed by the visibility filters instead.
        Action::ListDocuments | Action::CreateTicket | Action::ListTickets | Action::ListForms => {
            true
        }
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

fn is_admin(role: Role) -> bool {
    match role {
        Role::Admin => true,
        Role::Manager | Role::Worker => false,
    }
}

fn is_staff(role: Role) -> bool {
    match role {
        Role::Admin | Role::Manager => true,
        Role::Worker => false,
    }
}

/// Which documents a requester may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentVisibility {
    All,
    /// Documents without any access grant, plus those granted to this user.
    UnrestrictedOrGrantedTo(Uuid),
}

impl DocumentVisibility {
    /// `grantees` lists every user holding an access grant for the document.
    /// An empty list means the document is unrestricted.
    pub fn permits(&self, grantees: &[Uuid]) -> bool {
        match self {
            DocumentVisibility::All => true,
            DocumentVisibility::UnrestrictedOrGrantedTo(user_id) => {
                grantees.is_empty() || grantees.contains(user_id)
            }
        }
    }
}

pub fn document_visibility(role: Role, actor_id: Uuid) -> DocumentVisibility {
    match role {
        Role::Admin | Role::Manager => DocumentVisibility::All,
        Role::Worker => DocumentVisibility::UnrestrictedOrGrantedTo(actor_id),
    }
}

/// Which tickets a requester may list or open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketVisibility {
    All,
    CreatedBy(Uuid),
    AssignedToOrUnassigned(Uuid),
}

impl TicketVisibility {
    pub fn permits(&self, creator_id: Uuid, assignee_id: Option<Uuid>) -> bool {
        match self {
            TicketVisibility::All => true,
            TicketVisibility::CreatedBy(user_id) => creator_id == *user_id,
            TicketVisibility::AssignedToOrUnassigned(user_id) => {
                assignee_id.map_or(true, |assignee| assignee == *user_id)
            }
        }
    }
}

/// `requested_creator` is the optional `userId` filter of the list endpoint.
/// Administrators and managers may use it to look at one creator's tickets;
/// it replaces their default filter. Workers always see only their own.
pub fn ticket_visibility(
    role: Role,
    actor_id: Uuid,
    requested_creator: Option<Uuid>,
) -> TicketVisibility {
    match role {
        Role::Worker => TicketVisibility::CreatedBy(actor_id),
        Role::Manager => requested_creator.map_or(
            TicketVisibility::AssignedToOrUnassigned(actor_id),
            TicketVisibility::CreatedBy,
        ),
        Role::Admin => requested_creator.map_or(TicketVisibility::All, TicketVisibility::CreatedBy),
    }
}
