//! Role-based authorization.
//!
//! Every mutating operation calls [`authorize`] before it touches the
//! store. Policy:
//! - admin: everything.
//! - manager: conversations of their own department or assigned to them,
//!   plus the activity log. No user, department, channel or settings
//!   administration.
//! - agent: conversations assigned to them or belonging to their department.
//!
//! Deactivated users are refused everything.

use crate::conversation::Conversation;
use crate::error::{Error, Result};
use crate::identity::{Role, User};

/// Something a user attempts to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewConversation,
    SendMessage,
    Transfer,
    Close,
    Reopen,
    StartConversation,
    DeleteConversation,
    ViewActivity,
    ManageUsers,
    ManageDepartments,
    ManageChannels,
    ManageSettings,
}

impl Action {
    fn describe(&self) -> &'static str {
        match self {
            Action::ViewConversation => "view this conversation",
            Action::SendMessage => "send messages in this conversation",
            Action::Transfer => "transfer this conversation",
            Action::Close => "close this conversation",
            Action::Reopen => "reopen this conversation",
            Action::StartConversation => "start conversations",
            Action::DeleteConversation => "delete conversations",
            Action::ViewActivity => "view the activity log",
            Action::ManageUsers => "manage users",
            Action::ManageDepartments => "manage departments",
            Action::ManageChannels => "manage channel connections",
            Action::ManageSettings => "manage system settings",
        }
    }
}

/// What the action applies to.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Conversation(&'a Conversation),
    System,
}

/// Whether `user` may see and act on `conversation`.
pub fn can_access_conversation(user: &User, conversation: &Conversation) -> bool {
    if !user.is_active {
        return false;
    }
    if user.role == Role::Admin {
        return true;
    }

    let assigned = conversation.assigned_agent_id == Some(user.id);
    let same_department = match (user.department_id, conversation.department_id) {
        (Some(mine), Some(theirs)) => mine == theirs,
        _ => false,
    };
    assigned || same_department
}

/// Check that `user` may perform `action` on `resource`.
pub fn authorize(user: &User, action: Action, resource: Resource<'_>) -> Result<()> {
    if is_allowed(user, action, resource) {
        Ok(())
    } else {
        tracing::debug!(user_id = user.id, ?action, "authorization refused");
        Err(Error::denied(format!(
            "{} '{}' is not allowed to {}",
            user.role,
            user.username,
            action.describe()
        )))
    }
}

fn is_allowed(user: &User, action: Action, resource: Resource<'_>) -> bool {
    if !user.is_active {
        return false;
    }

    match action {
        Action::ManageUsers
        | Action::ManageDepartments
        | Action::ManageChannels
        | Action::ManageSettings
        | Action::DeleteConversation => user.role == Role::Admin,
        Action::ViewActivity => matches!(user.role, Role::Admin | Role::Manager),
        Action::StartConversation => true,
        Action::ViewConversation
        | Action::SendMessage
        | Action::Transfer
        | Action::Close
        | Action::Reopen => match resource {
            Resource::Conversation(conversation) => can_access_conversation(user, conversation),
            Resource::System => user.role == Role::Admin,
        },
    }
}
