//! Who may do what to an application. Pure predicates, no storage access.
//!
//! `available_actions` is derived from the same predicates the workflow enforces, so an action
//! is only offered when the state machine would accept it from this caller.

use super::domain::{Application, ApplicationAction, Identity};

/// Reviewers and superusers resolve applications.
pub fn can_review(identity: &Identity) -> bool {
    identity.roles.reviewer || identity.roles.superuser
}

pub fn is_creator(identity: &Identity, application: &Application) -> bool {
    application.created_by_id == identity.id
}

/// Withdrawal belongs to the creator alone; reviewer rights do not extend to it.
pub fn can_delete(identity: &Identity, application: &Application) -> bool {
    is_creator(identity, application)
}

pub fn can_edit(identity: &Identity, application: &Application) -> bool {
    is_creator(identity, application)
}

pub fn is_permitted(
    action: ApplicationAction,
    identity: &Identity,
    application: &Application,
) -> bool {
    if !application.status.is_pending() {
        return false;
    }
    match action {
        ApplicationAction::Approve | ApplicationAction::Reject => can_review(identity),
        ApplicationAction::Edit => can_edit(identity, application),
        ApplicationAction::Delete => can_delete(identity, application),
    }
}

pub fn available_actions(identity: &Identity, application: &Application) -> Vec<ApplicationAction> {
    [
        ApplicationAction::Approve,
        ApplicationAction::Reject,
        ApplicationAction::Edit,
        ApplicationAction::Delete,
    ]
    .into_iter()
    .filter(|action| is_permitted(*action, identity, application))
    .collect()
}
