//! Capability checks for mailings and clients

use mailcadence_common::types::{UserId, UserRole};
use mailcadence_storage::models::{Client, Mailing};
use uuid::Uuid;

/// Account id the command-line operator acts under. Never owns a row.
pub const OPERATOR_ID: UserId = Uuid::from_u128(0x6d61_696c_6361_6465_6e63_652d_6f70_7200);

/// Who is acting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        Self { user_id, role }
    }

    /// The command-line operator; owns nothing and acts as a manager
    pub fn operator() -> Self {
        Self::new(OPERATOR_ID, UserRole::Manager)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Edit,
    Delete,
    Cancel,
    Reactivate,
}

#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Mailing(&'a Mailing),
    Client(&'a Client),
}

impl Resource<'_> {
    fn owner_id(&self) -> UserId {
        match self {
            Resource::Mailing(m) => m.owner_id,
            Resource::Client(c) => c.owner_id,
        }
    }
}

/// Whether `actor` may perform `action` on `resource`
pub fn can(actor: &Actor, action: Action, resource: Resource<'_>) -> bool {
    if resource.owner_id() == actor.user_id {
        return true;
    }

    match (actor.role, resource) {
        (UserRole::Manager, Resource::Mailing(_)) => {
            matches!(action, Action::View | Action::Cancel | Action::Reactivate)
        }
        (UserRole::Manager, Resource::Client(_)) => action == Action::View,
        (UserRole::User | UserRole::ContentManager, _) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mailcadence_storage::models::MailingStatus;

    fn mailing_owned_by(owner_id: UserId) -> Mailing {
        let now = Utc::now();
        Mailing {
            id: Uuid::now_v7(),
            owner_id,
            title: "Digest".to_string(),
            message: "Body".to_string(),
            status: MailingStatus::New.to_string(),
            scheduled_time: now,
            periodicity: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn client_owned_by(owner_id: UserId) -> Client {
        let now = Utc::now();
        Client {
            id: Uuid::now_v7(),
            owner_id,
            email: "a@x.com".to_string(),
            last_name: "Petrov".to_string(),
            first_name: "Ivan".to_string(),
            second_name: None,
            comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_owner_can_do_everything() {
        let owner = Actor::new(Uuid::now_v7(), UserRole::User);
        let mailing = mailing_owned_by(owner.user_id);
        let client = client_owned_by(owner.user_id);

        for action in [
            Action::View,
            Action::Edit,
            Action::Delete,
            Action::Cancel,
            Action::Reactivate,
        ] {
            assert!(can(&owner, action, Resource::Mailing(&mailing)));
            assert!(can(&owner, action, Resource::Client(&client)));
        }
    }

    #[test]
    fn test_manager_capabilities() {
        let manager = Actor::new(Uuid::now_v7(), UserRole::Manager);
        let mailing = mailing_owned_by(Uuid::now_v7());
        let client = client_owned_by(Uuid::now_v7());

        assert!(can(&manager, Action::View, Resource::Mailing(&mailing)));
        assert!(can(&manager, Action::Cancel, Resource::Mailing(&mailing)));
        assert!(can(&manager, Action::Reactivate, Resource::Mailing(&mailing)));
        assert!(!can(&manager, Action::Edit, Resource::Mailing(&mailing)));
        assert!(!can(&manager, Action::Delete, Resource::Mailing(&mailing)));

        assert!(can(&manager, Action::View, Resource::Client(&client)));
        assert!(!can(&manager, Action::Edit, Resource::Client(&client)));
    }

    #[test]
    fn test_operator_acts_as_manager_not_owner() {
        let operator = Actor::operator();
        assert_ne!(operator.user_id, Uuid::nil());

        let mailing = mailing_owned_by(Uuid::nil());
        assert!(can(&operator, Action::Cancel, Resource::Mailing(&mailing)));
        assert!(!can(&operator, Action::Edit, Resource::Mailing(&mailing)));
        assert!(!can(&operator, Action::Delete, Resource::Mailing(&mailing)));
    }

    #[test]
    fn test_strangers_are_denied() {
        let mailing = mailing_owned_by(Uuid::now_v7());
        for role in [UserRole::User, UserRole::ContentManager] {
            let actor = Actor::new(Uuid::now_v7(), role);
            assert!(!can(&actor, Action::View, Resource::Mailing(&mailing)));
            assert!(!can(&actor, Action::Cancel, Resource::Mailing(&mailing)));
        }
    }
}
