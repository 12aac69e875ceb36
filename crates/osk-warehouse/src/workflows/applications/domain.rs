use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Application primary key. Supplied by the client as its idempotency token.
    ApplicationId
);
string_id!(
    /// Identifier of an authenticated user.
    UserId
);
string_id!(WarehouseId);
string_id!(ItemId);

/// Requested item quantities, keyed by item id.
pub type Payload = BTreeMap<ItemId, u64>;

/// What the application asks the warehouse network to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationType {
    Send,
    Receive,
    Defect,
    Use,
    Revert,
}

impl ApplicationType {
    pub const ALL: [ApplicationType; 5] = [
        ApplicationType::Send,
        ApplicationType::Receive,
        ApplicationType::Defect,
        ApplicationType::Use,
        ApplicationType::Revert,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationType::Send => "send",
            ApplicationType::Receive => "receive",
            ApplicationType::Defect => "defect",
            ApplicationType::Use => "use",
            ApplicationType::Revert => "revert",
        }
    }
}

/// Lifecycle status. Every status other than `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Success,
    Rejected,
    Deleted,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Success => "success",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Deleted => "deleted",
        }
    }

    pub const fn is_pending(self) -> bool {
        matches!(self, ApplicationStatus::Pending)
    }

    pub const fn is_terminal(self) -> bool {
        !self.is_pending()
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub const fn can_transition_to(self, next: ApplicationStatus) -> bool {
        matches!(
            (self, next),
            (
                ApplicationStatus::Pending,
                ApplicationStatus::Success
                    | ApplicationStatus::Rejected
                    | ApplicationStatus::Deleted
            )
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "rejected" => Some(Self::Rejected),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Operations a caller may be offered on an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationAction {
    Approve,
    Reject,
    Edit,
    Delete,
}

impl ApplicationAction {
    pub const fn past_tense(self) -> &'static str {
        match self {
            ApplicationAction::Approve => "approved",
            ApplicationAction::Reject => "rejected",
            ApplicationAction::Edit => "edited",
            ApplicationAction::Delete => "deleted",
        }
    }

    pub const fn verb(self) -> &'static str {
        match self {
            ApplicationAction::Approve => "approve",
            ApplicationAction::Reject => "reject",
            ApplicationAction::Edit => "edit",
            ApplicationAction::Delete => "delete",
        }
    }
}

/// Role flags attached to an authenticated caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub reviewer: bool,
    #[serde(default)]
    pub superuser: bool,
}

/// Caller identity as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    #[serde(default)]
    pub roles: Roles,
}

impl Identity {
    pub fn new(id: impl Into<String>, roles: Roles) -> Self {
        Self {
            id: UserId::new(id),
            roles,
        }
    }
}

/// Mutable part of an application, as submitted on create and edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ApplicationType,
    pub payload: Payload,
    #[serde(default)]
    pub sent_from_warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub sent_to_warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub linked_to_application_id: Option<ApplicationId>,
}

/// Stored application record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub serial_number: u64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ApplicationType,
    pub status: ApplicationStatus,
    pub payload: Payload,
    pub created_by_id: UserId,
    pub finished_by_id: Option<UserId>,
    pub sent_from_warehouse_id: Option<WarehouseId>,
    pub sent_to_warehouse_id: Option<WarehouseId>,
    pub linked_to_application_id: Option<ApplicationId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Builds a fresh pending record from a request.
    pub fn pending(
        id: ApplicationId,
        serial_number: u64,
        request: ApplicationRequest,
        created_by_id: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        let ApplicationRequest {
            name,
            description,
            kind,
            payload,
            sent_from_warehouse_id,
            sent_to_warehouse_id,
            linked_to_application_id,
        } = request;

        Self {
            id,
            serial_number,
            name,
            description,
            kind,
            status: ApplicationStatus::Pending,
            payload,
            created_by_id,
            finished_by_id: None,
            sent_from_warehouse_id,
            sent_to_warehouse_id,
            linked_to_application_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when `other` carries the same submission as this record, ignoring the fields the
    /// store assigns (serial, status, timestamps). Tells an idempotent retry apart from a reused
    /// token.
    pub fn same_submission(&self, other: &Application) -> bool {
        self.id == other.id
            && self.created_by_id == other.created_by_id
            && self.name == other.name
            && self.description == other.description
            && self.kind == other.kind
            && self.payload == other.payload
            && self.sent_from_warehouse_id == other.sent_from_warehouse_id
            && self.sent_to_warehouse_id == other.sent_to_warehouse_id
            && self.linked_to_application_id == other.linked_to_application_id
    }

    /// Replaces the editable fields of a pending record.
    pub fn apply_edit(&mut self, request: ApplicationRequest, now: DateTime<Utc>) {
        self.name = request.name;
        self.description = request.description;
        self.kind = request.kind;
        self.payload = request.payload;
        self.sent_from_warehouse_id = request.sent_from_warehouse_id;
        self.sent_to_warehouse_id = request.sent_to_warehouse_id;
        self.linked_to_application_id = request.linked_to_application_id;
        self.updated_at = now;
    }

    /// Whether `user` created or resolved this application.
    pub fn is_chained_to(&self, user: &UserId) -> bool {
        self.created_by_id == *user || self.finished_by_id.as_ref() == Some(user)
    }
}

/// Display metadata for a warehouse, owned by the warehouse directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseInfo {
    pub id: WarehouseId,
    pub name: String,
    #[serde(default)]
    pub address: String,
}

/// Display metadata for a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub codes: Vec<String>,
}

/// One payload line enriched with catalog metadata when the catalog knows the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadLine {
    pub item_id: ItemId,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemInfo>,
}

/// Application with its payload resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HydratedApplication {
    #[serde(flatten)]
    pub application: Application,
    pub items: Vec<PayloadLine>,
}

/// Application plus the actions the viewing caller may take on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationWithActions {
    #[serde(flatten)]
    pub application: HydratedApplication,
    pub actions: Vec<ApplicationAction>,
}

/// One page of applications, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationsList {
    pub items: Vec<HydratedApplication>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<DateTime<Utc>>,
}

/// Current stock of one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseStock {
    pub warehouse: WarehouseInfo,
    pub items: Vec<PayloadLine>,
}
