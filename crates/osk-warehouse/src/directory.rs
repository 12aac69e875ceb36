//! Read-only collaborators the workflow consults: identities, warehouses and the item catalog.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::workflows::applications::domain::{
    Identity, ItemId, ItemInfo, Roles, UserId, WarehouseId, WarehouseInfo,
};

/// Resolves bearer tokens and user ids to identities.
pub trait IdentityProvider: Send + Sync {
    fn resolve_token(&self, token: &str) -> Option<Identity>;
    fn user(&self, id: &UserId) -> Option<Identity>;
}

pub trait WarehouseDirectory: Send + Sync {
    fn warehouse(&self, id: &WarehouseId) -> Option<WarehouseInfo>;

    fn warehouse_exists(&self, id: &WarehouseId) -> bool {
        self.warehouse(id).is_some()
    }
}

/// Display metadata for items. Unknown ids are simply absent from the result.
pub trait Catalog: Send + Sync {
    fn display_info(&self, ids: &[&ItemId]) -> BTreeMap<ItemId, ItemInfo>;
}

/// Everything the workflow needs from the outside world.
pub trait Directory: IdentityProvider + WarehouseDirectory + Catalog {}

impl<T> Directory for T where T: IdentityProvider + WarehouseDirectory + Catalog {}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to read directory file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse directory file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("duplicate bearer token for user {0}")]
    DuplicateToken(UserId),
    #[error("user {0} is not in the directory")]
    UnknownUser(UserId),
}

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    users: Vec<UserEntry>,
    #[serde(default)]
    warehouses: Vec<WarehouseInfo>,
    #[serde(default)]
    items: Vec<ItemInfo>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    id: UserId,
    token: String,
    #[serde(default)]
    roles: Roles,
}

/// Immutable in-memory directory, loaded once at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    users: HashMap<UserId, Identity>,
    tokens: HashMap<String, UserId>,
    warehouses: HashMap<WarehouseId, WarehouseInfo>,
    items: HashMap<ItemId, ItemInfo>,
}

impl StaticDirectory {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw).map_err(|err| match err {
            DirectoryError::Parse { source, .. } => DirectoryError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile =
            serde_json::from_str(raw).map_err(|source| DirectoryError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;

        let mut directory = Self::default();
        for entry in file.users {
            if directory.tokens.contains_key(&entry.token) {
                return Err(DirectoryError::DuplicateToken(entry.id));
            }
            directory = directory.with_user(Identity::new(entry.id.0, entry.roles), entry.token);
        }
        for warehouse in file.warehouses {
            directory = directory.with_warehouse(warehouse);
        }
        for item in file.items {
            directory = directory.with_item(item);
        }
        Ok(directory)
    }

    pub fn with_user(mut self, identity: Identity, token: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), identity.id.clone());
        self.users.insert(identity.id.clone(), identity);
        self
    }

    pub fn with_warehouse(mut self, warehouse: WarehouseInfo) -> Self {
        self.warehouses.insert(warehouse.id.clone(), warehouse);
        self
    }

    pub fn with_item(mut self, item: ItemInfo) -> Self {
        self.items.insert(item.id.clone(), item);
        self
    }

    /// Looks up a user that the caller expects to be configured.
    pub fn require_user(&self, id: &UserId) -> Result<Identity, DirectoryError> {
        self.users
            .get(id)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownUser(id.clone()))
    }
}

impl IdentityProvider for StaticDirectory {
    fn resolve_token(&self, token: &str) -> Option<Identity> {
        self.tokens
            .get(token)
            .and_then(|id| self.users.get(id))
            .cloned()
    }

    fn user(&self, id: &UserId) -> Option<Identity> {
        self.users.get(id).cloned()
    }
}

impl WarehouseDirectory for StaticDirectory {
    fn warehouse(&self, id: &WarehouseId) -> Option<WarehouseInfo> {
        self.warehouses.get(id).cloned()
    }
}

impl Catalog for StaticDirectory {
    fn display_info(&self, ids: &[&ItemId]) -> BTreeMap<ItemId, ItemInfo> {
        ids.iter()
            .filter_map(|id| self.items.get(*id))
            .map(|item| (item.id.clone(), item.clone()))
            .collect()
    }
}
