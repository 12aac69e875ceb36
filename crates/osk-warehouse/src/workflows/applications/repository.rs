use chrono::{DateTime, Utc};
use sled::transaction::TransactionalTree;
use sled::Tree;

use super::domain::{Application, ApplicationId, ApplicationStatus, UserId};
use crate::store::{abort, decode, encode, in_tx, Store, StoreError, TxResult};

/// Result of [`ApplicationRepository::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The token was new and the record was stored.
    Inserted(Application),
    /// The token was already stored with the same submission; the stored record is returned
    /// unchanged.
    Replayed(Application),
}

impl CreateOutcome {
    pub fn application(&self) -> &Application {
        match self {
            CreateOutcome::Inserted(application) | CreateOutcome::Replayed(application) => {
                application
            }
        }
    }

    pub fn into_application(self) -> Application {
        match self {
            CreateOutcome::Inserted(application) | CreateOutcome::Replayed(application) => {
                application
            }
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, CreateOutcome::Replayed(_))
    }
}

/// Filter and cursor for [`ApplicationRepository::list_by_filter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Only applications created or resolved by this user.
    pub chained_to_user: Option<UserId>,
    pub status: Option<ApplicationStatus>,
    /// Only applications created strictly before this instant. `None` starts from the newest.
    pub cursor: Option<DateTime<Utc>>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationPage {
    pub items: Vec<Application>,
    /// `created_at` of the last item, present only when the page is full.
    pub next_cursor: Option<DateTime<Utc>>,
}

/// Order-preserving byte encoding of a timestamp (sign bit flipped, big endian).
fn created_key(created_at: &DateTime<Utc>) -> [u8; 8] {
    let nanos = created_at.timestamp_nanos_opt().unwrap_or(i64::MAX);
    ((nanos as u64) ^ (1 << 63)).to_be_bytes()
}

fn index_key(application: &Application) -> Vec<u8> {
    let mut key = created_key(&application.created_at).to_vec();
    key.extend_from_slice(&application.serial_number.to_be_bytes());
    key
}

/// Persistence of application records.
#[derive(Clone)]
pub struct ApplicationRepository {
    store: Store,
}

impl ApplicationRepository {
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
        }
    }

    fn applications(&self) -> &Tree {
        &self.store.applications
    }

    /// Inserts a pending record keyed by its id.
    ///
    /// An existing record with the same submission is returned unchanged; an existing record
    /// with a different submission fails with [`StoreError::TokenReused`].
    pub fn create(&self, application: Application) -> Result<CreateOutcome, StoreError> {
        self.store.transaction(|tx| {
            let applications = tx.applications();
            match applications.fetch(&application.id)? {
                Some(existing) if existing.same_submission(&application) => {
                    Ok(CreateOutcome::Replayed(existing))
                }
                Some(_) => abort(StoreError::TokenReused),
                None => {
                    applications.insert(&application)?;
                    Ok(CreateOutcome::Inserted(application.clone()))
                }
            }
        })
    }

    pub fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        match self.applications().get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_id(&self, id: &ApplicationId) -> Result<Application, StoreError> {
        self.fetch(id)?.ok_or(StoreError::NotFound)
    }

    pub fn exists(&self, id: &ApplicationId) -> Result<bool, StoreError> {
        Ok(self.applications().contains_key(id.as_str().as_bytes())?)
    }

    /// Newest-first page of applications matching `query`.
    pub fn list_by_filter(&self, query: &ListQuery) -> Result<ApplicationPage, StoreError> {
        let mut items = Vec::new();
        if query.limit == 0 {
            return Ok(ApplicationPage {
                items,
                next_cursor: None,
            });
        }

        let index = &self.store.created_index;
        let entries = match &query.cursor {
            Some(cursor) => index.range(..created_key(cursor).to_vec()),
            None => index.iter(),
        };

        for entry in entries.rev() {
            let (_, id) = entry?;
            let Some(bytes) = self.applications().get(&id)? else {
                return Err(StoreError::NotFound);
            };
            let application: Application = decode(&bytes)?;

            if let Some(status) = query.status {
                if application.status != status {
                    continue;
                }
            }
            if let Some(user) = &query.chained_to_user {
                if !application.is_chained_to(user) {
                    continue;
                }
            }

            items.push(application);
            if items.len() == query.limit {
                break;
            }
        }

        let next_cursor = if items.len() == query.limit {
            items.last().map(|application| application.created_at)
        } else {
            None
        };
        Ok(ApplicationPage { items, next_cursor })
    }

    /// Compare-and-swap of the status in its own transaction.
    pub fn transition_status(
        &self,
        id: &ApplicationId,
        from: ApplicationStatus,
        to: ApplicationStatus,
        finished_by: &UserId,
    ) -> Result<Application, StoreError> {
        let now = Utc::now();
        self.store
            .transaction(|tx| tx.applications().transition_status(id, from, to, finished_by, now))
    }
}

/// Application reads and writes bound to a running store transaction.
pub struct ApplicationTransaction<'a> {
    applications: &'a TransactionalTree,
    created_index: &'a TransactionalTree,
}

impl<'a> ApplicationTransaction<'a> {
    pub(crate) fn new(
        applications: &'a TransactionalTree,
        created_index: &'a TransactionalTree,
    ) -> Self {
        Self {
            applications,
            created_index,
        }
    }

    pub fn fetch(&self, id: &ApplicationId) -> TxResult<Option<Application>> {
        match self.applications.get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(in_tx(decode(&bytes))?)),
            None => Ok(None),
        }
    }

    fn put(&self, application: &Application) -> TxResult<()> {
        let bytes = in_tx(encode(application))?;
        self.applications
            .insert(application.id.as_str().as_bytes(), bytes)?;
        Ok(())
    }

    fn insert(&self, application: &Application) -> TxResult<()> {
        self.put(application)?;
        self.created_index
            .insert(index_key(application), application.id.as_str().as_bytes())?;
        Ok(())
    }

    /// Moves `id` from `from` to `to`, but only if the stored status still equals `from`.
    ///
    /// Fails with [`StoreError::StatusMismatch`] when another writer got there first.
    pub fn transition_status(
        &self,
        id: &ApplicationId,
        from: ApplicationStatus,
        to: ApplicationStatus,
        finished_by: &UserId,
        now: DateTime<Utc>,
    ) -> TxResult<Application> {
        let Some(mut application) = self.fetch(id)? else {
            return abort(StoreError::NotFound);
        };
        if application.status != from || !from.can_transition_to(to) {
            return abort(StoreError::StatusMismatch {
                expected: from,
                found: application.status,
            });
        }

        application.status = to;
        application.finished_by_id = Some(finished_by.clone());
        application.updated_at = now;
        self.put(&application)?;
        Ok(application)
    }

    /// Overwrites a record that must still be pending.
    pub fn replace_pending(&self, application: &Application) -> TxResult<Application> {
        let Some(stored) = self.fetch(&application.id)? else {
            return abort(StoreError::NotFound);
        };
        if !stored.status.is_pending() {
            return abort(StoreError::StatusMismatch {
                expected: ApplicationStatus::Pending,
                found: stored.status,
            });
        }

        let mut replacement = application.clone();
        replacement.serial_number = stored.serial_number;
        replacement.created_by_id = stored.created_by_id;
        replacement.created_at = stored.created_at;
        replacement.status = ApplicationStatus::Pending;
        replacement.finished_by_id = None;
        self.put(&replacement)?;
        Ok(replacement)
    }
}
