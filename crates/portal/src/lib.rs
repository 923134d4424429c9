use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{Portal, PortalKey, RoomId},
    error::{PortalError, PortalResult},
};
use tracing::{debug, info};
use uuid::Uuid;

mod memory;

pub use memory::MemoryPortalStore;

/// Raw `portal` row. `chat_id` is always text; the kind of chat is implied by
/// whether `receiver` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRow {
    pub chat_id: String,
    pub receiver: String,
    pub mxid: Option<String>,
    pub name: Option<String>,
    pub encrypted: bool,
}

impl From<&Portal> for PortalRow {
    fn from(portal: &Portal) -> Self {
        Self {
            chat_id: portal.key.chat_id_text(),
            receiver: portal.key.receiver().to_owned(),
            mxid: portal.mxid.as_ref().map(|mxid| mxid.0.clone()),
            name: portal.name.clone(),
            encrypted: portal.encrypted,
        }
    }
}

pub fn portal_from_row(row: PortalRow) -> PortalResult<Portal> {
    let key = if row.receiver.is_empty() {
        PortalKey::group(row.chat_id)
    } else {
        let recipient = Uuid::parse_str(&row.chat_id).map_err(|error| {
            PortalError::InvalidRecord(format!(
                "private portal for receiver {:?} has non-uuid chat_id {:?}: {error}",
                row.receiver, row.chat_id
            ))
        })?;
        PortalKey::Private {
            recipient,
            receiver: row.receiver,
        }
    };

    Ok(Portal {
        key,
        mxid: row.mxid.map(RoomId),
        name: row.name,
        encrypted: row.encrypted,
    })
}

fn portals_from_rows(rows: Vec<PortalRow>) -> PortalResult<Vec<Portal>> {
    rows.into_iter().map(portal_from_row).collect()
}

/// Backing store for portal rows. Every method is a single parameterized query.
#[async_trait]
pub trait PortalStore: Send + Sync {
    /// Inserts a full row. A duplicate `(chat_id, receiver)` must surface as
    /// [`PortalError::Conflict`].
    async fn insert(&self, row: &PortalRow) -> PortalResult<()>;
    /// Updates `mxid`, `name` and `encrypted` by key and returns the number of
    /// rows matched.
    async fn update(&self, row: &PortalRow) -> PortalResult<u64>;
    async fn select_by_mxid(&self, mxid: &str) -> PortalResult<Option<PortalRow>>;
    async fn select_by_key(&self, chat_id: &str, receiver: &str)
        -> PortalResult<Option<PortalRow>>;
    async fn select_by_receiver(&self, receiver: &str) -> PortalResult<Vec<PortalRow>>;
    /// Rows with the given `chat_id` and a non-empty receiver.
    async fn select_private_by_chat_id(&self, chat_id: &str) -> PortalResult<Vec<PortalRow>>;
    async fn select_with_mxid(&self) -> PortalResult<Vec<PortalRow>>;
}

#[derive(Clone)]
pub struct PortalRegistry<S: PortalStore> {
    store: S,
}

impl<S: PortalStore> PortalRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn create(&self, portal: &Portal) -> PortalResult<()> {
        portal.key.validate()?;
        self.store.insert(&PortalRow::from(portal)).await?;
        info!(key = %portal.key, "created portal");
        Ok(())
    }

    /// Persists `mxid`, `name` and `encrypted`. A key with no row is left alone.
    pub async fn save(&self, portal: &Portal) -> PortalResult<()> {
        portal.key.validate()?;
        let matched = self.store.update(&PortalRow::from(portal)).await?;
        if matched == 0 {
            debug!(key = %portal.key, "save matched no portal row");
        }
        Ok(())
    }

    pub async fn find_by_room(&self, mxid: &RoomId) -> PortalResult<Option<Portal>> {
        self.store
            .select_by_mxid(mxid.as_str())
            .await?
            .map(portal_from_row)
            .transpose()
    }

    pub async fn find_by_chat(&self, key: &PortalKey) -> PortalResult<Option<Portal>> {
        key.validate()?;
        self.store
            .select_by_key(&key.chat_id_text(), key.receiver())
            .await?
            .map(portal_from_row)
            .transpose()
    }

    /// One-to-one portals owned by a local user. An empty receiver owns none.
    pub async fn find_private_chats_of(&self, receiver: &str) -> PortalResult<Vec<Portal>> {
        if receiver.is_empty() {
            return Ok(Vec::new());
        }
        portals_from_rows(self.store.select_by_receiver(receiver).await?)
    }

    /// One-to-one portals with a remote user, across every local receiver.
    pub async fn find_private_chats_with(&self, recipient: Uuid) -> PortalResult<Vec<Portal>> {
        portals_from_rows(
            self.store
                .select_private_by_chat_id(&recipient.to_string())
                .await?,
        )
    }

    pub async fn all_with_room(&self) -> PortalResult<Vec<Portal>> {
        portals_from_rows(self.store.select_with_mxid().await?)
    }

    /// Returns the portal for `key`, creating a pending one if none exists.
    ///
    /// If another caller inserts the same key first, its row is returned.
    pub async fn resolve(&self, key: &PortalKey, name: Option<String>) -> PortalResult<Portal> {
        if let Some(portal) = self.find_by_chat(key).await? {
            return Ok(portal);
        }

        let portal = Portal::pending(key.clone(), name);
        match self.create(&portal).await {
            Ok(()) => Ok(portal),
            Err(error) if error.is_conflict() => {
                debug!(%key, "portal created concurrently, reloading");
                self.find_by_chat(key).await?.ok_or(error)
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
