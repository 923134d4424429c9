use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use shared::error::{PortalError, PortalResult};

use crate::{PortalRow, PortalStore};

type Rows = BTreeMap<(String, String), PortalRow>;

/// In-process [`PortalStore`] with the same key semantics as the `portal` table.
#[derive(Clone, Default)]
pub struct MemoryPortalStore {
    rows: Arc<Mutex<Rows>>,
    offline: Arc<AtomicBool>,
}

impl MemoryPortalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with [`PortalError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> PortalResult<MutexGuard<'_, Rows>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PortalError::unavailable("memory portal store is offline"));
        }
        self.rows
            .lock()
            .map_err(|_| PortalError::store("memory portal store lock poisoned"))
    }

    fn select(&self, filter: impl Fn(&PortalRow) -> bool) -> PortalResult<Vec<PortalRow>> {
        Ok(self
            .rows()?
            .values()
            .filter(|row| filter(row))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PortalStore for MemoryPortalStore {
    async fn insert(&self, row: &PortalRow) -> PortalResult<()> {
        let mut rows = self.rows()?;
        let key = (row.chat_id.clone(), row.receiver.clone());
        if rows.contains_key(&key) {
            return Err(PortalError::Conflict {
                chat_id: key.0,
                receiver: key.1,
            });
        }
        rows.insert(key, row.clone());
        Ok(())
    }

    async fn update(&self, row: &PortalRow) -> PortalResult<u64> {
        let mut rows = self.rows()?;
        let key = (row.chat_id.clone(), row.receiver.clone());
        let Some(existing) = rows.get_mut(&key) else {
            return Ok(0);
        };
        existing.mxid = row.mxid.clone();
        existing.name = row.name.clone();
        existing.encrypted = row.encrypted;
        Ok(1)
    }

    async fn select_by_mxid(&self, mxid: &str) -> PortalResult<Option<PortalRow>> {
        Ok(self
            .select(|row| row.mxid.as_deref() == Some(mxid))?
            .into_iter()
            .next())
    }

    async fn select_by_key(
        &self,
        chat_id: &str,
        receiver: &str,
    ) -> PortalResult<Option<PortalRow>> {
        Ok(self
            .rows()?
            .get(&(chat_id.to_owned(), receiver.to_owned()))
            .cloned())
    }

    async fn select_by_receiver(&self, receiver: &str) -> PortalResult<Vec<PortalRow>> {
        self.select(|row| row.receiver == receiver)
    }

    async fn select_private_by_chat_id(&self, chat_id: &str) -> PortalResult<Vec<PortalRow>> {
        self.select(|row| row.chat_id == chat_id && !row.receiver.is_empty())
    }

    async fn select_with_mxid(&self) -> PortalResult<Vec<PortalRow>> {
        self.select(|row| row.mxid.is_some())
    }
}
