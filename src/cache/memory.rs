//! In-memory cache backend.
//!
//! Useful for testing and one-off runs.

use super::{CacheEntry, CacheStore, CachedVideo};
use crate::error::{Result, TubeqaError};
use crate::transcript::VideoId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

struct Slot {
    entry: CacheEntry,
    accessed_at: DateTime<Utc>,
    access_seq: u64,
}

#[derive(Default)]
struct State {
    slots: HashMap<VideoId, Slot>,
    clock: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// In-memory cache store.
#[derive(Default)]
pub struct MemoryCacheStore {
    state: Mutex<State>,
    max_entries: Option<usize>,
}

impl MemoryCacheStore {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_entries,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| TubeqaError::Cache(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, video_id: &VideoId) -> Result<Option<CacheEntry>> {
        let mut state = self.lock()?;
        let seq = state.tick();
        Ok(state.slots.get_mut(video_id).map(|slot| {
            slot.accessed_at = Utc::now();
            slot.access_seq = seq;
            slot.entry.clone()
        }))
    }

    async fn put(&self, video_id: &VideoId, entry: &CacheEntry) -> Result<()> {
        entry.check_key(video_id)?;

        let mut state = self.lock()?;
        let seq = state.tick();
        state.slots.insert(
            video_id.clone(),
            Slot {
                entry: entry.clone(),
                accessed_at: Utc::now(),
                access_seq: seq,
            },
        );

        if let Some(max) = self.max_entries {
            let mut others: Vec<(u64, VideoId)> = state
                .slots
                .iter()
                .filter(|(id, _)| *id != video_id)
                .map(|(id, slot)| (slot.access_seq, id.clone()))
                .collect();
            others.sort_by(|a, b| b.0.cmp(&a.0));
            for (_, id) in others.into_iter().skip(max.saturating_sub(1)) {
                state.slots.remove(&id);
            }
        }
        Ok(())
    }

    async fn contains(&self, video_id: &VideoId) -> Result<bool> {
        Ok(self.lock()?.slots.contains_key(video_id))
    }

    async fn list(&self) -> Result<Vec<CachedVideo>> {
        let state = self.lock()?;
        let mut slots: Vec<&Slot> = state.slots.values().collect();
        slots.sort_by(|a, b| b.access_seq.cmp(&a.access_seq));
        Ok(slots
            .into_iter()
            .map(|slot| CachedVideo::from_entry(&slot.entry, slot.accessed_at))
            .collect())
    }

    async fn remove(&self, video_id: &VideoId) -> Result<bool> {
        Ok(self.lock()?.slots.remove(video_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::sample_entry;

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_eviction() {
        let store = MemoryCacheStore::new(Some(1));
        let a = sample_entry("aaaaaaaaaaa", "fp");
        let b = sample_entry("bbbbbbbbbbb", "fp");

        store.put(&a.video_id, &a).await.unwrap();
        assert_eq!(store.get(&a.video_id).await.unwrap(), Some(a.clone()));

        store.put(&b.video_id, &b).await.unwrap();
        assert!(!store.contains(&a.video_id).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.remove(&b.video_id).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }
}
