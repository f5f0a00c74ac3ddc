//! In-process KV + pub/sub binding
//!
//! A complete in-memory implementation of the collaborator contract, used by
//! tests and by daemon builds that have no external store binding compiled
//! in. State is inspectable so tests can assert on hashes, sets, streams and
//! the publish log.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::KvStore;
use crate::error::IpcError;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    streams: HashMap<String, Vec<Vec<(String, String)>>>,
    publish_log: Vec<(String, String)>,
}

/// In-memory KV + pub/sub store.
#[derive(Default)]
pub struct MemoryKvStore {
    inner: Mutex<Inner>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a hash field without going through the async trait.
    pub fn hash_field(&self, key: &str, field: &str) -> Option<String> {
        self.inner.lock().hashes.get(key)?.get(field).cloned()
    }

    /// Current members of a set, sorted.
    pub fn set_members(&self, key: &str) -> Vec<String> {
        self.inner
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All entries of a stream, oldest first.
    pub fn stream_entries(&self, stream: &str) -> Vec<Vec<(String, String)>> {
        self.inner
            .lock()
            .streams
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }

    /// Everything published so far, as (channel, payload) pairs.
    pub fn published(&self) -> Vec<(String, String)> {
        self.inner.lock().publish_log.clone()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), IpcError> {
        let mut inner = self.inner.lock();
        let hash = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone());
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, IpcError> {
        Ok(self.hash_field(key, field))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), IpcError> {
        self.inner
            .lock()
            .publish_log
            .push((channel.to_string(), payload.to_string()));
        // A send error just means nobody is subscribed right now.
        let _ = self.sender(channel).send(payload.to_string());
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.sender(channel).subscribe()
    }

    async fn xadd(
        &self,
        stream: &str,
        maxlen: usize,
        fields: &[(&str, String)],
    ) -> Result<(), IpcError> {
        let mut inner = self.inner.lock();
        let entries = inner.streams.entry(stream.to_string()).or_default();
        entries.push(
            fields
                .iter()
                .map(|(f, v)| ((*f).to_string(), v.clone()))
                .collect(),
        );
        if entries.len() > maxlen {
            let excess = entries.len() - maxlen;
            entries.drain(..excess);
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), IpcError> {
        self.inner
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), IpcError> {
        let mut inner = self.inner.lock();
        if let Some(set) = inner.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), IpcError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hset_then_hget() {
        let store = MemoryKvStore::new();
        store
            .hset("vehicle", &[("state", "ready-to-drive".to_string())])
            .await
            .unwrap();

        assert_eq!(
            store.hget("vehicle", "state").await.unwrap().as_deref(),
            Some("ready-to-drive")
        );
        assert_eq!(store.hget("vehicle", "missing").await.unwrap(), None);
        assert_eq!(store.hget("missing", "state").await.unwrap(), None);
    }

    #[tokio::test]
    async fn publish_reaches_subscribers_and_log() {
        let store = MemoryKvStore::new();
        let mut rx = store.subscribe("vehicle");

        store.publish("vehicle", "").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "");
        assert_eq!(store.published(), vec![("vehicle".to_string(), String::new())]);
    }

    #[tokio::test]
    async fn stream_is_trimmed_to_maxlen() {
        let store = MemoryKvStore::new();
        for i in 0..5 {
            store
                .xadd("events", 3, &[("seq", i.to_string())])
                .await
                .unwrap();
        }

        let entries = store.stream_entries("events");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0][0].1, "2");
        assert_eq!(entries[2][0].1, "4");
    }

    #[tokio::test]
    async fn set_membership() {
        let store = MemoryKvStore::new();
        store.sadd("faults", "3").await.unwrap();
        store.sadd("faults", "11").await.unwrap();
        store.srem("faults", "3").await.unwrap();

        assert_eq!(store.set_members("faults"), vec!["11".to_string()]);
    }
}
