use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreResult;

/// One entry read back from an append-only stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// A message delivered on a subscribed pub/sub channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: String,
}

/// The KV/sorted-set/stream/pub-sub substrate the broker is built on (§4.1).
///
/// Every method that mutates shared state is async and fallible with
/// [`crate::StoreError`]; callers retry on [`crate::StoreError::Unavailable`] and treat
/// everything else as a logic error.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    // -- hash --
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;
    async fn hash_set_many(&self, key: &str, fields: &HashMap<String, String>) -> StoreResult<()>;
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;
    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;
    async fn hash_del_field(&self, key: &str, field: &str) -> StoreResult<()>;
    async fn hash_del_key(&self, key: &str) -> StoreResult<()>;
    async fn hash_exists(&self, key: &str) -> StoreResult<bool>;
    async fn hash_len(&self, key: &str) -> StoreResult<u64>;

    // -- sorted set --
    async fn zset_add(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;
    async fn zset_remove(&self, key: &str, member: &str) -> StoreResult<()>;
    /// The single atomicity primitive the broker depends on: remove `member` from
    /// `key`, returning `true` iff it was present. The only place correctness
    /// depends on the store's atomicity (§9).
    async fn zset_conditional_remove(&self, key: &str, member: &str) -> StoreResult<bool>;
    /// Highest-scored members first, `[start, stop]` inclusive rank range.
    async fn zset_range_desc(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, f64)>>;
    async fn zset_rank(&self, key: &str, member: &str) -> StoreResult<Option<u64>>;
    async fn zset_card(&self, key: &str) -> StoreResult<u64>;

    // -- set --
    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()>;
    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()>;
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;
    async fn set_is_member(&self, key: &str, member: &str) -> StoreResult<bool>;

    // -- stream --
    async fn stream_append(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
    ) -> StoreResult<String>;
    /// Inclusive range read, `"-"`/`"+"` meaning the first/last entry respectively.
    async fn stream_range(&self, key: &str, start: &str, end: &str) -> StoreResult<Vec<StreamEntry>>;

    // -- pub/sub --
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()>;
    /// Fire-and-forget subscription; no replay of messages published before the
    /// subscribe call completes.
    async fn subscribe(
        &self,
        channels: &[String],
    ) -> StoreResult<tokio::sync::mpsc::Receiver<PubSubMessage>>;

    // -- misc --
    async fn expire(&self, key: &str, ttl_secs: i64) -> StoreResult<()>;
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;
    async fn ping(&self) -> StoreResult<()>;
}
