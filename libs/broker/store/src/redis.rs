//! Redis-backed [`Store`] implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::{PubSubMessage, StreamEntry, Store};

/// Lua body for the broker's single linearization point: removing a member from a
/// sorted set is already atomic in Redis, but wrapping it in a script keeps the
/// "remove, tell me if it was present" contract explicit and gives us one place to
/// extend if a future store needs a compare-and-swap instead (§9).
const CONDITIONAL_ZREM_SCRIPT: &str = r#"
return redis.call('ZREM', KEYS[1], ARGV[1])
"#;

/// A `Store` backed by a single Redis instance.
///
/// Commands run over a cloned `ConnectionManager` (auto-reconnecting); pub/sub
/// subscriptions open their own dedicated connection from `client` since Redis
/// multiplexes subscriptions on a connection that can no longer issue other
/// commands.
pub struct RedisStore {
    conn: ConnectionManager,
    client: Client,
    conditional_zrem: Script,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager, client: Client) -> Self {
        Self {
            conn,
            client,
            conditional_zrem: Script::new(CONDITIONAL_ZREM_SCRIPT),
        }
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    #[instrument(skip(self, value))]
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hash_set_many(&self, key: &str, fields: &HashMap<String, String>) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let pairs: Vec<(&String, &String)> = fields.iter().collect();
        let _: () = conn.hset_multiple(key, &pairs).await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn();
        let value: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(value)
    }

    async fn hash_del_field(&self, key: &str, field: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.hdel(key, field).await?;
        Ok(())
    }

    async fn hash_del_key(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn hash_exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn hash_len(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let len: u64 = conn.hlen(key).await?;
        Ok(len)
    }

    #[instrument(skip(self))]
    async fn zset_add(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zset_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.zrem(key, member).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn zset_conditional_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let removed: i64 = self
            .conditional_zrem
            .key(key)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn zset_range_desc(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, f64)>> {
        let mut conn = self.conn();
        let members: Vec<(String, f64)> = conn.zrevrange_withscores(key, start, stop).await?;
        Ok(members)
    }

    async fn zset_rank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.conn();
        let rank: Option<u64> = conn.zrank(key, member).await?;
        Ok(rank)
    }

    async fn zset_card(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let card: u64 = conn.zcard(key).await?;
        Ok(card)
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.srem(key, member).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let is_member: bool = conn.sismember(key, member).await?;
        Ok(is_member)
    }

    #[instrument(skip(self, fields))]
    async fn stream_append(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
    ) -> StoreResult<String> {
        let mut conn = self.conn();
        let pairs: Vec<(&String, &String)> = fields.iter().collect();
        let id: String = conn.xadd(key, "*", &pairs).await?;
        Ok(id)
    }

    async fn stream_range(&self, key: &str, start: &str, end: &str) -> StoreResult<Vec<StreamEntry>> {
        let mut conn = self.conn();
        let reply: redis::streams::StreamRangeReply = conn.xrange(key, start, end).await?;
        Ok(reply
            .ids
            .into_iter()
            .map(|stream_id| {
                let mut fields = HashMap::new();
                for (field, value) in stream_id.map {
                    if let redis::Value::BulkString(bytes) = value {
                        fields.insert(field, String::from_utf8_lossy(&bytes).into_owned());
                    }
                }
                StreamEntry {
                    id: stream_id.id,
                    fields,
                }
            })
            .collect())
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(
        &self,
        channels: &[String],
    ) -> StoreResult<mpsc::Receiver<PubSubMessage>> {
        let client = self.client.clone();
        let channels: Vec<String> = channels.to_vec();
        let (tx, rx) = mpsc::channel(1024);

        tokio::spawn(async move {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(pubsub) => pubsub,
                Err(e) => {
                    warn!("failed to open pub/sub connection: {e}");
                    return;
                }
            };
            for channel in &channels {
                if let Err(e) = pubsub.subscribe(channel).await {
                    warn!("failed to subscribe to {channel}: {e}");
                    return;
                }
            }

            let mut stream = pubsub.on_message();
            use futures::StreamExt;
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("failed to decode pub/sub payload on {channel}: {e}");
                        continue;
                    }
                };
                if tx.send(PubSubMessage { channel, payload }).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.expire(key, ttl_secs).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        if response != "PONG" {
            return Err(StoreError::Operation(format!(
                "unexpected PING response: {response}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_redis_url() -> Option<String> {
        std::env::var("REDIS_URL").ok()
    }

    #[tokio::test]
    #[ignore] // requires a running Redis instance
    async fn conditional_remove_is_one_shot() {
        let Some(url) = has_redis_url() else {
            return;
        };
        let client = Client::open(url).unwrap();
        let conn = ConnectionManager::new(client.clone()).await.unwrap();
        let store = RedisStore::new(conn, client);

        store.zset_add("test:pending", "job-1", 100.0).await.unwrap();
        assert!(store
            .zset_conditional_remove("test:pending", "job-1")
            .await
            .unwrap());
        assert!(!store
            .zset_conditional_remove("test:pending", "job-1")
            .await
            .unwrap());
    }
}
