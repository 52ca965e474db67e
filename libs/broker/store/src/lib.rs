//! `Store` abstracts the shared key-value/sorted-set/stream/pub-sub substrate the
//! broker is built on (§4.1). The trait is deliberately narrow: hashes, sorted sets,
//! sets, append-only streams, pub/sub, TTL, and one atomicity primitive — conditional
//! removal from a sorted set, the broker's single linearization point (§9).
//!
//! The only concrete implementation is [`redis::RedisStore`], built on
//! `database::redis`'s `ConnectionManager`.

mod error;
pub mod redis;
mod store;

pub use error::{StoreError, StoreResult};
pub use redis::RedisStore;
pub use store::{PubSubMessage, StreamEntry, Store};

#[cfg(feature = "mock")]
pub use store::MockStore;
