//! Dual wire-format event fan-out (§4.10), the periodic stats broadcast (§4.11),
//! and the two WebSocket routes (`/ws/monitor/{id}`, `/ws/client/{id}`) a binary
//! merges into its own router (§6.3, §6.4).

mod broadcaster;
pub mod chunk;
mod config;
mod error;
mod registry;
mod routes;
mod stats_ticker;
pub mod wire;

pub use broadcaster::EventBroadcaster;
pub use config::BroadcasterConfig;
pub use error::{EventsError, EventsResult};
pub use registry::ConnectionRegistry;
pub use routes::{events_router, EventsState};
pub use stats_ticker::StatsTicker;
