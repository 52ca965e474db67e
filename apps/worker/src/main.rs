//! Worker Service - Entry Point
//!
//! Polls the coordinator's pending queue, dispatches claimed jobs to a connector,
//! and streams progress back through the broker's store.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    worker::run().await
}
