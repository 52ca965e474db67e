//! Coordinator Service - Entry Point
//!
//! Runs the Reclaimer sweep loop, the monitor/EmProps WebSocket fan-out, the stats
//! ticker, and the admin HTTP surface.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    coordinator::run().await
}
