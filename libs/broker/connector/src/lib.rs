//! The connector contract (§6.2) that isolates the broker from service-specific
//! execution, plus the deterministic `SimConnector` this workspace ships for tests
//! and local demos — wiring in a real ComfyUI/A1111/Playwright connector is out of
//! scope here.

mod connector;
mod error;
mod sim_connector;

pub use connector::{Connector, ConnectorJob, ProgressSink, ProgressUpdate};
pub use error::{ConnectorError, ConnectorResult};
pub use sim_connector::{SimConnector, SimConnectorConfig};

#[cfg(feature = "mock")]
pub use connector::MockConnector;
