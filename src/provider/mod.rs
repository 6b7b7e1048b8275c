//! Discovery: sources that supply the backend mapping and the refresh
//! task that applies it to the routing table.

pub mod discovery;

pub use discovery::{spawn_refresh_task, DiscoverySource, HttpSource, ServiceRoute, StaticSource};
