pub mod config;
pub mod error;
/// Enlace - a stateful command router for MongoDB Sharded Clusters
///
/// Enlace presents a single logical connection to its caller while sending
/// each command to one of several interchangeable mongos routers:
/// 1. Cursor continuations go back to the router that opened the cursor
/// 2. Statements of one transaction stay on the router that started it
/// 3. `$clusterTime` gossip never moves backwards between routers
///
/// Node-local diagnostics are rejected up front and cluster-wide
/// administrative commands are broadcast to every router.
pub mod core;
pub mod routing;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::core::{
    BackendConnection, ClusterTime, CommandOptions, ConnectOptions, ConnectionPool, Connector,
    CursorId, Document, Endpoint,
};
pub use crate::error::{BackendError, ConfigError, RouterError, RouterResult};
pub use crate::routing::classifier::{classify, Affinity, Disposition};
pub use crate::routing::{AffinityStatistics, Dispatcher, RouteReason, RoutingDecision, RoutingOptions};
