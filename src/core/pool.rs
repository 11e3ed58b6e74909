/// Fixed pool of backend connections
use crate::core::{BackendConnection, ConnectOptions, Connector, Endpoint};
use crate::error::{RouterError, RouterResult};
use crate::routing::balancer::LoadBalancingAlgorithm;
use std::collections::HashMap;
use std::sync::Arc;

/// The ordered set of backend connections established at construction.
///
/// Membership never changes after construction; the first connection is
/// the primary used for delegated operations.
pub struct ConnectionPool {
    connections: Vec<Arc<dyn BackendConnection>>,
    by_identity: HashMap<String, usize>,
}

impl ConnectionPool {
    pub fn new(connections: Vec<Arc<dyn BackendConnection>>) -> RouterResult<Self> {
        if connections.is_empty() {
            return Err(RouterError::NoBackends);
        }

        let mut by_identity = HashMap::with_capacity(connections.len());
        for (index, connection) in connections.iter().enumerate() {
            let identity = connection.identity().to_string();
            if by_identity.insert(identity.clone(), index).is_some() {
                return Err(RouterError::DuplicateBackend { identity });
            }
        }

        Ok(Self {
            connections,
            by_identity,
        })
    }

    /// Connect to every endpoint in order
    pub async fn connect(
        endpoints: &[Endpoint],
        default_db: &str,
        options: &ConnectOptions,
        connector: &dyn Connector,
    ) -> RouterResult<Self> {
        let mut connections = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let connection = connector.connect(endpoint, default_db, options).await?;
            log::info!("Connected to backend {}", connection.identity());
            connections.push(connection);
        }
        Self::new(connections)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connections in pool order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn BackendConnection>> {
        self.connections.iter()
    }

    pub fn identities(&self) -> Vec<&str> {
        self.connections.iter().map(|c| c.identity()).collect()
    }

    pub fn get(&self, identity: &str) -> Option<&Arc<dyn BackendConnection>> {
        self.by_identity
            .get(identity)
            .map(|&index| &self.connections[index])
    }

    pub fn primary(&self) -> &Arc<dyn BackendConnection> {
        &self.connections[0]
    }

    /// Let the balancer choose a connection
    pub fn pick(&self, balancer: &dyn LoadBalancingAlgorithm) -> Option<&Arc<dyn BackendConnection>> {
        balancer
            .select_backend(self.connections.len())
            .and_then(|index| self.connections.get(index))
    }

    /// The connection that follows `identity` in pool order, wrapping around
    pub fn next_after(&self, identity: &str) -> RouterResult<&Arc<dyn BackendConnection>> {
        if self.connections.len() < 2 {
            return Err(RouterError::NotEnoughBackends {
                operation: "next_after".to_string(),
            });
        }
        let index = self
            .by_identity
            .get(identity)
            .ok_or_else(|| RouterError::UnknownBackend {
                identity: identity.to_string(),
            })?;
        Ok(&self.connections[(index + 1) % self.connections.len()])
    }
}
