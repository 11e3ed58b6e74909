/// Stateful command routing across interchangeable mongos routers
///
/// The dispatcher presents one logical connection while fanning commands
/// out over a fixed pool. It keeps three guarantees a plain random
/// dispatcher would break:
/// - cursor continuity: continuations reach the router that opened the cursor
/// - transaction continuity: a (session, txnNumber) pair stays on one router
/// - causal ordering: outgoing `$clusterTime` never lags behind what any
///   router has reported
pub mod balancer;
pub mod classifier;
pub mod clock;
pub mod cursor;
pub mod session;

use crate::config::Config;
use crate::core::document::{self, ClusterTime, CursorId, Document};
use crate::core::{BackendConnection, CommandOptions, ConnectOptions, ConnectionPool, Connector, Endpoint};
use crate::error::{RouterError, RouterResult};
use balancer::{LoadBalancingAlgorithm, UniformRandom};
use classifier::{classify, Affinity, Disposition};
use clock::ClockSynchronizer;
use cursor::CursorAffinityTable;
use session::SessionAffinityTable;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

/// Why a command was sent to a particular backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    /// Continues a cursor opened on that backend
    Cursor,
    /// Belongs to a transaction pinned to that backend
    Session,
}

/// Result type for routing decisions
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// Never sent; the command is unsafe to distribute
    Reject { field: String, reason: String },
    /// Sent to every backend in pool order
    Broadcast { backends: Vec<String> },
    /// Sent to a specific pinned backend
    Route { backend_id: String, reason: RouteReason },
    /// Sent to a uniformly random backend
    Any,
}

/// Routing behaviour switches
#[derive(Debug, Clone, Default)]
pub struct RoutingOptions {
    /// Drop a cursor pin once the cursor is exhausted or killed
    pub evict_exhausted_cursors: bool,
}

/// Statistics about current pins
#[derive(Debug, Clone)]
pub struct AffinityStatistics {
    pub total_sessions: usize,
    pub total_cursors: usize,
    pub backend_distribution: HashMap<String, usize>,
    pub cluster_time: Option<ClusterTime>,
    pub oldest_session_pin: Option<SystemTime>,
    pub oldest_cursor_pin: Option<SystemTime>,
}

impl AffinityStatistics {
    /// How long the oldest pin of either kind has been held
    pub fn oldest_pin_age(&self) -> Option<Duration> {
        let oldest = match (self.oldest_session_pin, self.oldest_cursor_pin) {
            (Some(a), Some(b)) => a.min(b),
            (a, b) => a.or(b)?,
        };
        Some(oldest.elapsed().unwrap_or_default())
    }
}

/// Everything mutated on the resolve-then-record path, behind one lock
#[derive(Debug, Default)]
struct RoutingState {
    sessions: SessionAffinityTable,
    cursors: CursorAffinityTable,
    clock: ClockSynchronizer,
}

impl RoutingState {
    /// Pinned backend for a command's affinity keys. Cursor pins win
    /// over session pins because cursors never leave their router.
    fn resolve(&self, affinity: &Affinity) -> Option<(String, RouteReason)> {
        if let Some(cursor_id) = affinity.cursor {
            match self.cursors.resolve(cursor_id) {
                Some(backend_id) => return Some((backend_id.to_string(), RouteReason::Cursor)),
                None => log::warn!(
                    "Cursor {} was not opened through this router; any backend may answer",
                    cursor_id
                ),
            }
        }

        if let Some(key) = &affinity.session {
            if let Some(backend_id) = self.sessions.resolve(key) {
                return Some((backend_id.to_string(), RouteReason::Session));
            }
        }

        None
    }
}

/// The command router
pub struct Dispatcher {
    pool: ConnectionPool,
    default_db: String,
    balancer: Box<dyn LoadBalancingAlgorithm>,
    options: RoutingOptions,
    state: Mutex<RoutingState>,
}

impl Dispatcher {
    pub fn new<S: Into<String>>(pool: ConnectionPool, default_db: S) -> Self {
        Self {
            pool,
            default_db: default_db.into(),
            balancer: Box::new(UniformRandom::new()),
            options: RoutingOptions::default(),
            state: Mutex::new(RoutingState::default()),
        }
    }

    pub fn with_balancer(mut self, balancer: Box<dyn LoadBalancingAlgorithm>) -> Self {
        self.balancer = balancer;
        self
    }

    pub fn with_options(mut self, options: RoutingOptions) -> Self {
        self.options = options;
        self
    }

    /// Connect to every endpoint and bind a dispatcher to the resulting pool
    pub async fn connect(
        endpoints: &[Endpoint],
        default_db: &str,
        options: &str,
        connector: &dyn Connector,
    ) -> RouterResult<Self> {
        let options = ConnectOptions::parse(options)?;
        let pool = ConnectionPool::connect(endpoints, default_db, &options, connector).await?;
        log::info!(
            "Routing {} over {} backends: {}",
            default_db,
            pool.len(),
            pool.identities().join(",")
        );
        Ok(Self::new(pool, default_db))
    }

    /// Build a dispatcher from a validated configuration file
    pub async fn from_config(config: &Config, connector: &dyn Connector) -> RouterResult<Self> {
        config.validate()?;
        let endpoints = config.endpoints()?;
        let dispatcher = Self::connect(
            &endpoints,
            &config.router.default_db,
            &config.router.options,
            connector,
        )
        .await?;

        let balancer: Box<dyn LoadBalancingAlgorithm> = match config.routing.seed {
            Some(seed) => Box::new(UniformRandom::seeded(seed)),
            None => Box::new(UniformRandom::new()),
        };
        Ok(dispatcher.with_balancer(balancer).with_options(RoutingOptions {
            evict_exhausted_cursors: config.routing.evict_exhausted_cursors,
        }))
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn default_db(&self) -> &str {
        &self.default_db
    }

    /// Connection-string style name: identities joined by commas
    pub fn name(&self) -> String {
        self.pool.identities().join(",")
    }

    /// Run a command, routing it according to its classification
    pub async fn execute(
        &self,
        db: &str,
        command: Document,
        options: &CommandOptions,
    ) -> RouterResult<Document> {
        let affinity = match classify(&command) {
            Disposition::Unsupported { field, reason } => {
                log::warn!(
                    "Rejected {} before dispatch: '{}' {}",
                    document::command_name(&command),
                    field,
                    reason
                );
                return Err(RouterError::Unsupported { field, reason });
            }
            Disposition::Broadcast => return self.broadcast(db, command, options).await,
            Disposition::Affine(affinity) => affinity,
            Disposition::Free => Affinity::default(),
        };

        self.dispatch(db, command, options, affinity).await
    }

    pub async fn run_command(&self, db: &str, command: Document) -> RouterResult<Document> {
        self.execute(db, command, &CommandOptions::none()).await
    }

    pub async fn admin_command(&self, command: Document) -> RouterResult<Document> {
        self.run_command("admin", command).await
    }

    /// Run an operation the router does not understand against the
    /// primary connection.
    pub async fn delegate<F, Fut, T>(&self, operation: &str, f: F) -> T
    where
        F: FnOnce(Arc<dyn BackendConnection>) -> Fut,
        Fut: Future<Output = T>,
    {
        let primary = Arc::clone(self.pool.primary());
        log::debug!("Delegating {} to primary {}", operation, primary.identity());
        f(primary).await
    }

    /// Where `command` would go right now. Does not modify any pin.
    pub async fn route(&self, command: &Document) -> RoutingDecision {
        match classify(command) {
            Disposition::Unsupported { field, reason } => RoutingDecision::Reject { field, reason },
            Disposition::Broadcast => RoutingDecision::Broadcast {
                backends: self.pool.identities().into_iter().map(String::from).collect(),
            },
            Disposition::Affine(affinity) => match self.state.lock().await.resolve(&affinity) {
                Some((backend_id, reason)) => RoutingDecision::Route { backend_id, reason },
                None => RoutingDecision::Any,
            },
            Disposition::Free => RoutingDecision::Any,
        }
    }

    pub async fn cluster_time(&self) -> Option<ClusterTime> {
        self.state.lock().await.clock.current()
    }

    pub async fn statistics(&self) -> AffinityStatistics {
        let state = self.state.lock().await;
        let mut backend_distribution = state.sessions.backend_distribution();
        for (backend_id, count) in state.cursors.backend_distribution() {
            *backend_distribution.entry(backend_id).or_insert(0) += count;
        }

        AffinityStatistics {
            total_sessions: state.sessions.len(),
            total_cursors: state.cursors.len(),
            backend_distribution,
            cluster_time: state.clock.current(),
            oldest_session_pin: state.sessions.oldest_pin(),
            oldest_cursor_pin: state.cursors.oldest_pin(),
        }
    }

    async fn dispatch(
        &self,
        db: &str,
        command: Document,
        options: &CommandOptions,
        affinity: Affinity,
    ) -> RouterResult<Document> {
        let name = document::command_name(&command).to_string();
        let kills_cursor = command.contains_key("killCursors");

        // Resolve, pin and correct under one lock so two commands opening
        // the same transaction cannot pin it to different backends.
        let (backend, outgoing) = {
            let mut state = self.state.lock().await;

            let pinned = state
                .resolve(&affinity)
                .and_then(|(backend_id, reason)| {
                    self.pool.get(&backend_id).map(|backend| (backend, Some(reason)))
                });
            let (backend, reason) = match pinned {
                Some(found) => found,
                None => (
                    self.pool.pick(self.balancer.as_ref()).ok_or(RouterError::NoBackends)?,
                    None,
                ),
            };

            if let Some(key) = &affinity.session {
                if state.sessions.resolve(key).is_none() {
                    state.sessions.record(key, backend.identity());
                }
            }

            log::debug!(
                "Routing {} to {} ({})",
                name,
                backend.identity(),
                match reason {
                    Some(RouteReason::Cursor) => "cursor",
                    Some(RouteReason::Session) => "session",
                    None => "random",
                }
            );
            (Arc::clone(backend), state.clock.correct(command))
        };

        let reply = backend.execute(db, outgoing, options).await?;

        let mut state = self.state.lock().await;
        state.clock.observe_reply(&reply);
        match affinity.cursor {
            None => {
                if let Some(cursor_id) = CursorId::from_reply(&reply) {
                    state.cursors.record(cursor_id, backend.identity());
                }
            }
            Some(cursor_id) if self.options.evict_exhausted_cursors => {
                let exhausted = CursorId::from_reply(&reply).is_some_and(|id| id.is_none());
                let killed = kills_cursor && document::is_ok(&reply);
                if exhausted || killed {
                    state.cursors.remove(cursor_id);
                }
            }
            Some(_) => {}
        }

        Ok(reply)
    }

    /// Send to every backend in pool order, stopping at the first not-ok reply
    async fn broadcast(
        &self,
        db: &str,
        command: Document,
        options: &CommandOptions,
    ) -> RouterResult<Document> {
        let name = document::command_name(&command).to_string();
        let mut last_reply = None;

        for backend in self.pool.iter() {
            let outgoing = self.state.lock().await.clock.correct(command.clone());
            log::debug!("Broadcasting {} to {}", name, backend.identity());

            let reply = backend.execute(db, outgoing, options).await?;
            self.state.lock().await.clock.observe_reply(&reply);

            if !document::is_ok(&reply) {
                log::warn!(
                    "Broadcast of {} failed on {}; remaining backends skipped",
                    name,
                    backend.identity()
                );
                return Ok(reply);
            }
            last_reply = Some(reply);
        }

        last_reply.ok_or(RouterError::NoBackends)
    }
}
