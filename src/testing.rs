//! Test doubles shared by the unit tests
use crate::core::document::{self, Document};
use crate::core::{BackendConnection, CommandOptions, ConnectOptions, Connector, Endpoint};
use crate::error::{BackendError, RouterError, RouterResult};
use crate::routing::balancer::LoadBalancingAlgorithm;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Backend that records every command and answers from a script,
/// falling back to `{ok: 1}` once the script runs out.
pub struct RecordingBackend {
    identity: String,
    received: Mutex<Vec<(String, Document)>>,
    script: Mutex<VecDeque<Result<Document, BackendError>>>,
}

impl RecordingBackend {
    pub fn new(identity: &str) -> Arc<Self> {
        Arc::new(Self {
            identity: identity.to_string(),
            received: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
        })
    }

    pub fn push_reply(&self, reply: Value) {
        let reply = reply.as_object().cloned().unwrap_or_default();
        self.script.lock().unwrap().push_back(Ok(reply));
    }

    pub fn push_failure(&self, message: &str) {
        let failure = BackendError::new(self.identity.clone(), message);
        self.script.lock().unwrap().push_back(Err(failure));
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn received(&self) -> Vec<Document> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }

    pub fn received_names(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|command| document::command_name(command).to_string())
            .collect()
    }

    pub fn received_dbs(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(db, _)| db.clone())
            .collect()
    }
}

#[async_trait]
impl BackendConnection for RecordingBackend {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn execute(
        &self,
        db: &str,
        command: Document,
        _options: &CommandOptions,
    ) -> Result<Document, BackendError> {
        self.received.lock().unwrap().push((db.to_string(), command));
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(json!({"ok": 1}).as_object().cloned().unwrap_or_default()),
        }
    }
}

/// Connector that hands out recording backends named after their endpoints
#[derive(Default)]
pub struct RecordingConnector {
    options: Mutex<ConnectOptions>,
    refused: Mutex<Vec<String>>,
}

impl RecordingConnector {
    pub fn options_seen(&self) -> ConnectOptions {
        self.options.lock().unwrap().clone()
    }

    /// Make later connections to `endpoint` fail
    pub fn refuse(&self, endpoint: &str) {
        self.refused.lock().unwrap().push(endpoint.to_string());
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        _default_db: &str,
        options: &ConnectOptions,
    ) -> RouterResult<Arc<dyn BackendConnection>> {
        *self.options.lock().unwrap() = options.clone();
        let endpoint_name = endpoint.to_string();
        if self.refused.lock().unwrap().contains(&endpoint_name) {
            return Err(RouterError::connect(endpoint_name, "connection refused"));
        }
        Ok(RecordingBackend::new(&endpoint.to_string()))
    }
}

/// Balancer that returns a fixed sequence of picks, then position 0
pub struct ScriptedBalancer {
    picks: Mutex<VecDeque<usize>>,
}

impl ScriptedBalancer {
    pub fn new(picks: &[usize]) -> Self {
        Self {
            picks: Mutex::new(picks.iter().copied().collect()),
        }
    }
}

impl LoadBalancingAlgorithm for ScriptedBalancer {
    fn select_backend(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let next = self.picks.lock().unwrap().pop_front().unwrap_or(0);
        Some(next % count)
    }
}
