//! Scripted `FleetApi` used by the engine, discovery and REST tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flux_sweeper::domain::automation::{AutomationEngine, AutomationSettings};
use flux_sweeper::domain::fleet_api::FleetApi;
use flux_sweeper::domain::node::Node;
use flux_sweeper::domain::types::{ApiError, Credential, RemovalOutcome, Workload};
use flux_sweeper::logging::Logger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub node_id: String,
    pub app: String,
    pub token: Option<String>,
}

#[derive(Default)]
pub struct FakeApi {
    alive: Mutex<HashSet<String>>,
    workloads: Mutex<HashMap<String, Vec<Workload>>>,
    failing_lists: Mutex<HashSet<String>>,
    outcomes: Mutex<HashMap<String, RemovalOutcome>>,
    list_calls: Mutex<HashMap<String, usize>>,
    removals: Mutex<Vec<Removal>>,
    remove_delay: Mutex<Duration>,
}

impl FakeApi {
    pub fn set_alive(&self, urls: &[String]) {
        *self.alive.lock().unwrap() = urls.iter().cloned().collect();
    }

    pub fn set_workloads(&self, node_id: &str, names: &[&str]) {
        self.workloads.lock().unwrap().insert(
            node_id.to_string(),
            names.iter().map(|n| Workload::named(*n)).collect(),
        );
    }

    pub fn fail_listing(&self, node_id: &str) {
        self.failing_lists.lock().unwrap().insert(node_id.to_string());
    }

    pub fn set_outcome(&self, app: &str, outcome: RemovalOutcome) {
        self.outcomes.lock().unwrap().insert(app.to_string(), outcome);
    }

    pub fn set_remove_delay(&self, delay: Duration) {
        *self.remove_delay.lock().unwrap() = delay;
    }

    pub fn list_calls(&self, node_id: &str) -> usize {
        self.list_calls.lock().unwrap().get(node_id).copied().unwrap_or(0)
    }

    pub fn removals(&self) -> Vec<Removal> {
        self.removals.lock().unwrap().clone()
    }

    pub fn removed_apps(&self, node_id: &str) -> Vec<String> {
        self.removals()
            .into_iter()
            .filter(|r| r.node_id == node_id)
            .map(|r| r.app)
            .collect()
    }
}

impl FleetApi for FakeApi {
    async fn probe_exists(&self, api_url: &str) -> bool {
        self.alive.lock().unwrap().contains(api_url)
    }

    async fn list_running_apps(
        &self,
        node: &Node,
        _credential: Option<&Credential>,
    ) -> Result<Vec<Workload>, ApiError> {
        *self
            .list_calls
            .lock()
            .unwrap()
            .entry(node.id.clone())
            .or_default() += 1;

        if self.failing_lists.lock().unwrap().contains(&node.id) {
            return Err(ApiError::Status(502));
        }
        Ok(self
            .workloads
            .lock()
            .unwrap()
            .get(&node.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_app(
        &self,
        node: &Node,
        credential: Option<&Credential>,
        app_name: &str,
    ) -> RemovalOutcome {
        self.removals.lock().unwrap().push(Removal {
            node_id: node.id.clone(),
            app: app_name.to_string(),
            token: credential.map(|c| c.expose().to_string()),
        });

        let delay = *self.remove_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.outcomes
            .lock()
            .unwrap()
            .get(app_name)
            .cloned()
            .unwrap_or_else(|| RemovalOutcome::Success(r#"{"status":"success"}"#.to_string()))
    }
}

pub fn node(id: &str) -> Node {
    Node {
        id: id.to_string(),
        name: id.to_uppercase(),
        ui_url: format!("http://{id}.local:16126"),
        api_url: format!("http://{id}.local:16127"),
    }
}

pub fn settings(prefixes: &[&str]) -> AutomationSettings {
    AutomationSettings::new(
        Duration::from_secs(60),
        Duration::from_secs(5),
        prefixes.iter().map(|p| p.to_string()).collect(),
    )
}

/// Engine over a fresh fake with the given static nodes.
pub async fn engine_with_nodes(
    ids: &[&str],
    prefixes: &[&str],
) -> (Arc<AutomationEngine<FakeApi>>, Arc<FakeApi>, Arc<Logger>) {
    let api = Arc::new(FakeApi::default());
    let logger = Arc::new(Logger::in_memory(1000, false));
    let engine = Arc::new(AutomationEngine::new(
        api.clone(),
        logger.clone(),
        settings(prefixes),
    ));
    engine
        .register_static(ids.iter().map(|id| node(id)).collect())
        .await;
    (engine, api, logger)
}
