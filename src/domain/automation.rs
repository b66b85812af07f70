//! Node automation engine — per-node credential lifecycle and the recurring
//! poll → match → remove cycle.
//!
//! Every node owns a record behind its own mutex plus a `watch` channel that
//! carries the record's current generation. Setting a credential on an idle
//! node bumps the generation and spawns one worker task bound to it:
//!
//! ```text
//!   Idle/Suspended --login--> Starting --settle delay--> Running
//!   Running --logout--> Idle          (external clear)
//!   Running --auth-rejected removal--> Suspended   (reactive clear)
//! ```
//!
//! Clearing a credential bumps the generation again, which wakes the worker
//! out of any wait and makes every later generation check fail. The worker
//! re-checks before each cycle and before each removal, so a cycle that is
//! mid-flight finishes its current request and then stops. Cycles of one
//! node run on that single task and therefore never overlap.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::discovery;
use super::fleet_api::FleetApi;
use super::node::{AutomationState, DiscoveryStatus, Node, NodeSet, NodeSummary};
use super::types::{Credential, RemovalOutcome};
use crate::logging::Logger;

pub const MIN_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct AutomationSettings {
    /// Time between cycle starts. Never below [`MIN_INTERVAL`].
    pub interval: Duration,
    /// Wait between a login and the first cycle.
    pub settle_delay: Duration,
    pub target_prefixes: Vec<String>,
}

impl AutomationSettings {
    pub fn new(interval: Duration, settle_delay: Duration, target_prefixes: Vec<String>) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            settle_delay,
            target_prefixes,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown node '{0}'")]
    UnknownNode(String),
}

/// Drop one leading `/` from a container name.
pub fn strip_leading_separator(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// Name of the app to remove for the container `name`, if it matches any
/// prefix: the text after the last `_` of the stripped name, or the whole
/// stripped name when there is no (non-empty) tail.
pub fn removal_target<'a>(name: &'a str, prefixes: &[String]) -> Option<&'a str> {
    let stripped = strip_leading_separator(name);
    let matched = prefixes
        .iter()
        .any(|p| !p.is_empty() && stripped.contains(p.as_str()));
    if !matched {
        return None;
    }

    match stripped.rsplit_once('_') {
        Some((_, tail)) if !tail.is_empty() => Some(tail),
        _ => Some(stripped),
    }
}

struct NodeRecord {
    discovery: DiscoveryStatus,
    credential: Option<Credential>,
    state: AutomationState,
    generation: u64,
    task: Option<JoinHandle<()>>,
    last_cycle_at: Option<DateTime<Utc>>,
    removed_total: u64,
}

struct NodeSlot {
    node: Node,
    record: Mutex<NodeRecord>,
    cancel: watch::Sender<u64>,
}

impl NodeSlot {
    fn new(node: Node, discovery: DiscoveryStatus) -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            node,
            record: Mutex::new(NodeRecord {
                discovery,
                credential: None,
                state: AutomationState::Idle,
                generation: 0,
                task: None,
                last_cycle_at: None,
                removed_total: 0,
            }),
            cancel,
        }
    }

    async fn summary(&self) -> NodeSummary {
        let rec = self.record.lock().await;
        NodeSummary {
            node: self.node.clone(),
            discovery: rec.discovery,
            state: rec.state,
            has_credential: rec.credential.is_some(),
            cycle_scheduled: rec.task.as_ref().is_some_and(|t| !t.is_finished()),
            last_cycle_at: rec.last_cycle_at,
            removed_total: rec.removed_total,
        }
    }

    /// Invalidate the current generation and wake its worker.
    fn cancel_current(&self, rec: &mut NodeRecord) {
        rec.generation += 1;
        rec.task = None;
        self.cancel.send_replace(rec.generation);
    }
}

pub struct AutomationEngine<A: FleetApi> {
    api: Arc<A>,
    logger: Arc<Logger>,
    settings: Arc<AutomationSettings>,
    nodes: RwLock<Vec<Arc<NodeSlot>>>,
    node_set: watch::Sender<NodeSet>,
}

impl<A: FleetApi> AutomationEngine<A> {
    pub fn new(api: Arc<A>, logger: Arc<Logger>, settings: AutomationSettings) -> Self {
        let (node_set, _) = watch::channel(NodeSet::default());
        Self {
            api,
            logger,
            settings: Arc::new(settings),
            nodes: RwLock::new(Vec::new()),
            node_set,
        }
    }

    /// Register nodes declared in configuration.
    pub async fn register_static(&self, nodes: Vec<Node>) {
        {
            let mut slots = self.nodes.write().await;
            for node in nodes {
                if slots.iter().any(|s| s.node.id == node.id) {
                    continue;
                }
                slots.push(Arc::new(NodeSlot::new(node, DiscoveryStatus::Static)));
            }
        }
        self.publish().await;
    }

    /// Merge a discovery result into the known set. Existing records keep
    /// their credential and state; discovered nodes that did not answer
    /// this time are marked unreachable.
    pub async fn apply_discovery(&self, found: Vec<Node>) {
        {
            let mut slots = self.nodes.write().await;
            for slot in slots.iter() {
                let mut rec = slot.record.lock().await;
                let seen = found.iter().any(|n| n.id == slot.node.id);
                rec.discovery = match (seen, rec.discovery) {
                    (true, _) => DiscoveryStatus::Online,
                    (false, DiscoveryStatus::Static) => DiscoveryStatus::Static,
                    (false, _) => DiscoveryStatus::Unreachable,
                };
            }
            for node in found {
                if !slots.iter().any(|s| s.node.id == node.id) {
                    slots.push(Arc::new(NodeSlot::new(node, DiscoveryStatus::Online)));
                }
            }
        }
        self.publish().await;
    }

    /// Scan `ips` and merge the result. Returns the published node set.
    pub async fn discover(&self, ips: &[std::net::IpAddr]) -> NodeSet {
        let found = discovery::discover_all(self.api.clone(), ips, self.logger.clone()).await;
        self.apply_discovery(found).await;
        self.node_set.borrow().clone()
    }

    /// Inbound "credential changed" event for one node.
    pub async fn handle_auth(
        &self,
        node_id: &str,
        logged_in: bool,
        token: Option<String>,
    ) -> Result<AutomationState, EngineError> {
        let slot = self
            .slot(node_id)
            .await
            .ok_or_else(|| EngineError::UnknownNode(node_id.to_string()))?;
        let prefix = format!("MAIN-{node_id}");
        let credential = if logged_in {
            token.and_then(Credential::new)
        } else {
            None
        };

        let mut rec = slot.record.lock().await;
        match credential {
            Some(credential) => {
                self.logger.record(&prefix, &["Received LOGIN notification.".into()]);
                rec.credential = Some(credential);

                if rec.state.is_active() {
                    self.logger.record(
                        &prefix,
                        &["Automation already active, keeping the current schedule.".into()],
                    );
                    return Ok(rec.state);
                }

                rec.generation += 1;
                rec.state = AutomationState::Starting;
                slot.cancel.send_replace(rec.generation);

                self.logger.record(
                    &prefix,
                    &[format!(
                        "Starting automation in {}s...",
                        self.settings.settle_delay.as_secs()
                    )
                    .into()],
                );
                let worker = NodeWorker {
                    slot: slot.clone(),
                    api: self.api.clone(),
                    logger: self.logger.clone(),
                    settings: self.settings.clone(),
                    generation: rec.generation,
                };
                rec.task = Some(tokio::spawn(worker.run()));
            }
            None => {
                if logged_in {
                    self.logger.record(
                        &prefix,
                        &["LOGIN notification without a token, treating as logout.".into()],
                    );
                } else {
                    self.logger.record(&prefix, &["Received LOGOUT notification.".into()]);
                }
                rec.credential = None;
                if rec.state.is_active() {
                    self.logger.record(&prefix, &["Stopping automation...".into()]);
                    slot.cancel_current(&mut rec);
                }
                rec.state = AutomationState::Idle;
            }
        }

        Ok(rec.state)
    }

    pub async fn state(&self, node_id: &str) -> Option<AutomationState> {
        let slot = self.slot(node_id).await?;
        let state = slot.record.lock().await.state;
        Some(state)
    }

    pub async fn node_summary(&self, node_id: &str) -> Option<NodeSummary> {
        let slot = self.slot(node_id).await?;
        Some(slot.summary().await)
    }

    /// Fresh view of every node, in registration order.
    pub async fn node_set(&self) -> NodeSet {
        let slots = self.nodes.read().await.clone();
        let mut nodes = Vec::with_capacity(slots.len());
        for slot in &slots {
            nodes.push(slot.summary().await);
        }
        NodeSet {
            active_node_id: nodes.first().map(|n| n.node.id.clone()),
            nodes,
        }
    }

    /// Receives a new value after every discovery or registration.
    pub fn subscribe_nodes(&self) -> watch::Receiver<NodeSet> {
        self.node_set.subscribe()
    }

    /// Cancel every node's schedule and drop its credential. In-flight
    /// requests are aborted; every node ends up Idle.
    pub async fn shutdown(&self) {
        let slots = self.nodes.read().await.clone();
        for slot in slots {
            let mut rec = slot.record.lock().await;
            let task = rec.task.take();
            slot.cancel_current(&mut rec);
            rec.credential = None;
            rec.state = AutomationState::Idle;
            if let Some(task) = task {
                task.abort();
            }
        }
        info!("automation engine stopped");
    }

    async fn slot(&self, node_id: &str) -> Option<Arc<NodeSlot>> {
        self.nodes
            .read()
            .await
            .iter()
            .find(|s| s.node.id == node_id)
            .cloned()
    }

    async fn publish(&self) {
        let set = self.node_set().await;
        info!(
            nodes = set.nodes.len(),
            active = ?set.active_node_id,
            "node set changed"
        );
        self.node_set.send_replace(set);
    }
}

enum CycleEnd {
    Completed,
    Cancelled,
    Suspended,
}

/// The task that owns one generation of a node's schedule.
struct NodeWorker<A: FleetApi> {
    slot: Arc<NodeSlot>,
    api: Arc<A>,
    logger: Arc<Logger>,
    settings: Arc<AutomationSettings>,
    generation: u64,
}

impl<A: FleetApi> NodeWorker<A> {
    async fn run(self) {
        let mut cancel = self.slot.cancel.subscribe();

        tokio::select! {
            _ = tokio::time::sleep(self.settings.settle_delay) => {}
            _ = cancelled(&mut cancel, self.generation) => return,
        }

        {
            let mut rec = self.slot.record.lock().await;
            if rec.generation != self.generation || rec.credential.is_none() {
                return;
            }
            rec.state = AutomationState::Running;
        }
        self.log("Automation running.");

        // First tick completes immediately.
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancelled(&mut cancel, self.generation) => return,
            }
            match self.run_cycle().await {
                CycleEnd::Completed => {}
                CycleEnd::Cancelled | CycleEnd::Suspended => return,
            }
        }
    }

    async fn run_cycle(&self) -> CycleEnd {
        let Some(credential) = self.current_credential().await else {
            return CycleEnd::Cancelled;
        };

        self.log("Checking for target applications to remove...");
        let workloads = match self
            .api
            .list_running_apps(&self.slot.node, Some(&credential))
            .await
        {
            Ok(workloads) => workloads,
            Err(_) => {
                if self.current_credential().await.is_some() {
                    self.log("Could not retrieve running apps. API might be down.");
                }
                self.finish_cycle(0).await;
                return CycleEnd::Completed;
            }
        };

        let mut removed = 0;
        let mut end = CycleEnd::Completed;
        for workload in &workloads {
            let Some(name) = workload.display_name() else {
                continue;
            };
            let Some(target) = removal_target(name, &self.settings.target_prefixes) else {
                continue;
            };
            let Some(credential) = self.current_credential().await else {
                self.log("Credential cleared, abandoning the rest of this cycle.");
                end = CycleEnd::Cancelled;
                break;
            };

            self.log(&format!(
                "Found target app component: {}. Attempting to remove main app: {}...",
                strip_leading_separator(name),
                target
            ));
            match self
                .api
                .remove_app(&self.slot.node, Some(&credential), target)
                .await
            {
                RemovalOutcome::Success(_) => {
                    removed += 1;
                    self.log(&format!("Successfully removed {target}."));
                }
                RemovalOutcome::SoftFail {
                    message,
                    auth_error: true,
                } => {
                    self.suspend(&message).await;
                    end = CycleEnd::Suspended;
                    break;
                }
                RemovalOutcome::SoftFail { message, .. } => {
                    self.log(&format!("Failed to remove {target}: {message}"));
                }
                RemovalOutcome::TransportFail(message) => {
                    self.log(&format!("Could not reach node to remove {target}: {message}"));
                }
            }
        }

        self.finish_cycle(removed).await;
        end
    }

    /// The credential, if this worker's generation is still current.
    async fn current_credential(&self) -> Option<Credential> {
        let rec = self.slot.record.lock().await;
        if rec.generation != self.generation {
            return None;
        }
        rec.credential.clone()
    }

    /// Reactive invalidation: the remote rejected the credential.
    async fn suspend(&self, reason: &str) {
        let mut rec = self.slot.record.lock().await;
        if rec.generation != self.generation {
            return;
        }
        rec.credential = None;
        rec.state = AutomationState::Suspended;
        self.slot.cancel_current(&mut rec);
        drop(rec);

        self.log(&format!(
            "Auth token was rejected ({reason}). Automation paused until the next login."
        ));
    }

    async fn finish_cycle(&self, removed: u64) {
        let mut rec = self.slot.record.lock().await;
        rec.last_cycle_at = Some(Utc::now());
        rec.removed_total += removed;
    }

    fn log(&self, message: &str) {
        self.logger
            .record(&format!("AUTOMATION-{}", self.slot.node.id), &[message.into()]);
    }
}

/// Resolves once the node's generation moves past `generation`.
async fn cancelled(rx: &mut watch::Receiver<u64>, generation: u64) {
    loop {
        if *rx.borrow_and_update() != generation {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
