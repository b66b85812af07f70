//! Node — one managed Flux endpoint and its automation state.
//!
//! `Node` is the immutable identity produced by discovery or static config.
//! The mutable half (credential, cycle handle, counters) lives in the
//! engine's per-node record; `NodeSummary` is the read-only view of both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a managed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable id, e.g. `IP1-node03`.
    pub id: String,
    pub name: String,
    /// Web UI address. Opaque here; only the presentation layer uses it.
    pub ui_url: String,
    /// Management API base address.
    pub api_url: String,
}

/// How the node entered (or left) the known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    /// Answered the most recent scan.
    Online,
    /// Declared in configuration, never scanned.
    Static,
    /// Answered an earlier scan but not the latest one.
    Unreachable,
}

/// Per-node credential lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationState {
    /// No credential, no cycle.
    Idle,
    /// Credential set, waiting out the settle delay before the first cycle.
    Starting,
    /// Cycle armed and executing on its interval.
    Running,
    /// Was running until a cycle saw the credential rejected.
    Suspended,
}

impl AutomationState {
    pub fn is_active(self) -> bool {
        matches!(self, AutomationState::Starting | AutomationState::Running)
    }
}

/// Read-only view of a node for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    #[serde(flatten)]
    pub node: Node,
    pub discovery: DiscoveryStatus,
    pub state: AutomationState,
    pub has_credential: bool,
    pub cycle_scheduled: bool,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub removed_total: u64,
}

/// "Node set changed" notification: ordered nodes plus the initially active one.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeSet {
    pub nodes: Vec<NodeSummary>,
    pub active_node_id: Option<String>,
}
