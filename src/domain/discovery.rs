//! Discovery — find live Flux nodes on a set of IPs.
//!
//! A host runs at most [`SLOTS_PER_IP`] nodes. Slot `i` serves its UI on
//! `BASE_UI_PORT + 10·i` and its API one port above. All slots of an IP are
//! probed concurrently and all IPs are scanned concurrently; results keep
//! scan order (IP order, then slot order) and slots never short-circuit
//! each other.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::warn;

use super::fleet_api::FleetApi;
use super::node::Node;
use crate::logging::Logger;

pub const BASE_UI_PORT: u16 = 16126;
pub const PORT_STRIDE: u16 = 10;
pub const SLOTS_PER_IP: usize = 8;

/// Ports for slot `slot` (0-based): `(ui_port, api_port)`.
pub fn slot_ports(slot: usize) -> (u16, u16) {
    let ui = BASE_UI_PORT + PORT_STRIDE * slot as u16;
    (ui, ui + 1)
}

/// Id prefix for the IP at `position` (0-based) in the scan list.
pub fn ip_prefix(position: usize) -> String {
    format!("IP{}", position + 1)
}

fn host(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

/// Build the node that would live at `slot` on `ip`.
pub fn slot_node(ip: IpAddr, prefix: &str, slot: usize) -> Node {
    let (ui_port, api_port) = slot_ports(slot);
    let number = format!("{:02}", slot + 1);
    let host = host(ip);
    Node {
        id: format!("{prefix}-node{number}"),
        name: format!("{prefix}-Node{number}"),
        ui_url: format!("http://{host}:{ui_port}"),
        api_url: format!("http://{host}:{api_port}"),
    }
}

/// Probe every slot on one IP.
pub async fn discover_nodes_on_ip<A: FleetApi>(
    api: Arc<A>,
    ip: IpAddr,
    prefix: &str,
    logger: Arc<Logger>,
) -> Vec<Node> {
    logger.record(
        "DISCOVERY",
        &[format!("Scanning IP: {ip} with prefix {prefix}").into()],
    );

    let mut probes = JoinSet::new();
    for slot in 0..SLOTS_PER_IP {
        let node = slot_node(ip, prefix, slot);
        let api = api.clone();
        let logger = logger.clone();
        probes.spawn(async move {
            logger.record(
                "DISCOVERY",
                &[format!("Checking for node at {}...", node.api_url).into()],
            );
            let found = api.probe_exists(&node.api_url).await.then(|| {
                logger.record("DISCOVERY", &[format!("Found active node: {}", node.name).into()]);
                node
            });
            (slot, found)
        });
    }

    let mut slots: Vec<Option<Node>> = vec![None; SLOTS_PER_IP];
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((slot, found)) => slots[slot] = found,
            Err(e) => warn!(error = %e, ip = %ip, "discovery probe task failed"),
        }
    }

    slots.into_iter().flatten().collect()
}

/// Scan every IP and return the nodes found, in scan order.
pub async fn discover_all<A: FleetApi>(
    api: Arc<A>,
    ips: &[IpAddr],
    logger: Arc<Logger>,
) -> Vec<Node> {
    if ips.is_empty() {
        logger.record("DISCOVERY", &["No scan IPs configured, skipping discovery.".into()]);
        return Vec::new();
    }

    let mut scans = JoinSet::new();
    for (position, ip) in ips.iter().copied().enumerate() {
        let api = api.clone();
        let logger = logger.clone();
        scans.spawn(async move {
            let prefix = ip_prefix(position);
            (position, discover_nodes_on_ip(api, ip, &prefix, logger).await)
        });
    }

    let mut per_ip: Vec<Vec<Node>> = vec![Vec::new(); ips.len()];
    while let Some(joined) = scans.join_next().await {
        match joined {
            Ok((position, nodes)) => per_ip[position] = nodes,
            Err(e) => warn!(error = %e, "discovery scan task failed"),
        }
    }

    let nodes: Vec<Node> = per_ip.into_iter().flatten().collect();
    logger.record(
        "DISCOVERY",
        &[format!("Discovery finished: {} node(s) found on {} IP(s).", nodes.len(), ips.len()).into()],
    );
    nodes
}
