//! Connectivity probe.

use std::time::Duration;

/// Host resolved to decide whether the machine has outside connectivity.
pub const PROBE_HOST: &str = "google.com";

/// True when `PROBE_HOST` resolves within `timeout`.
pub async fn has_internet(timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, tokio::net::lookup_host((PROBE_HOST, 80))).await {
        Ok(Ok(mut addrs)) => addrs.next().is_some(),
        _ => false,
    }
}
