//! The remote node API as the engine and discovery see it.
//!
//! `client::FluxClient` is the HTTP implementation; tests drive the engine
//! with scripted implementations.

use std::future::Future;

use super::node::Node;
use super::types::{ApiError, Credential, RemovalOutcome, Workload};

pub trait FleetApi: Send + Sync + 'static {
    /// True when anything answers at `api_url`. Never fails.
    fn probe_exists(&self, api_url: &str) -> impl Future<Output = bool> + Send;

    /// Running workloads on `node`. Errors are already logged by the
    /// implementation; callers treat them as "nothing to do this cycle".
    fn list_running_apps(
        &self,
        node: &Node,
        credential: Option<&Credential>,
    ) -> impl Future<Output = Result<Vec<Workload>, ApiError>> + Send;

    /// Ask `node` to remove the application `app_name`.
    fn remove_app(
        &self,
        node: &Node,
        credential: Option<&Credential>,
        app_name: &str,
    ) -> impl Future<Output = RemovalOutcome> + Send;
}
