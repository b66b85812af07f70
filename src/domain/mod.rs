pub mod automation;
pub mod discovery;
pub mod fleet_api;
pub mod node;
pub mod types;
