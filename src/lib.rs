//! flux-sweeper — discovers Flux nodes on the local network and keeps them
//! clear of stuck workloads.

pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod logging;
pub mod net;
pub mod server;
