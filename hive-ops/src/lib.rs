pub mod artifacts;
pub mod aws;
pub mod manifests;
pub mod poller;
