//! Deployment engine: source sync, container lifecycle and compose

pub mod cleanup;
pub mod compose;
pub mod docker;
pub mod fsm;
pub mod git;
pub mod paths;
pub mod ports;
pub mod resources;
