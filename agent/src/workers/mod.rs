//! Background workers

pub mod deployer;
pub mod janitor;
pub mod queue;
pub mod recovery;
