//! Record models

pub mod draft;
pub mod job;
pub mod project;

pub use draft::{Detection, DraftType, ProjectDraft};
pub use job::{Job, JobStatus, JobType};
pub use project::{DeployType, EffectiveDeployType, Project, ProjectStatus};
