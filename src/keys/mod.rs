//! Provider-neutral key representation shared by inventory, planning and execution.

pub mod material;
pub mod models;

pub use models::{DeployKey, KeyOrigin, KeyRole, RepositoryTarget};
