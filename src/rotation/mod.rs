//! Per-repository key rotation: inventory, planning, execution and scheduling.

pub mod executor;
pub mod inventory;
pub mod outcome;
pub mod planner;
pub mod scheduler;

pub use executor::RotationExecutor;
pub use inventory::{InventorySnapshot, KeyInventory};
pub use outcome::{DeletionFailure, RotationOutcome, RotationPhase, RotationStatus, RunSummary};
pub use planner::{ReconciliationPlan, ReconciliationPlanner, RetainedPair, RotationPolicy};
pub use scheduler::{RepositoryScheduler, RotationPipeline};
