pub mod cache;
pub mod queue;
pub mod tasks;

pub use cache::{KeyScope, QueryCache, QueryKey};
pub use queue::{
    DrainOutcome, DrainReport, Mutation, OfflineQueue, QueuedMutation, SkipReason, MAX_RETRIES,
};
pub use tasks::{MutationOutcome, ServiceError, ServiceParts, TasksService};
