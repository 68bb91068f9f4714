pub mod app;
pub mod capture;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod database;
pub mod history;
pub mod llm;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod parser;
pub mod repository;
pub mod services;
pub mod stats;
pub mod store;

pub use app::App;
pub use capture::{CaptureError, TaskDraft, TaskPatch};
pub use config::{AppConfig, LlmSettings};
pub use history::{HistoryError, HistoryResponse, HistoryService};
pub use model::*;
pub use parser::{ParseFailure, ParseResponse, TaskParser};
pub use repository::{RepositoryError, TaskApi, TaskRepository};
pub use services::{DrainOutcome, MutationOutcome, ServiceError, TasksService};
pub use stats::TaskStats;
