pub mod artifact;
pub mod biblio;
pub mod compare;
pub mod config;
pub mod error;
pub mod expand;
pub mod extract;
pub mod http;
pub mod identity;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod ranking;
pub mod scholar;
pub mod types;

pub use config::PipelineConfig;
pub use error::{FailureKind, Stage, StageFailure};
pub use pipeline::{Pipeline, PipelineOutcome, Services};
pub use types::{Handoff, ResultBundle};
