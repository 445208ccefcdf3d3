//! Workflow engine — routes a deal query to an advisory pipeline and runs
//! its steps one at a time against a reasoning service.
//!
//! # Architecture
//!
//! ```text
//! query ──► Classifier ──► WorkflowType ──► WorkflowCatalog ──► [StepSpec]
//!                                                                   │
//!                        ExecutionEngine ◄──────────────────────────┘
//!                          │        │
//!              StepInvoker │        │ RunRecorder (SQLite)
//!                          ▼
//!                 ReasoningService (HTTP: Anthropic / OpenAI-compatible)
//! ```

pub mod catalog;
pub mod classifier;
pub mod context;
pub mod engine;
pub mod invoker;
pub mod prompts;
pub mod reasoning;
pub mod recorder;

pub use catalog::{CatalogError, ContextField, StepSpec, WorkflowCatalog};
pub use classifier::{Classification, Classifier};
pub use context::DealContext;
pub use engine::{CancelHandle, ExecutionEngine, FailureCause, RunOutcome};
pub use invoker::StepInvoker;
pub use prompts::{PromptLibrary, PromptTemplate};
pub use reasoning::{
    FieldValue, HttpReasoningClient, InputField, Provider, ReasoningConfig, ReasoningError,
    ReasoningRequest, ReasoningService,
};
pub use recorder::{RunRecorder, RunSnapshot, SqliteRunRecorder};
