//! Natural-language query workflow.
//!
//! ```text
//!  Idle ──analyze──▶ Analyzed ──confirm + generate──▶ SqlGenerated ──execute──▶ Executed
//!    │                                                                            ▲
//!    └──────────────────────────── process (one-shot) ────────────────────────────┘
//! ```
//!
//! The caller carries [`QueryWorkflowState`] between calls; each request is
//! rebuilt from it.

mod classify;
mod orchestrator;
mod types;
mod workflow;

pub use classify::{classify, format_decimal, format_number, Classification, NumberLocale, ViewingType};
pub use orchestrator::QueryService;
pub use types::{
    AnalysisResult, AnalyzeRequest, CombinedResult, ExecuteRequest, Failure, GenerateRequest,
    ProcessStage, QueryExecutionResult, SqlGenerationResult,
};
pub use workflow::{QueryWorkflowState, WorkflowStage};
