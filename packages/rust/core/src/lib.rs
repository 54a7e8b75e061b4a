//! Audit orchestration: prompt/response contract and the per-domain pipeline.

pub mod audit;
pub mod pipeline;

pub use audit::{
    AuditInvoker, AuditRequest, MAX_SCORE, RiskLevel, check_scorecard, render_cookie_inventory,
};
pub use pipeline::{
    AuditPipeline, AuditSummary, DomainOutcome, PipelineSettings, ProgressReporter, RunSummary,
    SilentProgress,
};
