//! Application layer: the scoring worker loop.

pub mod scoring_worker;

pub use scoring_worker::{
    CycleReport, FamilyFailure, FamilyResult, JobError, JobOutcome, JobReport, ScoringWorker,
    WorkerOptions, WorkerState,
};
