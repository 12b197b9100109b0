//! Grading policies: registry, resolution, letter-grade calculation, late penalties, and
//! weighted aggregation, plus the HTTP surface and CSV batch grading built on top of them.

pub mod aggregate;
pub mod batch;
pub mod calculator;
pub mod domain;
pub mod late;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod service;
pub mod standard;
pub mod store;
pub mod validation;

#[cfg(test)]
mod tests;

pub use aggregate::{
    aggregate_weighted, score_rubric, AggregationError, Criterion, Rubric, RubricError,
    RubricLevel, RubricScore, WeightedAggregate, WeightedItem,
};
pub use batch::{BatchGradeRow, BatchGrader, BatchImportError, BatchOptions, BatchReport};
pub use calculator::{calculate, CalculationError};
pub use domain::{
    GradeResult, GradeScaleEntry, GradingRecord, Policy, PolicyDraft, PolicyFilter, PolicyId,
    PolicyPatch,
};
pub use late::{apply_late_policy, LateLevel, LatePenaltyOutcome, LatePolicy};
pub use registry::{PolicyRegistry, RegistryError, RegistrySnapshot};
pub use resolver::{PolicyResolver, ResolutionError, ResolutionSource, ResolverStrategy};
pub use router::grading_router;
pub use service::{
    FinalGrade, GradingService, GradingServiceError, PolicyResolution, SubmissionGrade,
    SubmissionRequest,
};
pub use store::{InMemoryPolicyStore, JsonFilePolicyStore, PolicyStore, StoreError};
pub use validation::{validate, ValidationError, ValidationReport};
