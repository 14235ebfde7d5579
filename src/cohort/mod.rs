// =============================================================================
// Cohort — smart-money cohort readings and their classification
// =============================================================================

pub mod assessment;
pub mod provider;

pub use assessment::{AssessedCohortSignal, CohortPolicy, CohortStatus, DegradedReason};
pub use provider::{CohortKind, CohortReading, CohortSignalProvider, CohortSnapshotStore, CohortSpec};
