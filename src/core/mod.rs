//! Core validation logic: resolution, normalization, consensus and gating.

pub mod config;
pub mod consensus;
pub mod dedupe;
pub mod env;
pub mod error;
pub mod log;
pub mod normalize;
pub mod pipeline;
pub mod quality;
pub mod rates;
pub mod resolver;
pub mod validation;

// Re-export main types for cleaner imports
pub use consensus::{ConsensusConfig, ConsensusEngine};
pub use env::{EnvLookup, ProcessEnv, StaticEnv};
pub use error::RatesError;
pub use pipeline::{DateRange, PipelineOutput};
pub use quality::QualityReport;
pub use rates::{
    ConsensusResult, ConsensusStatus, NormalizedRate, RateRecord, Severity, Source,
    ValidatedFact, ValidationStatus,
};
pub use resolver::{LocationOrigin, MetadataResolver, ResolveMode, SnapshotLocation, TableLayout};
pub use validation::ValidationGate;
