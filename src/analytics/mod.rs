//! Per-contract analytics: snapshot loading, metadata resolution and the
//! pure scoring functions applied by the workers

pub mod confidence;
pub mod loader;
pub mod metadata;
pub mod statistics;
pub mod zone;

pub use confidence::{assess_confidence, ConfidenceAssessment};
pub use loader::{BatchDataLoader, ContractSeries, HistorySnapshot};
pub use metadata::{MetadataResolver, MetadataSource, ResolvedMetadata};
pub use statistics::{percentile_rank, summarize, z_score};
pub use zone::classify_zone;
