//! Annotation migration
//!
//! Computes legacy block addresses from pre-migration content and plans
//! the switch of every matching annotation to the block's stable id.

mod legacy;
mod migrator;

pub use legacy::{legacy_addressing, LegacyAddressing, PositionFingerprintV1, SUPPORTED_VERSIONS};
pub use migrator::{build_mapping, plan_updates, AnnotationMigrator, AnnotationPlan};
