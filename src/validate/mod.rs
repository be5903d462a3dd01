//! Validation passes
//!
//! An explicit, ordered pipeline of pure validation functions over the
//! declaration tables: consolidation, then referential integrity, then
//! extension compatibility. Each pass collects every error it finds and
//! raises them as one aggregate; a failing pass stops the pipeline so later
//! passes never run on known-bad data.

pub(crate) mod consolidation;
pub(crate) mod extension;
pub(crate) mod references;
