//! Modelforge
//!
//! Tiered schema modeling and validation for graph data platforms: one
//! conceptual data model is carried through a logical tier down to the
//! physical tier (containers, views, properties) bound to the target
//! platform, with cross-tier and intra-tier consistency enforced along the
//! way.
//!
//! ## Features
//!
//! - **Consolidation**: repeated declarations of one shared physical field
//!   are merged into a canonical definition; true conflicts are reported
//! - **Referential Integrity**: every view, container and constraint target
//!   must resolve within the declaration set
//! - **Extension Checking**: a schema that builds on a published reference
//!   is held to its compatibility mode (`addition`, `reshape`, `rebuild`)
//! - **Structural Diffing**: exactly which attributes and properties changed
//!   between schema versions
//! - **Checksum Validation**: SHA256 checksums over schema records
//!
//! ## Architecture
//!
//! ```text
//! declaration tables (properties / views / containers)
//!         │ validate()
//!         ├── consolidation        merge shared physical fields
//!         ├── referential integrity   every reference must be declared
//!         └── extension compatibility diff against the published reference
//!         │ materialize()
//!         ▼
//! physical schema (containers / views / data model)  →  exporters
//! ```
//!
//! Validation is synchronous, pure and deterministic: re-running it on the
//! same input always yields the same error set or success. All errors of a
//! pass are raised together as one aggregate, never one at a time.

pub mod checksum;
pub mod config;
pub mod declarations;
pub mod entities;
pub mod error;
pub mod physical;
pub mod schema;
mod validate;

pub use checksum::Checksum;
pub use config::EngineConfig;
pub use declarations::{ContainerRow, DataFilter, PropertyRow, ViewRow};
pub use entities::{
    ClassRef, Connection, ContainerRef, Primitive, ReferencePointer, ValueType, ViewId,
    ViewPropertyRef, ViewRef,
};
pub use error::{Fault, Result, SchemaError, ValidationError, ValidationFailure};
pub use physical::{diff, PhysicalSchema, SchemaDiff};
pub use schema::{Completeness, ExtensionMode, Schema, SchemaMetadata};
