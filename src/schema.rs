//! Schema model
//!
//! The physical-tier schema: metadata plus the property/view/container
//! declaration tables, and the optional reference schema an `extended`
//! schema builds on. [`Schema::validate`] runs the ordered validation
//! pipeline and returns the back-filled schema.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::declarations::{ContainerRow, PropertyRow, ViewRow};
use crate::entities::ReferencePointer;
use crate::error::{Fault, SchemaError, ValidationError, ValidationFailure};
use crate::physical::{self, PhysicalSchema};
use crate::validate;

/// Whether a schema is self-contained, intentionally partial, or builds on
/// a previously published schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    Partial,
    Complete,
    Extended,
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Completeness::Partial => "partial",
            Completeness::Complete => "complete",
            Completeness::Extended => "extended",
        })
    }
}

/// Compatibility policy for `extended` schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionMode {
    /// Additive changes only: containers and views are frozen.
    #[default]
    Addition,
    /// Containers are frozen, views may change freely.
    Reshape,
    /// Anything may change.
    Rebuild,
}

impl fmt::Display for ExtensionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtensionMode::Addition => "addition",
            ExtensionMode::Reshape => "reshape",
            ExtensionMode::Rebuild => "rebuild",
        })
    }
}

fn creator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Creator: (.+)").unwrap())
}

const CREATOR_PREFIX: &str = "Creator: ";

/// Identity and lifecycle metadata of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub space: String,
    pub external_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub creator: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub completeness: Completeness,
    /// Meaningful only when completeness is `extended`.
    #[serde(default)]
    pub extension: ExtensionMode,
}

impl SchemaMetadata {
    /// The identity of the exported model, `space:externalId(version=V)`.
    pub fn model_id(&self) -> String {
        format!("{}:{}(version={})", self.space, self.external_id, self.version)
    }

    /// Description as embedded in the exported model: the creator list is
    /// carried in a `Creator: ...` suffix.
    pub fn exported_description(&self) -> String {
        let creators = format!("{CREATOR_PREFIX}{}", self.creator.join(", "));
        match &self.description {
            Some(description) => format!("{description} {creators}"),
            None => creators,
        }
    }

    /// Inverse of [`SchemaMetadata::exported_description`]: split a raw
    /// model description into the description proper and the creator list.
    pub fn split_description(raw: Option<&str>) -> (Option<String>, Vec<String>) {
        let Some(raw) = raw else {
            return (None, vec!["MISSING".to_string()]);
        };
        if let Some(found) = creator_pattern().find(raw) {
            let creators = found
                .as_str()
                .trim_start_matches(CREATOR_PREFIX)
                .split(", ")
                .map(str::to_string)
                .collect();
            let description = raw[..found.start()].trim().to_string();
            ((!description.is_empty()).then_some(description), creators)
        } else {
            (Some(raw.to_string()), vec!["MISSING".to_string()])
        }
    }

    fn check(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("space", &self.space),
            ("external_id", &self.external_id),
            ("version", &self.version),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError::InvalidMetadata {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }
        if let Some(name) = &self.name {
            if name.chars().count() > 255 {
                errors.push(ValidationError::InvalidMetadata {
                    field: "name",
                    reason: "must be at most 255 characters".to_string(),
                });
            }
        }
        if let Some(description) = &self.description {
            if description.chars().count() > 1024 {
                errors.push(ValidationError::InvalidMetadata {
                    field: "description",
                    reason: "must be at most 1024 characters".to_string(),
                });
            }
        }
        errors
    }

    fn trim(&mut self) {
        self.space = self.space.trim().to_string();
        self.external_id = self.external_id.trim().to_string();
        self.version = self.version.trim().to_string();
        self.name = self
            .name
            .take()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self.description = self
            .description
            .take()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        for creator in &mut self.creator {
            *creator = creator.trim().to_string();
        }
    }
}

/// A full schema: metadata, declaration tables, optional reference.
///
/// The schema owns its tables and reference exclusively; validation
/// deep-copies before merging with the reference so the caller's schema is
/// never observably mutated beyond consolidation back-fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub metadata: SchemaMetadata,
    #[serde(default)]
    pub properties: Vec<PropertyRow>,
    #[serde(default)]
    pub views: Vec<ViewRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<ContainerRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Box<Schema>>,
}

impl Schema {
    /// Run the full validation pipeline, in order: structural/row checks,
    /// consolidation, referential integrity, extension compatibility.
    ///
    /// A failing pass stops the pipeline so later passes never run on
    /// known-bad data. On success the returned schema has every shared
    /// physical field back-filled to its canonical definition.
    ///
    /// Errors are [`SchemaError::Validation`] for problems in the input and
    /// [`SchemaError::Fault`] for engine invariant breaches.
    pub fn validate(mut self) -> Result<Self, SchemaError> {
        self.normalize();
        ValidationFailure::new(self.check_structure()).into_result()?;
        validate::consolidation::run(&mut self)?;
        validate::references::run(&self)?;
        validate::extension::run(&self)?;
        Ok(self)
    }

    /// Project the declaration tables into the physical schema consumed by
    /// exporters. The reference schema is not included.
    ///
    /// Assumes the validation passes have run; a resolution failure here is
    /// a [`Fault`], not a user-facing validation error.
    pub fn materialize(&self) -> Result<PhysicalSchema, Fault> {
        physical::materialize(self)
    }

    /// Structured record form of this schema, for file-based persistence.
    pub fn dump(&self) -> Value {
        serde_json::to_value(self).expect("schema records serialize to JSON")
    }

    /// Rebuild a schema from its record form. Rows are numbered by their
    /// position in the table and string fields are whitespace-trimmed.
    pub fn from_record(record: Value) -> Result<Self, SchemaError> {
        let mut schema: Schema = serde_json::from_value(record)
            .map_err(|error| SchemaError::InvalidRecord(error.to_string()))?;
        schema.normalize();
        Ok(schema)
    }

    /// A deep copy whose rows, views and containers all point back at this
    /// schema. Used when publishing a schema that later versions extend.
    pub fn reference_self(&self) -> Schema {
        let mut copy = self.clone();
        for property in &mut copy.properties {
            property.reference = Some(ReferencePointer {
                space: property.view.space.clone(),
                external_id: property.view.external_id.clone(),
                version: property.view.version.clone(),
                property: Some(property.logical_property.clone()),
            });
        }
        for view in &mut copy.views {
            view.reference = Some(ReferencePointer {
                space: view.view.space.clone(),
                external_id: view.view.external_id.clone(),
                version: view.view.version.clone(),
                property: None,
            });
        }
        for container in copy.containers.iter_mut().flatten() {
            container.reference = Some(ReferencePointer {
                space: container.container.space.clone(),
                external_id: container.container.external_id.clone(),
                version: None,
                property: None,
            });
        }
        copy
    }

    fn normalize(&mut self) {
        self.metadata.trim();
        for (row_no, property) in self.properties.iter_mut().enumerate() {
            property.row = row_no;
        }
        for (row_no, view) in self.views.iter_mut().enumerate() {
            view.row = row_no;
        }
        for (row_no, container) in self.containers.iter_mut().flatten().enumerate() {
            container.row = row_no;
        }
        if let Some(reference) = &mut self.reference {
            reference.normalize();
        }
    }

    fn check_structure(&self) -> Vec<ValidationError> {
        let mut errors = self.metadata.check();
        if let Some(reference) = &self.reference {
            if reference.reference.is_some() {
                errors.push(ValidationError::ReferenceWithReference);
            }
        }
        for property in &self.properties {
            errors.extend(property.check_connection());
        }
        self.warn_on_metadata_mismatch();
        errors
    }

    /// Views may pin another version or space than the model itself; that is
    /// tolerated, but usually an authoring mistake, so surface it.
    fn warn_on_metadata_mismatch(&self) {
        let mismatched: Vec<String> = self
            .views
            .iter()
            .filter(|view| {
                view.view.space != self.metadata.space
                    || view
                        .view
                        .version
                        .as_deref()
                        .is_some_and(|version| version != self.metadata.version)
            })
            .map(|view| view.view.to_string())
            .collect();
        if !mismatched.is_empty() {
            warn!(
                model = %self.metadata.model_id(),
                views = ?mismatched,
                "views do not match the model's space/version"
            );
        }
    }
}
