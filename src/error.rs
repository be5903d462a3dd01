//! Error types for the schema engine
//!
//! Two classes of failure: [`ValidationError`] describes a problem in the
//! user's declarations and is always raised as part of an aggregate
//! [`ValidationFailure`], so one run reports every problem at once.
//! [`Fault`] is an internal invariant breach (a bug in the engine, not bad
//! input) and is fatal.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::entities::{Connection, ContainerRef, ViewId, ViewRef};

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Top-level error for schema operations
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("malformed entity reference '{text}': {reason}")]
    MalformedReference { text: String, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Fault(#[from] Fault),

    #[error("invalid schema record: {0}")]
    InvalidRecord(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every validation error found by one pass, raised together.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    pub errors: Vec<ValidationError>,
}

impl std::error::Error for ValidationFailure {}

impl ValidationFailure {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    /// `Ok` when no errors were collected, otherwise the aggregate failure.
    pub fn into_result(self) -> std::result::Result<(), ValidationFailure> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "validation failed with {} error(s):", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, "  [{}] {}", error.code(), error)?;
        }
        Ok(())
    }
}

/// A single problem in the user's declarations.
///
/// Carries the affected container/view id and row numbers so report
/// generators can point back at the offending declarations. Never consumed
/// by control flow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("container '{container}' field '{field}' is declared with multiple value types {values:?} (rows {rows:?})")]
    MultiValueType {
        container: ContainerRef,
        field: String,
        rows: BTreeSet<usize>,
        values: Vec<String>,
    },

    #[error("container '{container}' field '{field}' is declared both as a list and as a single value (rows {rows:?})")]
    MultiValueIsList {
        container: ContainerRef,
        field: String,
        rows: BTreeSet<usize>,
        values: Vec<bool>,
    },

    #[error("container '{container}' field '{field}' is declared both nullable and not nullable (rows {rows:?})")]
    MultiNullable {
        container: ContainerRef,
        field: String,
        rows: BTreeSet<usize>,
        values: Vec<bool>,
    },

    #[error("container '{container}' field '{field}' is declared with multiple default values (rows {rows:?})")]
    MultiDefault {
        container: ContainerRef,
        field: String,
        rows: BTreeSet<usize>,
        values: Vec<serde_json::Value>,
    },

    #[error("container '{container}' field '{field}' is declared with multiple index sets {values:?} (rows {rows:?})")]
    MultiIndex {
        container: ContainerRef,
        field: String,
        rows: BTreeSet<usize>,
        values: Vec<String>,
    },

    #[error("container '{container}' field '{field}' is declared with multiple uniqueness constraint sets {values:?} (rows {rows:?})")]
    MultiUniqueConstraint {
        container: ContainerRef,
        field: String,
        rows: BTreeSet<usize>,
        values: Vec<String>,
    },

    #[error("row {row}: a direct connection must be nullable ('{view}'.'{property}')")]
    DirectNotNullable {
        row: usize,
        view: ViewRef,
        property: String,
    },

    #[error("row {row}: a {connection} connection cannot have value type '{value_type}'")]
    InvalidConnectionValueType {
        row: usize,
        connection: Connection,
        value_type: String,
    },

    #[error("row {row}: a {connection} connection cannot map onto a container field")]
    BackedConnection { row: usize, connection: Connection },

    #[error("metadata field '{field}': {reason}")]
    InvalidMetadata { field: &'static str, reason: String },

    #[error("{column} row {row}: view '{view}' is not declared in the views table")]
    NonExistingView {
        column: &'static str,
        row: usize,
        view: ViewRef,
    },

    #[error("{column} row {row}: container '{container}' is not declared in the containers table")]
    NonExistingContainer {
        column: &'static str,
        row: usize,
        container: ContainerRef,
    },

    #[error("a reference schema cannot itself carry a reference")]
    ReferenceWithReference,

    #[error("completeness is 'extended' but no reference schema is provided to validate against")]
    MissingReference,

    #[error("container '{container}' has changed (attributes {changed_attributes:?}, properties {changed_properties:?}); containers must remain unchanged when extending with mode 'addition' or 'reshape'")]
    ChangingContainer {
        container: ContainerRef,
        changed_attributes: Vec<String>,
        changed_properties: Vec<String>,
    },

    #[error("view '{view}' has changed (attributes {changed_attributes:?}, properties {changed_properties:?}); views must remain unchanged when extending with mode 'addition'")]
    ChangingView {
        view: ViewId,
        changed_attributes: Vec<String>,
        changed_properties: Vec<String>,
    },

    #[error("container '{container}' referred to by '{referred_by}' is not defined")]
    MissingContainer {
        container: ContainerRef,
        referred_by: ViewId,
    },

    #[error("property '{property}' of container '{container}' referred to by '{referred_by}' is not defined")]
    MissingContainerProperty {
        container: ContainerRef,
        property: String,
        referred_by: ViewId,
    },

    #[error("parent view '{view}' implemented by '{referred_by}' is not defined")]
    MissingParentView { view: ViewId, referred_by: ViewId },

    #[error("source view '{view}' referred to by '{referred_by}'.'{property}' is not defined")]
    MissingSourceView {
        view: ViewId,
        property: String,
        referred_by: ViewId,
    },

    #[error("view '{view}' is listed in the data model but not defined")]
    MissingView { view: ViewId },

    #[error("view '{view}' is listed more than once in the data model")]
    DuplicatedViewInModel { view: ViewId },
}

impl ValidationError {
    /// Stable kind tag for report generators.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MultiValueType { .. } => "MultiValueType",
            ValidationError::MultiValueIsList { .. } => "MultiValueIsList",
            ValidationError::MultiNullable { .. } => "MultiNullable",
            ValidationError::MultiDefault { .. } => "MultiDefault",
            ValidationError::MultiIndex { .. } => "MultiIndex",
            ValidationError::MultiUniqueConstraint { .. } => "MultiUniqueConstraint",
            ValidationError::DirectNotNullable { .. } => "DirectNotNullable",
            ValidationError::InvalidConnectionValueType { .. } => "InvalidConnectionValueType",
            ValidationError::BackedConnection { .. } => "BackedConnection",
            ValidationError::InvalidMetadata { .. } => "InvalidMetadata",
            ValidationError::NonExistingView { .. } => "NonExistingView",
            ValidationError::NonExistingContainer { .. } => "NonExistingContainer",
            ValidationError::ReferenceWithReference => "ReferenceWithReference",
            ValidationError::MissingReference => "MissingReference",
            ValidationError::ChangingContainer { .. } => "ChangingContainer",
            ValidationError::ChangingView { .. } => "ChangingView",
            ValidationError::MissingContainer { .. } => "MissingContainer",
            ValidationError::MissingContainerProperty { .. } => "MissingContainerProperty",
            ValidationError::MissingParentView { .. } => "MissingParentView",
            ValidationError::MissingSourceView { .. } => "MissingSourceView",
            ValidationError::MissingView { .. } => "MissingView",
            ValidationError::DuplicatedViewInModel { .. } => "DuplicatedViewInModel",
        }
    }

    /// Row numbers of the declarations that contributed to this error.
    pub fn rows(&self) -> Vec<usize> {
        match self {
            ValidationError::MultiValueType { rows, .. }
            | ValidationError::MultiValueIsList { rows, .. }
            | ValidationError::MultiNullable { rows, .. }
            | ValidationError::MultiDefault { rows, .. }
            | ValidationError::MultiIndex { rows, .. }
            | ValidationError::MultiUniqueConstraint { rows, .. } => rows.iter().copied().collect(),
            ValidationError::DirectNotNullable { row, .. }
            | ValidationError::InvalidConnectionValueType { row, .. }
            | ValidationError::BackedConnection { row, .. }
            | ValidationError::NonExistingView { row, .. }
            | ValidationError::NonExistingContainer { row, .. } => vec![*row],
            _ => Vec::new(),
        }
    }
}

/// Internal invariant breaches.
///
/// By the time materialization runs, every reference is expected to resolve;
/// a failure here indicates a bug in the engine itself, not bad input.
/// Fatal and non-recoverable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    #[error("row {row}: {connection} connection with unresolved value type '{value_type}' survived row validation")]
    UnresolvedConnection {
        row: usize,
        connection: Connection,
        value_type: String,
    },
}
