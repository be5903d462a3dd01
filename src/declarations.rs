//! Declaration tables
//!
//! Row-level declarations as handed over by the tabular loader: one row per
//! property-on-a-view, one per container, one per view. Rows carry their
//! table row number for error reporting; tables are plain ordered vectors.
//! Property rows are mutated in place only by the consolidation pass, which
//! back-fills aspects a row left unspecified.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{ClassRef, Connection, ContainerRef, ReferencePointer, ValueType, ViewRef};
use crate::error::ValidationError;

/// Grouping that preserves the declaration order of the first occurrence of
/// each key, so downstream output stays deterministic.
pub(crate) struct OrderedGroups<K, V> {
    index: HashMap<K, usize>,
    groups: Vec<(K, Vec<V>)>,
}

impl<K: Eq + Hash + Clone, V> OrderedGroups<K, V> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    pub fn push(&mut self, key: K, value: V) {
        match self.index.get(&key) {
            Some(&at) => self.groups[at].1.push(value),
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push((key, vec![value]));
            }
        }
    }

    pub fn into_vec(self) -> Vec<(K, Vec<V>)> {
        self.groups
    }
}

fn default_true() -> bool {
    true
}

/// One property-on-a-view declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRow {
    /// Position in the properties table, assigned at construction.
    #[serde(skip)]
    pub row: usize,
    pub view: ViewRef,
    pub view_property: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<Connection>,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_list: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferencePointer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Vec<String>>,
    pub logical_class: ClassRef,
    pub logical_property: String,
}

impl PropertyRow {
    /// Connection legality: the one switch deciding which value types are
    /// legal per connection kind, plus the nullability rule for direct
    /// relations.
    pub(crate) fn check_connection(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let Some(connection) = self.connection else {
            return errors;
        };
        let legal = match connection {
            Connection::Direct => {
                matches!(self.value_type, ValueType::View(_) | ValueType::Unknown)
            }
            Connection::Edge => matches!(self.value_type, ValueType::View(_)),
            Connection::Reverse => {
                matches!(self.value_type, ValueType::View(_) | ValueType::ViewProperty(_))
            }
        };
        if !legal {
            errors.push(ValidationError::InvalidConnectionValueType {
                row: self.row,
                connection,
                value_type: self.value_type.to_string(),
            });
        }
        if connection == Connection::Direct && self.nullable == Some(false) {
            errors.push(ValidationError::DirectNotNullable {
                row: self.row,
                view: self.view.clone(),
                property: self.view_property.clone(),
            });
        }
        // Only direct relations live in a container field; edges and reverse
        // connections are view-level only.
        if connection != Connection::Direct && self.backing_field().is_some() {
            errors.push(ValidationError::BackedConnection {
                row: self.row,
                connection,
            });
        }
        errors
    }

    /// Key of the physical field backing this row, when it has one.
    /// Rows without a backing field describe pure view-level connections.
    pub(crate) fn backing_field(&self) -> Option<(ContainerRef, String)> {
        match (&self.container, &self.container_property) {
            (Some(container), Some(field)) => Some((container.clone(), field.clone())),
            _ => None,
        }
    }
}

/// One container declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRow {
    #[serde(skip)]
    pub row: usize,
    pub container: ContainerRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Targets of `requires` constraints; each must itself be declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Vec<ContainerRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferencePointer>,
    pub logical_class: ClassRef,
}

/// Explicit data filter on a view declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataFilter {
    HasData,
    NodeType,
}

/// One view declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    #[serde(skip)]
    pub row: usize,
    pub view: ViewRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implements: Option<Vec<ViewRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<DataFilter>,
    #[serde(default = "default_true")]
    pub in_model: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferencePointer>,
    pub logical_class: ClassRef,
}
