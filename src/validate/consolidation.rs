//! Consolidation pass
//!
//! Spreadsheet authors legitimately re-declare a shared physical field on
//! every view that exposes it. This pass merges repeated declarations of
//! the same (container, field) pair into one canonical definition: true
//! conflicts (a different value type, nullability, list-ness, default,
//! index set or constraint set) are reported, while partial re-declarations
//! are back-filled in place so the rest of the pipeline can treat the field
//! as declared exactly once per row.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use crate::declarations::OrderedGroups;
use crate::entities::{ContainerRef, ValueType};
use crate::error::{ValidationError, ValidationFailure};
use crate::schema::Schema;

fn push_distinct<T: PartialEq>(values: &mut Vec<T>, value: T) {
    if !values.contains(&value) {
        values.push(value);
    }
}

pub(crate) fn run(schema: &mut Schema) -> Result<(), ValidationFailure> {
    let mut groups: OrderedGroups<(ContainerRef, String), usize> = OrderedGroups::new();
    for (position, property) in schema.properties.iter().enumerate() {
        if let Some(key) = property.backing_field() {
            groups.push(key, position);
        }
    }

    let mut errors = Vec::new();
    let mut shared_fields = 0usize;
    for ((container, field), positions) in groups.into_vec() {
        if positions.len() < 2 {
            continue;
        }
        shared_fields += 1;
        let rows: BTreeSet<usize> = positions
            .iter()
            .map(|&position| schema.properties[position].row)
            .collect();

        // Distinct non-null values per aspect, in row order.
        let mut value_types: Vec<ValueType> = Vec::new();
        let mut list_values: Vec<bool> = Vec::new();
        let mut nullable_values: Vec<bool> = Vec::new();
        let mut default_values: Vec<Value> = Vec::new();
        let mut index_values: Vec<Vec<String>> = Vec::new();
        let mut constraint_values: Vec<Vec<String>> = Vec::new();
        for &position in &positions {
            let property = &schema.properties[position];
            push_distinct(&mut value_types, property.value_type.clone());
            if let Some(value) = property.is_list {
                push_distinct(&mut list_values, value);
            }
            if let Some(value) = property.nullable {
                push_distinct(&mut nullable_values, value);
            }
            if let Some(value) = &property.default {
                push_distinct(&mut default_values, value.clone());
            }
            if let Some(value) = &property.index {
                push_distinct(&mut index_values, value.clone());
            }
            if let Some(value) = &property.constraint {
                push_distinct(&mut constraint_values, value.clone());
            }
        }

        let mut group_errors = Vec::new();
        if value_types.len() > 1 {
            group_errors.push(ValidationError::MultiValueType {
                container: container.clone(),
                field: field.clone(),
                rows: rows.clone(),
                values: value_types.iter().map(ToString::to_string).collect(),
            });
        }
        if list_values.len() > 1 {
            group_errors.push(ValidationError::MultiValueIsList {
                container: container.clone(),
                field: field.clone(),
                rows: rows.clone(),
                values: list_values.clone(),
            });
        }
        if nullable_values.len() > 1 {
            group_errors.push(ValidationError::MultiNullable {
                container: container.clone(),
                field: field.clone(),
                rows: rows.clone(),
                values: nullable_values.clone(),
            });
        }
        if default_values.len() > 1 {
            group_errors.push(ValidationError::MultiDefault {
                container: container.clone(),
                field: field.clone(),
                rows: rows.clone(),
                values: default_values.clone(),
            });
        }
        if index_values.len() > 1 {
            group_errors.push(ValidationError::MultiIndex {
                container: container.clone(),
                field: field.clone(),
                rows: rows.clone(),
                values: index_values.iter().map(|tags| tags.join(",")).collect(),
            });
        }
        if constraint_values.len() > 1 {
            group_errors.push(ValidationError::MultiUniqueConstraint {
                container: container.clone(),
                field: field.clone(),
                rows: rows.clone(),
                values: constraint_values.iter().map(|tags| tags.join(",")).collect(),
            });
        }

        // Inconsistent groups are reported, never merged. All groups are
        // checked before any error is raised.
        if !group_errors.is_empty() {
            errors.extend(group_errors);
            continue;
        }

        // The group is consistent: back-fill every aspect a row left
        // unspecified with the single canonical value, so the field reads as
        // declared exactly once per row while it is physically shared.
        let canonical_type = value_types.into_iter().next();
        let canonical_list = list_values.into_iter().next();
        let canonical_nullable = nullable_values.into_iter().next();
        let canonical_default = default_values.into_iter().next();
        let canonical_index = index_values.into_iter().next();
        let canonical_constraint = constraint_values.into_iter().next();
        for &position in &positions {
            let property = &mut schema.properties[position];
            if let Some(value_type) = &canonical_type {
                property.value_type = value_type.clone();
            }
            if property.is_list.is_none() {
                property.is_list = canonical_list;
            }
            if property.nullable.is_none() {
                property.nullable = canonical_nullable;
            }
            if property.default.is_none() {
                property.default = canonical_default.clone();
            }
            if property.index.is_none() {
                property.index = canonical_index.clone();
            }
            if property.constraint.is_none() {
                property.constraint = canonical_constraint.clone();
            }
        }
    }

    debug!(shared_fields, errors = errors.len(), "consolidated shared container fields");
    ValidationFailure::new(errors).into_result()
}
