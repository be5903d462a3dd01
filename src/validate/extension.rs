//! Extension compatibility pass
//!
//! Decides which structural changes are legal when a schema extends a
//! previously published reference schema, and validates the materialized
//! schema as a whole. Runs last: it needs materialized schemas to diff.

use std::collections::HashSet;

use tracing::debug;

use crate::entities::ViewRef;
use crate::error::{SchemaError, ValidationError, ValidationFailure};
use crate::physical;
use crate::schema::{Completeness, ExtensionMode, Schema};

pub(crate) fn run(schema: &Schema) -> Result<(), SchemaError> {
    check_extension(schema)?;
    check_schema(schema)
}

/// Compare the materialized schema against the published reference,
/// per completeness and extension mode.
fn check_extension(schema: &Schema) -> Result<(), SchemaError> {
    if schema.metadata.completeness != Completeness::Extended {
        return Ok(());
    }
    let Some(reference) = &schema.reference else {
        return Err(ValidationFailure::new(vec![ValidationError::MissingReference]).into());
    };
    if schema.metadata.space != reference.metadata.space {
        // A solution model built on a shared model owns none of the
        // reference's definitions; every change is legal.
        debug!(
            space = %schema.metadata.space,
            reference_space = %reference.metadata.space,
            "cross-space extension; skipping structural comparison"
        );
        return Ok(());
    }
    if schema.metadata.extension == ExtensionMode::Rebuild {
        return Ok(());
    }

    // The current schema is materialized without its reference; the
    // reference is materialized in isolation.
    let current = schema.materialize()?;
    let published = reference.materialize()?;

    let mut errors = Vec::new();
    for container in &current.containers {
        let id = container.id();
        let Some(existing) = published.container(&id) else {
            continue;
        };
        let new_dump = container.dump();
        let existing_dump = existing.dump();
        if new_dump == existing_dump {
            continue;
        }
        let (changed_attributes, changed_properties) =
            physical::changed_attributes_and_properties(&new_dump, &existing_dump);
        errors.push(ValidationError::ChangingContainer {
            container: id,
            changed_attributes,
            changed_properties,
        });
    }

    if schema.metadata.extension == ExtensionMode::Reshape {
        // Reshape freezes containers but leaves views free; stop here.
        ValidationFailure::new(errors).into_result()?;
        return Ok(());
    }

    for view in &current.views {
        let id = view.id();
        let Some(existing) = published.view(&id) else {
            continue;
        };
        let new_dump = view.dump();
        let existing_dump = existing.dump();
        if new_dump == existing_dump {
            continue;
        }
        let (changed_attributes, changed_properties) =
            physical::changed_attributes_and_properties(&new_dump, &existing_dump);
        errors.push(ValidationError::ChangingView {
            view: id,
            changed_attributes,
            changed_properties,
        });
    }

    ValidationFailure::new(errors).into_result()?;
    Ok(())
}

/// Materialize and structurally validate the schema as a whole. An extended
/// schema is first merged with its reference so that properties pointing at
/// inherited views and containers resolve.
fn check_schema(schema: &Schema) -> Result<(), SchemaError> {
    let merged;
    let subject = match schema.metadata.completeness {
        // Intentionally incomplete; nothing to check.
        Completeness::Partial => return Ok(()),
        Completeness::Complete => schema,
        Completeness::Extended => {
            let Some(reference) = &schema.reference else {
                return Err(ValidationFailure::new(vec![ValidationError::MissingReference]).into());
            };
            merged = merge_with_reference(schema, reference);
            &merged
        }
    };
    let materialized = subject.materialize()?;
    ValidationFailure::new(materialized.validate()).into_result()?;
    Ok(())
}

/// Deep-copy the schema and extend it with every property, view and
/// container of the reference that is not already declared by id. The
/// caller's schema is never touched.
fn merge_with_reference(schema: &Schema, reference: &Schema) -> Schema {
    let mut merged = schema.clone();
    merged.reference = None;

    merged.properties.extend(reference.properties.iter().cloned());

    let existing_views: HashSet<ViewRef> =
        merged.views.iter().map(|view| view.view.clone()).collect();
    merged.views.extend(
        reference
            .views
            .iter()
            .filter(|view| !existing_views.contains(&view.view))
            .cloned(),
    );

    if let Some(reference_containers) = &reference.containers {
        let containers = merged.containers.get_or_insert_with(Vec::new);
        let existing: HashSet<_> = containers
            .iter()
            .map(|container| container.container.clone())
            .collect();
        containers.extend(
            reference_containers
                .iter()
                .filter(|container| !existing.contains(&container.container))
                .cloned(),
        );
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::{ContainerRow, PropertyRow, ViewRow};
    use crate::schema::SchemaMetadata;

    fn metadata(space: &str, completeness: Completeness, extension: ExtensionMode) -> SchemaMetadata {
        SchemaMetadata {
            space: space.to_string(),
            external_id: "PowerModel".to_string(),
            version: "1".to_string(),
            name: None,
            description: None,
            creator: vec!["Alice".to_string()],
            created: "2024-03-01T00:00:00Z".parse().unwrap(),
            updated: "2024-03-01T00:00:00Z".parse().unwrap(),
            completeness,
            extension,
        }
    }

    fn property(view: &str, name: &str, value_type: &str, container: &str) -> PropertyRow {
        PropertyRow {
            row: 0,
            view: view.parse().unwrap(),
            view_property: name.to_string(),
            name: None,
            description: None,
            connection: None,
            value_type: value_type.parse().unwrap(),
            nullable: None,
            is_list: None,
            default: None,
            reference: None,
            container: Some(container.parse().unwrap()),
            container_property: Some(name.to_string()),
            index: None,
            constraint: None,
            logical_class: "power:GeneratingUnit".parse().unwrap(),
            logical_property: name.to_string(),
        }
    }

    fn view_row(view: &str) -> ViewRow {
        ViewRow {
            row: 0,
            view: view.parse().unwrap(),
            name: None,
            description: None,
            implements: None,
            filter: None,
            in_model: true,
            reference: None,
            logical_class: "power:GeneratingUnit".parse().unwrap(),
        }
    }

    fn container_row(container: &str) -> ContainerRow {
        ContainerRow {
            row: 0,
            container: container.parse().unwrap(),
            name: None,
            description: None,
            constraint: None,
            reference: None,
            logical_class: "power:Asset".parse().unwrap(),
        }
    }

    /// Published schema: C1 with field `f: int32`.
    fn published() -> Schema {
        Schema {
            metadata: metadata("power", Completeness::Complete, ExtensionMode::Addition),
            properties: vec![property("power:GeneratingUnit", "f", "int32", "power:C1")],
            views: vec![view_row("power:GeneratingUnit")],
            containers: Some(vec![container_row("power:C1")]),
            reference: None,
        }
    }

    fn extending(extension: ExtensionMode) -> Schema {
        Schema {
            metadata: metadata("power", Completeness::Extended, extension),
            properties: vec![property("power:GeneratingUnit", "f", "int32", "power:C1")],
            views: vec![view_row("power:GeneratingUnit")],
            containers: Some(vec![container_row("power:C1")]),
            reference: Some(Box::new(published())),
        }
    }

    #[test]
    fn test_missing_reference_is_an_error() {
        let mut schema = extending(ExtensionMode::Addition);
        schema.reference = None;
        let error = run(&schema).unwrap_err();
        let SchemaError::Validation(failure) = error else {
            panic!("expected validation failure, got {error:?}");
        };
        assert_eq!(failure.errors, vec![ValidationError::MissingReference]);
    }

    #[test]
    fn test_unchanged_extension_is_legal() {
        run(&extending(ExtensionMode::Addition)).unwrap();
    }

    #[test]
    fn test_addition_rejects_container_change() {
        let mut schema = extending(ExtensionMode::Addition);
        schema.properties[0].value_type = "text".parse().unwrap();
        let error = run(&schema).unwrap_err();
        let SchemaError::Validation(failure) = error else {
            panic!("expected validation failure, got {error:?}");
        };
        assert_eq!(failure.errors.len(), 1);
        let ValidationError::ChangingContainer {
            container,
            changed_properties,
            ..
        } = &failure.errors[0]
        else {
            panic!("expected ChangingContainer, got {:?}", failure.errors[0]);
        };
        assert_eq!(container.to_string(), "power:C1");
        assert_eq!(changed_properties, &vec!["f".to_string()]);
    }

    #[test]
    fn test_reshape_rejects_container_change() {
        let mut schema = extending(ExtensionMode::Reshape);
        schema.properties[0].value_type = "text".parse().unwrap();
        let error = run(&schema).unwrap_err();
        let SchemaError::Validation(failure) = error else {
            panic!("expected validation failure, got {error:?}");
        };
        assert_eq!(failure.errors[0].code(), "ChangingContainer");
    }

    #[test]
    fn test_reshape_allows_view_changes() {
        let mut schema = extending(ExtensionMode::Reshape);
        schema.views[0].name = Some("Renamed".to_string());
        run(&schema).unwrap();
    }

    #[test]
    fn test_addition_rejects_view_changes() {
        let mut schema = extending(ExtensionMode::Addition);
        schema.views[0].name = Some("Renamed".to_string());
        let error = run(&schema).unwrap_err();
        let SchemaError::Validation(failure) = error else {
            panic!("expected validation failure, got {error:?}");
        };
        assert_eq!(failure.errors.len(), 1);
        let ValidationError::ChangingView {
            view,
            changed_attributes,
            ..
        } = &failure.errors[0]
        else {
            panic!("expected ChangingView, got {:?}", failure.errors[0]);
        };
        assert_eq!(view.to_string(), "power:GeneratingUnit(version=1)");
        assert_eq!(changed_attributes, &vec!["name".to_string()]);
    }

    #[test]
    fn test_rebuild_allows_everything() {
        let mut schema = extending(ExtensionMode::Rebuild);
        schema.properties[0].value_type = "text".parse().unwrap();
        schema.views[0].name = Some("Renamed".to_string());
        run(&schema).unwrap();
    }

    #[test]
    fn test_cross_space_extension_skips_comparison() {
        let mut schema = extending(ExtensionMode::Addition);
        schema.metadata.space = "solution".to_string();
        // Move every declaration into the solution space; the reference keeps
        // its own space, so nothing is compared.
        schema.properties[0] = property("solution:GeneratingUnit", "f", "text", "solution:C1");
        schema.views[0] = view_row("solution:GeneratingUnit");
        schema.containers = Some(vec![container_row("solution:C1")]);
        run(&schema).unwrap();
    }

    #[test]
    fn test_additions_on_top_of_reference_are_legal() {
        let mut schema = extending(ExtensionMode::Addition);
        schema.views.push(view_row("power:WindTurbine"));
        schema.properties.push(property("power:WindTurbine", "rotor", "float64", "power:C2"));
        schema
            .containers
            .as_mut()
            .unwrap()
            .push(container_row("power:C2"));
        run(&schema).unwrap();
    }

    #[test]
    fn test_merged_schema_resolves_inherited_declarations() {
        // The extension declares a property on an inherited view and backs it
        // with an inherited container, declaring neither itself.
        let schema = Schema {
            metadata: metadata("power", Completeness::Extended, ExtensionMode::Addition),
            properties: vec![property("power:GeneratingUnit", "g", "text", "power:C1")],
            views: Vec::new(),
            containers: None,
            reference: Some(Box::new(published())),
        };
        run(&schema).unwrap();
    }

    #[test]
    fn test_merge_does_not_mutate_the_original() {
        let schema = extending(ExtensionMode::Addition);
        let before = schema.clone();
        run(&schema).unwrap();
        assert_eq!(schema, before);
    }

    #[test]
    fn test_merge_keeps_current_declarations_first() {
        let schema = extending(ExtensionMode::Addition);
        let merged = merge_with_reference(&schema, schema.reference.as_ref().unwrap());
        assert_eq!(merged.views.len(), 1);
        assert_eq!(merged.containers.as_ref().unwrap().len(), 1);
        // Properties are concatenated; the reference copy comes second.
        assert_eq!(merged.properties.len(), 2);
        assert!(merged.reference.is_none());
    }

    #[test]
    fn test_complete_schema_is_checked_in_isolation() {
        let mut schema = published();
        // The view maps into a container that is never declared; the
        // materialized schema is missing it.
        schema.containers = None;
        schema.metadata.completeness = Completeness::Partial;
        run(&schema).unwrap();

        schema.metadata.completeness = Completeness::Complete;
        let error = run(&schema).unwrap_err();
        let SchemaError::Validation(failure) = error else {
            panic!("expected validation failure, got {error:?}");
        };
        assert_eq!(failure.errors[0].code(), "MissingContainer");
    }
}
