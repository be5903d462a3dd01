//! End-to-end pipeline tests over JSON schema records
//!
//! Drives the full chain a collaborator would: load a record, validate,
//! materialize, diff, dump.

use modelforge::{Checksum, Schema, SchemaError, ValidationError};

fn load(content: &str) -> Schema {
    let record = serde_json::from_str(content).unwrap();
    Schema::from_record(record).unwrap()
}

fn complete_schema() -> Schema {
    load(include_str!("fixtures/complete_schema.json"))
}

fn extension_schema() -> Schema {
    load(include_str!("fixtures/extension_schema.json"))
}

fn validation_errors(error: SchemaError) -> Vec<ValidationError> {
    match error {
        SchemaError::Validation(failure) => failure.errors,
        other => panic!("expected a validation failure, got {other:?}"),
    }
}

#[test]
fn test_complete_record_validates() {
    let schema = complete_schema().validate().unwrap();
    assert_eq!(schema.properties.len(), 6);
    assert_eq!(schema.views.len(), 3);
}

#[test]
fn test_shared_field_is_backfilled_across_views() {
    let schema = complete_schema().validate().unwrap();
    // Row 2 re-declares GeneratingUnit.name for the WindTurbine view without
    // nullability or index; both are filled from the canonical declaration.
    assert_eq!(schema.properties[2].nullable, Some(false));
    assert_eq!(schema.properties[2].index, Some(vec!["by_name".to_string()]));
}

#[test]
fn test_record_roundtrip_preserves_content() {
    let schema = complete_schema();
    let reparsed = Schema::from_record(schema.dump()).unwrap();
    assert_eq!(reparsed, schema);
}

#[test]
fn test_validation_and_materialization_are_idempotent() {
    let first = complete_schema().validate().unwrap();
    let second = first.clone().validate().unwrap();
    assert_eq!(first, second);

    let first_dump = first.materialize().unwrap().dump();
    let second_dump = second.materialize().unwrap().dump();
    assert_eq!(
        serde_json::to_string(&first_dump).unwrap(),
        serde_json::to_string(&second_dump).unwrap()
    );
    assert_eq!(
        Checksum::from_record(&first_dump),
        Checksum::from_record(&second_dump)
    );
}

#[test]
fn test_materialized_views_carry_default_version() {
    let schema = complete_schema().validate().unwrap();
    let physical = schema.materialize().unwrap();
    assert!(physical
        .views
        .iter()
        .all(|view| view.version == "1"));
    assert_eq!(physical.model.views.len(), 3);
    assert_eq!(physical.spaces, vec!["power".to_string()]);
}

#[test]
fn test_dangling_view_reference_is_reported() {
    let mut schema = complete_schema();
    schema.views.retain(|view| view.view.external_id != "Substation");
    let errors = validation_errors(schema.validate().unwrap_err());
    assert_eq!(errors.len(), 1);
    let ValidationError::NonExistingView { row, view, .. } = &errors[0] else {
        panic!("expected NonExistingView, got {:?}", errors[0]);
    };
    assert_eq!(*row, 5);
    assert_eq!(view.to_string(), "power:Substation");
}

#[test]
fn test_consolidation_failure_stops_the_pipeline() {
    let mut schema = complete_schema();
    // A value-type conflict on the shared field, plus a dangling view that
    // a later pass would flag: only the consolidation error is reported.
    schema.properties[2].value_type = "int64".parse().unwrap();
    schema.views.retain(|view| view.view.external_id != "Substation");

    let errors = validation_errors(schema.validate().unwrap_err());
    assert_eq!(errors.len(), 1);
    let ValidationError::MultiValueType { rows, values, .. } = &errors[0] else {
        panic!("expected MultiValueType, got {:?}", errors[0]);
    };
    assert_eq!(rows.iter().copied().collect::<Vec<_>>(), vec![0, 2]);
    assert_eq!(values, &vec!["text".to_string(), "int64".to_string()]);
}

#[test]
fn test_extension_record_validates() {
    extension_schema().validate().unwrap();
}

#[test]
fn test_extension_container_conflict_is_rejected() {
    let mut schema = extension_schema();
    // The published C1.f is int32; redefining it is not an addition.
    schema.properties[0].value_type = "text".parse().unwrap();
    let errors = validation_errors(schema.validate().unwrap_err());
    assert_eq!(errors.len(), 1);
    let ValidationError::ChangingContainer {
        container,
        changed_properties,
        changed_attributes,
    } = &errors[0]
    else {
        panic!("expected ChangingContainer, got {:?}", errors[0]);
    };
    assert_eq!(container.to_string(), "power:C1");
    assert_eq!(changed_properties, &vec!["f".to_string()]);
    assert!(changed_attributes.is_empty());
}

#[test]
fn test_diff_between_versions() {
    let published = complete_schema().validate().unwrap();
    let mut next = complete_schema();
    next.metadata.version = "2".to_string();
    next.properties[1].nullable = Some(false);
    let next = next.validate().unwrap();

    let changes = modelforge::diff(
        &next.materialize().unwrap(),
        &published.materialize().unwrap(),
    );
    assert_eq!(changes.changed_containers.len(), 1);
    assert_eq!(changes.changed_containers[0].id, "power:GeneratingUnit");
    assert_eq!(
        changes.changed_containers[0].changed_properties,
        vec!["activePower".to_string()]
    );
    assert!(changes.added_views.is_empty());
}
