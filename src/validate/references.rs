//! Referential integrity pass
//!
//! Every view referenced by a property row, and (in complete mode) every
//! container referenced by a row or a constraint, must itself be declared.
//! References resolve only within the current declaration set; resolution
//! against the reference schema is the extension pass's job.

use std::collections::HashSet;

use tracing::debug;

use crate::entities::{ContainerRef, ViewRef};
use crate::error::{ValidationError, ValidationFailure};
use crate::schema::{Completeness, Schema};

pub(crate) fn run(schema: &Schema) -> Result<(), ValidationFailure> {
    let declared_views: HashSet<&ViewRef> = schema.views.iter().map(|view| &view.view).collect();

    let mut errors = Vec::new();
    for property in &schema.properties {
        if !declared_views.contains(&property.view) {
            errors.push(ValidationError::NonExistingView {
                column: "view",
                row: property.row,
                view: property.view.clone(),
            });
        }
    }

    if schema.metadata.completeness == Completeness::Complete {
        let declared_containers: HashSet<&ContainerRef> = schema
            .containers
            .iter()
            .flatten()
            .map(|container| &container.container)
            .collect();
        for property in &schema.properties {
            if let Some(container) = &property.container {
                if !declared_containers.contains(container) {
                    errors.push(ValidationError::NonExistingContainer {
                        column: "container",
                        row: property.row,
                        container: container.clone(),
                    });
                }
            }
        }
        for container in schema.containers.iter().flatten() {
            for (constraint_no, target) in container.constraint.iter().flatten().enumerate() {
                if !declared_containers.contains(target) {
                    errors.push(ValidationError::NonExistingContainer {
                        column: "constraint",
                        row: constraint_no,
                        container: target.clone(),
                    });
                }
            }
        }
    }

    debug!(errors = errors.len(), "checked referential integrity");
    ValidationFailure::new(errors).into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::{ContainerRow, PropertyRow, ViewRow};
    use crate::schema::{ExtensionMode, SchemaMetadata};

    fn metadata(completeness: Completeness) -> SchemaMetadata {
        SchemaMetadata {
            space: "power".to_string(),
            external_id: "PowerModel".to_string(),
            version: "1".to_string(),
            name: None,
            description: None,
            creator: vec!["Alice".to_string()],
            created: "2024-03-01T00:00:00Z".parse().unwrap(),
            updated: "2024-03-01T00:00:00Z".parse().unwrap(),
            completeness,
            extension: ExtensionMode::Addition,
        }
    }

    fn property(view: &str, container: Option<&str>) -> PropertyRow {
        PropertyRow {
            row: 0,
            view: view.parse().unwrap(),
            view_property: "name".to_string(),
            name: None,
            description: None,
            connection: None,
            value_type: "text".parse().unwrap(),
            nullable: None,
            is_list: None,
            default: None,
            reference: None,
            container: container.map(|c| c.parse().unwrap()),
            container_property: container.map(|_| "name".to_string()),
            index: None,
            constraint: None,
            logical_class: "power:GeneratingUnit".parse().unwrap(),
            logical_property: "name".to_string(),
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

    fn container_row(container: &str, requires: Option<&str>) -> ContainerRow {
        ContainerRow {
            row: 0,
            container: container.parse().unwrap(),
            name: None,
            description: None,
            constraint: requires.map(|target| vec![target.parse().unwrap()]),
            reference: None,
            logical_class: "power:Asset".parse().unwrap(),
        }
    }

    #[test]
    fn test_undeclared_view_is_reported_with_its_row() {
        let mut schema = Schema {
            metadata: metadata(Completeness::Partial),
            properties: vec![
                property("power:GeneratingUnit", None),
                property("power:Undeclared", None),
            ],
            views: vec![view_row("power:GeneratingUnit")],
            containers: None,
            reference: None,
        };
        schema.properties[1].row = 1;

        let failure = run(&schema).unwrap_err();
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(
            failure.errors[0],
            ValidationError::NonExistingView {
                column: "view",
                row: 1,
                view: "power:Undeclared".parse().unwrap(),
            }
        );
    }

    #[test]
    fn test_view_reference_must_match_declared_version_exactly() {
        let schema = Schema {
            metadata: metadata(Completeness::Partial),
            properties: vec![property("power:GeneratingUnit", None)],
            views: vec![view_row("power:GeneratingUnit(version=2)")],
            containers: None,
            reference: None,
        };
        let failure = run(&schema).unwrap_err();
        assert_eq!(failure.errors[0].code(), "NonExistingView");
    }

    #[test]
    fn test_containers_checked_only_in_complete_mode() {
        let dangling = Schema {
            metadata: metadata(Completeness::Partial),
            properties: vec![property("power:GeneratingUnit", Some("power:Undeclared"))],
            views: vec![view_row("power:GeneratingUnit")],
            containers: None,
            reference: None,
        };
        run(&dangling).unwrap();

        let mut complete = dangling.clone();
        complete.metadata.completeness = Completeness::Complete;
        let failure = run(&complete).unwrap_err();
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(failure.errors[0].code(), "NonExistingContainer");
    }

    #[test]
    fn test_constraint_targets_must_be_declared() {
        let schema = Schema {
            metadata: metadata(Completeness::Complete),
            properties: vec![property("power:GeneratingUnit", Some("power:Asset"))],
            views: vec![view_row("power:GeneratingUnit")],
            containers: Some(vec![container_row("power:Asset", Some("power:Undeclared"))]),
            reference: None,
        };
        let failure = run(&schema).unwrap_err();
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(
            failure.errors[0],
            ValidationError::NonExistingContainer {
                column: "constraint",
                row: 0,
                container: "power:Undeclared".parse().unwrap(),
            }
        );
    }

    #[test]
    fn test_all_dangling_references_reported_together() {
        let mut schema = Schema {
            metadata: metadata(Completeness::Complete),
            properties: vec![
                property("power:Undeclared", Some("power:Asset")),
                property("power:GeneratingUnit", Some("power:AlsoUndeclared")),
            ],
            views: vec![view_row("power:GeneratingUnit")],
            containers: Some(vec![container_row("power:Asset", None)]),
            reference: None,
        };
        schema.properties[1].row = 1;

        let failure = run(&schema).unwrap_err();
        let codes: Vec<_> = failure.errors.iter().map(|error| error.code()).collect();
        assert_eq!(codes, vec!["NonExistingView", "NonExistingContainer"]);
    }
}
