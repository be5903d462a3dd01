//! Physical schema
//!
//! Materialization of validated declaration tables into the container/view
//! objects bound to the target platform, the structural checks that run over
//! the materialized schema, and the structural diff used by extension
//! validation.
//!
//! Materialization never partially succeeds: the validation passes have
//! already established referential integrity, so a resolution failure here
//! is a [`Fault`] (a bug in the engine), not a user-facing error.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::declarations::{ContainerRow, DataFilter, OrderedGroups, PropertyRow, ViewRow};
use crate::entities::{Connection, ContainerRef, Primitive, ValueType, ViewId};
use crate::error::{Fault, ValidationError};
use crate::schema::Schema;

/// Serialize an insertion-ordered pair list as a JSON map.
fn pairs_as_map<V: Serialize, S: Serializer>(
    pairs: &[(String, V)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for (key, value) in pairs {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// Insert into an insertion-ordered pair list, replacing an existing key.
fn insert_pair<V>(pairs: &mut Vec<(String, V)>, key: String, value: V) {
    if let Some(slot) = pairs.iter_mut().find(|(existing, _)| *existing == key) {
        slot.1 = value;
    } else {
        pairs.push((key, value));
    }
}

/// Storage type of a container property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PhysicalType {
    Primitive { primitive: Primitive, is_list: bool },
    Direct { is_list: bool },
}

/// One property of a materialized container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerPropertyDef {
    pub value_type: PhysicalType,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A constraint on a materialized container.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConstraintDef {
    Requires { require: ContainerRef },
    Uniqueness { properties: Vec<String> },
}

/// A b-tree index over container properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDef {
    pub properties: Vec<String>,
}

/// A materialized container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerDef {
    pub space: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(serialize_with = "pairs_as_map")]
    pub constraints: Vec<(String, ConstraintDef)>,
    #[serde(serialize_with = "pairs_as_map")]
    pub indexes: Vec<(String, IndexDef)>,
    // Kept last: attribute-level diffs exclude exactly the `properties` key.
    #[serde(serialize_with = "pairs_as_map")]
    pub properties: Vec<(String, ContainerPropertyDef)>,
}

impl ContainerDef {
    pub fn id(&self) -> ContainerRef {
        ContainerRef::new(self.space.clone(), self.external_id.clone())
    }

    pub fn dump(&self) -> Value {
        serde_json::to_value(self).expect("container definitions serialize to JSON")
    }
}

/// Identity of a node type backing a view filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub space: String,
    pub external_id: String,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.external_id)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Data filter of a materialized view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FilterDef {
    HasData { containers: Vec<ContainerRef> },
    NodeType { nodes: Vec<NodeId> },
}

/// Type of an edge connection, conventionally `View.property`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeTypeId {
    pub space: String,
    pub external_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outwards,
    Inwards,
}

/// One property of a materialized view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ViewPropertyDef {
    /// Backed by a container field.
    Mapped {
        container: ContainerRef,
        container_property: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<ViewId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// An edge to another view, outwards or inwards.
    Edge {
        edge_type: EdgeTypeId,
        source: ViewId,
        direction: Direction,
        #[serde(skip_serializing_if = "Option::is_none")]
        edge_source: Option<ViewId>,
        is_list: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// The inverse of a direct relation on the other side.
    ReverseDirect {
        source: ViewId,
        through: String,
        is_list: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

/// A materialized view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewDef {
    pub space: String,
    pub external_id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub implements: Vec<ViewId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterDef>,
    #[serde(serialize_with = "pairs_as_map")]
    pub properties: Vec<(String, ViewPropertyDef)>,
}

impl ViewDef {
    pub fn id(&self) -> ViewId {
        ViewId {
            space: self.space.clone(),
            external_id: self.external_id.clone(),
            version: self.version.clone(),
        }
    }

    pub fn dump(&self) -> Value {
        serde_json::to_value(self).expect("view definitions serialize to JSON")
    }
}

/// The data model listing: the views exposed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDef {
    pub space: String,
    pub external_id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub views: Vec<ViewId>,
}

/// The materialized physical schema consumed by exporters. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicalSchema {
    pub spaces: Vec<String>,
    pub model: ModelDef,
    pub views: Vec<ViewDef>,
    pub containers: Vec<ContainerDef>,
}

impl PhysicalSchema {
    pub fn view(&self, id: &ViewId) -> Option<&ViewDef> {
        self.views.iter().find(|view| &view.id() == id)
    }

    pub fn container(&self, id: &ContainerRef) -> Option<&ContainerDef> {
        self.containers.iter().find(|container| &container.id() == id)
    }

    /// Deterministic structured record of this schema; the input to the
    /// structural diff and to integrity checksums.
    pub fn dump(&self) -> Value {
        serde_json::to_value(self).expect("physical schemas serialize to JSON")
    }

    /// Structural checks over the materialized schema: every reference made
    /// by a view or the model listing must resolve within the schema.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let view_ids: HashSet<ViewId> = self.views.iter().map(ViewDef::id).collect();

        for view in &self.views {
            let id = view.id();
            for parent in &view.implements {
                if !view_ids.contains(parent) {
                    errors.push(ValidationError::MissingParentView {
                        view: parent.clone(),
                        referred_by: id.clone(),
                    });
                }
            }
            for (property_name, property) in &view.properties {
                match property {
                    ViewPropertyDef::Mapped {
                        container,
                        container_property,
                        source,
                        ..
                    } => {
                        match self.container(container) {
                            None => errors.push(ValidationError::MissingContainer {
                                container: container.clone(),
                                referred_by: id.clone(),
                            }),
                            Some(def) => {
                                if !def.properties.iter().any(|(key, _)| key == container_property)
                                {
                                    errors.push(ValidationError::MissingContainerProperty {
                                        container: container.clone(),
                                        property: container_property.clone(),
                                        referred_by: id.clone(),
                                    });
                                }
                            }
                        }
                        if let Some(source) = source {
                            if !view_ids.contains(source) {
                                errors.push(ValidationError::MissingSourceView {
                                    view: source.clone(),
                                    property: property_name.clone(),
                                    referred_by: id.clone(),
                                });
                            }
                        }
                    }
                    ViewPropertyDef::Edge {
                        source, edge_source, ..
                    } => {
                        if !view_ids.contains(source) {
                            errors.push(ValidationError::MissingSourceView {
                                view: source.clone(),
                                property: property_name.clone(),
                                referred_by: id.clone(),
                            });
                        }
                        if let Some(edge_source) = edge_source {
                            if !view_ids.contains(edge_source) {
                                errors.push(ValidationError::MissingSourceView {
                                    view: edge_source.clone(),
                                    property: property_name.clone(),
                                    referred_by: id.clone(),
                                });
                            }
                        }
                    }
                    ViewPropertyDef::ReverseDirect { source, .. } => {
                        if !view_ids.contains(source) {
                            errors.push(ValidationError::MissingSourceView {
                                view: source.clone(),
                                property: property_name.clone(),
                                referred_by: id.clone(),
                            });
                        }
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        for view_id in &self.model.views {
            if !view_ids.contains(view_id) {
                errors.push(ValidationError::MissingView {
                    view: view_id.clone(),
                });
            }
            if !seen.insert(view_id.clone()) {
                errors.push(ValidationError::DuplicatedViewInModel {
                    view: view_id.clone(),
                });
            }
        }
        errors
    }
}

/// Project a schema's declaration tables into its physical form.
/// The reference schema, when present, is not included.
pub(crate) fn materialize(schema: &Schema) -> Result<PhysicalSchema, Fault> {
    debug!(model = %schema.metadata.model_id(), "materializing physical schema");
    let (container_groups, view_groups) = gather_properties(&schema.properties);
    let view_rows_by_id: HashMap<ViewId, Vec<&PropertyRow>> = view_groups.into_iter().collect();

    let containers = create_containers(schema, &container_groups);
    let views = create_views(schema, &view_rows_by_id)?;

    let mut model_views: Vec<ViewId> = schema
        .views
        .iter()
        .filter(|row| row.in_model)
        .map(|row| row.view.to_id())
        .collect();
    model_views.sort();

    let mut used_spaces: BTreeSet<String> = containers
        .iter()
        .map(|container| container.space.clone())
        .chain(views.iter().map(|view| view.space.clone()))
        .collect();
    let model_space = if used_spaces.len() == 1 {
        used_spaces.iter().next().cloned().unwrap_or_default()
    } else {
        used_spaces.insert(schema.metadata.space.clone());
        schema.metadata.space.clone()
    };

    let model = ModelDef {
        space: model_space,
        external_id: schema.metadata.external_id.clone(),
        version: schema.metadata.version.clone(),
        name: schema.metadata.name.clone(),
        description: Some(schema.metadata.exported_description()),
        views: model_views,
    };

    Ok(PhysicalSchema {
        spaces: used_spaces.into_iter().collect(),
        model,
        views,
        containers,
    })
}

type ContainerGroups<'a> = Vec<(ContainerRef, Vec<&'a PropertyRow>)>;
type ViewGroups<'a> = Vec<(ViewId, Vec<&'a PropertyRow>)>;

fn gather_properties(properties: &[PropertyRow]) -> (ContainerGroups<'_>, ViewGroups<'_>) {
    let mut by_container = OrderedGroups::new();
    let mut by_view = OrderedGroups::new();
    for property in properties {
        by_view.push(property.view.to_id(), property);
        if let Some((container, _)) = property.backing_field() {
            by_container.push(container, property);
        }
    }
    (by_container.into_vec(), by_view.into_vec())
}

fn create_containers(schema: &Schema, groups: &ContainerGroups<'_>) -> Vec<ContainerDef> {
    let rows_by_id: HashMap<&ContainerRef, &Vec<&PropertyRow>> =
        groups.iter().map(|(id, rows)| (id, rows)).collect();

    let mut dropped: HashSet<ContainerRef> = HashSet::new();
    let mut containers = Vec::new();
    for row in schema.containers.iter().flatten() {
        let Some(rows) = rows_by_id.get(&row.container) else {
            warn!(container = %row.container, "container has no properties; dropping it from the physical schema");
            dropped.insert(row.container.clone());
            continue;
        };

        let mut def = ContainerDef {
            space: row.container.space.clone(),
            external_id: row.container.external_id.clone(),
            name: row.name.clone(),
            description: row.description.clone(),
            constraints: row
                .constraint
                .iter()
                .flatten()
                .map(|target| {
                    (
                        format!("{}_{}", target.space, target.external_id),
                        ConstraintDef::Requires {
                            require: target.clone(),
                        },
                    )
                })
                .collect(),
            indexes: Vec::new(),
            properties: Vec::new(),
        };

        for property in rows.iter() {
            let Some(field) = &property.container_property else {
                continue;
            };
            let is_list = property.is_list.unwrap_or(false);
            let value_type = match &property.value_type {
                ValueType::Primitive(primitive) => PhysicalType::Primitive {
                    primitive: *primitive,
                    is_list,
                },
                _ => PhysicalType::Direct { is_list },
            };
            insert_pair(
                &mut def.properties,
                field.clone(),
                ContainerPropertyDef {
                    value_type,
                    // If not set, the platform defaults nullable to true.
                    nullable: property.nullable.unwrap_or(true),
                    // Connection properties cannot carry a default value.
                    default: if property.connection.is_none() {
                        property.default.clone()
                    } else {
                        None
                    },
                    name: property.name.clone(),
                    description: property.description.clone(),
                },
            );
        }

        let mut uniqueness: OrderedGroups<String, String> = OrderedGroups::new();
        let mut indexes: OrderedGroups<String, String> = OrderedGroups::new();
        for property in rows.iter() {
            let Some(field) = &property.container_property else {
                continue;
            };
            for tag in property.constraint.iter().flatten() {
                uniqueness.push(tag.clone(), field.clone());
            }
            for tag in property.index.iter().flatten() {
                indexes.push(tag.clone(), field.clone());
            }
        }
        for (tag, mut fields) in uniqueness.into_vec() {
            fields.sort();
            fields.dedup();
            insert_pair(
                &mut def.constraints,
                tag,
                ConstraintDef::Uniqueness { properties: fields },
            );
        }
        for (tag, mut fields) in indexes.into_vec() {
            fields.sort();
            fields.dedup();
            insert_pair(&mut def.indexes, tag, IndexDef { properties: fields });
        }

        containers.push(def);
    }

    // Dropped containers must not remain as constraint targets.
    for container in &mut containers {
        container.constraints.retain(|(_, constraint)| match constraint {
            ConstraintDef::Requires { require } => !dropped.contains(require),
            ConstraintDef::Uniqueness { .. } => true,
        });
    }
    containers
}

fn create_views(
    schema: &Schema,
    rows_by_view: &HashMap<ViewId, Vec<&PropertyRow>>,
) -> Result<Vec<ViewDef>, Fault> {
    let mut views = Vec::new();
    for row in &schema.views {
        let id = row.view.to_id();
        let mut def = ViewDef {
            space: id.space.clone(),
            external_id: id.external_id.clone(),
            version: id.version.clone(),
            name: row.name.clone(),
            description: row.description.clone(),
            implements: row
                .implements
                .iter()
                .flatten()
                .map(|parent| parent.to_id())
                .collect(),
            filter: None,
            properties: Vec::new(),
        };
        for property in rows_by_view.get(&id).into_iter().flatten() {
            if let Some(view_property) = create_view_property(property, rows_by_view)? {
                insert_pair(&mut def.properties, property.view_property.clone(), view_property);
            }
        }
        def.filter = Some(create_view_filter(row, &def));
        views.push(def);
    }
    Ok(views)
}

fn create_view_property(
    property: &PropertyRow,
    rows_by_view: &HashMap<ViewId, Vec<&PropertyRow>>,
) -> Result<Option<ViewPropertyDef>, Fault> {
    let unresolved = |connection: Connection| Fault::UnresolvedConnection {
        row: property.row,
        connection,
        value_type: property.value_type.to_string(),
    };

    if let Some((container, field)) = property.backing_field() {
        let source = match property.connection {
            Some(Connection::Direct) => match &property.value_type {
                ValueType::View(view) => Some(view.to_id()),
                ValueType::Unknown => None,
                _ => return Err(unresolved(Connection::Direct)),
            },
            // Edge and reverse connections are never container-backed.
            Some(connection) => return Err(unresolved(connection)),
            None => None,
        };
        return Ok(Some(ViewPropertyDef::Mapped {
            container,
            container_property: field,
            source,
            name: property.name.clone(),
            description: property.description.clone(),
        }));
    }

    match property.connection {
        Some(Connection::Edge) => {
            let ValueType::View(target) = &property.value_type else {
                return Err(unresolved(Connection::Edge));
            };
            Ok(Some(ViewPropertyDef::Edge {
                edge_type: edge_type_for(property),
                source: target.to_id(),
                direction: Direction::Outwards,
                edge_source: None,
                // An unspecified edge defaults to a multi-edge.
                is_list: property.is_list.unwrap_or(true),
                name: property.name.clone(),
                description: property.description.clone(),
            }))
        }
        Some(Connection::Reverse) => {
            let (source, through) = match &property.value_type {
                ValueType::ViewProperty(target) => {
                    (target.as_view().to_id(), Some(target.property.clone()))
                }
                ValueType::View(target) => (target.to_id(), None),
                _ => return Err(unresolved(Connection::Reverse)),
            };
            // The other side decides whether this reverse maps onto an edge
            // or onto a direct relation.
            let other_side = through.as_ref().and_then(|through| {
                rows_by_view
                    .get(&source)
                    .and_then(|rows| rows.iter().find(|row| &row.logical_property == through))
                    .copied()
            });
            if other_side.is_none() {
                warn!(
                    view = %source,
                    property = %property.view_property,
                    referred_by = %property.view,
                    "reverse connection is missing its other side"
                );
            }
            match (other_side, through) {
                (Some(other), Some(through)) if other.connection == Some(Connection::Direct) => {
                    Ok(Some(ViewPropertyDef::ReverseDirect {
                        source,
                        through,
                        is_list: property.is_list.unwrap_or(true),
                        name: property.name.clone(),
                        description: property.description.clone(),
                    }))
                }
                (other, _) => Ok(Some(ViewPropertyDef::Edge {
                    edge_type: edge_type_for(other.unwrap_or(property)),
                    source,
                    direction: Direction::Inwards,
                    edge_source: None,
                    is_list: property.is_list.unwrap_or(true),
                    name: property.name.clone(),
                    description: property.description.clone(),
                })),
            }
        }
        Some(Connection::Direct) => {
            // A direct connection needs a backing container field.
            warn!(
                view = %property.view,
                property = %property.view_property,
                "direct connection without a backing field has no physical form"
            );
            Ok(None)
        }
        None => Ok(None),
    }
}

fn edge_type_for(property: &PropertyRow) -> EdgeTypeId {
    if let Some(pointer) = &property.reference {
        if let Some(pointed_property) = &pointer.property {
            return EdgeTypeId {
                space: pointer.space.clone(),
                external_id: format!("{}.{}", pointer.external_id, pointed_property),
            };
        }
    }
    EdgeTypeId {
        space: property.view.space.clone(),
        external_id: format!("{}.{}", property.view.external_id, property.view_property),
    }
}

fn create_view_filter(row: &ViewRow, def: &ViewDef) -> FilterDef {
    let mut referenced: Vec<ContainerRef> = Vec::new();
    for (_, property) in &def.properties {
        if let ViewPropertyDef::Mapped { container, .. } = property {
            if !referenced.contains(container) {
                referenced.push(container.clone());
            }
        }
    }
    let node_type = || FilterDef::NodeType {
        nodes: vec![NodeId {
            space: def.space.clone(),
            external_id: def.external_id.clone(),
        }],
    };
    match row.filter {
        Some(DataFilter::NodeType) => node_type(),
        Some(DataFilter::HasData) if referenced.is_empty() => {
            warn!(
                view = %def.id(),
                "hasData filter on a view without container-backed properties; using a node type filter"
            );
            node_type()
        }
        Some(DataFilter::HasData) => FilterDef::HasData {
            containers: referenced,
        },
        None if referenced.is_empty() => node_type(),
        None => FilterDef::HasData {
            containers: referenced,
        },
    }
}

impl ContainerRow {
    /// Rebuild a container declaration from its materialized form, for
    /// re-import of a published schema.
    pub fn from_container(def: &ContainerDef) -> ContainerRow {
        let container = def.id();
        let constraints: Vec<ContainerRef> = def
            .constraints
            .iter()
            .filter_map(|(_, constraint)| match constraint {
                ConstraintDef::Requires { require } => Some(require.clone()),
                ConstraintDef::Uniqueness { .. } => None,
            })
            .collect();
        ContainerRow {
            row: 0,
            logical_class: container.as_class(),
            container,
            name: def.name.clone(),
            description: def.description.clone(),
            constraint: (!constraints.is_empty()).then_some(constraints),
            reference: None,
        }
    }
}

impl ViewRow {
    /// Rebuild a view declaration from its materialized form.
    pub fn from_view(def: &ViewDef, in_model: bool) -> ViewRow {
        let view = def.id().to_ref();
        ViewRow {
            row: 0,
            logical_class: view.as_class(),
            name: def.name.clone(),
            description: def.description.clone(),
            implements: (!def.implements.is_empty())
                .then(|| def.implements.iter().map(ViewId::to_ref).collect()),
            filter: def.filter.as_ref().map(|filter| match filter {
                FilterDef::HasData { .. } => DataFilter::HasData,
                FilterDef::NodeType { .. } => DataFilter::NodeType,
            }),
            in_model,
            reference: None,
            view,
        }
    }
}

/// Difference of one container or view between two schema versions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDiff {
    pub id: String,
    pub changed_attributes: Vec<String>,
    pub changed_properties: Vec<String>,
}

/// Structural diff between two physical schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDiff {
    pub added_containers: Vec<String>,
    pub removed_containers: Vec<String>,
    pub changed_containers: Vec<EntityDiff>,
    pub added_views: Vec<String>,
    pub removed_views: Vec<String>,
    pub changed_views: Vec<EntityDiff>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added_containers.is_empty()
            && self.removed_containers.is_empty()
            && self.changed_containers.is_empty()
            && self.added_views.is_empty()
            && self.removed_views.is_empty()
            && self.changed_views.is_empty()
    }
}

/// Attribute keys (everything except the property map) and property-map keys
/// whose values differ or are missing on one side. Order is the insertion
/// order of the new record, with keys only present on the old side appended.
pub fn changed_attributes_and_properties(new: &Value, existing: &Value) -> (Vec<String>, Vec<String>) {
    let empty = serde_json::Map::new();
    let new_record = new.as_object().unwrap_or(&empty);
    let existing_record = existing.as_object().unwrap_or(&empty);

    let mut changed_attributes = Vec::new();
    for (key, value) in new_record {
        if key == "properties" {
            continue;
        }
        if existing_record.get(key) != Some(value) {
            changed_attributes.push(key.clone());
        }
    }
    for key in existing_record.keys() {
        if key != "properties" && !new_record.contains_key(key) {
            changed_attributes.push(key.clone());
        }
    }

    let new_properties = new_record
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let existing_properties = existing_record
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let mut changed_properties = Vec::new();
    for (key, value) in new_properties {
        if existing_properties.get(key) != Some(value) {
            changed_properties.push(key.clone());
        }
    }
    for key in existing_properties.keys() {
        if !new_properties.contains_key(key) {
            changed_properties.push(key.clone());
        }
    }
    (changed_attributes, changed_properties)
}

/// Structural diff of `new` against `old`, per container and view id.
pub fn diff(new: &PhysicalSchema, old: &PhysicalSchema) -> SchemaDiff {
    let mut result = SchemaDiff::default();

    for container in &new.containers {
        let id = container.id();
        match old.container(&id) {
            None => result.added_containers.push(id.to_string()),
            Some(existing) => {
                let new_dump = container.dump();
                let existing_dump = existing.dump();
                if new_dump == existing_dump {
                    continue;
                }
                let (changed_attributes, changed_properties) =
                    changed_attributes_and_properties(&new_dump, &existing_dump);
                result.changed_containers.push(EntityDiff {
                    id: id.to_string(),
                    changed_attributes,
                    changed_properties,
                });
            }
        }
    }
    for container in &old.containers {
        if new.container(&container.id()).is_none() {
            result.removed_containers.push(container.id().to_string());
        }
    }

    for view in &new.views {
        let id = view.id();
        match old.view(&id) {
            None => result.added_views.push(id.to_string()),
            Some(existing) => {
                let new_dump = view.dump();
                let existing_dump = existing.dump();
                if new_dump == existing_dump {
                    continue;
                }
                let (changed_attributes, changed_properties) =
                    changed_attributes_and_properties(&new_dump, &existing_dump);
                result.changed_views.push(EntityDiff {
                    id: id.to_string(),
                    changed_attributes,
                    changed_properties,
                });
            }
        }
    }
    for view in &old.views {
        if new.view(&view.id()).is_none() {
            result.removed_views.push(view.id().to_string());
        }
    }

    result
}
