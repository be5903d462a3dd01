//! Entity references
//!
//! Canonical identifiers for classes, views, containers and view properties,
//! written in the `space:externalId(version=V)` text form used across all
//! declaration tables. Parsing and display are exact inverses of each other
//! for every reference kind.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SchemaError;

/// Version assigned to a view when its reference does not carry one.
pub const DEFAULT_VERSION: &str = "1";

/// Placeholder for a value type that could not be resolved.
pub const UNKNOWN_MARKER: &str = "#N/A";

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<space>[A-Za-z0-9_][A-Za-z0-9_-]*):(?P<external_id>[A-Za-z0-9_][A-Za-z0-9_-]*)(?:\((?P<args>[^()]*)\))?$",
        )
        .unwrap()
    })
}

/// Intermediate result of parsing the shared reference grammar.
struct RawReference {
    space: String,
    external_id: String,
    version: Option<String>,
    property: Option<String>,
}

fn malformed(text: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::MalformedReference {
        text: text.to_string(),
        reason: reason.into(),
    }
}

fn parse_reference(text: &str) -> Result<RawReference, SchemaError> {
    let captures = reference_pattern()
        .captures(text.trim())
        .ok_or_else(|| malformed(text, "expected space:externalId(version=..,property=..)"))?;
    let mut raw = RawReference {
        space: captures["space"].to_string(),
        external_id: captures["external_id"].to_string(),
        version: None,
        property: None,
    };
    if let Some(args) = captures.name("args") {
        for arg in args.as_str().split(',') {
            let (key, value) = arg
                .split_once('=')
                .ok_or_else(|| malformed(text, "arguments must be key=value pairs"))?;
            let value = value.trim();
            if value.is_empty() {
                return Err(malformed(text, format!("empty value for argument '{}'", key.trim())));
            }
            match key.trim() {
                "version" => raw.version = Some(value.to_string()),
                "property" => raw.property = Some(value.to_string()),
                other => return Err(malformed(text, format!("unknown argument '{other}'"))),
            }
        }
    }
    Ok(raw)
}

fn write_args(
    f: &mut fmt::Formatter<'_>,
    version: Option<&str>,
    property: Option<&str>,
) -> fmt::Result {
    match (version, property) {
        (None, None) => Ok(()),
        (Some(v), None) => write!(f, "(version={v})"),
        (None, Some(p)) => write!(f, "(property={p})"),
        (Some(v), Some(p)) => write!(f, "(version={v},property={p})"),
    }
}

/// Serialize/deserialize a reference type through its text form.
macro_rules! text_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(de::Error::custom)
            }
        }
    };
}

/// Reference to a logical class, the lineage tier behind every physical
/// declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassRef {
    pub space: String,
    pub external_id: String,
    pub version: Option<String>,
}

impl ClassRef {
    pub fn new(space: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
            version: None,
        }
    }

    /// Project into a view reference, carrying the version along.
    pub fn as_view(&self) -> ViewRef {
        ViewRef {
            space: self.space.clone(),
            external_id: self.external_id.clone(),
            version: self.version.clone(),
        }
    }
}

impl FromStr for ClassRef {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = parse_reference(s)?;
        if raw.property.is_some() {
            return Err(malformed(s, "a class reference cannot carry a property"));
        }
        Ok(Self {
            space: raw.space,
            external_id: raw.external_id,
            version: raw.version,
        })
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.external_id)?;
        write_args(f, self.version.as_deref(), None)
    }
}

text_serde!(ClassRef);

/// Reference to a view, the query-facing projection of the physical tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewRef {
    pub space: String,
    pub external_id: String,
    pub version: Option<String>,
}

impl ViewRef {
    pub fn new(space: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Project into a class reference, stripping the version.
    pub fn as_class(&self) -> ClassRef {
        ClassRef::new(self.space.clone(), self.external_id.clone())
    }

    /// Project into a container reference (containers are never versioned).
    pub fn as_container(&self) -> ContainerRef {
        ContainerRef {
            space: self.space.clone(),
            external_id: self.external_id.clone(),
        }
    }

    /// The materialized identity of this view, falling back to the default
    /// version when the reference carries none.
    pub fn to_id(&self) -> ViewId {
        ViewId {
            space: self.space.clone(),
            external_id: self.external_id.clone(),
            version: self.version.clone().unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        }
    }
}

impl FromStr for ViewRef {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = parse_reference(s)?;
        if raw.property.is_some() {
            return Err(malformed(s, "a view reference cannot carry a property"));
        }
        Ok(Self {
            space: raw.space,
            external_id: raw.external_id,
            version: raw.version,
        })
    }
}

impl fmt::Display for ViewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.external_id)?;
        write_args(f, self.version.as_deref(), None)
    }
}

text_serde!(ViewRef);

/// Identity of a materialized view: the version is always concrete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId {
    pub space: String,
    pub external_id: String,
    pub version: String,
}

impl ViewId {
    pub fn to_ref(&self) -> ViewRef {
        ViewRef {
            space: self.space.clone(),
            external_id: self.external_id.clone(),
            version: Some(self.version.clone()),
        }
    }
}

impl FromStr for ViewId {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = parse_reference(s)?;
        if raw.property.is_some() {
            return Err(malformed(s, "a view identity cannot carry a property"));
        }
        let version = raw
            .version
            .ok_or_else(|| malformed(s, "a view identity requires a version"))?;
        Ok(Self {
            space: raw.space,
            external_id: raw.external_id,
            version,
        })
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.external_id)?;
        write_args(f, Some(&self.version), None)
    }
}

text_serde!(ViewId);

/// Reference to a container, the storage unit of the physical tier.
/// Containers are never versioned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerRef {
    pub space: String,
    pub external_id: String,
}

impl ContainerRef {
    pub fn new(space: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
        }
    }

    /// Project into a class reference.
    pub fn as_class(&self) -> ClassRef {
        ClassRef::new(self.space.clone(), self.external_id.clone())
    }

    /// Project into an (unversioned) view reference.
    pub fn as_view(&self) -> ViewRef {
        ViewRef::new(self.space.clone(), self.external_id.clone())
    }
}

impl FromStr for ContainerRef {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = parse_reference(s)?;
        if raw.version.is_some() {
            return Err(malformed(s, "a container reference cannot carry a version"));
        }
        if raw.property.is_some() {
            return Err(malformed(s, "a container reference cannot carry a property"));
        }
        Ok(Self {
            space: raw.space,
            external_id: raw.external_id,
        })
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.external_id)
    }
}

text_serde!(ContainerRef);

/// Reference to one property of a view, used as the value type of reverse
/// connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewPropertyRef {
    pub space: String,
    pub external_id: String,
    pub version: Option<String>,
    pub property: String,
}

impl ViewPropertyRef {
    /// The view this property belongs to.
    pub fn as_view(&self) -> ViewRef {
        ViewRef {
            space: self.space.clone(),
            external_id: self.external_id.clone(),
            version: self.version.clone(),
        }
    }
}

impl FromStr for ViewPropertyRef {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = parse_reference(s)?;
        let property = raw
            .property
            .ok_or_else(|| malformed(s, "a view property reference requires a property"))?;
        Ok(Self {
            space: raw.space,
            external_id: raw.external_id,
            version: raw.version,
            property,
        })
    }
}

impl fmt::Display for ViewPropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.external_id)?;
        write_args(f, self.version.as_deref(), Some(&self.property))
    }
}

text_serde!(ViewPropertyRef);

/// Pointer into the reference schema a declaration was inherited from.
/// Carried by rows, views and containers of extension schemas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferencePointer {
    pub space: String,
    pub external_id: String,
    pub version: Option<String>,
    pub property: Option<String>,
}

impl ReferencePointer {
    pub fn as_view(&self) -> ViewRef {
        ViewRef {
            space: self.space.clone(),
            external_id: self.external_id.clone(),
            version: self.version.clone(),
        }
    }

    pub fn as_container(&self) -> ContainerRef {
        ContainerRef {
            space: self.space.clone(),
            external_id: self.external_id.clone(),
        }
    }
}

impl FromStr for ReferencePointer {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = parse_reference(s)?;
        Ok(Self {
            space: raw.space,
            external_id: raw.external_id,
            version: raw.version,
            property: raw.property,
        })
    }
}

impl fmt::Display for ReferencePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.external_id)?;
        write_args(f, self.version.as_deref(), self.property.as_deref())
    }
}

text_serde!(ReferencePointer);

/// Primitive datatypes supported by the physical tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Text,
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Date,
    Timestamp,
    Json,
}

impl Primitive {
    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::Text => "text",
            Primitive::Boolean => "boolean",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Date => "date",
            Primitive::Timestamp => "timestamp",
            Primitive::Json => "json",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "text" => Primitive::Text,
            "boolean" => Primitive::Boolean,
            "int32" => Primitive::Int32,
            "int64" => Primitive::Int64,
            "float32" => Primitive::Float32,
            "float64" => Primitive::Float64,
            "date" => Primitive::Date,
            "timestamp" => Primitive::Timestamp,
            "json" => Primitive::Json,
            _ => return None,
        })
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value type of a property row: a primitive datatype, or the target of a
/// connection. A closed union; legality per connection kind is enforced in
/// one place by the row-level checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Primitive(Primitive),
    View(ViewRef),
    ViewProperty(ViewPropertyRef),
    /// Unresolved placeholder. Equal only to itself; never satisfies a
    /// "must be declared" check.
    Unknown,
}

impl FromStr for ValueType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text == UNKNOWN_MARKER {
            return Ok(ValueType::Unknown);
        }
        if let Some(primitive) = Primitive::parse(text) {
            return Ok(ValueType::Primitive(primitive));
        }
        let raw = parse_reference(text)?;
        Ok(match raw.property {
            Some(property) => ValueType::ViewProperty(ViewPropertyRef {
                space: raw.space,
                external_id: raw.external_id,
                version: raw.version,
                property,
            }),
            None => ValueType::View(ViewRef {
                space: raw.space,
                external_id: raw.external_id,
                version: raw.version,
            }),
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Primitive(primitive) => primitive.fmt(f),
            ValueType::View(view) => view.fmt(f),
            ValueType::ViewProperty(property) => property.fmt(f),
            ValueType::Unknown => f.write_str(UNKNOWN_MARKER),
        }
    }
}

text_serde!(ValueType);

/// Connection kind of a property row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    Direct,
    Edge,
    Reverse,
}

impl Connection {
    pub fn as_str(self) -> &'static str {
        match self {
            Connection::Direct => "direct",
            Connection::Edge => "edge",
            Connection::Reverse => "reverse",
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T>(text: &str)
    where
        T: FromStr<Err = SchemaError> + fmt::Display,
    {
        let parsed: T = text.parse().unwrap();
        assert_eq!(parsed.to_string(), text);
    }

    #[test]
    fn test_class_roundtrip() {
        roundtrip::<ClassRef>("power:GeneratingUnit");
        roundtrip::<ClassRef>("power:GeneratingUnit(version=2)");
    }

    #[test]
    fn test_view_roundtrip() {
        roundtrip::<ViewRef>("power:GeneratingUnit");
        roundtrip::<ViewRef>("power:GeneratingUnit(version=2)");
    }

    #[test]
    fn test_container_roundtrip() {
        roundtrip::<ContainerRef>("power:Asset");
    }

    #[test]
    fn test_view_property_roundtrip() {
        roundtrip::<ViewPropertyRef>("power:GeneratingUnit(property=name)");
        roundtrip::<ViewPropertyRef>("power:GeneratingUnit(version=2,property=name)");
    }

    #[test]
    fn test_reference_pointer_roundtrip() {
        roundtrip::<ReferencePointer>("power:GeneratingUnit");
        roundtrip::<ReferencePointer>("power:GeneratingUnit(version=2,property=name)");
    }

    #[test]
    fn test_value_type_roundtrip() {
        roundtrip::<ValueType>("int64");
        roundtrip::<ValueType>("power:GeneratingUnit(version=2)");
        roundtrip::<ValueType>("power:GeneratingUnit(property=name)");
        roundtrip::<ValueType>("#N/A");
    }

    #[test]
    fn test_malformed_references() {
        assert!("GeneratingUnit".parse::<ViewRef>().is_err());
        assert!("power:Generating Unit".parse::<ViewRef>().is_err());
        assert!("power:GeneratingUnit(foo=1)".parse::<ViewRef>().is_err());
        assert!("power:GeneratingUnit(version=)".parse::<ViewRef>().is_err());
        assert!("power:Asset(version=1)".parse::<ContainerRef>().is_err());
        assert!("power:GeneratingUnit".parse::<ViewPropertyRef>().is_err());
        assert!("power:GeneratingUnit".parse::<ViewId>().is_err());
    }

    #[test]
    fn test_projections() {
        let view: ViewRef = "power:GeneratingUnit(version=2)".parse().unwrap();
        assert_eq!(view.as_class().to_string(), "power:GeneratingUnit");
        assert_eq!(view.as_container().to_string(), "power:GeneratingUnit");
        assert_eq!(view.to_id().to_string(), "power:GeneratingUnit(version=2)");

        let unversioned: ViewRef = "power:GeneratingUnit".parse().unwrap();
        assert_eq!(unversioned.to_id().version, DEFAULT_VERSION);
    }

    #[test]
    fn test_unknown_is_only_equal_to_itself() {
        let unknown: ValueType = UNKNOWN_MARKER.parse().unwrap();
        assert_eq!(unknown, ValueType::Unknown);
        assert_ne!(unknown, "text".parse::<ValueType>().unwrap());
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let view: ViewRef = "  power:GeneratingUnit ".parse().unwrap();
        assert_eq!(view.to_string(), "power:GeneratingUnit");
    }

    #[test]
    fn test_serde_through_text_form() {
        let view: ViewRef = "power:GeneratingUnit(version=2)".parse().unwrap();
        let json = serde_json::to_string(&view).unwrap();
        assert_eq!(json, "\"power:GeneratingUnit(version=2)\"");
        let back: ViewRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, view);
    }
}
