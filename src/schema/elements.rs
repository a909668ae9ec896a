//! Core schema elements and type definitions.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the type used for objects whose kind has no declared schema.
pub const DEDUCED_TYPE_NAME: &str = "__untyped_deduced_";

/// Name of the fully atomic companion of the deduced type.
pub const DEDUCED_ATOMIC_TYPE_NAME: &str = "__untyped_atomic_";

/// Schema is a list of named types.
///
/// Types are indexed by name on the first lookup, so a schema should be
/// treated as immutable once in use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<TypeDef>,

    #[serde(skip)]
    type_map: OnceCell<HashMap<String, TypeDef>>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
    }
}

/// TypeDef represents a named type in a schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(flatten)]
    pub atom: Atom,
}

/// TypeRef either refers to a named type or declares an inlined type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "namedType")]
    pub named_type: Option<String>,

    #[serde(flatten)]
    pub inlined: Box<Atom>,

    /// Overrides the relationship of the referred map or list type.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "elementRelationship"
    )]
    pub element_relationship: Option<ElementRelationship>,
}

/// Atom lists the shapes a value of this type may take.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<List>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<Map>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scalar {
    Numeric,
    String,
    Boolean,
    Untyped,
}

/// How the elements of a container relate to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementRelationship {
    /// List items are identified by their key fields, or by their value for
    /// lists of scalars.
    Associative,
    /// The container is owned and replaced as a whole.
    Atomic,
    /// Items are independent; the default for maps.
    #[default]
    Separable,
}

/// Map describes either a struct with declared fields, a free-form map, or
/// both (declared fields plus an element type for the rest).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Map {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<StructField>,

    /// Type of the keys not declared in `fields`.
    #[serde(default, rename = "elementType")]
    pub element_type: TypeRef,

    #[serde(
        default,
        skip_serializing_if = "is_default_element_relationship",
        rename = "elementRelationship"
    )]
    pub element_relationship: ElementRelationship,

    #[serde(skip)]
    field_map: OnceCell<HashMap<String, StructField>>,
}

fn is_default_element_relationship(er: &ElementRelationship) -> bool {
    *er == ElementRelationship::Separable
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
            && self.element_type == other.element_type
            && self.element_relationship == other.element_relationship
    }
}

/// StructField pairs a field name with a field type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, rename = "type")]
    pub field_type: TypeRef,

    /// Value the field takes when it is absent from an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct List {
    #[serde(default, rename = "elementType")]
    pub element_type: TypeRef,

    #[serde(default, rename = "elementRelationship")]
    pub element_relationship: ElementRelationship,

    /// Fields of the element map identifying an item of an associative list.
    /// Empty for associative lists of scalars.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn with_types(types: Vec<TypeDef>) -> Self {
        Schema {
            types,
            type_map: OnceCell::new(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Schema, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Returns the schema extended with the deduced types, unless it already
    /// declares them.
    pub fn with_deduced_types(mut self) -> Self {
        if !self.types.iter().any(|t| t.name == DEDUCED_TYPE_NAME) {
            self.types.extend(deduced_types());
            self.type_map = OnceCell::new();
        }
        self
    }

    pub fn find_named_type(&self, name: &str) -> Option<&TypeDef> {
        let map = self.type_map.get_or_init(|| {
            self.types
                .iter()
                .map(|t| (t.name.clone(), t.clone()))
                .collect()
        });
        map.get(name)
    }

    /// Returns the atom referenced, whether it is inline or named, with the
    /// reference's relationship override applied. `None` if a named type is
    /// missing.
    pub fn resolve(&self, tr: &TypeRef) -> Option<Atom> {
        let mut atom = match tr.named_type {
            Some(ref named) => self.find_named_type(named)?.atom.clone(),
            None => (*tr.inlined).clone(),
        };

        if let Some(relationship) = tr.element_relationship {
            if let Some(map) = atom.map.as_mut() {
                map.element_relationship = relationship;
            }
            if let Some(list) = atom.list.as_mut() {
                list.element_relationship = relationship;
            }
        }
        Some(atom)
    }
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef {
            named_type: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn deduced() -> Self {
        TypeRef::named(DEDUCED_TYPE_NAME)
    }
}

impl Map {
    pub fn find_field(&self, name: &str) -> Option<&StructField> {
        let map = self.field_map.get_or_init(|| {
            self.fields
                .iter()
                .map(|f| (f.name.clone(), f.clone()))
                .collect()
        });
        map.get(name)
    }

    /// Type of the value stored under `name`: the declared field type, or the
    /// element type for undeclared keys.
    pub fn field_type(&self, name: &str) -> &TypeRef {
        match self.find_field(name) {
            Some(field) => &field.field_type,
            None => &self.element_type,
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.element_relationship == ElementRelationship::Atomic
    }
}

impl List {
    pub fn is_atomic(&self) -> bool {
        self.element_relationship == ElementRelationship::Atomic
    }

    pub fn is_associative(&self) -> bool {
        self.element_relationship == ElementRelationship::Associative
    }
}

fn deduced_types() -> Vec<TypeDef> {
    let untyped = |map_element: &str, map_relationship| Atom {
        scalar: Some(Scalar::Untyped),
        list: Some(List {
            element_type: TypeRef::named(DEDUCED_ATOMIC_TYPE_NAME),
            element_relationship: ElementRelationship::Atomic,
            keys: Vec::new(),
        }),
        map: Some(Map {
            element_type: TypeRef::named(map_element),
            element_relationship: map_relationship,
            ..Default::default()
        }),
    };

    vec![
        TypeDef {
            name: DEDUCED_ATOMIC_TYPE_NAME.to_string(),
            atom: untyped(DEDUCED_ATOMIC_TYPE_NAME, ElementRelationship::Atomic),
        },
        TypeDef {
            name: DEDUCED_TYPE_NAME.to_string(),
            atom: untyped(DEDUCED_TYPE_NAME, ElementRelationship::Separable),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"types:
- name: port
  map:
    fields:
    - name: name
      type:
        scalar: string
    - name: protocol
      type:
        scalar: string
      default: TCP
- name: ports
  list:
    elementType:
      namedType: port
    elementRelationship: associative
    keys: [name, protocol]
"#;

    #[test]
    fn test_relationship_serialization() {
        assert_eq!(
            serde_json::to_string(&ElementRelationship::Associative).unwrap(),
            "\"associative\""
        );
        assert_eq!(serde_json::to_string(&Scalar::Numeric).unwrap(), "\"numeric\"");
        assert_eq!(ElementRelationship::default(), ElementRelationship::Separable);
    }

    #[test]
    fn test_from_yaml() {
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let port = schema.find_named_type("port").unwrap();
        let map = port.atom.map.as_ref().unwrap();
        assert_eq!(
            map.find_field("protocol").and_then(|f| f.default.clone()),
            Some(serde_json::json!("TCP"))
        );
        assert_eq!(map.field_type("name").inlined.scalar, Some(Scalar::String));
        assert_eq!(map.field_type("other"), &TypeRef::default());

        let ports = schema.resolve(&TypeRef::named("ports")).unwrap();
        let list = ports.list.unwrap();
        assert!(list.is_associative());
        assert_eq!(list.keys, vec!["name", "protocol"]);
        assert!(schema.resolve(&TypeRef::named("missing")).is_none());
    }

    #[test]
    fn test_resolve_with_override() {
        let schema = Schema::from_yaml(SCHEMA).unwrap();
        let atomic = TypeRef {
            element_relationship: Some(ElementRelationship::Atomic),
            ..TypeRef::named("ports")
        };
        assert!(schema.resolve(&atomic).unwrap().list.unwrap().is_atomic());
    }

    #[test]
    fn test_deduced_types() {
        let schema = Schema::from_yaml(SCHEMA).unwrap().with_deduced_types();
        let len = schema.types.len();
        let schema = schema.with_deduced_types();
        assert_eq!(schema.types.len(), len);

        let deduced = schema.resolve(&TypeRef::deduced()).unwrap();
        assert!(!deduced.map.as_ref().unwrap().is_atomic());
        assert!(deduced.list.as_ref().unwrap().is_atomic());
        assert_eq!(
            deduced.map.unwrap().element_type,
            TypeRef::named(DEDUCED_TYPE_NAME)
        );
    }
}
