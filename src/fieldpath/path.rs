//! Path elements and paths addressing nodes of an object tree.

use crate::value::{Field, FieldList, Value};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// PathElement represents one level of path navigation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    /// Field name of a map or struct.
    FieldName(String),
    /// Key fields of an item in an associative list.
    Key(FieldList),
    /// Value of an item in a set-like list of scalars.
    Value(Value),
    /// Position of an item in a list without identity.
    Index(i32),
}

impl PathElement {
    pub fn field_name(name: impl Into<String>) -> Self {
        PathElement::FieldName(name.into())
    }

    /// Builds a key element from `(name, value)` pairs in any order.
    pub fn key<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        PathElement::Key(FieldList::with_fields(
            pairs
                .into_iter()
                .map(|(name, value)| Field {
                    name: name.into(),
                    value,
                })
                .collect(),
        ))
    }

    pub fn value(v: Value) -> Self {
        PathElement::Value(v)
    }

    pub fn index(i: i32) -> Self {
        PathElement::Index(i)
    }

    pub fn as_field_name(&self) -> Option<&str> {
        match self {
            PathElement::FieldName(name) => Some(name),
            _ => None,
        }
    }

    fn type_order(&self) -> u8 {
        match self {
            PathElement::FieldName(_) => 0,
            PathElement::Key(_) => 1,
            PathElement::Value(_) => 2,
            PathElement::Index(_) => 3,
        }
    }
}

impl PartialOrd for PathElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Field names sort before keys, keys before values, values before indices.
impl Ord for PathElement {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PathElement::FieldName(a), PathElement::FieldName(b)) => a.cmp(b),
            (PathElement::Key(a), PathElement::Key(b)) => a.cmp(b),
            (PathElement::Value(a), PathElement::Value(b)) => a.cmp(b),
            (PathElement::Index(a), PathElement::Index(b)) => a.cmp(b),
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::FieldName(name) => write!(f, ".{}", name),
            PathElement::Key(fields) => {
                write!(f, "[")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", field.name, field.value)?;
                }
                write!(f, "]")
            }
            PathElement::Value(v) => write!(f, "[={}]", v),
            PathElement::Index(i) => write!(f, "[{}]", i),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathParseError {
    #[error("path {0:?} must start with '.'")]
    MissingLeadingDot(String),
    #[error("path {0:?} contains an empty field name")]
    EmptyFieldName(String),
}

/// Path represents a complete path to a nested field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    elements: Vec<PathElement>,
}

impl Path {
    pub fn new() -> Self {
        Path {
            elements: Vec::new(),
        }
    }

    pub fn from_elements(elements: Vec<PathElement>) -> Self {
        Path { elements }
    }

    /// Builds a path made only of field names.
    pub fn from_fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().map(PathElement::field_name).collect()
    }

    /// Parses the dotted form used in configuration, e.g. `.spec.replicas`.
    ///
    /// Only field-name chains are accepted.
    pub fn parse(s: &str) -> Result<Path, PathParseError> {
        let rest = s
            .strip_prefix('.')
            .ok_or_else(|| PathParseError::MissingLeadingDot(s.to_string()))?;
        rest.split('.')
            .map(|name| {
                if name.is_empty() {
                    Err(PathParseError::EmptyFieldName(s.to_string()))
                } else {
                    Ok(PathElement::field_name(name))
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.elements.iter()
    }

    pub fn push(&mut self, element: PathElement) {
        self.elements.push(element);
    }

    pub fn pop(&mut self) -> Option<PathElement> {
        self.elements.pop()
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.elements.last()
    }

    /// Returns a copy of this path with `element` appended.
    pub fn with(&self, element: PathElement) -> Self {
        let mut new_path = self.clone();
        new_path.push(element);
        new_path
    }

    pub fn as_slice(&self) -> &[PathElement] {
        &self.elements
    }

    /// Returns true if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.elements.starts_with(&prefix.elements)
    }

    /// Replaces the leading `from` prefix with `to`.
    pub fn replace_prefix(&self, from: &Path, to: &Path) -> Option<Path> {
        if !self.starts_with(from) {
            return None;
        }
        let mut elements = to.elements.clone();
        elements.extend_from_slice(&self.elements[from.len()..]);
        Some(Path { elements })
    }

    /// Returns the field names of the path, or `None` if it holds any other
    /// kind of element.
    pub fn field_names(&self) -> Option<Vec<&str>> {
        self.elements.iter().map(PathElement::as_field_name).collect()
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<T: IntoIterator<Item = PathElement>>(iter: T) -> Self {
        Path {
            elements: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Path {
    type Item = PathElement;
    type IntoIter = std::vec::IntoIter<PathElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a PathElement;
    type IntoIter = std::slice::Iter<'a, PathElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            write!(f, "{}", element)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_operations() {
        let mut path = Path::new();
        assert!(path.is_empty());

        path.push(PathElement::field_name("metadata"));
        path.push(PathElement::field_name("name"));
        assert_eq!(path.len(), 2);
        assert_eq!(path.last(), Some(&PathElement::field_name("name")));

        assert_eq!(path.pop(), Some(PathElement::field_name("name")));
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn test_path_display() {
        let path = Path::from_elements(vec![
            PathElement::field_name("spec"),
            PathElement::field_name("containers"),
            PathElement::key([("name", Value::from("nginx"))]),
            PathElement::field_name("ports"),
            PathElement::index(0),
        ]);
        assert_eq!(path.to_string(), r#".spec.containers[name="nginx"].ports[0]"#);
        assert_eq!(
            Path::from_elements(vec![PathElement::value(Value::from("a"))]).to_string(),
            r#"[="a"]"#
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            Path::parse(".spec.replicas").unwrap(),
            Path::from_fields(["spec", "replicas"])
        );
        assert_eq!(
            Path::parse("spec"),
            Err(PathParseError::MissingLeadingDot("spec".into()))
        );
        assert_eq!(
            Path::parse(".spec..x"),
            Err(PathParseError::EmptyFieldName(".spec..x".into()))
        );
    }

    #[test]
    fn test_prefix_operations() {
        let path = Path::from_fields(["spec", "template", "spec"]);
        assert!(path.starts_with(&Path::from_fields(["spec"])));
        assert!(path.starts_with(&Path::new()));
        assert!(!path.starts_with(&Path::from_fields(["status"])));

        let renamed = path
            .replace_prefix(&Path::from_fields(["spec", "template"]), &Path::from_fields(["tpl"]))
            .unwrap();
        assert_eq!(renamed, Path::from_fields(["tpl", "spec"]));
        assert_eq!(path.field_names(), Some(vec!["spec", "template", "spec"]));
    }

    #[test]
    fn test_path_element_ordering() {
        let a = PathElement::field_name("a");
        let b = PathElement::field_name("b");
        assert!(a < b);
        assert!(b < PathElement::key([("name", Value::from("x"))]));
        assert!(PathElement::key([("name", Value::from("x"))]) < PathElement::value(Value::Int(0)));
        assert!(PathElement::value(Value::Int(9)) < PathElement::index(0));
    }
}
