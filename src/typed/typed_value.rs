//! TypedValue: a value paired with the schema type describing it.

use super::comparison::Comparison;
use super::validation::{ValidationError, ValidationErrors};
use crate::fieldpath::{FieldSet, Path, PathElement};
use crate::schema::{self, Atom, Scalar, Schema, TypeRef};
use crate::value::{Field, FieldList, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// TypedValue is a Value paired with its schema and type.
#[derive(Debug, Clone)]
pub struct TypedValue {
    value: Value,
    type_ref: TypeRef,
    schema: Arc<Schema>,
}

/// How a node is traversed: as a leaf, as a map of fields, or as a list
/// of identified items.
enum Shape {
    Leaf,
    Map(schema::Map),
    List(schema::List),
}

/// Creates a TypedValue after validating it against the schema.
pub fn as_typed(
    value: Value,
    schema: Arc<Schema>,
    type_ref: TypeRef,
) -> Result<TypedValue, ValidationErrors> {
    let tv = TypedValue::new(value, schema, type_ref);
    tv.validate()?;
    Ok(tv)
}

impl TypedValue {
    pub fn new(value: Value, schema: Arc<Schema>, type_ref: TypeRef) -> Self {
        TypedValue {
            value,
            type_ref,
            schema,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns a value of the same type holding `value`.
    pub fn with_value(&self, value: Value) -> TypedValue {
        TypedValue {
            value,
            type_ref: self.type_ref.clone(),
            schema: Arc::clone(&self.schema),
        }
    }

    /// Returns an empty object of the same type.
    pub fn empty(&self) -> TypedValue {
        self.with_value(Value::Map(Map::new()))
    }

    fn atom(&self, type_ref: &TypeRef) -> Option<Atom> {
        self.schema.resolve(type_ref)
    }

    fn shape(atom: Option<&Atom>, value: &Value) -> Shape {
        let Some(atom) = atom else {
            return Shape::Leaf;
        };
        match value {
            Value::Map(_) => match &atom.map {
                Some(map) if !map.is_atomic() => Shape::Map(map.clone()),
                _ => Shape::Leaf,
            },
            Value::List(_) => match &atom.list {
                Some(list) if !list.is_atomic() => Shape::List(list.clone()),
                _ => Shape::Leaf,
            },
            _ => Shape::Leaf,
        }
    }

    /// Computes the path element identifying `item` within `list`.
    ///
    /// Key fields missing from the item take the default declared on the
    /// element type.
    fn item_key(&self, item: &Value, list: &schema::List) -> Result<PathElement, ValidationError> {
        if !list.is_associative() {
            return Err(ValidationError::schema_error("list items are not identified"));
        }
        if list.keys.is_empty() {
            if item.is_scalar() {
                return Ok(PathElement::Value(item.clone()));
            }
            return Err(ValidationError::type_mismatch("", "scalar set item", item.type_name()));
        }

        let Value::Map(fields) = item else {
            return Err(ValidationError::type_mismatch("", "map", item.type_name()));
        };
        let element_map = self.atom(&list.element_type).and_then(|a| a.map);

        let mut key = Vec::with_capacity(list.keys.len());
        for name in &list.keys {
            let value = match fields.get(name) {
                Some(v) => v.clone(),
                None => element_map
                    .as_ref()
                    .and_then(|m| m.find_field(name))
                    .and_then(|f| f.default.clone())
                    .map(Value::from)
                    .ok_or_else(|| ValidationError::missing_key("", name.clone()))?,
            };
            key.push(Field {
                name: name.clone(),
                value,
            });
        }
        Ok(PathElement::Key(FieldList::with_fields(key)))
    }

    fn item_element(&self, item: &Value, list: &schema::List, index: usize) -> PathElement {
        self.item_key(item, list)
            .unwrap_or_else(|_| PathElement::index(index as i32))
    }

    /// Checks the value against the schema: scalar kinds, container kinds,
    /// and key fields of associative lists.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        self.validate_value(&self.value, &self.type_ref, &Path::new(), &mut errors);
        errors.into_result()
    }

    fn validate_value(
        &self,
        value: &Value,
        type_ref: &TypeRef,
        path: &Path,
        errors: &mut ValidationErrors,
    ) {
        let Some(atom) = self.atom(type_ref) else {
            errors.add(ValidationError::schema_error(format!(
                "no type found matching: {}",
                type_ref.named_type.as_deref().unwrap_or_default()
            )));
            return;
        };
        if atom == Atom::default() {
            return;
        }

        match value {
            Value::Null => {}
            Value::Map(fields) => {
                let Some(map) = &atom.map else {
                    errors.add(ValidationError::type_mismatch(path.to_string(), describe(&atom), "map"));
                    return;
                };
                for (key, val) in fields.iter() {
                    let child = path.with(PathElement::field_name(key.clone()));
                    self.validate_value(val, map.field_type(key), &child, errors);
                }
            }
            Value::List(items) => {
                let Some(list) = &atom.list else {
                    errors.add(ValidationError::type_mismatch(path.to_string(), describe(&atom), "list"));
                    return;
                };
                let mut seen = HashMap::new();
                for (i, item) in items.iter().enumerate() {
                    let pe = if list.is_associative() {
                        match self.item_key(item, list) {
                            Ok(pe) => {
                                if seen.insert(pe.clone(), i).is_some() {
                                    errors.add(ValidationError::duplicate_key(path.to_string(), pe.to_string()));
                                }
                                pe
                            }
                            Err(err) => {
                                errors.add(with_path(err, path));
                                PathElement::index(i as i32)
                            }
                        }
                    } else {
                        PathElement::index(i as i32)
                    };
                    self.validate_value(item, &list.element_type, &path.with(pe), errors);
                }
            }
            scalar => {
                let valid = match atom.scalar {
                    Some(Scalar::Numeric) => matches!(scalar, Value::Int(_) | Value::Float(_)),
                    Some(Scalar::String) => matches!(scalar, Value::String(_)),
                    Some(Scalar::Boolean) => matches!(scalar, Value::Bool(_)),
                    Some(Scalar::Untyped) => true,
                    None => false,
                };
                if !valid {
                    errors.add(ValidationError::type_mismatch(
                        path.to_string(),
                        describe(&atom),
                        scalar.type_name(),
                    ));
                }
            }
        }
    }

    /// Returns every path the value sets.
    ///
    /// Leaves, atomic containers and list items are members. Map fields are
    /// members when their value is null or an empty map, and when the key is
    /// not a declared struct field (an entry of a free-form map).
    pub fn to_field_set(&self) -> FieldSet {
        let mut set = FieldSet::new();
        self.collect_field_set(&self.value, &self.type_ref, &Path::new(), &mut set);
        set
    }

    fn collect_field_set(&self, value: &Value, type_ref: &TypeRef, path: &Path, set: &mut FieldSet) {
        let atom = self.atom(type_ref);
        match (Self::shape(atom.as_ref(), value), value) {
            (Shape::Map(map), Value::Map(fields)) => {
                for (key, val) in fields.iter() {
                    let child = path.with(PathElement::field_name(key.clone()));
                    let empty_map = val.as_map().is_some_and(Map::is_empty);
                    if val.is_null() || empty_map || map.find_field(key).is_none() {
                        set.insert(&child);
                    }
                    self.collect_field_set(val, map.field_type(key), &child, set);
                }
            }
            (Shape::List(list), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let child = path.with(self.item_element(item, &list, i));
                    set.insert(&child);
                    self.collect_field_set(item, &list.element_type, &child, set);
                }
            }
            _ => set.insert(path),
        }
    }

    /// Compares `self` (left-hand side) with `rhs`.
    pub fn compare(&self, rhs: &TypedValue) -> Result<Comparison, ValidationErrors> {
        self.check_same_type(rhs)?;
        let mut comparison = Comparison::new();
        self.compare_values(
            Some(&self.value),
            Some(&rhs.value),
            &self.type_ref,
            &Path::new(),
            &mut comparison,
        );
        Ok(comparison)
    }

    fn check_same_type(&self, rhs: &TypedValue) -> Result<(), ValidationErrors> {
        if self.type_ref != rhs.type_ref {
            return Err(ValidationErrors::from_error(ValidationError::schema_error(
                "expected objects of the same type",
            )));
        }
        Ok(())
    }

    fn compare_values(
        &self,
        lhs: Option<&Value>,
        rhs: Option<&Value>,
        type_ref: &TypeRef,
        path: &Path,
        comparison: &mut Comparison,
    ) {
        let atom = self.atom(type_ref);
        let lhs_shape = lhs.map(|v| Self::shape(atom.as_ref(), v));
        let rhs_shape = rhs.map(|v| Self::shape(atom.as_ref(), v));

        let same_container = matches!(
            (&lhs_shape, &rhs_shape),
            (Some(Shape::Map(_)), Some(Shape::Map(_))) | (Some(Shape::List(_)), Some(Shape::List(_)))
        );
        match (lhs, rhs) {
            (None, None) => return,
            (None, Some(_)) => comparison.added.insert(path),
            (Some(_), None) => comparison.removed.insert(path),
            (Some(l), Some(r)) => {
                if !same_container && l != r {
                    comparison.modified.insert(path);
                }
            }
        }

        let lhs_fields = match (&lhs_shape, lhs) {
            (Some(Shape::Map(m)), Some(Value::Map(f))) => Some((m, f)),
            _ => None,
        };
        let rhs_fields = match (&rhs_shape, rhs) {
            (Some(Shape::Map(m)), Some(Value::Map(f))) => Some((m, f)),
            _ => None,
        };
        if let Some(map) = lhs_fields.or(rhs_fields).map(|(m, _)| m) {
            let lf = lhs_fields.map(|(_, f)| f);
            let rf = rhs_fields.map(|(_, f)| f);
            for key in lf.into_iter().flat_map(|f| f.keys()) {
                if rf.is_some_and(|rf| rf.has(key)) {
                    continue;
                }
                let child = path.with(PathElement::field_name(key.clone()));
                self.compare_values(lf.and_then(|f| f.get(key)), None, map.field_type(key), &child, comparison);
            }
            for key in rf.into_iter().flat_map(|f| f.keys()) {
                let child = path.with(PathElement::field_name(key.clone()));
                self.compare_values(
                    lf.and_then(|f| f.get(key)),
                    rf.and_then(|f| f.get(key)),
                    map.field_type(key),
                    &child,
                    comparison,
                );
            }
        }

        let lhs_items = match (&lhs_shape, lhs) {
            (Some(Shape::List(l)), Some(Value::List(items))) => Some((l, items)),
            _ => None,
        };
        let rhs_items = match (&rhs_shape, rhs) {
            (Some(Shape::List(l)), Some(Value::List(items))) => Some((l, items)),
            _ => None,
        };
        if let Some(list) = lhs_items.or(rhs_items).map(|(l, _)| l) {
            let lk = self.keyed_items(lhs_items.map(|(_, items)| items.as_slice()), list);
            let rk = self.keyed_items(rhs_items.map(|(_, items)| items.as_slice()), list);
            let l_index: HashMap<&PathElement, &Value> = lk.iter().map(|(pe, v)| (pe, *v)).collect();
            let r_index: HashMap<&PathElement, &Value> = rk.iter().map(|(pe, v)| (pe, *v)).collect();

            for (pe, item) in &lk {
                if !r_index.contains_key(pe) {
                    let child = path.with(pe.clone());
                    self.compare_values(Some(*item), None, &list.element_type, &child, comparison);
                }
            }
            for (pe, item) in &rk {
                let child = path.with(pe.clone());
                self.compare_values(l_index.get(pe).copied(), Some(*item), &list.element_type, &child, comparison);
            }
        }
    }

    fn keyed_items<'v>(
        &self,
        items: Option<&'v [Value]>,
        list: &schema::List,
    ) -> Vec<(PathElement, &'v Value)> {
        items
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, item)| (self.item_element(item, list, i), item))
            .collect()
    }

    /// Merges `rhs` into `self`; values from `rhs` win.
    ///
    /// Maps merge field by field and associative lists merge item by item,
    /// keeping the order of `self` and appending new items. Atomic
    /// containers and everything else are replaced. A null in `rhs` leaves
    /// the existing value in place.
    pub fn merge(&self, rhs: &TypedValue) -> Result<TypedValue, ValidationErrors> {
        self.check_same_type(rhs)?;
        Ok(self.with_value(self.merge_values(&self.value, &rhs.value, &self.type_ref)))
    }

    fn merge_values(&self, lhs: &Value, rhs: &Value, type_ref: &TypeRef) -> Value {
        if rhs.is_null() {
            return lhs.clone();
        }
        if lhs.is_null() {
            return rhs.clone();
        }

        let atom = self.atom(type_ref);
        match (Self::shape(atom.as_ref(), lhs), lhs, rhs) {
            (Shape::Map(map), Value::Map(lf), Value::Map(rf)) => {
                let mut result = lf.clone();
                for (key, rhs_val) in rf.iter() {
                    let merged = match lf.get(key) {
                        Some(lhs_val) => self.merge_values(lhs_val, rhs_val, map.field_type(key)),
                        None => rhs_val.clone(),
                    };
                    result.set(key.clone(), merged);
                }
                Value::Map(result)
            }
            (Shape::List(list), Value::List(li), Value::List(ri)) if list.is_associative() => {
                self.merge_lists(li, ri, &list)
            }
            _ => rhs.clone(),
        }
    }

    fn merge_lists(&self, lhs: &[Value], rhs: &[Value], list: &schema::List) -> Value {
        let mut merged: Vec<Value> = Vec::with_capacity(lhs.len() + rhs.len());
        let mut positions: HashMap<PathElement, usize> = HashMap::new();

        for item in lhs {
            if let Ok(pe) = self.item_key(item, list) {
                positions.insert(pe, merged.len());
            }
            merged.push(item.clone());
        }

        for item in rhs {
            match self.item_key(item, list).ok().and_then(|pe| positions.get(&pe).copied()) {
                Some(pos) => {
                    let value = self.merge_values(&merged[pos], item, &list.element_type);
                    merged[pos] = value;
                }
                None => {
                    if let Ok(pe) = self.item_key(item, list) {
                        positions.insert(pe, merged.len());
                    }
                    merged.push(item.clone());
                }
            }
        }

        Value::List(merged)
    }

    /// Returns the value with every path in `items` removed, together with
    /// everything below it.
    pub fn remove_items(&self, items: &FieldSet) -> TypedValue {
        if items.is_empty() {
            return self.clone();
        }
        self.with_value(self.remove_from_value(&self.value, &self.type_ref, items, &Path::new()))
    }

    fn remove_from_value(&self, value: &Value, type_ref: &TypeRef, items: &FieldSet, path: &Path) -> Value {
        let atom = self.atom(type_ref);
        match (Self::shape(atom.as_ref(), value), value) {
            (Shape::Map(map), Value::Map(fields)) => Value::Map(
                fields
                    .iter()
                    .filter_map(|(key, val)| {
                        let child = path.with(PathElement::field_name(key.clone()));
                        (!items.has(&child)).then(|| {
                            (key.clone(), self.remove_from_value(val, map.field_type(key), items, &child))
                        })
                    })
                    .collect(),
            ),
            (Shape::List(list), Value::List(values)) => Value::List(
                values
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        let child = path.with(self.item_element(item, &list, i));
                        (!items.has(&child))
                            .then(|| self.remove_from_value(item, &list.element_type, items, &child))
                    })
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    /// Applies a strategic merge patch.
    ///
    /// Maps merge field by field and a null deletes the field. Associative
    /// lists merge item by item, sets gain the values of the patch, and
    /// atomic containers and scalars are replaced.
    pub fn apply_strategic_patch(&self, patch: &Value) -> TypedValue {
        self.with_value(self.patch_value(Some(&self.value), patch, &self.type_ref))
    }

    fn patch_value(&self, original: Option<&Value>, patch: &Value, type_ref: &TypeRef) -> Value {
        let Some(original) = original.filter(|v| !v.is_null()) else {
            return without_nulls(patch);
        };
        let atom = self.atom(type_ref);
        match (Self::shape(atom.as_ref(), original), original, patch) {
            (Shape::Map(map), Value::Map(of), Value::Map(pf)) => {
                let mut result = of.clone();
                for (key, pv) in pf.iter() {
                    if pv.is_null() {
                        result.delete(key);
                    } else {
                        result.set(key.clone(), self.patch_value(of.get(key), pv, map.field_type(key)));
                    }
                }
                Value::Map(result)
            }
            (Shape::List(list), Value::List(oi), Value::List(pi)) if list.is_associative() => {
                let mut result = oi.clone();
                for item in pi {
                    if list.keys.is_empty() {
                        if !result.contains(item) {
                            result.push(item.clone());
                        }
                        continue;
                    }
                    let pos = self.item_key(item, &list).ok().and_then(|pe| {
                        result
                            .iter()
                            .position(|o| self.item_key(o, &list).ok().as_ref() == Some(&pe))
                    });
                    match pos {
                        Some(pos) => {
                            let value = self.patch_value(Some(&result[pos]), item, &list.element_type);
                            result[pos] = value;
                        }
                        None => result.push(without_nulls(item)),
                    }
                }
                Value::List(result)
            }
            _ => without_nulls(patch),
        }
    }

    /// Fills in declared field defaults on every map present in the value.
    pub fn with_defaults(&self) -> TypedValue {
        let mut value = self.value.clone();
        self.apply_defaults(&mut value, &self.type_ref);
        self.with_value(value)
    }

    fn apply_defaults(&self, value: &mut Value, type_ref: &TypeRef) {
        let atom = self.atom(type_ref);
        match (Self::shape(atom.as_ref(), value), value) {
            (Shape::Map(map), Value::Map(fields)) => {
                for field in &map.fields {
                    if let Some(default) = &field.default {
                        if !fields.has(&field.name) {
                            fields.set(field.name.clone(), Value::from(default.clone()));
                        }
                    }
                }
                for (key, val) in fields.iter_mut() {
                    self.apply_defaults(val, map.field_type(key));
                }
            }
            (Shape::List(list), Value::List(items)) => {
                for item in items.iter_mut() {
                    self.apply_defaults(item, &list.element_type);
                }
            }
            _ => {}
        }
    }
}

/// Drops null map entries, which in a patch mean "delete".
fn without_nulls(value: &Value) -> Value {
    match value {
        Value::Map(fields) => Value::Map(
            fields
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), without_nulls(v)))
                .collect(),
        ),
        Value::List(items) => Value::List(items.iter().map(without_nulls).collect()),
        other => other.clone(),
    }
}

fn describe(atom: &Atom) -> String {
    let mut kinds = Vec::new();
    if let Some(scalar) = atom.scalar {
        kinds.push(match scalar {
            Scalar::Numeric => "numeric",
            Scalar::String => "string",
            Scalar::Boolean => "boolean",
            Scalar::Untyped => "scalar",
        });
    }
    if atom.list.is_some() {
        kinds.push("list");
    }
    if atom.map.is_some() {
        kinds.push("map");
    }
    kinds.join(" or ")
}

fn with_path(err: ValidationError, path: &Path) -> ValidationError {
    match err {
        ValidationError::TypeMismatch { expected, actual, .. } => {
            ValidationError::type_mismatch(path.to_string(), expected, actual)
        }
        ValidationError::MissingKey { field, .. } => ValidationError::missing_key(path.to_string(), field),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::from_json;
    use pretty_assertions::assert_eq;

    const SCHEMA: &str = r#"types:
- name: object
  map:
    fields:
    - name: replicas
      type:
        scalar: numeric
    - name: labels
      type:
        map:
          elementType:
            scalar: string
    - name: ports
      type:
        list:
          elementType:
            namedType: port
          elementRelationship: associative
          keys: [port, protocol]
    - name: finalizers
      type:
        list:
          elementType:
            scalar: string
          elementRelationship: associative
    - name: args
      type:
        list:
          elementType:
            scalar: string
          elementRelationship: atomic
- name: port
  map:
    fields:
    - name: port
      type:
        scalar: numeric
    - name: protocol
      type:
        scalar: string
      default: TCP
    - name: name
      type:
        scalar: string
"#;

    fn tv(json: &str) -> TypedValue {
        let schema = Arc::new(Schema::from_yaml(SCHEMA).unwrap());
        TypedValue::new(from_json(json).unwrap(), schema, TypeRef::named("object"))
    }

    fn set(json: &str) -> FieldSet {
        FieldSet::from_json(json).unwrap()
    }

    #[test]
    fn test_validate() {
        assert!(tv(r#"{"replicas":1,"ports":[{"port":80}]}"#).validate().is_ok());

        let errs = tv(r#"{"replicas":"one"}"#).validate().unwrap_err();
        assert_eq!(errs.to_string(), ".replicas: expected numeric, got string");

        let errs = tv(r#"{"ports":[{"name":"x"}]}"#).validate().unwrap_err();
        assert_eq!(
            errs.iter().next(),
            Some(&ValidationError::missing_key(".ports", "port"))
        );

        let errs = tv(r#"{"finalizers":["a","a"]}"#).validate().unwrap_err();
        assert!(matches!(errs.iter().next(), Some(ValidationError::DuplicateKey { .. })));
    }

    #[test]
    fn test_to_field_set() {
        let value = tv(r#"{"replicas":1,"labels":{"app":"x"},"ports":[{"port":80,"name":"http"}],"finalizers":["a"],"args":["x"],"extra":{}}"#);
        assert_eq!(
            value.to_field_set(),
            set(r#"{"f:args":{},"f:extra":{},"f:finalizers":{"v:\"a\"":{}},"f:labels":{"f:app":{}},"f:ports":{"k:{\"port\":80,\"protocol\":\"TCP\"}":{".":{},"f:name":{},"f:port":{}}},"f:replicas":{}}"#)
        );
    }

    #[test]
    fn test_to_field_set_deduced() {
        let schema = Arc::new(Schema::new().with_deduced_types());
        let value = TypedValue::new(
            from_json(r#"{"spec":{"replicas":1,"list":[1,2]}}"#).unwrap(),
            schema,
            TypeRef::deduced(),
        );
        assert_eq!(
            value.to_field_set(),
            set(r#"{"f:spec":{".":{},"f:list":{},"f:replicas":{}}}"#)
        );
    }

    #[test]
    fn test_compare() {
        let lhs = tv(r#"{"replicas":1,"labels":{"a":"1","b":"2"},"ports":[{"port":80,"name":"http"}]}"#);
        let rhs = tv(r#"{"replicas":2,"labels":{"a":"1","c":"3"},"ports":[{"port":443,"name":"https"}]}"#);
        let comparison = lhs.compare(&rhs).unwrap();

        assert_eq!(comparison.modified, set(r#"{"f:replicas":{}}"#));
        assert_eq!(
            comparison.added,
            set(r#"{"f:labels":{"f:c":{}},"f:ports":{"k:{\"port\":443,\"protocol\":\"TCP\"}":{".":{},"f:name":{},"f:port":{}}}}"#)
        );
        assert_eq!(
            comparison.removed,
            set(r#"{"f:labels":{"f:b":{}},"f:ports":{"k:{\"port\":80,\"protocol\":\"TCP\"}":{".":{},"f:name":{},"f:port":{}}}}"#)
        );
        assert!(lhs.compare(&lhs).unwrap().is_same());
    }

    #[test]
    fn test_compare_new_container_lists_subtree() {
        let lhs = tv(r#"{}"#);
        let rhs = tv(r#"{"labels":{"a":"1"}}"#);
        let comparison = lhs.compare(&rhs).unwrap();
        assert_eq!(comparison.added, set(r#"{"f:labels":{".":{},"f:a":{}}}"#));
        assert!(comparison.modified.is_empty());
    }

    #[test]
    fn test_merge() {
        let lhs = tv(r#"{"replicas":1,"labels":{"a":"1"},"ports":[{"port":80,"name":"http"},{"port":53,"protocol":"UDP"}],"args":["a","b"]}"#);
        let rhs = tv(r#"{"replicas":3,"labels":{"b":"2"},"ports":[{"port":80,"name":"web"},{"port":8080}],"args":["c"]}"#);
        let merged = lhs.merge(&rhs).unwrap();
        assert_eq!(
            merged.value(),
            &from_json(r#"{"replicas":3,"labels":{"a":"1","b":"2"},"ports":[{"port":80,"name":"web"},{"port":53,"protocol":"UDP"},{"port":8080}],"args":["c"]}"#).unwrap()
        );
    }

    #[test]
    fn test_remove_items() {
        let value = tv(r#"{"replicas":1,"labels":{"a":"1","b":"2"},"ports":[{"port":80,"name":"http"},{"port":53}]}"#);
        let removed = value.remove_items(&set(
            r#"{"f:labels":{"f:a":{}},"f:ports":{"k:{\"port\":80,\"protocol\":\"TCP\"}":{}},"f:replicas":{}}"#,
        ));
        assert_eq!(
            removed.value(),
            &from_json(r#"{"labels":{"b":"2"},"ports":[{"port":53}]}"#).unwrap()
        );
    }

    #[test]
    fn test_with_defaults() {
        let value = tv(r#"{"ports":[{"port":80}]}"#).with_defaults();
        assert_eq!(
            value.value(),
            &from_json(r#"{"ports":[{"port":80,"protocol":"TCP"}]}"#).unwrap()
        );
    }

    #[test]
    fn test_apply_strategic_patch() {
        let value = tv(r#"{"replicas":1,"labels":{"a":"1","b":"2"},"ports":[{"port":80,"name":"http"},{"port":53,"protocol":"UDP"}],"finalizers":["x"],"args":["a","b"]}"#);
        let patch = from_json(r#"{"replicas":null,"labels":{"b":null,"c":"3"},"ports":[{"port":80,"protocol":"TCP","name":"web"},{"port":8080}],"finalizers":["x","y"],"args":["c"]}"#).unwrap();
        assert_eq!(
            value.apply_strategic_patch(&patch).value(),
            &from_json(r#"{"labels":{"a":"1","c":"3"},"ports":[{"port":80,"name":"web","protocol":"TCP"},{"port":53,"protocol":"UDP"},{"port":8080}],"finalizers":["x","y"],"args":["c"]}"#).unwrap()
        );
    }
}
