//! FieldSet, the tree-shaped set of paths used to record ownership.

use super::path::{Path, PathElement};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// PathElementSet is a sorted set of PathElements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathElementSet {
    members: Vec<PathElement>,
}

impl PathElementSet {
    pub fn new() -> Self {
        PathElementSet {
            members: Vec::new(),
        }
    }

    pub fn from_vec(mut elements: Vec<PathElement>) -> Self {
        elements.sort();
        elements.dedup();
        PathElementSet { members: elements }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, element: &PathElement) -> bool {
        self.members.binary_search(element).is_ok()
    }

    pub fn insert(&mut self, element: PathElement) {
        if let Err(pos) = self.members.binary_search(&element) {
            self.members.insert(pos, element);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.members.iter()
    }

    pub fn union(&self, other: &PathElementSet) -> PathElementSet {
        let mut result = Vec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0, 0);

        while i < self.members.len() && j < other.members.len() {
            match self.members[i].cmp(&other.members[j]) {
                Ordering::Less => {
                    result.push(self.members[i].clone());
                    i += 1;
                }
                Ordering::Greater => {
                    result.push(other.members[j].clone());
                    j += 1;
                }
                Ordering::Equal => {
                    result.push(self.members[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }

        result.extend(self.members[i..].iter().cloned());
        result.extend(other.members[j..].iter().cloned());
        PathElementSet { members: result }
    }

    pub fn intersection(&self, other: &PathElementSet) -> PathElementSet {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < self.members.len() && j < other.members.len() {
            match self.members[i].cmp(&other.members[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    result.push(self.members[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }

        PathElementSet { members: result }
    }

    /// Returns the elements of `self` not in `other`.
    pub fn difference(&self, other: &PathElementSet) -> PathElementSet {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < self.members.len() && j < other.members.len() {
            match self.members[i].cmp(&other.members[j]) {
                Ordering::Less => {
                    result.push(self.members[i].clone());
                    i += 1;
                }
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }

        result.extend(self.members[i..].iter().cloned());
        PathElementSet { members: result }
    }
}

/// FieldSet is a set of paths stored as a tree.
///
/// `members` holds the elements that are themselves in the set at this level,
/// `children` holds the subtrees below an element. A path can be a member and
/// have children at the same time (an associative list item that is owned
/// together with some of its fields, for instance). Children are never empty,
/// so two sets with the same paths compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    pub(super) members: PathElementSet,
    pub(super) children: BTreeMap<PathElement, FieldSet>,
}

impl FieldSet {
    pub fn new() -> Self {
        FieldSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.children.is_empty()
    }

    /// Returns the number of paths in the set.
    pub fn len(&self) -> usize {
        self.members.len() + self.children.values().map(FieldSet::len).sum::<usize>()
    }

    pub fn has(&self, path: &Path) -> bool {
        match path.as_slice().split_last() {
            None => false,
            Some((last, parents)) => self
                .node(parents)
                .is_some_and(|node| node.members.contains(last)),
        }
    }

    fn node(&self, elements: &[PathElement]) -> Option<&FieldSet> {
        match elements.split_first() {
            None => Some(self),
            Some((first, rest)) => self.children.get(first)?.node(rest),
        }
    }

    /// Inserts `path`. The empty path is never a member.
    pub fn insert(&mut self, path: &Path) {
        self.insert_elements(path.as_slice());
    }

    fn insert_elements(&mut self, elements: &[PathElement]) {
        match elements {
            [] => {}
            [last] => self.members.insert(last.clone()),
            [first, rest @ ..] => self
                .children
                .entry(first.clone())
                .or_default()
                .insert_elements(rest),
        }
    }

    pub fn union(&self, other: &FieldSet) -> FieldSet {
        let mut children = self.children.clone();
        for (key, other_child) in &other.children {
            match children.get_mut(key) {
                Some(child) => *child = child.union(other_child),
                None => {
                    children.insert(key.clone(), other_child.clone());
                }
            }
        }
        FieldSet {
            members: self.members.union(&other.members),
            children,
        }
    }

    pub fn intersection(&self, other: &FieldSet) -> FieldSet {
        let children = self
            .children
            .iter()
            .filter_map(|(key, child)| {
                let other_child = other.children.get(key)?;
                let child = child.intersection(other_child);
                (!child.is_empty()).then(|| (key.clone(), child))
            })
            .collect();
        FieldSet {
            members: self.members.intersection(&other.members),
            children,
        }
    }

    /// Returns the paths of `self` that are not in `other`. Descendants of a
    /// removed path are kept.
    pub fn difference(&self, other: &FieldSet) -> FieldSet {
        let children = self
            .children
            .iter()
            .filter_map(|(key, child)| match other.children.get(key) {
                Some(other_child) => {
                    let child = child.difference(other_child);
                    (!child.is_empty()).then(|| (key.clone(), child))
                }
                None => Some((key.clone(), child.clone())),
            })
            .collect();
        FieldSet {
            members: self.members.difference(&other.members),
            children,
        }
    }

    /// Returns the paths of `self` that are neither in `other` nor below a
    /// path of `other`.
    pub fn recursive_difference(&self, other: &FieldSet) -> FieldSet {
        let children = self
            .children
            .iter()
            .filter_map(|(key, child)| {
                if other.members.contains(key) {
                    return None;
                }
                match other.children.get(key) {
                    Some(other_child) => {
                        let child = child.recursive_difference(other_child);
                        (!child.is_empty()).then(|| (key.clone(), child))
                    }
                    None => Some((key.clone(), child.clone())),
                }
            })
            .collect();
        FieldSet {
            members: self.members.difference(&other.members),
            children,
        }
    }

    /// Returns the paths that have no descendant in the set.
    pub fn leaves(&self) -> FieldSet {
        FieldSet {
            members: PathElementSet::from_vec(
                self.members
                    .iter()
                    .filter(|m| !self.children.contains_key(*m))
                    .cloned()
                    .collect(),
            ),
            children: self
                .children
                .iter()
                .map(|(key, child)| (key.clone(), child.leaves()))
                .collect(),
        }
    }

    /// Returns the paths that have no ancestor in the set.
    pub fn top_level(&self) -> FieldSet {
        FieldSet {
            members: self.members.clone(),
            children: self
                .children
                .iter()
                .filter(|(key, _)| !self.members.contains(key))
                .map(|(key, child)| (key.clone(), child.top_level()))
                .collect(),
        }
    }

    /// Calls `f` for every path, parents before their descendants.
    pub fn iterate<F>(&self, mut f: F)
    where
        F: FnMut(&Path),
    {
        self.iterate_with_path(&mut Path::new(), &mut f);
    }

    fn iterate_with_path<F>(&self, current: &mut Path, f: &mut F)
    where
        F: FnMut(&Path),
    {
        for member in self.members.iter() {
            current.push(member.clone());
            f(current);
            current.pop();
        }
        for (key, child) in &self.children {
            current.push(key.clone());
            child.iterate_with_path(current, f);
            current.pop();
        }
    }

    pub fn paths(&self) -> Vec<Path> {
        let mut paths = Vec::with_capacity(self.len());
        self.iterate(|p| paths.push(p.clone()));
        paths
    }
}

impl FromIterator<Path> for FieldSet {
    fn from_iter<T: IntoIterator<Item = Path>>(iter: T) -> Self {
        let mut set = FieldSet::new();
        for path in iter {
            set.insert(&path);
        }
        set
    }
}

impl<'a> FromIterator<&'a Path> for FieldSet {
    fn from_iter<T: IntoIterator<Item = &'a Path>>(iter: T) -> Self {
        let mut set = FieldSet::new();
        for path in iter {
            set.insert(path);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn set(paths: &[&str]) -> FieldSet {
        paths.iter().map(|s| p(s)).collect()
    }

    #[test]
    fn test_path_element_set_operations() {
        let a = PathElementSet::from_vec(vec![
            PathElement::field_name("b"),
            PathElement::field_name("a"),
        ]);
        let b = PathElementSet::from_vec(vec![
            PathElement::field_name("b"),
            PathElement::field_name("c"),
        ]);

        assert_eq!(a.union(&b).len(), 3);
        assert_eq!(
            a.intersection(&b),
            PathElementSet::from_vec(vec![PathElement::field_name("b")])
        );
        assert_eq!(
            a.difference(&b),
            PathElementSet::from_vec(vec![PathElement::field_name("a")])
        );
    }

    #[test]
    fn test_insert_and_has() {
        let s = set(&[".metadata.name"]);
        assert!(s.has(&p(".metadata.name")));
        assert!(!s.has(&p(".metadata")));
        assert!(!s.has(&Path::new()));
        assert_eq!(s.len(), 1);

        let mut s = s;
        s.insert(&Path::new());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_member_with_children() {
        let item = Path::from_elements(vec![
            PathElement::field_name("containers"),
            PathElement::key([("name", Value::from("nginx"))]),
        ]);
        let mut s = FieldSet::new();
        s.insert(&item);
        s.insert(&item.with(PathElement::field_name("image")));

        assert!(s.has(&item));
        assert_eq!(s.len(), 2);
        assert_eq!(s.leaves().paths(), vec![item.with(PathElement::field_name("image"))]);
        assert_eq!(s.top_level().paths(), vec![item]);
    }

    #[test]
    fn test_set_algebra() {
        let a = set(&[".a.x", ".a.y", ".b"]);
        let b = set(&[".a.y", ".c"]);

        assert_eq!(a.union(&b), set(&[".a.x", ".a.y", ".b", ".c"]));
        assert_eq!(a.intersection(&b), set(&[".a.y"]));
        assert_eq!(a.difference(&b), set(&[".a.x", ".b"]));
        assert!(a.intersection(&set(&[".z"])).is_empty());
        assert_eq!(a.difference(&a), FieldSet::new());
    }

    #[test]
    fn test_difference_keeps_descendants() {
        let a = set(&[".spec", ".spec.replicas"]);
        assert_eq!(a.difference(&set(&[".spec"])), set(&[".spec.replicas"]));
    }

    #[test]
    fn test_recursive_difference() {
        let a = set(&[".spec.replicas", ".spec.template.spec", ".status.phase", ".metadata.labels.a"]);
        let reset = set(&[".status", ".spec.template"]);
        assert_eq!(
            a.recursive_difference(&reset),
            set(&[".spec.replicas", ".metadata.labels.a"])
        );
        assert_eq!(a.recursive_difference(&FieldSet::new()), a);
    }

    #[test]
    fn test_leaves_and_top_level() {
        let s = set(&[".a", ".a.b", ".a.b.c", ".d.e"]);
        assert_eq!(s.leaves(), set(&[".a.b.c", ".d.e"]));
        assert_eq!(s.top_level(), set(&[".a", ".d.e"]));
    }

    #[test]
    fn test_iterate_visits_every_path() {
        let s = set(&[".a", ".b.c", ".b.d"]);
        let mut seen = Vec::new();
        s.iterate(|path| seen.push(path.to_string()));
        assert_eq!(seen, vec![".a", ".b.c", ".b.d"]);
        assert_eq!(s.len(), 3);
    }
}
