//! Conflict types for apply operations.

use crate::fieldpath::{FieldSet, Path, PathElement};
use crate::managedfields::ManagerKey;
use std::fmt;

/// Conflict is one field that an apply would change while another manager
/// owns it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Conflict {
    /// The manager that owns the conflicting field.
    pub manager: String,
    /// The path to the conflicting field.
    pub path: Path,
}

impl Conflict {
    pub fn new(manager: impl Into<String>, path: Path) -> Self {
        Conflict {
            manager: manager.into(),
            path,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conflict with {:?}: {}", self.manager, self.path)
    }
}

/// Conflicts is a sorted, duplicate-free collection of conflicts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conflicts {
    conflicts: Vec<Conflict>,
}

impl Conflicts {
    pub fn new() -> Self {
        Conflicts {
            conflicts: Vec::new(),
        }
    }

    pub fn add(&mut self, conflict: Conflict) {
        if let Err(pos) = self.conflicts.binary_search(&conflict) {
            self.conflicts.insert(pos, conflict);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter()
    }

    /// Converts the conflicts to a set of paths.
    pub fn to_set(&self) -> FieldSet {
        self.conflicts.iter().map(|c| &c.path).collect()
    }

    /// Managers involved in at least one conflict.
    pub fn managers(&self) -> Vec<&str> {
        let mut managers: Vec<&str> = self.conflicts.iter().map(|c| c.manager.as_str()).collect();
        managers.dedup();
        managers
    }
}

impl IntoIterator for Conflicts {
    type Item = Conflict;
    type IntoIter = std::vec::IntoIter<Conflict>;

    fn into_iter(self) -> Self::IntoIter {
        self.conflicts.into_iter()
    }
}

impl fmt::Display for Conflicts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.conflicts.len() == 1 { "conflict" } else { "conflicts" };
        write!(f, "apply failed with {} {}:", self.conflicts.len(), noun)?;
        for conflict in &self.conflicts {
            write!(f, "\n  {}", conflict)?;
        }
        Ok(())
    }
}

impl std::error::Error for Conflicts {}

/// Finds the paths of `contested` owned by managers other than `manager`.
///
/// `contested` holds the paths an apply sets to a new value, and `entries`
/// the owned sets in the same version. Every entry of another manager that
/// owns one of them yields a conflict. A list item the entry owns is
/// reported once, however many of its fields change, and when an entry owns
/// a path and some of its descendants, only the path is reported.
pub fn detect_conflicts<'a, I>(entries: I, manager: &str, contested: &FieldSet) -> Conflicts
where
    I: IntoIterator<Item = (&'a ManagerKey, &'a FieldSet)>,
{
    let mut conflicts = Conflicts::new();
    for (key, set) in entries {
        if key.manager == manager {
            continue;
        }
        let mut causes = FieldSet::new();
        set.intersection(contested)
            .iterate(|path| causes.insert(&owning_item(set, path)));
        causes
            .top_level()
            .iterate(|path| conflicts.add(Conflict::new(key.manager.clone(), path.clone())));
    }
    conflicts
}

/// Returns the outermost list item of `path` that `owned` contains, or the
/// path itself when it is not inside an owned item.
fn owning_item(owned: &FieldSet, path: &Path) -> Path {
    let elements = path.as_slice();
    (1..elements.len())
        .map(|len| Path::from_elements(elements[..len].to_vec()))
        .find(|prefix| {
            matches!(prefix.last(), Some(PathElement::Key(_) | PathElement::Value(_)))
                && owned.has(prefix)
        })
        .unwrap_or_else(|| path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn set(paths: &[&str]) -> FieldSet {
        paths.iter().map(|p| Path::parse(p).unwrap()).collect()
    }

    #[test]
    fn test_conflict_display() {
        let conflict = Conflict::new("manager1", Path::parse(".spec.replicas").unwrap());
        assert_eq!(conflict.to_string(), r#"conflict with "manager1": .spec.replicas"#);
    }

    #[test]
    fn test_conflicts_are_sorted_and_unique() {
        let mut conflicts = Conflicts::new();
        assert!(conflicts.is_empty());

        conflicts.add(Conflict::new("b", Path::parse(".x").unwrap()));
        conflicts.add(Conflict::new("a", Path::parse(".y").unwrap()));
        conflicts.add(Conflict::new("b", Path::parse(".x").unwrap()));

        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts.managers(), vec!["a", "b"]);
        assert_eq!(conflicts.to_set(), set(&[".x", ".y"]));
        assert_eq!(
            conflicts.to_string(),
            "apply failed with 2 conflicts:\n  conflict with \"a\": .y\n  conflict with \"b\": .x"
        );
    }

    #[test]
    fn test_list_item_is_one_conflict() {
        let item = Path::parse(".spec.containers")
            .unwrap()
            .with(PathElement::key([("name", Value::from("app"))]));
        let image = item.with(PathElement::field_name("image"));
        let command = item.with(PathElement::field_name("command"));
        let owned: BTreeMap<ManagerKey, FieldSet> = [(
            ManagerKey::apply("alice", ""),
            [item.clone(), image.clone(), command.clone()].into_iter().collect(),
        )]
        .into_iter()
        .collect();

        let contested: FieldSet = [image, command].into_iter().collect();
        let conflicts = detect_conflicts(&owned, "bob", &contested);

        assert_eq!(conflicts.into_iter().collect::<Vec<_>>(), vec![Conflict::new("alice", item)]);
    }

    #[test]
    fn test_unowned_item_reports_fields() {
        let item = Path::parse(".spec.containers")
            .unwrap()
            .with(PathElement::key([("name", Value::from("app"))]));
        let image = item.with(PathElement::field_name("image"));
        let owned: BTreeMap<ManagerKey, FieldSet> =
            [(ManagerKey::update("controller", ""), [image.clone()].into_iter().collect())]
                .into_iter()
                .collect();

        let contested: FieldSet = [image.clone()].into_iter().collect();
        let conflicts = detect_conflicts(&owned, "bob", &contested);

        assert_eq!(conflicts.into_iter().collect::<Vec<_>>(), vec![Conflict::new("controller", image)]);
    }

    #[test]
    fn test_detect_conflicts() {
        let owned: BTreeMap<ManagerKey, FieldSet> = [
            (ManagerKey::update("controller", ""), set(&[".spec.replicas", ".spec.paused"])),
            (ManagerKey::update("me", ""), set(&[".spec.replicas"])),
            (ManagerKey::apply("other", ""), set(&[".spec.items", ".spec.items.a"])),
        ]
        .into_iter()
        .collect();

        let contested = set(&[".spec.replicas", ".spec.items", ".spec.items.a"]);
        let conflicts = detect_conflicts(&owned, "me", &contested);

        assert_eq!(
            conflicts.into_iter().collect::<Vec<_>>(),
            vec![
                Conflict::new("controller", Path::parse(".spec.replicas").unwrap()),
                Conflict::new("other", Path::parse(".spec.items").unwrap()),
            ]
        );
    }
}
