use super::*;
use crate::fieldpath::{APIVersion, FieldSet, Path};
use crate::version::{IdentityConverter, PathMappingConverter};
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;

fn at(secs: u32) -> Option<DateTime<Utc>> {
    Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, secs / 60, secs % 60).unwrap())
}

fn field(name: &str) -> FieldSet {
    [Path::from_fields([name])].into_iter().collect()
}

fn updaters(count: u32) -> ManagedFields {
    (0..count)
        .map(|i| {
            (
                ManagerKey::update(format!("updater-{i:02}"), ""),
                VersionedSet::new(field(&format!("f{i:02}")), "v1".into(), at(10 + i)),
            )
        })
        .collect()
}

#[test]
fn test_under_cap_is_untouched() {
    let mut managed = updaters(10);
    let before = managed.clone();
    Bookkeeper::default()
        .cap_history(&mut managed, &IdentityConverter, &"v1".into())
        .unwrap();
    assert_eq!(managed, before);
}

#[test]
fn test_oldest_entries_fold_into_bucket() {
    let mut managed = updaters(12);
    managed.insert(
        ManagerKey::apply("applier", ""),
        VersionedSet::new(field("applied"), "v1".into(), at(0)),
    );

    Bookkeeper::default()
        .cap_history(&mut managed, &IdentityConverter, &"v1".into())
        .unwrap();

    assert_eq!(managed.len(), 11);
    assert!(managed.contains(&ManagerKey::apply("applier", "")));
    let bucket = managed.get(&ManagerKey::update("ancient-changes", "")).unwrap();
    // 12 updaters plus a new bucket need three folds to get down to 10.
    let expected: FieldSet = ["f00", "f01", "f02"].iter().map(|f| Path::from_fields([*f])).collect();
    assert_eq!(bucket.set, expected);
    assert_eq!(bucket.time, at(12));
    assert!(!managed.contains(&ManagerKey::update("updater-02", "")));
    assert!(managed.contains(&ManagerKey::update("updater-03", "")));
}

#[test]
fn test_existing_bucket_absorbs_more() {
    let mut managed = updaters(10);
    managed.insert(
        ManagerKey::update("ancient-changes", ""),
        VersionedSet::new(field("old"), "v1".into(), at(5)),
    );

    Bookkeeper::default()
        .cap_history(&mut managed, &IdentityConverter, &"v1".into())
        .unwrap();

    assert_eq!(managed.len(), 10);
    let bucket = managed.get(&ManagerKey::update("ancient-changes", "")).unwrap();
    assert_eq!(bucket.set, field("old").union(&field("f00")));
    assert_eq!(bucket.time, at(10));
}

#[test]
fn test_custom_cap_and_name() {
    let mut managed = updaters(5);
    Bookkeeper::new(2, "history")
        .cap_history(&mut managed, &IdentityConverter, &"v1".into())
        .unwrap();

    let managers: Vec<String> = managed.keys().map(|k| k.manager.clone()).collect();
    assert_eq!(managers, vec!["history".to_string(), "updater-04".to_string()]);
}

#[test]
fn test_folded_sets_are_converted() {
    let converter = PathMappingConverter::new("Widget").with_rename(
        "v1beta1",
        "v1",
        Path::parse(".size").unwrap(),
        Path::parse(".replicas").unwrap(),
    );
    let mut managed = updaters(2);
    managed.insert(
        ManagerKey::update("legacy", ""),
        VersionedSet::new(field("size"), APIVersion::new("v1beta1"), at(1)),
    );

    Bookkeeper::new(2, "ancient-changes")
        .cap_history(&mut managed, &converter, &"v1".into())
        .unwrap();

    let bucket = managed.get(&ManagerKey::update("ancient-changes", "")).unwrap();
    assert_eq!(bucket.api_version, APIVersion::new("v1"));
    assert_eq!(bucket.set, field("replicas").union(&field("f00")));
}

#[test]
fn test_zero_cap_keeps_only_the_bucket() {
    let mut managed = updaters(3);
    Bookkeeper::new(0, "ancient-changes")
        .cap_history(&mut managed, &IdentityConverter, &"v1".into())
        .unwrap();

    let managers: Vec<String> = managed.keys().map(|k| k.manager.clone()).collect();
    assert_eq!(managers, vec!["ancient-changes".to_string()]);
}
