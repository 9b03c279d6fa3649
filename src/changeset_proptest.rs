//! Property-based tests for change-set operations.
//!
//! These tests use proptest to generate random change-sets and verify that
//! the location-keyed invariants hold for all of them.

#[cfg(test)]
mod proptest_tests {
    use crate::changeset::{normalize_location, AttrChange, ChangeSet, FsObject};
    use proptest::prelude::*;
    use std::path::{Component, Path};

    fn location() -> impl Strategy<Value = String> {
        prop::collection::vec(prop_oneof!["[a-z]{1,6}", Just("..".to_string()), Just(".".to_string())], 1..5)
            .prop_map(|parts| parts.join("/"))
    }

    fn fs_object() -> impl Strategy<Value = FsObject> {
        (location(), 0u32..4, 0u32..1000, 0u32..1000, 0u32..0o7777).prop_map(
            |(loc, kind, uid, gid, mode)| {
                let obj = match kind {
                    0 => FsObject::file(&loc),
                    1 => FsObject::dir(&loc),
                    2 => FsObject::symlink(&loc, "target"),
                    _ => FsObject::fifo(&loc),
                };
                obj.with_owner(uid, gid).with_mode(mode)
            },
        )
    }

    fn change_set() -> impl Strategy<Value = ChangeSet> {
        prop::collection::vec(fs_object(), 0..20).prop_map(ChangeSet::from)
    }

    // ============================================================================
    // normalize_location property tests
    // ============================================================================

    proptest! {
        /// Property: normalized locations are absolute and free of `.` and `..`
        #[test]
        fn normalize_location_is_clean(input in location()) {
            let normalized = normalize_location(Path::new(&input));
            prop_assert!(normalized.is_absolute());
            for component in normalized.components() {
                prop_assert!(matches!(component, Component::RootDir | Component::Normal(_)));
            }
        }

        /// Property: normalizing twice changes nothing
        #[test]
        fn normalize_location_is_idempotent(input in location()) {
            let once = normalize_location(Path::new(&input));
            let twice = normalize_location(&once);
            prop_assert_eq!(once, twice);
        }
    }

    // ============================================================================
    // ChangeSet property tests
    // ============================================================================

    proptest! {
        /// Property: locations stay unique no matter what is inserted
        #[test]
        fn locations_are_unique(cset in change_set()) {
            let mut seen = std::collections::HashSet::new();
            for location in cset.locations() {
                prop_assert!(seen.insert(location.to_path_buf()), "duplicate {}", location.display());
            }
        }

        /// Property: replace_where keeps cardinality and order
        #[test]
        fn replace_where_preserves_shape(cset in change_set(), uid in 0u32..1000, threshold in 0u32..1000) {
            let mut rewritten = cset.clone();
            let count = rewritten.replace_where(|obj| obj.uid < threshold, &AttrChange::uid(uid));

            prop_assert_eq!(rewritten.len(), cset.len());
            prop_assert_eq!(count, cset.iter().filter(|obj| obj.uid < threshold).count());
            let before: Vec<_> = cset.locations().collect();
            let after: Vec<_> = rewritten.locations().collect();
            prop_assert_eq!(before, after);
        }

        /// Property: replace_where leaves nothing matching the old id behind
        #[test]
        fn replace_where_rewrites_every_match(cset in change_set(), from in 0u32..10, to in 10u32..20) {
            let mut rewritten = cset.clone();
            rewritten.replace_where(|obj| obj.uid == from, &AttrChange::uid(to));
            prop_assert!(rewritten.iter().all(|obj| obj.uid != from));
        }

        /// Property: updating a change-set with its own contents changes nothing
        #[test]
        fn update_with_self_is_idempotent(cset in change_set()) {
            let mut updated = cset.clone();
            updated.update(cset.iter().cloned());
            prop_assert_eq!(updated, cset);
        }

        /// Property: difference and intersection partition a change-set
        #[test]
        fn difference_and_intersection_partition(a in change_set(), b in change_set()) {
            let only_a = a.difference(&b);
            let both = a.intersection(&b);
            prop_assert_eq!(only_a.len() + both.len(), a.len());
            prop_assert!(only_a.iter().all(|obj| !b.contains(&obj.location)));
            prop_assert!(both.iter().all(|obj| b.contains(&obj.location)));
        }
    }
}
