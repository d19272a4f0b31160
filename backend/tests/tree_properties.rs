use proptest::prelude::*;
use trackreport::{cartesian_product, DataTree, Node};

fn label() -> impl Strategy<Value = String> {
    "[a-e]{1,2}"
}

fn path() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(label(), 1..5)
}

/// One to four levels, each with one to three distinct labels.
fn regular_levels() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(
        prop::collection::btree_set(label(), 1..4).prop_map(|set| set.into_iter().collect::<Vec<_>>()),
        1..5,
    )
}

fn build(paths: &[Vec<String>]) -> DataTree {
    let mut tree = DataTree::new();
    for (i, p) in paths.iter().enumerate() {
        tree.set_leaf(p, Node::from(i as f64));
    }
    tree
}

fn sorted(mut labels: Vec<String>) -> Vec<String> {
    labels.sort();
    labels
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn set_then_get_returns_value(
        prior in prop::collection::vec(path(), 0..8),
        target in path(),
        value in -1e6f64..1e6,
    ) {
        let mut tree = build(&prior);
        tree.set_leaf(&target, Node::from(value));
        prop_assert_eq!(tree.get_leaf(&target), Some(&Node::from(value)));
    }

    #[test]
    fn removed_paths_are_absent(
        prior in prop::collection::vec(path(), 0..8),
        target in path(),
    ) {
        let mut tree = build(&prior);
        tree.set_leaf(&target, Node::from(1.0));
        prop_assert!(tree.remove_leaf(&target).is_some());
        prop_assert!(tree.get_leaf(&target).is_none());
    }

    #[test]
    fn regular_levels_come_back_in_order(levels in regular_levels()) {
        let tree = build(&cartesian_product(&levels));
        prop_assert_eq!(tree.get_paths(), levels);
    }

    #[test]
    fn regular_levels_survive_any_insertion_order(
        (levels, paths) in regular_levels().prop_flat_map(|levels| {
            let paths = cartesian_product(&levels);
            (Just(levels), Just(paths).prop_shuffle())
        })
    ) {
        let found = build(&paths).get_paths();
        prop_assert_eq!(found.len(), levels.len());
        for (found, expected) in found.into_iter().zip(levels) {
            prop_assert_eq!(sorted(found), sorted(expected));
        }
    }

    #[test]
    fn prune_keeps_first_and_last_level(levels in regular_levels()) {
        let mut tree = build(&cartesian_product(&levels));
        let before = tree.get_paths();
        let removed = tree.prune(&[]);
        let after = tree.get_paths();

        prop_assert_eq!(after.len() + removed, before.len());
        prop_assert_eq!(after.first(), before.first());
        prop_assert_eq!(after.last(), before.last());
        if before.len() <= 2 {
            prop_assert_eq!(removed, 0);
        }
    }

    #[test]
    fn prune_never_removes_ignored_levels(
        (levels, at) in regular_levels().prop_flat_map(|levels| {
            let n = levels.len();
            (Just(levels), 0..=n)
        })
    ) {
        let mut levels = levels;
        levels.insert(at, vec!["text".to_string()]);
        let mut tree = build(&cartesian_product(&levels));

        tree.prune(&["text".to_string()]);
        prop_assert!(tree.get_paths().contains(&vec!["text".to_string()]));
    }
}

#[test]
fn two_level_tree_is_never_pruned() {
    let mut tree = build(&cartesian_product(&[vec!["only".to_string()], vec!["v".to_string()]]));
    assert_eq!(tree.prune(&[]), 0);
    assert_eq!(tree.depth(), 2);
}
