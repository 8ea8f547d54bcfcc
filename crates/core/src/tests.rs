use super::*;
use proptest::prelude::*;

fn codec(steplen: usize) -> PathCodec {
    PathCodec::try_new(steplen).unwrap()
}

fn addr(tree_id: i64, path: &str) -> PathAddress {
    PathAddress::parse(tree_id, path, &PathCodec::default()).unwrap()
}

fn row(id: i64, tree_id: i64, path: &str) -> NodeRow {
    NodeRow {
        id: NodeId::try_new(id).unwrap(),
        parent_id: None,
        address: addr(tree_id, path),
    }
}

#[test]
fn encode_is_fixed_width_most_significant_first() {
    let c = codec(3);
    assert_eq!(c.encode(0).unwrap(), "000");
    assert_eq!(c.encode(35).unwrap(), "00Z");
    assert_eq!(c.encode(36).unwrap(), "010");
    assert_eq!(c.encode(46_655).unwrap(), "ZZZ");
    assert_eq!(
        c.encode(46_656).unwrap_err(),
        TreeError::PathOverflow {
            index: 46_656,
            steplen: 3
        }
    );
    assert_eq!(codec(1).encode(36).unwrap_err().code(), "PATH_OVERFLOW");
}

#[test]
fn decode_refuses_corrupt_segments() {
    let c = codec(3);
    assert_eq!(c.decode("3GZ").unwrap(), 3 * 1296 + 16 * 36 + 35);
    assert!(matches!(
        c.decode("0a0").unwrap_err(),
        TreeError::CorruptPath { .. }
    ));
    assert!(matches!(
        c.decode("00").unwrap_err(),
        TreeError::CorruptPath { .. }
    ));
    assert!(matches!(
        c.split("000!!!").unwrap_err(),
        TreeError::CorruptPath { .. }
    ));
    assert!(matches!(
        c.split("00001").unwrap_err(),
        TreeError::CorruptPath { .. }
    ));
    assert_eq!(c.split("001ZZZ").unwrap(), vec![1, 46_655]);
}

#[test]
fn codec_rejects_unusable_steplen() {
    assert_eq!(
        PathCodec::try_new(0).unwrap_err(),
        TreeError::InvalidLayout("steplen must be at least 1")
    );
    assert!(PathCodec::try_new(13).is_err());
    assert!(PathCodec::try_new(12).is_ok());
    assert!(TreeLimits::try_new(4, 3).is_err());
}

#[test]
fn limits_reject_unrepresentable_layouts() {
    assert_eq!(max_children(12), Ok(36u64.pow(12)));
    assert_eq!(max_children(13).unwrap_err().code(), "INVALID_LAYOUT");
    assert_eq!(max_children(0).unwrap_err().code(), "INVALID_LAYOUT");
    assert_eq!(max_depth(255, 0).unwrap_err().code(), "INVALID_LAYOUT");
    assert_eq!(max_depth(2, 3).unwrap_err().code(), "INVALID_LAYOUT");
    assert_eq!(max_depth(6, 1), Ok(7));
}

#[test]
fn limits_match_default_layout() {
    assert_eq!(max_children(3), Ok(46_656));
    assert_eq!(max_children(2), Ok(1_296));
    assert_eq!(max_depth(255, 3), Ok(86));
    let limits = TreeLimits::default();
    assert_eq!(limits.max_children(), 46_656);
    assert_eq!(limits.max_depth(), 86);
    assert_eq!(limits.deepest(), 85);
    assert!(limits.check_depth(85).is_ok());
    assert_eq!(
        limits.check_depth(86).unwrap_err(),
        TreeError::PathTooDeep {
            depth: 86,
            max_depth: 85
        }
    );
}

#[test]
fn successor_carries_across_segments() {
    let c = codec(3);
    assert_eq!(c.successor("000").as_deref(), Some("001"));
    assert_eq!(c.successor("000ZZZ").as_deref(), Some("001000"));
    assert_eq!(codec(4).successor("3GZU").as_deref(), Some("3GZV"));
    assert_eq!(codec(2).successor("337Z").as_deref(), Some("3380"));
    assert_eq!(codec(5).successor("GWZZZ").as_deref(), Some("GX000"));
    assert_eq!(c.successor("ZZZZZZ"), None);
    assert_eq!(c.successor(""), None);
}

#[test]
fn child_address_checks_width_and_depth() {
    let limits = TreeLimits::try_new(1, 2).unwrap();
    let root = PathAddress::root(7);
    let child = root.child_address(3, &limits).unwrap();
    assert_eq!(child.path(), "3");
    assert_eq!(child.depth(), 1);
    assert_eq!(child.tree_id(), 7);
    let grandchild = child.child_address(35, &limits).unwrap();
    assert_eq!(grandchild.path(), "3Z");
    assert_eq!(
        grandchild.child_address(0, &limits).unwrap_err(),
        TreeError::PathTooDeep {
            depth: 3,
            max_depth: 2
        }
    );
    assert!(matches!(
        child.child_address(36, &limits).unwrap_err(),
        TreeError::PathOverflow { .. }
    ));
}

#[test]
fn ancestry_is_prefix_within_one_tree() {
    let root = addr(1, "");
    let child = addr(1, "001");
    let grandchild = addr(1, "001000");
    assert!(root.is_ancestor_of(&child));
    assert!(child.is_ancestor_of(&grandchild));
    assert!(!child.is_ancestor_of(&child));
    assert!(child.is_self_or_ancestor_of(&child));
    assert!(!grandchild.is_ancestor_of(&child));
    assert!(!addr(2, "").is_ancestor_of(&child));
    assert!(!addr(1, "002").is_ancestor_of(&grandchild));
}

#[test]
fn from_stored_rejects_depth_mismatch() {
    let c = PathCodec::default();
    assert!(PathAddress::from_stored(1, "000001", 2, &c).is_ok());
    assert!(matches!(
        PathAddress::from_stored(1, "000001", 3, &c).unwrap_err(),
        TreeError::CorruptPath { .. }
    ));
}

#[test]
fn parent_and_last_index() {
    let c = PathCodec::default();
    let node = addr(4, "00200A");
    assert_eq!(node.last_index(&c).unwrap(), Some(10));
    let parent = node.parent(&c).unwrap();
    assert_eq!(parent, addr(4, "002"));
    assert_eq!(addr(4, "").last_index(&c).unwrap(), None);
    assert!(addr(4, "").parent(&c).is_none());
}

#[test]
fn descendant_filter_excludes_siblings_and_other_trees() {
    let c = PathCodec::default();
    let node = addr(1, "000ZZZ");
    let filter = NodeFilter::descendants(&node, false, &c);
    assert!(filter.matches(1, "000ZZZ000", 3));
    assert!(filter.matches(1, "000ZZZ000001", 4));
    assert!(!filter.matches(1, "000ZZZ", 2));
    assert!(!filter.matches(1, "001000", 2));
    assert!(!filter.matches(2, "000ZZZ000", 3));

    let with_self = NodeFilter::descendants(&node, true, &c);
    assert!(with_self.matches(1, "000ZZZ", 2));

    let root_subtree = NodeFilter::subtree(&addr(3, ""), &c);
    assert!(root_subtree.matches(3, "", 0));
    assert!(root_subtree.matches(3, "ZZZZZZ", 2));
}

#[test]
fn children_filter_is_one_level_only() {
    let c = PathCodec::default();
    let filter = NodeFilter::for_relation(&addr(1, "001"), Relation::Children, true, &c);
    assert!(filter.matches(1, "001000", 2));
    assert!(filter.matches(1, "001ZZZ", 2));
    assert!(!filter.matches(1, "001", 1));
    assert!(!filter.matches(1, "001000000", 3));
    assert!(!filter.matches(1, "002000", 2));
}

#[test]
fn ancestor_filter_lists_every_prefix() {
    let c = PathCodec::default();
    let node = addr(5, "001002003");
    assert_eq!(
        node.ancestor_paths(false, &c),
        vec!["".to_string(), "001".to_string(), "001002".to_string()]
    );
    let filter = NodeFilter::ancestors(&node, true, &c);
    assert!(filter.matches(5, "", 0));
    assert!(filter.matches(5, "001002003", 3));
    assert!(!filter.matches(5, "001003", 2));
    assert_eq!(
        NodeFilter::ancestors(&addr(5, ""), false, &c).path,
        PathPredicate::OneOf(Vec::new())
    );
}

#[test]
fn rebase_moves_descendants_with_their_root() {
    let limits = TreeLimits::default();
    let old_root = addr(1, "002");
    let new_root = addr(9, "");
    let moved = addr(1, "002001004").rebase(&old_root, &new_root, &limits).unwrap();
    assert_eq!(moved, addr(9, "001004"));

    let deeper = addr(9, "00A00B");
    let back = moved.rebase(&new_root, &deeper, &limits).unwrap();
    assert_eq!(back, addr(9, "00A00B001004"));

    assert!(addr(1, "003").rebase(&old_root, &new_root, &limits).is_err());

    let rewrite = SubtreeRewrite::between(&old_root, &addr(1, "005"));
    assert_eq!(rewrite.tree_id, None);
    assert_eq!(rewrite.depth_delta, 0);
    assert_eq!(rewrite.apply(1, "002XYZ", 2), (1, "005XYZ".to_string(), 2));
}

#[test]
fn reparent_appends_new_segment_to_new_parent() {
    let limits = TreeLimits::default();
    let node = addr(1, "000001");
    let moved = node.reparent(&addr(2, "00Z"), 37, &limits).unwrap();
    assert_eq!(moved, addr(2, "00Z011"));
    let sibling = node.reparent(&addr(1, "001"), 0, &limits).unwrap();
    assert_eq!(sibling, addr(1, "001000"));
}

#[test]
fn reparent_refuses_own_subtree() {
    let limits = TreeLimits::default();
    let node = addr(1, "000001");
    assert_eq!(
        node.reparent(&node, 0, &limits).unwrap_err(),
        TreeError::MovingToDescendant
    );
    assert_eq!(
        node.reparent(&addr(1, "000001002"), 0, &limits).unwrap_err(),
        TreeError::MovingToDescendant
    );
    assert!(node.reparent(&addr(2, "000001002"), 0, &limits).is_ok());
}

#[test]
fn nest_pairs_children_by_depth() {
    let rows = vec![
        row(1, 1, ""),
        row(2, 1, "000"),
        row(4, 1, "000000"),
        row(3, 1, "001"),
        row(5, 2, ""),
    ];
    let forest = nest(rows.iter());
    assert_eq!(forest.len(), 2);
    assert_eq!(forest[0].node.id.get(), 1);
    let kids: Vec<i64> = forest[0].children.iter().map(|c| c.node.id.get()).collect();
    assert_eq!(kids, vec![2, 3]);
    assert_eq!(forest[0].children[0].children[0].node.id.get(), 4);
    assert!(forest[1].children.is_empty());
}

#[test]
fn tree_events_balance_enter_and_leave() {
    let rows = vec![row(2, 1, "000"), row(4, 1, "000000"), row(3, 1, "001")];
    let events: Vec<TreeEvent<i64>> = TreeEvents::new(rows)
        .map(|event| match event {
            TreeEvent::Enter(row) => TreeEvent::Enter(row.id.get()),
            TreeEvent::Leave => TreeEvent::Leave,
        })
        .collect();
    assert_eq!(
        events,
        vec![
            TreeEvent::Enter(2),
            TreeEvent::Enter(4),
            TreeEvent::Leave,
            TreeEvent::Leave,
            TreeEvent::Enter(3),
            TreeEvent::Leave,
        ]
    );
    assert!(nest(Vec::<NodeRow>::new()).is_empty());
}

#[test]
fn node_id_must_be_positive() {
    assert_eq!(NodeId::try_new(0).unwrap_err(), NodeIdError::NotPositive);
    assert_eq!(NodeId::try_new(-4).unwrap_err(), NodeIdError::NotPositive);
    assert_eq!(NodeId::try_from(12).unwrap().get(), 12);
}

proptest! {
    #[test]
    fn encode_decode_round_trip(steplen in 1usize..=5, seed in any::<u64>()) {
        let c = codec(steplen);
        let index = seed % c.capacity();
        let segment = c.encode(index).unwrap();
        prop_assert_eq!(segment.len(), steplen);
        prop_assert_eq!(c.decode(&segment).unwrap(), index);
    }

    #[test]
    fn encoding_preserves_sibling_order(a in 0u64..46_656, b in 0u64..46_656) {
        let c = codec(3);
        let (ea, eb) = (c.encode(a).unwrap(), c.encode(b).unwrap());
        prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
    }

    #[test]
    fn descendant_range_matches_prefix_test(
        parent in prop::collection::vec(0u64..1296, 0..4),
        other in prop::collection::vec(0u64..1296, 0..6),
    ) {
        let c = codec(2);
        let to_path = |indices: &[u64]| -> String {
            indices.iter().map(|i| c.encode(*i).unwrap()).collect()
        };
        let parent_path = to_path(&parent);
        let other_path = to_path(&other);
        let range = PathAddress::parse(1, parent_path.clone(), &c)
            .unwrap()
            .descendant_range(false, &c);
        let is_descendant =
            other_path.len() > parent_path.len() && other_path.starts_with(&parent_path);
        prop_assert_eq!(range.contains(&other_path), is_descendant);
    }
}
