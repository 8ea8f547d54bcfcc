#![forbid(unsafe_code)]

use mp_core::{AdjacencyRow, NodeId, NodeRow};
use mp_storage::{
    ChildPosition, RebuildOrder, RebuildReport, SqliteTreeStore, TreeManager, TreeOptions,
};
use rusqlite::params;
use std::collections::BTreeMap;
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("mp_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn open(test_name: &str) -> TreeManager<SqliteTreeStore> {
    let options = TreeOptions::default();
    let store = SqliteTreeStore::open(temp_dir(test_name), &options).expect("open store");
    TreeManager::new(options, store).expect("manager")
}

fn id(raw: i64) -> NodeId {
    NodeId::try_new(raw).expect("node id")
}

/// (id, parent) pairs, parents listed before their children.
const ADJACENCY: [(i64, Option<i64>); 8] = [
    (1, None),
    (2, Some(1)),
    (3, Some(1)),
    (4, Some(2)),
    (5, Some(2)),
    (6, Some(3)),
    (7, None),
    (8, Some(7)),
];

fn build_by_attach(manager: &mut TreeManager<SqliteTreeStore>) {
    for (node, parent) in ADJACENCY {
        let attached = match parent {
            None => manager.attach_root(id(node)),
            Some(parent) => manager.attach_child(id(parent), id(node), ChildPosition::Last),
        };
        attached.expect("attach");
    }
}

/// Parent of every row, as seen through path-based child queries.
fn parents_from_paths(manager: &TreeManager<SqliteTreeStore>) -> BTreeMap<i64, Option<i64>> {
    let rows = manager.query_all().expect("rows");
    let mut out: BTreeMap<i64, Option<i64>> =
        rows.iter().map(|row| (row.id.get(), None)).collect();
    for row in &rows {
        for child in manager.children(row.id).expect("children") {
            out.insert(child.id.get(), Some(row.id.get()));
        }
    }
    out
}

fn parents_from_adjacency(rows: &[NodeRow]) -> BTreeMap<i64, Option<i64>> {
    rows.iter()
        .map(|row| (row.id.get(), row.parent_id.map(NodeId::get)))
        .collect()
}

fn assert_consistent(manager: &TreeManager<SqliteTreeStore>) {
    let rows = manager.query_all().expect("rows");
    let by_id: BTreeMap<i64, &NodeRow> = rows.iter().map(|row| (row.id.get(), row)).collect();
    let steplen = manager.limits().steplen();
    let mut root_trees = Vec::new();
    for row in &rows {
        assert_eq!(row.path().len() % steplen, 0);
        assert_eq!(row.path().len() / steplen, row.depth() as usize);
        match row.parent_id {
            None => {
                assert_eq!(row.path(), "");
                root_trees.push(row.tree_id());
            }
            Some(parent) => {
                let parent = by_id[&parent.get()];
                assert_eq!(row.tree_id(), parent.tree_id());
                assert!(row.path().starts_with(parent.path()));
                assert_eq!(row.depth(), parent.depth() + 1);
            }
        }
    }
    let distinct = root_trees.len();
    root_trees.sort_unstable();
    root_trees.dedup();
    assert_eq!(root_trees.len(), distinct);
    assert_eq!(parents_from_paths(manager), parents_from_adjacency(&rows));
}

#[test]
fn rebuild_from_parent_pointers_only() {
    let mut manager = open("rebuild_adjacency_only");
    manager.storage().drop_indices().expect("drop indices");
    for (node, parent) in ADJACENCY {
        manager
            .storage()
            .connection()
            .execute(
                "INSERT INTO nodes(id, parent_id, mp_tree_id, mp_path, mp_depth) \
                 VALUES (?1, ?2, 0, 'junk', 0)",
                params![node, parent],
            )
            .expect("raw insert");
    }

    let report = manager
        .rebuild_all_trees(&RebuildOrder::PrimaryKey)
        .expect("rebuild");
    manager.storage().create_indices().expect("create indices");
    assert_eq!(report, RebuildReport { trees: 2, nodes: 8 });

    let g = manager.node(id(6)).expect("row 6");
    assert_eq!((g.tree_id(), g.path(), g.depth()), (1, "001000", 2));
    let leaf = manager.node(id(8)).expect("row 8");
    assert_eq!((leaf.tree_id(), leaf.path()), (2, "000"));
    assert_consistent(&manager);
}

#[test]
fn rebuild_restores_corrupted_paths() {
    let mut manager = open("rebuild_corrupted");
    build_by_attach(&mut manager);
    let clean = manager.query_all().expect("rows");

    let conn = manager.storage().connection();
    conn.execute(
        "UPDATE nodes SET mp_tree_id = 9, mp_path = 'ZZZ', mp_depth = 1 WHERE id = 5",
        [],
    )
    .expect("corrupt");
    conn.execute(
        "UPDATE nodes SET mp_path = 'A', mp_depth = 7 WHERE id = 8",
        [],
    )
    .expect("corrupt");
    assert_eq!(manager.node(id(8)).expect_err("corrupt").code(), "CORRUPT_PATH");

    manager
        .rebuild_all_trees(&RebuildOrder::PrimaryKey)
        .expect("rebuild");
    assert_eq!(manager.query_all().expect("rows"), clean);
}

#[test]
fn detach_then_rebuild_keeps_structure() {
    let mut manager = open("detach_round_trip");
    build_by_attach(&mut manager);
    manager.detach_subtree(id(2)).expect("detach");
    let before = parents_from_paths(&manager);
    assert_eq!(before[&2], None);
    assert_consistent(&manager);

    let report = manager
        .rebuild_all_trees(&RebuildOrder::PrimaryKey)
        .expect("rebuild");
    assert_eq!(report.trees, 3);
    assert_eq!(parents_from_paths(&manager), before);
    assert_consistent(&manager);

    let again = manager.query_all().expect("rows");
    manager
        .rebuild_all_trees(&RebuildOrder::PrimaryKey)
        .expect("rebuild twice");
    assert_eq!(manager.query_all().expect("rows"), again);
}

#[test]
fn rebuild_orders_siblings_by_column() {
    let mut manager = open("rebuild_by_column");
    build_by_attach(&mut manager);
    let conn = manager.storage().connection();
    conn.execute_batch("ALTER TABLE nodes ADD COLUMN title TEXT;")
        .expect("add column");
    for (node, title) in [(2, "b"), (3, "a"), (4, "z"), (5, "y")] {
        conn.execute(
            "UPDATE nodes SET title = ?1 WHERE id = ?2",
            params![title, node],
        )
        .expect("title");
    }

    manager
        .rebuild_all_trees(&RebuildOrder::Column {
            name: "title".to_string(),
            descending: false,
        })
        .expect("rebuild");
    let children: Vec<i64> = manager
        .children(id(1))
        .expect("children")
        .iter()
        .map(|row| row.id.get())
        .collect();
    assert_eq!(children, vec![3, 2]);
    assert_eq!(manager.node(id(5)).expect("row 5").path(), "001000");

    manager
        .rebuild_all_trees(&RebuildOrder::Column {
            name: "title".to_string(),
            descending: true,
        })
        .expect("rebuild");
    assert_eq!(manager.node(id(4)).expect("row 4").path(), "000000");
    assert_consistent(&manager);

    let err = manager
        .rebuild_all_trees(&RebuildOrder::Column {
            name: "title; DROP TABLE nodes".to_string(),
            descending: false,
        })
        .expect_err("bad column");
    assert_eq!(err.code(), "INVALID_CONFIG");
}

#[test]
fn cyclic_adjacency_rolls_back() {
    let mut manager = open("rebuild_cycle");
    build_by_attach(&mut manager);
    manager.attach_root(id(10)).expect("root");
    manager
        .attach_child(id(10), id(11), ChildPosition::Last)
        .expect("child");
    manager
        .storage()
        .connection()
        .execute("UPDATE nodes SET parent_id = 11 WHERE id = 10", [])
        .expect("make cycle");
    let before = manager.query_all().expect("rows");

    let err = manager
        .rebuild_all_trees(&RebuildOrder::PrimaryKey)
        .expect_err("cycle");
    assert_eq!(err.code(), "ADJACENCY_CYCLE");
    assert_eq!(manager.query_all().expect("rows"), before);
}

#[test]
fn import_places_rows_in_one_transaction() {
    let mut manager = open("import_adjacency");
    let rows: Vec<AdjacencyRow> = ADJACENCY
        .iter()
        .rev()
        .map(|(node, parent)| AdjacencyRow {
            id: id(*node),
            parent_id: parent.map(id),
        })
        .collect();

    let report = manager
        .import_adjacency(&rows, &RebuildOrder::PrimaryKey)
        .expect("import");
    assert_eq!(report, RebuildReport { trees: 2, nodes: 8 });
    assert_consistent(&manager);

    let dangling = [AdjacencyRow {
        id: id(20),
        parent_id: Some(id(99)),
    }];
    assert!(
        manager
            .import_adjacency(&dangling, &RebuildOrder::PrimaryKey)
            .is_err()
    );
    assert!(manager.node(id(20)).is_err());
    assert_eq!(manager.query_all().expect("rows").len(), 8);
}
