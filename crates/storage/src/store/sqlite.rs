#![forbid(unsafe_code)]

use super::{RebuildOrder, StoreError, TreeRead, TreeStorage, TreeTx};
use crate::config::{TreeOptions, validate_identifier};
use mp_core::{
    AdjacencyRow, NodeFilter, NodeId, NodeRow, PathAddress, PathCodec, PathPredicate,
    SubtreeRewrite,
};
use rusqlite::types::Value;
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior, params,
    params_from_iter,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const DB_FILE_NAME: &str = "mp_tree.db";

#[derive(Debug)]
pub struct SqliteTreeStore {
    conn: Connection,
    layout: SqlLayout,
    storage_dir: Option<PathBuf>,
}

impl SqliteTreeStore {
    pub fn open(storage_dir: impl AsRef<Path>, options: &TreeOptions) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let conn = Connection::open(storage_dir.join(DB_FILE_NAME))?;
        let store = Self::install(conn, options, Some(storage_dir))?;
        info!(
            table = %options.table,
            storage_dir = ?store.storage_dir,
            "tree store opened"
        );
        Ok(store)
    }

    pub fn open_in_memory(options: &TreeOptions) -> Result<Self, StoreError> {
        Self::install(Connection::open_in_memory()?, options, None)
    }

    fn install(
        conn: Connection,
        options: &TreeOptions,
        storage_dir: Option<PathBuf>,
    ) -> Result<Self, StoreError> {
        options.validate()?;
        let layout = SqlLayout::new(options)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        layout.install_schema(&conn)?;
        Ok(Self {
            conn,
            layout,
            storage_dir,
        })
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// Raw connection, for callers that keep their own columns in the table.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Creates the `(tree_id, path)` unique index and the parent index.
    pub fn create_indices(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(&self.layout.create_indices_sql())?;
        Ok(())
    }

    /// Drops both indices, e.g. before bulk loading adjacency-only rows.
    pub fn drop_indices(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(&self.layout.drop_indices_sql())?;
        Ok(())
    }
}

impl TreeRead for SqliteTreeStore {
    fn select_row(&self, id: NodeId) -> Result<Option<NodeRow>, StoreError> {
        self.layout.select_row(&self.conn, id)
    }

    fn select_rows(&self, filter: &NodeFilter) -> Result<Vec<NodeRow>, StoreError> {
        self.layout.select_rows(&self.conn, Some(filter))
    }

    fn select_all(&self) -> Result<Vec<NodeRow>, StoreError> {
        self.layout.select_rows(&self.conn, None)
    }

    fn max_tree_id(&self) -> Result<Option<i64>, StoreError> {
        self.layout.max_tree_id(&self.conn)
    }

    fn max_depth(&self, filter: &NodeFilter) -> Result<Option<u32>, StoreError> {
        self.layout.max_depth(&self.conn, filter)
    }

    fn select_adjacency(&self, order: &RebuildOrder) -> Result<Vec<AdjacencyRow>, StoreError> {
        self.layout.select_adjacency(&self.conn, order)
    }
}

impl TreeStorage for SqliteTreeStore {
    type Tx<'a>
        = SqliteTx<'a>
    where
        Self: 'a;

    fn transaction(&mut self) -> Result<Self::Tx<'_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        // Parent pointers may be briefly dangling while rows are inserted.
        tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;
        Ok(SqliteTx {
            tx,
            layout: &self.layout,
        })
    }
}

pub struct SqliteTx<'a> {
    tx: Transaction<'a>,
    layout: &'a SqlLayout,
}

impl TreeRead for SqliteTx<'_> {
    fn select_row(&self, id: NodeId) -> Result<Option<NodeRow>, StoreError> {
        self.layout.select_row(&self.tx, id)
    }

    fn select_rows(&self, filter: &NodeFilter) -> Result<Vec<NodeRow>, StoreError> {
        self.layout.select_rows(&self.tx, Some(filter))
    }

    fn select_all(&self) -> Result<Vec<NodeRow>, StoreError> {
        self.layout.select_rows(&self.tx, None)
    }

    fn max_tree_id(&self) -> Result<Option<i64>, StoreError> {
        self.layout.max_tree_id(&self.tx)
    }

    fn max_depth(&self, filter: &NodeFilter) -> Result<Option<u32>, StoreError> {
        self.layout.max_depth(&self.tx, filter)
    }

    fn select_adjacency(&self, order: &RebuildOrder) -> Result<Vec<AdjacencyRow>, StoreError> {
        self.layout.select_adjacency(&self.tx, order)
    }
}

impl TreeTx for SqliteTx<'_> {
    fn insert_row(&mut self, row: &NodeRow) -> Result<(), StoreError> {
        let l = self.layout;
        let sql = format!(
            "INSERT INTO {}({}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5)",
            l.table, l.pk, l.parent, l.tree, l.path, l.depth
        );
        self.tx
            .execute(
                &sql,
                params![
                    row.id.get(),
                    row.parent_id.map(NodeId::get),
                    row.tree_id(),
                    row.path(),
                    i64::from(row.depth()),
                ],
            )
            .map_err(|err| map_insert_conflict(err, row.id))?;
        Ok(())
    }

    fn insert_unplaced(
        &mut self,
        id: NodeId,
        parent_id: Option<NodeId>,
    ) -> Result<(), StoreError> {
        self.insert_row(&NodeRow {
            id,
            parent_id,
            address: PathAddress::root(-id.get()),
        })
    }

    fn set_parent(&mut self, id: NodeId, parent_id: Option<NodeId>) -> Result<(), StoreError> {
        let l = self.layout;
        let sql = format!("UPDATE {} SET {} = ?1 WHERE {} = ?2", l.table, l.parent, l.pk);
        let changed = self
            .tx
            .execute(&sql, params![parent_id.map(NodeId::get), id.get()])?;
        if changed == 0 {
            return Err(StoreError::UnknownNode(id));
        }
        Ok(())
    }

    fn rewrite_subtree(
        &mut self,
        filter: &NodeFilter,
        rewrite: &SubtreeRewrite,
    ) -> Result<usize, StoreError> {
        let l = self.layout;
        let mut values = vec![
            Value::Text(rewrite.new_prefix.clone()),
            Value::Integer(to_sqlite_i64(rewrite.old_prefix_len + 1)?),
            Value::Integer(rewrite.depth_delta),
            rewrite.tree_id.map_or(Value::Null, Value::Integer),
        ];
        let clause = l.where_clause(filter, &mut values);
        let sql = format!(
            "UPDATE {table} SET {path} = ?1 || substr({path}, ?2), {depth} = {depth} + ?3, \
             {tree} = COALESCE(?4, {tree}) WHERE {clause}",
            table = l.table,
            path = l.path,
            depth = l.depth,
            tree = l.tree,
        );
        let touched = self.tx.execute(&sql, params_from_iter(values.iter()))?;
        debug!(
            touched,
            new_prefix = %rewrite.new_prefix,
            depth_delta = rewrite.depth_delta,
            "subtree rewritten"
        );
        Ok(touched)
    }

    fn delete_rows(&mut self, filter: &NodeFilter) -> Result<usize, StoreError> {
        let mut values = Vec::new();
        let clause = self.layout.where_clause(filter, &mut values);
        let sql = format!("DELETE FROM {} WHERE {clause}", self.layout.table);
        let deleted = self.tx.execute(&sql, params_from_iter(values.iter()))?;
        debug!(deleted, tree_id = filter.tree_id, "rows deleted");
        Ok(deleted)
    }

    fn park_all(&mut self) -> Result<usize, StoreError> {
        let l = self.layout;
        let sql = format!(
            "UPDATE {} SET {} = -{}, {} = '', {} = 0",
            l.table, l.tree, l.pk, l.path, l.depth
        );
        let parked = self.tx.execute(&sql, [])?;
        debug!(parked, "rows parked for rebuild");
        Ok(parked)
    }

    fn assign_address(&mut self, id: NodeId, address: &PathAddress) -> Result<(), StoreError> {
        let l = self.layout;
        let sql = format!(
            "UPDATE {} SET {} = ?1, {} = ?2, {} = ?3 WHERE {} = ?4",
            l.table, l.tree, l.path, l.depth, l.pk
        );
        let changed = self.tx.execute(
            &sql,
            params![
                address.tree_id(),
                address.path(),
                i64::from(address.depth()),
                id.get()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownNode(id));
        }
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }
}

/// Quoted table and column names plus the codec used to decode rows.
#[derive(Debug)]
struct SqlLayout {
    table_name: String,
    tree_name: String,
    path_name: String,
    parent_name: String,
    table: String,
    pk: String,
    parent: String,
    tree: String,
    path: String,
    depth: String,
    codec: PathCodec,
}

impl SqlLayout {
    fn new(options: &TreeOptions) -> Result<Self, StoreError> {
        let limits = options.limits()?;
        Ok(Self {
            table_name: options.table.clone(),
            tree_name: options.tree_id_field.clone(),
            path_name: options.path_field.clone(),
            parent_name: options.parent_id_field.clone(),
            table: quote(&options.table),
            pk: quote(&options.pk_field),
            parent: quote(&options.parent_id_field),
            tree: quote(&options.tree_id_field),
            path: quote(&options.path_field),
            depth: quote(&options.depth_field),
            codec: *limits.codec(),
        })
    }

    fn install_schema(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
              {pk} INTEGER PRIMARY KEY CHECK({pk} > 0),
              {parent} INTEGER REFERENCES {table}({pk}),
              {tree} INTEGER NOT NULL,
              {path} TEXT NOT NULL,
              {depth} INTEGER NOT NULL CHECK({depth} >= 0)
            );
            "#,
            table = self.table,
            pk = self.pk,
            parent = self.parent,
            tree = self.tree,
            path = self.path,
            depth = self.depth,
        ))?;
        conn.execute_batch(&self.create_indices_sql())?;
        Ok(())
    }

    fn unique_index(&self) -> String {
        quote(&format!(
            "{}__{}__{}",
            self.table_name, self.tree_name, self.path_name
        ))
    }

    fn parent_index(&self) -> String {
        quote(&format!("{}__{}", self.table_name, self.parent_name))
    }

    fn create_indices_sql(&self) -> String {
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {unique} ON {table}({tree}, {path});\n\
             CREATE INDEX IF NOT EXISTS {parent_index} ON {table}({parent});",
            unique = self.unique_index(),
            parent_index = self.parent_index(),
            table = self.table,
            tree = self.tree,
            path = self.path,
            parent = self.parent,
        )
    }

    fn drop_indices_sql(&self) -> String {
        format!(
            "DROP INDEX IF EXISTS {};\nDROP INDEX IF EXISTS {};",
            self.unique_index(),
            self.parent_index()
        )
    }

    fn select_columns(&self) -> String {
        format!(
            "SELECT {}, {}, {}, {}, {} FROM {}",
            self.pk, self.parent, self.tree, self.path, self.depth, self.table
        )
    }

    /// Renders `filter` as a WHERE clause, appending its parameters to
    /// `values` and numbering placeholders after the ones already there.
    fn where_clause(&self, filter: &NodeFilter, values: &mut Vec<Value>) -> String {
        let mut push = |value: Value| {
            values.push(value);
            format!("?{}", values.len())
        };
        let mut parts = vec![format!("{} = {}", self.tree, push(Value::Integer(filter.tree_id)))];
        match &filter.path {
            PathPredicate::Range(range) => {
                let op = if range.lower_inclusive { ">=" } else { ">" };
                parts.push(format!(
                    "{} {op} {}",
                    self.path,
                    push(Value::Text(range.lower.clone()))
                ));
                if let Some(upper) = &range.upper {
                    parts.push(format!("{} < {}", self.path, push(Value::Text(upper.clone()))));
                }
            }
            PathPredicate::OneOf(paths) if paths.is_empty() => parts.push("0".to_string()),
            PathPredicate::OneOf(paths) => {
                let slots: Vec<String> = paths
                    .iter()
                    .map(|path| push(Value::Text(path.clone())))
                    .collect();
                parts.push(format!("{} IN ({})", self.path, slots.join(", ")));
            }
            PathPredicate::ChildOf { parent, steplen } => {
                let pattern = format!("{parent}{}", "_".repeat(*steplen));
                parts.push(format!("{} LIKE {}", self.path, push(Value::Text(pattern))));
            }
        }
        if let Some(depth) = filter.depth {
            parts.push(format!(
                "{} = {}",
                self.depth,
                push(Value::Integer(i64::from(depth)))
            ));
        }
        parts.join(" AND ")
    }

    fn select_row(&self, conn: &Connection, id: NodeId) -> Result<Option<NodeRow>, StoreError> {
        let sql = format!("{} WHERE {} = ?1", self.select_columns(), self.pk);
        let raw = conn
            .query_row(&sql, params![id.get()], RawRow::read)
            .optional()?;
        raw.map(|raw| raw.decode(&self.codec)).transpose()
    }

    fn select_rows(
        &self,
        conn: &Connection,
        filter: Option<&NodeFilter>,
    ) -> Result<Vec<NodeRow>, StoreError> {
        let mut values = Vec::new();
        let clause = match filter {
            Some(filter) => format!(" WHERE {}", self.where_clause(filter, &mut values)),
            None => String::new(),
        };
        let sql = format!(
            "{}{clause} ORDER BY {}, {}, {}",
            self.select_columns(),
            self.tree,
            self.path,
            self.pk
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(RawRow::read(row)?.decode(&self.codec)?);
        }
        Ok(out)
    }

    fn max_tree_id(&self, conn: &Connection) -> Result<Option<i64>, StoreError> {
        let sql = format!("SELECT MAX({}) FROM {}", self.tree, self.table);
        Ok(conn.query_row(&sql, [], |row| row.get::<_, Option<i64>>(0))?)
    }

    fn max_depth(&self, conn: &Connection, filter: &NodeFilter) -> Result<Option<u32>, StoreError> {
        let mut values = Vec::new();
        let clause = self.where_clause(filter, &mut values);
        let sql = format!("SELECT MAX({}) FROM {} WHERE {clause}", self.depth, self.table);
        let depth = conn.query_row(&sql, params_from_iter(values.iter()), |row| {
            row.get::<_, Option<i64>>(0)
        })?;
        depth
            .map(|depth| {
                u32::try_from(depth).map_err(|_| StoreError::InvalidInput("stored depth out of range"))
            })
            .transpose()
    }

    fn select_adjacency(
        &self,
        conn: &Connection,
        order: &RebuildOrder,
    ) -> Result<Vec<AdjacencyRow>, StoreError> {
        let order_by = match order {
            RebuildOrder::PrimaryKey => self.pk.clone(),
            RebuildOrder::Column { name, descending } => {
                validate_identifier("rebuild order column", name)?;
                let direction = if *descending { " DESC" } else { "" };
                format!("{}{direction}, {}", quote(name), self.pk)
            }
        };
        let sql = format!(
            "SELECT {}, {} FROM {} ORDER BY {order_by}",
            self.pk, self.parent, self.table
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(AdjacencyRow {
                id: decode_id(row.get::<_, i64>(0)?)?,
                parent_id: row.get::<_, Option<i64>>(1)?.map(decode_id).transpose()?,
            });
        }
        Ok(out)
    }
}

/// Column values as stored, before validation.
struct RawRow {
    id: i64,
    parent_id: Option<i64>,
    tree_id: i64,
    path: String,
    depth: i64,
}

impl RawRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            tree_id: row.get(2)?,
            path: row.get(3)?,
            depth: row.get(4)?,
        })
    }

    fn decode(self, codec: &PathCodec) -> Result<NodeRow, StoreError> {
        Ok(NodeRow {
            id: decode_id(self.id)?,
            parent_id: self.parent_id.map(decode_id).transpose()?,
            address: PathAddress::from_stored(self.tree_id, self.path, self.depth, codec)?,
        })
    }
}

fn decode_id(raw: i64) -> Result<NodeId, StoreError> {
    NodeId::try_new(raw).map_err(|_| StoreError::InvalidInput("stored node id is not positive"))
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn map_insert_conflict(err: rusqlite::Error, id: NodeId) -> StoreError {
    if is_primary_key_conflict(&err) {
        return StoreError::NodeAlreadyExists(id);
    }
    StoreError::Sql(err)
}

/// Only a clash on the primary key means the node exists; NOT NULL, CHECK
/// and trigger failures from caller-owned columns stay SQL errors.
fn is_primary_key_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, _) => {
            code.code == ErrorCode::ConstraintViolation
                && code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}
