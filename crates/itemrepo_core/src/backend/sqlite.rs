//! SQLite backend storing items as JSON documents.
//!
//! # Responsibility
//! - Persist items of one collection in the shared `items` table.
//! - Translate predicate/sort ASTs to `json_extract` SQL so filtering,
//!   ordering and windows run inside SQLite.
//! - Fall back to in-process evaluation for closures and unusual paths.
//!
//! # Invariants
//! - Only connections migrated through `db::open_db*` are accepted.
//! - Comparisons and sort keys rank JSON types like `Value::total_cmp`
//!   (null, bool, number, text) before comparing values, so pushed-down
//!   chains return what in-process evaluation returns.
//! - Equality against null is null-safe; ordering comparisons against a
//!   missing field are false.
//! - Ties in ordered results break by `item_key`.

use crate::backend::{Backend, Capabilities, PagingTier};
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::error::{StoreError, StoreResult};
use crate::model::item::{Item, ItemKey};
use crate::model::value::Value;
use crate::query::exec::{apply_stage, count_matching};
use crate::query::expr::{CompareOp, Direction, Predicate, SortKey};
use crate::query::plan::Stage;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use std::fmt::Write as _;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const BACKEND_NAME: &str = "sqlite";

// Mirrors `Value::rank`; `json_extract` alone reads JSON booleans as 0/1.
const TYPE_RANK_SQL: &str = "CASE COALESCE(json_type(body, ?), 'null') \
     WHEN 'null' THEN 0 WHEN 'true' THEN 1 WHEN 'false' THEN 1 \
     WHEN 'integer' THEN 2 WHEN 'real' THEN 2 ELSE 3 END";

static FIELD_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid field path regex")
});

/// Direct-index backend over one collection of the `items` table.
pub struct SqliteBackend<T: Item> {
    conn: Mutex<Connection>,
    collection: String,
    _items: PhantomData<fn() -> T>,
}

impl<T: Item> SqliteBackend<T> {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - `DbError::UnsupportedSchemaVersion` / `MissingRequiredTable` when the
    ///   connection was not opened through `db::open_db*`.
    pub fn try_new(conn: Connection, collection: impl Into<String>) -> StoreResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.into(),
            _items: PhantomData,
        })
    }

    pub fn open(path: impl AsRef<Path>, collection: impl Into<String>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?, collection)
    }

    pub fn open_in_memory(collection: impl Into<String>) -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?, collection)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::poisoned(BACKEND_NAME))
    }

    /// Runs the pushable part of `stage`; the rest runs in-process.
    fn select(&self, stage: &Stage<T>, full_pushdown: bool) -> StoreResult<Vec<T>> {
        let mut sql = String::from("SELECT body FROM items WHERE collection = ?");
        let mut bind = vec![SqlValue::Text(self.collection.clone())];

        for filter in stage.filters.iter().filter(|f| is_pushable(f)) {
            sql.push_str(" AND ");
            push_predicate(filter, &mut sql, &mut bind);
        }

        if full_pushdown {
            sql.push_str(" ORDER BY ");
            for spec in &stage.order {
                if let SortKey::Field(path) = &spec.key {
                    let dir = match spec.direction {
                        Direction::Ascending => "ASC",
                        Direction::Descending => "DESC",
                    };
                    let _ = write!(sql, "{TYPE_RANK_SQL} {dir}, json_extract(body, ?) {dir}, ");
                    bind.push(SqlValue::Text(json_path(path)));
                    bind.push(SqlValue::Text(json_path(path)));
                }
            }
            sql.push_str("item_key ASC LIMIT ? OFFSET ?");
            bind.push(SqlValue::Integer(
                stage.window.take.map_or(-1, |take| to_sql_int(take)),
            ));
            bind.push(SqlValue::Integer(to_sql_int(stage.window.skip)));
        } else {
            sql.push_str(" ORDER BY item_key ASC");
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            items.push(parse_body(&body)?);
        }
        Ok(items)
    }
}

impl<T: Item> Backend<T> for SqliteBackend<T> {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            tier: PagingTier::DirectIndex,
            cheap_count: true,
            predicate_pushdown: true,
        }
    }

    fn get(&self, key: &T::Key) -> StoreResult<Option<T>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT body FROM items WHERE collection = ?1 AND item_key = ?2;")?;
        let mut rows = stmt.query(params![self.collection, key.to_storage()])?;
        if let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            return Ok(Some(parse_body(&body)?));
        }
        Ok(None)
    }

    fn upsert(&self, item: &T) -> StoreResult<()> {
        let body = serde_json::to_string(item)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO items (collection, item_key, body)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (collection, item_key) DO UPDATE SET body = excluded.body;",
            params![self.collection, item.key().to_storage(), body],
        )?;
        Ok(())
    }

    fn delete(&self, key: &T::Key) -> StoreResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM items WHERE collection = ?1 AND item_key = ?2;",
            params![self.collection, key.to_storage()],
        )?;
        Ok(changed > 0)
    }

    fn scan(&self, stage: &Stage<T>) -> StoreResult<Vec<T>> {
        let full_pushdown = stage.is_translatable()
            && stage.filters.iter().all(is_pushable)
            && stage.order.iter().all(|spec| match &spec.key {
                SortKey::Field(path) => FIELD_PATH.is_match(path),
                SortKey::Computed(_) => false,
            });
        debug!(
            "event=sqlite_scan module=backend collection={} pushdown={}",
            self.collection,
            if full_pushdown { "full" } else { "partial" }
        );

        if full_pushdown {
            return self.select(stage, true);
        }

        let candidates = self.select(stage, false)?;
        let residual = Stage {
            filters: stage
                .filters
                .iter()
                .filter(|f| !is_pushable(f))
                .cloned()
                .collect(),
            order: stage.order.clone(),
            window: stage.window,
        };
        apply_stage(candidates, &residual)
    }

    fn count(&self, stage: &Stage<T>) -> StoreResult<u64> {
        if stage.filters.iter().all(is_pushable) {
            let mut sql = String::from("SELECT COUNT(*) FROM items WHERE collection = ?");
            let mut bind = vec![SqlValue::Text(self.collection.clone())];
            for filter in &stage.filters {
                sql.push_str(" AND ");
                push_predicate(filter, &mut sql, &mut bind);
            }
            let conn = self.lock()?;
            let count: i64 = conn.query_row(&sql, params_from_iter(bind), |row| row.get(0))?;
            return Ok(u64::try_from(count).unwrap_or_default());
        }

        let candidates = self.select(stage, false)?;
        let remaining: Vec<Predicate<T>> = stage
            .filters
            .iter()
            .filter(|f| !is_pushable(f))
            .cloned()
            .collect();
        count_matching(&candidates, &remaining)
    }
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let version = current_user_version(conn)?;
    let latest = latest_version();
    if version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: version,
            latest_supported: latest,
        }
        .into());
    }

    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'items'
        );",
        [],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(DbError::MissingRequiredTable("items").into());
    }
    Ok(())
}

fn parse_body<T: Item>(body: &str) -> StoreResult<T> {
    serde_json::from_str(body)
        .map_err(|err| StoreError::InvalidData(format!("item body does not decode: {err}")))
}

fn json_path(path: &str) -> String {
    format!("$.{path}")
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Int(int) => SqlValue::Integer(*int),
        Value::Float(float) => SqlValue::Real(*float),
        Value::Text(text) => SqlValue::Text(text.clone()),
    }
}

fn is_pushable<T>(predicate: &Predicate<T>) -> bool {
    match predicate {
        Predicate::Compare { field, .. } | Predicate::IsNull(field) => FIELD_PATH.is_match(field),
        Predicate::And(parts) | Predicate::Or(parts) => parts.iter().all(is_pushable),
        Predicate::Not(inner) => is_pushable(inner),
        Predicate::Custom(_) => false,
    }
}

/// Appends SQL for a pushable predicate. Callers check `is_pushable` first.
fn push_predicate<T>(predicate: &Predicate<T>, sql: &mut String, bind: &mut Vec<SqlValue>) {
    match predicate {
        Predicate::Compare { field, op, value } if value.is_null() => match op {
            CompareOp::Eq | CompareOp::Ne => {
                bind.push(SqlValue::Text(json_path(field)));
                sql.push_str(if *op == CompareOp::Eq {
                    "(json_extract(body, ?) IS NULL)"
                } else {
                    "(json_extract(body, ?) IS NOT NULL)"
                });
            }
            // Nothing orders against null.
            _ => sql.push('0'),
        },
        Predicate::Compare { field, op, value } => {
            let path = json_path(field);
            // A missing field only satisfies `!=`.
            let when_null = if *op == CompareOp::Ne { 1 } else { 0 };
            let symbol = match op {
                CompareOp::Ne => "<>",
                other => other.symbol(),
            };
            let _ = write!(
                sql,
                "(CASE WHEN json_extract(body, ?) IS NULL THEN {when_null} \
                 ELSE ({TYPE_RANK_SQL}, json_extract(body, ?)) {symbol} (?, ?) END)"
            );
            bind.push(SqlValue::Text(path.clone()));
            bind.push(SqlValue::Text(path.clone()));
            bind.push(SqlValue::Text(path));
            bind.push(SqlValue::Integer(i64::from(value.rank())));
            bind.push(to_sql_value(value));
        }
        Predicate::IsNull(field) => {
            bind.push(SqlValue::Text(json_path(field)));
            sql.push_str("(json_extract(body, ?) IS NULL)");
        }
        Predicate::And(parts) | Predicate::Or(parts) => {
            if parts.is_empty() {
                sql.push_str(if matches!(predicate, Predicate::And(_)) { "1" } else { "0" });
                return;
            }
            let joiner = if matches!(predicate, Predicate::And(_)) {
                " AND "
            } else {
                " OR "
            };
            sql.push('(');
            for (idx, part) in parts.iter().enumerate() {
                if idx > 0 {
                    sql.push_str(joiner);
                }
                push_predicate(part, sql, bind);
            }
            sql.push(')');
        }
        Predicate::Not(inner) => {
            sql.push_str("(NOT ");
            push_predicate(inner, sql, bind);
            sql.push(')');
        }
        Predicate::Custom(_) => sql.push('1'),
    }
}

#[cfg(test)]
mod tests {
    use super::{is_pushable, push_predicate, SqliteBackend};
    use rusqlite::types::Value as SqlValue;
    use crate::backend::Backend;
    use crate::error::StoreError;
    use crate::model::item::HasKey;
    use crate::query::expr::{field, Predicate};
    use crate::query::plan::Stage;
    use rusqlite::Connection;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        n: Option<i64>,
    }

    impl HasKey for Row {
        type Key = String;

        fn key(&self) -> &String {
            &self.id
        }
    }

    #[test]
    fn predicates_translate_to_null_safe_sql() {
        let predicate: Predicate<Row> = field("n").eq(1).or(field("n").gt(5).not());
        let mut sql = String::new();
        let mut bind = Vec::new();
        push_predicate(&predicate, &mut sql, &mut bind);
        assert!(sql.starts_with("((CASE WHEN json_extract(body, ?) IS NULL THEN 0 ELSE ("));
        assert!(sql.contains(") = (?, ?) END) OR (NOT (CASE WHEN"));
        assert!(sql.ends_with(") > (?, ?) END)))"));
        assert_eq!(sql.matches("json_type(body, ?)").count(), 2);
        assert_eq!(bind.len(), 10);
        assert_eq!(bind[3], SqlValue::Integer(2));
        assert_eq!(bind[4], SqlValue::Integer(1));

        let against_null: Predicate<Row> = field("n").lt(None::<i64>);
        let mut sql = String::new();
        push_predicate(&against_null, &mut sql, &mut bind);
        assert_eq!(sql, "0");
    }

    #[test]
    fn odd_paths_and_closures_are_not_pushed() {
        assert!(is_pushable::<Row>(&field("a.b_c").eq(1)));
        assert!(!is_pushable::<Row>(&field("a-b").eq(1)));
        assert!(!is_pushable::<Row>(&field("x\") OR 1=1 --").eq(1)));
        assert!(!is_pushable::<Row>(&Predicate::custom(|_| true)));
    }

    #[test]
    fn unmigrated_connection_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteBackend::<Row>::try_new(conn, "rows").err().unwrap();
        assert!(matches!(err, StoreError::Db(_)));
    }

    #[test]
    fn null_fields_behave_like_in_process_evaluation() {
        let backend = SqliteBackend::<Row>::open_in_memory("rows").unwrap();
        for (id, n) in [("a", Some(1)), ("b", None), ("c", Some(7))] {
            backend
                .upsert(&Row {
                    id: id.to_string(),
                    n,
                })
                .unwrap();
        }

        let count = |predicate: Predicate<Row>| {
            backend
                .count(&Stage {
                    filters: vec![predicate],
                    ..Stage::default()
                })
                .unwrap()
        };
        assert_eq!(count(field("n").ne(1)), 2);
        assert_eq!(count(field("n").gt(5).not()), 2);
        assert_eq!(count(field("n").is_null()), 1);
        assert_eq!(count(field("n").eq(None::<i64>)), 1);
        assert_eq!(count(field("n").gt(true)), 2);
        assert_eq!(count(field("n").eq(1.0)), 1);
        assert_eq!(count(field("n").lt(None::<i64>).not()), 3);
    }
}
