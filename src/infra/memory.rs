//! In-process record store with the same observable contract as the hosted
//! backend: generated ids and timestamps, server-side ordering, filters,
//! limits, a many-to-one join, and foreign-key checks on appointment writes.
//!
//! Also the test double for the data-access layer: every call is counted per
//! table and operation, and a failure can be queued for the next call.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::repos::{
    Embed, Filter, FilterOp, ListQuery, Order, RawRecord, RecordStore, StoreError,
};
use crate::cache::lock::{mutex_lock, rw_read, rw_write};
use crate::domain::entities::RecordId;
use crate::domain::types::Table;

const SOURCE: &str = "infra::memory::InMemoryRecordStore";
const CLIENT_FOREIGN_KEY: &str = "client_id";
/// Fixed width so that lexical order matches chronological order.
const CREATED_AT_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCall {
    List,
    Count,
    Insert,
    Update,
    Delete,
}

impl StoreCall {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreCall::List => "list",
            StoreCall::Count => "count",
            StoreCall::Insert => "insert",
            StoreCall::Update => "update",
            StoreCall::Delete => "delete",
        }
    }
}

impl fmt::Display for StoreCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct Tables {
    clients: BTreeMap<i64, RawRecord>,
    appointments: BTreeMap<i64, RawRecord>,
    next_id: i64,
    last_created_at: Option<OffsetDateTime>,
}

impl Tables {
    fn rows(&self, table: Table) -> &BTreeMap<i64, RawRecord> {
        match table {
            Table::Clients => &self.clients,
            Table::Appointments => &self.appointments,
        }
    }

    fn rows_mut(&mut self, table: Table) -> &mut BTreeMap<i64, RawRecord> {
        match table {
            Table::Clients => &mut self.clients,
            Table::Appointments => &mut self.appointments,
        }
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Wall-clock timestamp, nudged forward so consecutive inserts never tie.
    fn next_created_at(&mut self) -> Result<String, StoreError> {
        let now = match self.last_created_at {
            Some(last) => OffsetDateTime::now_utc().max(last + time::Duration::microseconds(1)),
            None => OffsetDateTime::now_utc(),
        };
        self.last_created_at = Some(now);
        now.format(CREATED_AT_FORMAT)
            .map_err(StoreError::from_persistence)
    }

    fn check_client_reference(&self, record: &RawRecord) -> Result<(), StoreError> {
        let Some(value) = record.get(CLIENT_FOREIGN_KEY) else {
            return Ok(());
        };
        let exists = key_of(value).is_some_and(|id| self.clients.contains_key(&id));
        if exists {
            Ok(())
        } else {
            Err(StoreError::Integrity {
                message: format!(
                    "insert or update on table \"appointments\" violates foreign key constraint: client_id {} is not present in table \"clients\"",
                    text_of(value)
                ),
            })
        }
    }

    fn join(&self, row: &RawRecord, embed: &Embed) -> Value {
        let joined = row
            .get(embed.foreign_key)
            .and_then(key_of)
            .and_then(|id| self.rows(embed.table).get(&id));
        match joined {
            Some(target) => {
                let columns: Map<String, Value> = embed
                    .columns
                    .iter()
                    .map(|column| {
                        let value = target.get(*column).cloned().unwrap_or(Value::Null);
                        ((*column).to_string(), value)
                    })
                    .collect();
                Value::Object(columns)
            }
            None => Value::Null,
        }
    }
}

/// `RecordStore` held entirely in memory.
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
    calls: Mutex<HashMap<(Table, StoreCall), usize>>,
    failures: Mutex<Vec<(Table, StoreCall, StoreError)>>,
    latency: Option<Duration>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before touching the tables.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls made against `table` for `call`, failed ones included.
    pub fn calls(&self, table: Table, call: StoreCall) -> usize {
        mutex_lock(&self.calls, SOURCE, "calls")
            .get(&(table, call))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        mutex_lock(&self.calls, SOURCE, "total_calls").values().sum()
    }

    /// Make the next `call` against `table` fail with `error`.
    pub fn fail_next(&self, table: Table, call: StoreCall, error: StoreError) {
        mutex_lock(&self.failures, SOURCE, "fail_next").push((table, call, error));
    }

    pub fn len(&self, table: Table) -> usize {
        rw_read(&self.tables, SOURCE, "len").rows(table).len()
    }

    pub fn is_empty(&self, table: Table) -> bool {
        self.len(table) == 0
    }

    async fn enter(&self, table: Table, call: StoreCall) -> Result<(), StoreError> {
        *mutex_lock(&self.calls, SOURCE, "enter")
            .entry((table, call))
            .or_insert(0) += 1;
        debug!(table = %table, call = %call, "In-memory store call");

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut failures = mutex_lock(&self.failures, SOURCE, "enter");
        match failures
            .iter()
            .position(|(t, c, _)| *t == table && *c == call)
        {
            Some(index) => Err(failures.remove(index).2),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn list(&self, table: Table, query: &ListQuery) -> Result<Vec<RawRecord>, StoreError> {
        self.enter(table, StoreCall::List).await?;
        let tables = rw_read(&self.tables, SOURCE, "list");

        let mut rows: Vec<RawRecord> = tables
            .rows(table)
            .values()
            .filter(|row| matches_all(row, &query.filters))
            .cloned()
            .collect();
        rows.sort_by(|left, right| compare_rows(left, right, &query.orders));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        if let Some(embed) = &query.embed {
            for row in &mut rows {
                let joined = tables.join(row, embed);
                row.insert(embed.table.as_str().to_string(), joined);
            }
        }
        Ok(rows)
    }

    async fn count(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError> {
        self.enter(table, StoreCall::Count).await?;
        let tables = rw_read(&self.tables, SOURCE, "count");
        let count = tables
            .rows(table)
            .values()
            .filter(|row| matches_all(row, filters))
            .count();
        Ok(count as u64)
    }

    async fn insert(&self, table: Table, record: RawRecord) -> Result<RawRecord, StoreError> {
        self.enter(table, StoreCall::Insert).await?;
        let mut tables = rw_write(&self.tables, SOURCE, "insert");
        if table == Table::Appointments {
            tables.check_client_reference(&record)?;
        }

        let id = tables.allocate_id();
        let created_at = tables.next_created_at()?;
        let mut row = record;
        row.insert("id".to_string(), Value::from(id));
        row.insert("created_at".to_string(), Value::from(created_at));
        tables.rows_mut(table).insert(id, row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        id: RecordId,
        patch: RawRecord,
    ) -> Result<RawRecord, StoreError> {
        self.enter(table, StoreCall::Update).await?;
        let mut tables = rw_write(&self.tables, SOURCE, "update");
        if !tables.rows(table).contains_key(&id.get()) {
            return Err(StoreError::NotFound);
        }
        if table == Table::Appointments {
            tables.check_client_reference(&patch)?;
        }

        let row = tables
            .rows_mut(table)
            .get_mut(&id.get())
            .ok_or(StoreError::NotFound)?;
        for (column, value) in patch {
            if column != "id" && column != "created_at" {
                row.insert(column, value);
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: Table, id: RecordId) -> Result<(), StoreError> {
        self.enter(table, StoreCall::Delete).await?;
        let mut tables = rw_write(&self.tables, SOURCE, "delete");
        tables
            .rows_mut(table)
            .remove(&id.get())
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

fn matches_all(row: &RawRecord, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        let Some(value) = row.get(filter.column).filter(|value| !value.is_null()) else {
            return false;
        };
        let value = text_of(value);
        match filter.op {
            FilterOp::Eq => value == filter.value,
            FilterOp::Gte => value.as_str() >= filter.value.as_str(),
        }
    })
}

fn compare_rows(left: &RawRecord, right: &RawRecord, orders: &[Order]) -> Ordering {
    orders
        .iter()
        .map(|order| {
            let ordering = compare_values(left.get(order.column), right.get(order.column));
            if order.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Numbers compare numerically, everything else as text; nulls sort after
/// values in ascending order.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|value| !value.is_null());
    let right = right.filter(|value| !value.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => a.to_string().cmp(&b.to_string()),
            }
        }
        (Some(a), Some(b)) => text_of(a).cmp(&text_of(b)),
    }
}

fn key_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    async fn client(store: &InMemoryRecordStore, name: &str) -> i64 {
        let row = store
            .insert(Table::Clients, record(json!({"name": name, "phone": "5550000"})))
            .await
            .expect("insert client");
        row["id"].as_i64().expect("numeric id")
    }

    #[tokio::test]
    async fn inserts_assign_ids_and_increasing_timestamps() {
        let store = InMemoryRecordStore::new();
        let first = store
            .insert(Table::Clients, record(json!({"name": "a"})))
            .await
            .expect("first");
        let second = store
            .insert(Table::Clients, record(json!({"name": "b"})))
            .await
            .expect("second");

        assert_eq!(first["id"], json!(1));
        assert_eq!(second["id"], json!(2));
        let first_at = first["created_at"].as_str().expect("timestamp");
        let second_at = second["created_at"].as_str().expect("timestamp");
        assert!(second_at > first_at);
    }

    #[tokio::test]
    async fn list_orders_filters_limits_and_joins() {
        let store = InMemoryRecordStore::new();
        let ana = client(&store, "Ana").await;
        for (date, time, status) in [
            ("2030-01-02", "09:00", "pendiente"),
            ("2030-01-01", "11:00", "pendiente"),
            ("2030-01-01", "08:00", "realizado"),
            ("2029-12-31", "10:00", "pendiente"),
        ] {
            store
                .insert(
                    Table::Appointments,
                    record(json!({"date": date, "time": time, "client_id": ana, "status": status})),
                )
                .await
                .expect("insert appointment");
        }

        let query = ListQuery::new()
            .filter(Filter::gte("date", "2030-01-01"))
            .filter(Filter::eq("status", "pendiente"))
            .order_by("date", true)
            .order_by("time", true)
            .limit(1)
            .embed(Table::Clients, "client_id", &["name", "phone"]);
        let rows = store
            .list(Table::Appointments, &query)
            .await
            .expect("list");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["date"], json!("2030-01-01"));
        assert_eq!(rows[0]["time"], json!("11:00"));
        assert_eq!(rows[0]["clients"], json!({"name": "Ana", "phone": "5550000"}));
    }

    #[tokio::test]
    async fn appointment_insert_requires_existing_client() {
        let store = InMemoryRecordStore::new();
        let error = store
            .insert(
                Table::Appointments,
                record(json!({"date": "2030-01-01", "time": "10:00", "client_id": 404, "status": "pendiente"})),
            )
            .await
            .expect_err("dangling client");
        assert!(matches!(error, StoreError::Integrity { .. }));
        assert!(store.is_empty(Table::Appointments));
    }

    #[tokio::test]
    async fn deleting_a_client_leaves_a_null_join() {
        let store = InMemoryRecordStore::new();
        let ana = client(&store, "Ana").await;
        store
            .insert(
                Table::Appointments,
                record(json!({"date": "2030-01-01", "time": "10:00", "client_id": ana, "status": "pendiente"})),
            )
            .await
            .expect("appointment");
        store
            .delete(Table::Clients, RecordId::new(ana))
            .await
            .expect("delete client");

        let rows = store
            .list(
                Table::Appointments,
                &ListQuery::new().embed(Table::Clients, "client_id", &["name"]),
            )
            .await
            .expect("list");
        assert_eq!(rows[0]["clients"], Value::Null);
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let store = InMemoryRecordStore::new();
        assert_eq!(
            store.delete(Table::Clients, RecordId::new(7)).await,
            Err(StoreError::NotFound)
        );
        assert_eq!(
            store
                .update(Table::Clients, RecordId::new(7), RawRecord::new())
                .await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn injected_failures_fire_once_and_are_counted() {
        let store = InMemoryRecordStore::new();
        store.fail_next(
            Table::Clients,
            StoreCall::List,
            StoreError::Persistence("offline".to_string()),
        );

        let first = store.list(Table::Clients, &ListQuery::new()).await;
        assert_eq!(first, Err(StoreError::Persistence("offline".to_string())));
        assert!(store.list(Table::Clients, &ListQuery::new()).await.is_ok());
        assert_eq!(store.calls(Table::Clients, StoreCall::List), 2);
        assert_eq!(store.calls(Table::Appointments, StoreCall::List), 0);
    }

    #[tokio::test]
    async fn count_applies_filters() {
        let store = InMemoryRecordStore::new();
        let ana = client(&store, "Ana").await;
        for status in ["pendiente", "pendiente", "realizado"] {
            store
                .insert(
                    Table::Appointments,
                    record(json!({"date": "2030-01-01", "time": "10:00", "client_id": ana, "status": status})),
                )
                .await
                .expect("appointment");
        }

        assert_eq!(store.count(Table::Appointments, &[]).await, Ok(3));
        assert_eq!(
            store
                .count(Table::Appointments, &[Filter::eq("status", "pendiente")])
                .await,
            Ok(2)
        );
    }
}
