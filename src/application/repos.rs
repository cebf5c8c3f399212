//! Record store contract describing the hosted table backend.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::entities::RecordId;
use crate::domain::types::Table;

/// A backend row as delivered on the wire: a JSON object keyed by column.
pub type RawRecord = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("record not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("failed to decode backend response: {message}")]
    Decode { message: String },
}

impl StoreError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gte => "gte",
        }
    }
}

/// Server-side row predicate. Values are compared as text, which is exact for
/// the enum literals and ISO dates the layer filters on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: &'static str,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<String>) -> Self {
        Self {
            column,
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn gte(column: &'static str, value: impl Into<String>) -> Self {
        Self {
            column,
            op: FilterOp::Gte,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

/// Many-to-one join embedded under the joined table's name in each row.
///
/// A row whose foreign key resolves to nothing carries `null` there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub table: Table,
    pub foreign_key: &'static str,
    pub columns: Vec<&'static str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub orders: Vec<Order>,
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
    pub embed: Option<Embed>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, column: &'static str, ascending: bool) -> Self {
        self.orders.push(Order { column, ascending });
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn embed(
        mut self,
        table: Table,
        foreign_key: &'static str,
        columns: &[&'static str],
    ) -> Self {
        self.embed = Some(Embed {
            table,
            foreign_key,
            columns: columns.to_vec(),
        });
        self
    }
}

/// Filtered select/insert/update/delete against the backend tables.
///
/// Implementations never retry and return backend failures unmodified.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self, table: Table, query: &ListQuery) -> Result<Vec<RawRecord>, StoreError>;

    async fn count(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError>;

    async fn insert(&self, table: Table, record: RawRecord) -> Result<RawRecord, StoreError>;

    async fn update(
        &self,
        table: Table,
        id: RecordId,
        patch: RawRecord,
    ) -> Result<RawRecord, StoreError>;

    async fn delete(&self, table: Table, id: RecordId) -> Result<(), StoreError>;
}
