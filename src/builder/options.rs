//! Structured statement options, one type per statement kind.
//!
//! The serde shapes accept the same JSON the CLI takes, e.g.
//!
//! ```text
//! {"fields": ["age", "name"], "where": {"id": 100}, "literalWhere": ["age > ?"],
//!  "orders": [["age", "asc"]], "limit": {"offset": 0, "size": 20}, "params": [18]}
//! ```

use crate::models::{Record, SqlValue};
use serde::{Deserialize, Serialize};

/// Default page size when a limit omits `size`.
pub const DEFAULT_LIMIT_SIZE: u64 = 10;

/// Sort direction for `order by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "ASC")]
    Asc,
    #[default]
    #[serde(alias = "DESC")]
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One `order by` term. The direction defaults to descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OrderInput")]
pub struct Order {
    pub column: String,
    pub direction: Option<Direction>,
}

impl Order {
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction: Some(direction),
        }
    }

    pub fn effective_direction(&self) -> Direction {
        self.direction.unwrap_or_default()
    }
}

/// Accepted JSON shapes: `["col", "asc"]`, `["col"]` or `"col"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum OrderInput {
    Pair(String, Direction),
    Single((String,)),
    Column(String),
}

impl From<OrderInput> for Order {
    fn from(input: OrderInput) -> Self {
        match input {
            OrderInput::Pair(column, direction) => Order::new(column, direction),
            OrderInput::Single((column,)) | OrderInput::Column(column) => Order {
                column,
                direction: None,
            },
        }
    }
}

/// Row window rendered as `limit <offset>,<size>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "LimitInput")]
pub struct Limit {
    pub offset: Option<u64>,
    pub size: Option<u64>,
}

impl Limit {
    pub fn new(offset: u64, size: u64) -> Self {
        Self {
            offset: Some(offset),
            size: Some(size),
        }
    }

    pub fn effective_offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }

    pub fn effective_size(&self) -> u64 {
        self.size.unwrap_or(DEFAULT_LIMIT_SIZE)
    }
}

/// Accepted JSON shapes: `20` (size only) or `{"offset": 40, "size": 20}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum LimitInput {
    Size(u64),
    Window {
        #[serde(default)]
        offset: Option<u64>,
        #[serde(default)]
        size: Option<u64>,
    },
}

impl From<LimitInput> for Limit {
    fn from(input: LimitInput) -> Self {
        match input {
            LimitInput::Size(size) => Limit {
                offset: None,
                size: Some(size),
            },
            LimitInput::Window { offset, size } => Limit { offset, size },
        }
    }
}

/// Equality filter plus raw boolean fragments, all ANDed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(rename = "where", default)]
    pub where_eq: Record,
    #[serde(default)]
    pub literal_where: Vec<String>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.where_eq.set_entries().next().is_none() && self.literal_where.is_empty()
    }
}

/// Options appended to caller-supplied SQL (`Statement::Query`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(flatten)]
    pub filter: Filter,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub having: Vec<String>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub limit: Option<Limit>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub params: Vec<SqlValue>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.filter.where_eq.insert(column, Some(value.into()));
        self
    }

    pub fn literal_where(mut self, fragment: impl Into<String>) -> Self {
        self.filter.literal_where.push(fragment.into());
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group = Some(column.into());
        self
    }

    pub fn having(mut self, condition: impl Into<String>) -> Self {
        self.having.push(condition.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(Order::new(column, direction));
        self
    }

    pub fn limit(mut self, offset: u64, size: u64) -> Self {
        self.limit = Some(Limit::new(offset, size));
        self
    }

    pub fn end(mut self, suffix: impl Into<String>) -> Self {
        self.end = Some(suffix.into());
        self
    }

    pub fn param(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// Options for `SELECT <projection> FROM <table> ...`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOptions {
    #[serde(default)]
    pub fields: Vec<String>,
    /// Raw projection expressions, e.g. `sum(score) as scores`
    #[serde(default)]
    pub literal_fields: Vec<String>,
    #[serde(flatten)]
    pub query: QueryOptions,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn literal_field(mut self, expr: impl Into<String>) -> Self {
        self.literal_fields.push(expr.into());
        self
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.query = self.query.where_eq(column, value);
        self
    }

    pub fn literal_where(mut self, fragment: impl Into<String>) -> Self {
        self.query = self.query.literal_where(fragment);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.query = self.query.group_by(column);
        self
    }

    pub fn having(mut self, condition: impl Into<String>) -> Self {
        self.query = self.query.having(condition);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.query = self.query.order_by(column, direction);
        self
    }

    pub fn limit(mut self, offset: u64, size: u64) -> Self {
        self.query = self.query.limit(offset, size);
        self
    }

    pub fn end(mut self, suffix: impl Into<String>) -> Self {
        self.query = self.query.end(suffix);
        self
    }

    pub fn param(mut self, value: impl Into<SqlValue>) -> Self {
        self.query = self.query.param(value);
        self
    }
}

/// Rows to insert: one record, or a sequence whose column set is the union of
/// keys across all rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InsertRows {
    Many(Vec<Record>),
    Single(Record),
}

impl Default for InsertRows {
    fn default() -> Self {
        Self::Single(Record::new())
    }
}

/// The `ON DUPLICATE KEY UPDATE` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnUpdate {
    /// `` `col`= VALUES(`col`) `` for each listed column
    Columns(Vec<String>),
    /// `` `col`= ? `` for each set entry
    Assign(Record),
}

/// Options for `INSERT INTO <table> ...`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOptions {
    pub insert: InsertRows,
    #[serde(default)]
    pub on_update: Option<OnUpdate>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub params: Vec<SqlValue>,
}

impl InsertOptions {
    pub fn row(row: Record) -> Self {
        Self {
            insert: InsertRows::Single(row),
            ..Self::default()
        }
    }

    pub fn rows(rows: Vec<Record>) -> Self {
        Self {
            insert: InsertRows::Many(rows),
            ..Self::default()
        }
    }

    pub fn on_update(mut self, assignments: Record) -> Self {
        self.on_update = Some(OnUpdate::Assign(assignments));
        self
    }

    pub fn on_update_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_update = Some(OnUpdate::Columns(
            columns.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn end(mut self, suffix: impl Into<String>) -> Self {
        self.end = Some(suffix.into());
        self
    }
}

/// Options for `UPDATE <table> SET ... where ...`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    #[serde(default)]
    pub update: Record,
    #[serde(default)]
    pub literal_update: Vec<String>,
    #[serde(flatten)]
    pub filter: Filter,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub params: Vec<SqlValue>,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.update.insert(column, Some(value.into()));
        self
    }

    pub fn literal_update(mut self, fragment: impl Into<String>) -> Self {
        self.literal_update.push(fragment.into());
        self
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.filter.where_eq.insert(column, Some(value.into()));
        self
    }

    pub fn literal_where(mut self, fragment: impl Into<String>) -> Self {
        self.filter.literal_where.push(fragment.into());
        self
    }

    pub fn end(mut self, suffix: impl Into<String>) -> Self {
        self.end = Some(suffix.into());
        self
    }

    pub fn param(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_shapes() {
        let orders: Vec<Order> =
            serde_json::from_str(r#"[["age", "asc"], ["name"], "city", ["id", "DESC"]]"#).unwrap();
        assert_eq!(orders[0].effective_direction(), Direction::Asc);
        assert_eq!(orders[1].direction, None);
        assert_eq!(orders[1].effective_direction(), Direction::Desc);
        assert_eq!(orders[2].column, "city");
        assert_eq!(orders[3].effective_direction(), Direction::Desc);
    }

    #[test]
    fn test_limit_defaults() {
        let limit: Limit = serde_json::from_str(r#"{"offset": 5}"#).unwrap();
        assert_eq!(limit.effective_offset(), 5);
        assert_eq!(limit.effective_size(), DEFAULT_LIMIT_SIZE);

        let limit: Limit = serde_json::from_str("20").unwrap();
        assert_eq!(limit.effective_offset(), 0);
        assert_eq!(limit.effective_size(), 20);
    }

    #[test]
    fn test_select_options_from_json() {
        let opts: SelectOptions = serde_json::from_str(
            r#"{"fields": ["age"], "where": {"id": 1}, "literalWhere": ["age > ?"], "params": [3]}"#,
        )
        .unwrap();
        assert_eq!(opts.fields, vec!["age"]);
        assert_eq!(opts.query.filter.where_eq.get("id"), Some(&SqlValue::Int(1)));
        assert_eq!(opts.query.filter.literal_where, vec!["age > ?"]);
        assert_eq!(opts.query.params, vec![SqlValue::Int(3)]);
    }

    #[test]
    fn test_insert_rows_shapes() {
        let single: InsertOptions =
            serde_json::from_str(r#"{"insert": {"name": "Tom"}, "onUpdate": ["name"]}"#).unwrap();
        assert!(matches!(single.insert, InsertRows::Single(_)));
        assert!(matches!(single.on_update, Some(OnUpdate::Columns(_))));

        let many: InsertOptions =
            serde_json::from_str(r#"{"insert": [{"name": "Tom"}, {"age": 3}], "onUpdate": {"age": 4}}"#)
                .unwrap();
        assert!(matches!(many.insert, InsertRows::Many(ref rows) if rows.len() == 2));
        assert!(matches!(many.on_update, Some(OnUpdate::Assign(_))));
    }

    #[test]
    fn test_filter_is_empty_ignores_unset() {
        let filter = Filter {
            where_eq: Record::new().set_opt("id", None),
            literal_where: Vec::new(),
        };
        assert!(filter.is_empty());
    }
}
