//! Statement builder.
//!
//! Translates structured options into parameterized MySQL text. Building is
//! pure: no I/O, no shared state, and the same input always produces the
//! same [`BuiltStatement`].
//!
//! Column identifiers are back-tick quoted. Table names, literal fragments
//! and `end` suffixes are trusted and copied verbatim.

pub mod options;
pub mod writer;

pub use options::{
    DEFAULT_LIMIT_SIZE, Direction, Filter, InsertOptions, InsertRows, Limit, OnUpdate, Order,
    QueryOptions, SelectOptions, UpdateOptions,
};
pub use writer::quote_ident;

use crate::error::{DbError, DbResult};
use crate::models::{Record, SqlValue};
use serde::Serialize;
use std::fmt;
use writer::SqlWriter;

/// SQL text plus its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltStatement {
    sql: String,
    params: Vec<SqlValue>,
}

impl BuiltStatement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }
}

impl fmt::Display for BuiltStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Raw,
    Query,
    Select,
    Insert,
    Update,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::Query => "query",
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
        };
        f.write_str(name)
    }
}

/// A statement description, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Hand-written SQL with `?` placeholders, passed through unchanged.
    Raw { sql: String, params: Vec<SqlValue> },
    /// Caller SQL followed by the structured clause chain.
    Query { sql: String, options: QueryOptions },
    Select { table: String, options: SelectOptions },
    Insert { table: String, options: InsertOptions },
    Update { table: String, options: UpdateOptions },
}

impl Statement {
    pub fn raw(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self::Raw {
            sql: sql.into(),
            params,
        }
    }

    pub fn query(sql: impl Into<String>, options: QueryOptions) -> Self {
        Self::Query {
            sql: sql.into(),
            options,
        }
    }

    pub fn select(table: impl Into<String>, options: SelectOptions) -> Self {
        Self::Select {
            table: table.into(),
            options,
        }
    }

    pub fn insert(table: impl Into<String>, options: InsertOptions) -> Self {
        Self::Insert {
            table: table.into(),
            options,
        }
    }

    pub fn update(table: impl Into<String>, options: UpdateOptions) -> Self {
        Self::Update {
            table: table.into(),
            options,
        }
    }

    pub fn kind(&self) -> StatementKind {
        match self {
            Self::Raw { .. } => StatementKind::Raw,
            Self::Query { .. } => StatementKind::Query,
            Self::Select { .. } => StatementKind::Select,
            Self::Insert { .. } => StatementKind::Insert,
            Self::Update { .. } => StatementKind::Update,
        }
    }

    /// Render this statement. See [`build`].
    pub fn build(&self) -> DbResult<BuiltStatement> {
        build(self)
    }
}

/// Render a statement into SQL text and an ordered parameter list.
pub fn build(statement: &Statement) -> DbResult<BuiltStatement> {
    let (sql, params) = match statement {
        Statement::Raw { sql, params } => {
            if sql.trim().is_empty() {
                return Err(DbError::validation("sql text is empty"));
            }
            (sql.clone(), params.clone())
        }
        Statement::Query { sql, options } => build_query(sql, options)?,
        Statement::Select { table, options } => build_select(table, options)?,
        Statement::Insert { table, options } => build_insert(table, options)?,
        Statement::Update { table, options } => build_update(table, options)?,
    };
    Ok(BuiltStatement { sql, params })
}

fn require_table(table: &str) -> DbResult<&str> {
    let table = table.trim();
    if table.is_empty() {
        return Err(DbError::validation("table name is empty"));
    }
    Ok(table)
}

/// Clause chain shared by query and select: where, group/having, order, limit, end.
fn push_clauses(writer: &mut SqlWriter<'_>, options: &QueryOptions) -> DbResult<()> {
    writer.push_filter(&options.filter)?;
    writer.push_group(options.group.as_deref(), &options.having)?;
    writer.push_orders(&options.orders)?;
    writer.push_limit(options.limit.as_ref());
    writer.push_end(options.end.as_deref())
}

fn build_query(sql: &str, options: &QueryOptions) -> DbResult<(String, Vec<SqlValue>)> {
    if sql.trim().is_empty() {
        return Err(DbError::validation("sql text is empty"));
    }
    // Placeholders in the caller SQL take the first explicit params.
    let mut writer = SqlWriter::new(String::new(), &options.params);
    writer.push_literal(sql.trim_end().trim_end_matches(';'))?;
    push_clauses(&mut writer, options)?;
    writer.finish()
}

fn build_select(table: &str, options: &SelectOptions) -> DbResult<(String, Vec<SqlValue>)> {
    let table = require_table(table)?;
    let mut writer = SqlWriter::new("SELECT ", &options.query.params);

    if options.fields.is_empty() && options.literal_fields.is_empty() {
        writer.push_str("*");
    } else {
        let mut first = true;
        for field in &options.fields {
            if !first {
                writer.push_str(", ");
            }
            writer.push_str(&quote_ident(field)?);
            first = false;
        }
        for expr in &options.literal_fields {
            if !first {
                writer.push_str(", ");
            }
            writer.push_literal(expr)?;
            first = false;
        }
    }

    writer.push_str(" FROM ");
    writer.push_str(table);
    push_clauses(&mut writer, &options.query)?;
    writer.finish()
}

/// Ordered union of columns across rows, in first-seen order.
fn column_union(rows: &[Record]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for column in row.columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }
    columns
}

fn push_column_list(writer: &mut SqlWriter<'_>, columns: &[&str]) -> DbResult<()> {
    writer.push_str(" (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            writer.push_str(",");
        }
        writer.push_str(&quote_ident(column)?);
    }
    writer.push_str(") VALUES ");
    Ok(())
}

fn build_insert(table: &str, options: &InsertOptions) -> DbResult<(String, Vec<SqlValue>)> {
    let table = require_table(table)?;
    let mut writer = SqlWriter::new(format!("INSERT INTO {}", table), &options.params);

    match &options.insert {
        // Unset entries are omitted: the column and its placeholder disappear.
        InsertRows::Single(row) => {
            let entries: Vec<(&str, &SqlValue)> = row.set_entries().collect();
            if entries.is_empty() {
                return Err(DbError::validation("insert row has no columns"));
            }
            let columns: Vec<&str> = entries.iter().map(|(c, _)| *c).collect();
            push_column_list(&mut writer, &columns)?;
            writer.push_str("(");
            for (i, (_, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    writer.push_str(",");
                }
                writer.push_param(value.clone());
            }
            writer.push_str(")");
        }
        // Rectangular grid: absent or unset entries become NULL.
        InsertRows::Many(rows) => {
            if rows.is_empty() {
                return Err(DbError::validation("insert has no rows"));
            }
            let columns = column_union(rows);
            if columns.is_empty() {
                return Err(DbError::validation("insert rows have no columns"));
            }
            push_column_list(&mut writer, &columns)?;
            for (r, row) in rows.iter().enumerate() {
                if r > 0 {
                    writer.push_str(",");
                }
                writer.push_str("(");
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        writer.push_str(",");
                    }
                    writer.push_param(row.get(column).cloned().unwrap_or(SqlValue::Null));
                }
                writer.push_str(")");
            }
        }
    }

    match &options.on_update {
        Some(OnUpdate::Assign(record)) if record.set_entries().next().is_some() => {
            writer.push_str(" ON DUPLICATE KEY UPDATE ");
            writer.push_assignments(record)?;
        }
        Some(OnUpdate::Columns(columns)) if !columns.is_empty() => {
            writer.push_str(" ON DUPLICATE KEY UPDATE ");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    writer.push_str(",");
                }
                let quoted = quote_ident(column)?;
                writer.push_str(&format!("{quoted}= VALUES({quoted})"));
            }
        }
        _ => {}
    }

    writer.push_end(options.end.as_deref())?;
    writer.finish()
}

fn build_update(table: &str, options: &UpdateOptions) -> DbResult<(String, Vec<SqlValue>)> {
    let table = require_table(table)?;
    let mut writer = SqlWriter::new(format!("UPDATE {} SET ", table), &options.params);

    let mut assignments = writer.push_assignments(&options.update)?;
    for fragment in &options.literal_update {
        if fragment.trim().is_empty() {
            continue;
        }
        if assignments > 0 {
            writer.push_str(", ");
        }
        writer.push_literal(fragment)?;
        assignments += 1;
    }
    if assignments == 0 {
        return Err(DbError::validation(
            "update has no assignments: set `update` or `literalUpdate`",
        ));
    }

    writer.push_filter(&options.filter)?;
    writer.push_end(options.end.as_deref())?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_of(statement: Statement) -> (String, Vec<SqlValue>) {
        statement.build().unwrap().into_parts()
    }

    #[test]
    fn test_select_star_with_where() {
        let (sql, params) = sql_of(Statement::select(
            "person",
            SelectOptions::new().where_eq("id", 100),
        ));
        assert_eq!(sql, "SELECT * FROM person where (`id`= ?);");
        assert_eq!(params, vec![SqlValue::Int(100)]);
    }

    #[test]
    fn test_select_full_clause_chain() {
        let options = SelectOptions::new()
            .fields(["age", "name"])
            .where_eq("age", 1)
            .where_eq("name", "Tom")
            .literal_where("id in (?)")
            .literal_where("id > ?")
            .group_by("city")
            .having("age >= ?")
            .having("age <= ?")
            .order_by("age", Direction::Desc)
            .order_by("name", Direction::Asc)
            .limit(5, 10)
            .param(SqlValue::List(vec![100.into(), 101.into()]))
            .param(20)
            .param(10)
            .param(100);
        let (sql, params) = sql_of(Statement::select("db_one.person", options));
        assert_eq!(
            sql,
            "SELECT `age`, `name` FROM db_one.person where (`age`= ?) and (`name`= ?) \
             and (id in (?, ?)) and (id > ?) group by `city` having (age >= ?) and (age <= ?) \
             order by `age` desc, `name` asc limit 5,10;"
        );
        assert_eq!(
            params,
            vec![
                SqlValue::Int(1),
                SqlValue::String("Tom".into()),
                SqlValue::Int(100),
                SqlValue::Int(101),
                SqlValue::Int(20),
                SqlValue::Int(10),
                SqlValue::Int(100),
            ]
        );
    }

    #[test]
    fn test_literal_where_only_has_no_leading_and() {
        let (sql, _) = sql_of(Statement::select(
            "t",
            SelectOptions::new().literal_where("a > 1").literal_where("b < 2"),
        ));
        assert_eq!(sql, "SELECT * FROM t where (a > 1) and (b < 2);");
    }

    #[test]
    fn test_having_requires_group() {
        let (sql, _) = sql_of(Statement::select("t", SelectOptions::new().having("x > 1")));
        assert_eq!(sql, "SELECT * FROM t;");
    }

    #[test]
    fn test_literal_fields_and_end() {
        let (sql, _) = sql_of(Statement::select(
            "person",
            SelectOptions::new()
                .fields(["city"])
                .literal_field("sum(score) as scores")
                .end("FOR UPDATE"),
        ));
        assert_eq!(
            sql,
            "SELECT `city`, sum(score) as scores FROM person FOR UPDATE;"
        );
    }

    #[test]
    fn test_order_defaults_to_desc() {
        let mut options = SelectOptions::new();
        options.query.orders.push(Order {
            column: "age".into(),
            direction: None,
        });
        let (sql, _) = sql_of(Statement::select("t", options));
        assert_eq!(sql, "SELECT * FROM t order by `age` desc;");
    }

    #[test]
    fn test_limit_defaults() {
        let mut options = SelectOptions::new();
        options.query.limit = Some(Limit::default());
        let (sql, _) = sql_of(Statement::select("t", options));
        assert_eq!(sql, "SELECT * FROM t limit 0,10;");
    }

    #[test]
    fn test_insert_single_row_skips_unset() {
        let row = Record::new()
            .set("name", "Tom")
            .set_opt("nick", None)
            .set("age", 18);
        let (sql, params) = sql_of(Statement::insert("person", InsertOptions::row(row)));
        assert_eq!(sql, "INSERT INTO person (`name`,`age`) VALUES (?,?);");
        assert_eq!(params, vec![SqlValue::from("Tom"), SqlValue::Int(18)]);
    }

    #[test]
    fn test_insert_many_rows_fill_null() {
        let rows = vec![
            Record::new().set("name", "Tom").set("age", 18),
            Record::new().set("name", "Ann"),
            Record::new().set("city", "Oslo").set_opt("age", None),
        ];
        let (sql, params) = sql_of(Statement::insert("person", InsertOptions::rows(rows)));
        assert_eq!(
            sql,
            "INSERT INTO person (`name`,`age`,`city`) VALUES (?,?,?),(?,?,?),(?,?,?);"
        );
        assert_eq!(
            params,
            vec![
                SqlValue::from("Tom"),
                SqlValue::Int(18),
                SqlValue::Null,
                SqlValue::from("Ann"),
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::from("Oslo"),
            ]
        );
    }

    #[test]
    fn test_insert_upsert_assignments() {
        let options = InsertOptions::row(Record::new().set("name", "Tom").set("age", 18))
            .on_update(Record::new().set("age", 19).set_opt("name", None));
        let (sql, params) = sql_of(Statement::insert("person", options));
        assert_eq!(
            sql,
            "INSERT INTO person (`name`,`age`) VALUES (?,?) ON DUPLICATE KEY UPDATE `age`= ?;"
        );
        assert_eq!(
            params,
            vec![SqlValue::from("Tom"), SqlValue::Int(18), SqlValue::Int(19)]
        );
    }

    #[test]
    fn test_insert_upsert_columns() {
        let options = InsertOptions::rows(vec![
            Record::new().set("id", 1).set("name", "a"),
            Record::new().set("id", 2).set("name", "b"),
        ])
        .on_update_columns(["name"]);
        let (sql, _) = sql_of(Statement::insert("person", options));
        assert_eq!(
            sql,
            "INSERT INTO person (`id`,`name`) VALUES (?,?),(?,?) \
             ON DUPLICATE KEY UPDATE `name`= VALUES(`name`);"
        );
    }

    #[test]
    fn test_insert_validation() {
        let empty_row = Statement::insert("t", InsertOptions::row(Record::new().set_opt("a", None)));
        assert!(matches!(
            empty_row.build(),
            Err(DbError::BuilderValidationFailed { .. })
        ));
        let no_rows = Statement::insert("t", InsertOptions::rows(vec![]));
        assert!(matches!(
            no_rows.build(),
            Err(DbError::BuilderValidationFailed { .. })
        ));
        let no_table = Statement::insert("  ", InsertOptions::row(Record::new().set("a", 1)));
        assert!(matches!(
            no_table.build(),
            Err(DbError::BuilderValidationFailed { .. })
        ));
    }

    #[test]
    fn test_update_param_order() {
        let options = UpdateOptions::new()
            .set("name", "Tom")
            .set("age", 18)
            .literal_update("score = score + ?")
            .literal_update("age = age + ?")
            .where_eq("id", 100)
            .where_eq("age", 20)
            .literal_where("age > ?")
            .literal_where("id > ?")
            .param(1)
            .param(2)
            .param(3)
            .param(4);
        let (sql, params) = sql_of(Statement::update("db_one.person", options));
        assert_eq!(
            sql,
            "UPDATE db_one.person SET `name`= ?,`age`= ?, score = score + ?, age = age + ? \
             where (`id`= ?) and (`age`= ?) and (age > ?) and (id > ?);"
        );
        let expected: Vec<SqlValue> = vec![
            "Tom".into(),
            18.into(),
            1.into(),
            2.into(),
            100.into(),
            20.into(),
            3.into(),
            4.into(),
        ];
        assert_eq!(params, expected);
    }

    #[test]
    fn test_update_without_assignments_fails() {
        let statement = Statement::update("t", UpdateOptions::new().where_eq("id", 1));
        assert!(matches!(
            statement.build(),
            Err(DbError::BuilderValidationFailed { .. })
        ));
    }

    #[test]
    fn test_raw_is_verbatim() {
        let statement = Statement::raw("select * from t where a > ?", vec![SqlValue::Int(3)]);
        let built = statement.build().unwrap();
        assert_eq!(built.sql(), "select * from t where a > ?");
        assert_eq!(built.params(), &[SqlValue::Int(3)]);
    }

    #[test]
    fn test_query_appends_clauses() {
        let statement = Statement::query(
            "select count(*) as n from person;",
            QueryOptions::new().where_eq("city", "Oslo").limit(0, 1),
        );
        let (sql, params) = sql_of(statement);
        assert_eq!(
            sql,
            "select count(*) as n from person where (`city`= ?) limit 0,1;"
        );
        assert_eq!(params, vec![SqlValue::from("Oslo")]);
    }

    #[test]
    fn test_query_binds_caller_placeholders_first() {
        let statement = Statement::query(
            "select * from person where age > ?",
            QueryOptions::new().param(10).limit(0, 5),
        );
        let (sql, params) = sql_of(statement);
        assert_eq!(sql, "select * from person where age > ? limit 0,5;");
        assert_eq!(params, vec![SqlValue::Int(10)]);

        let statement = Statement::query(
            "select * from (select * from person where name <> '?' and id in (?)) p",
            QueryOptions::new()
                .where_eq("city", "Oslo")
                .literal_where("age < ?")
                .param(SqlValue::List(vec![1.into(), 2.into()]))
                .param(30),
        );
        let (sql, params) = sql_of(statement);
        assert_eq!(
            sql,
            "select * from (select * from person where name <> '?' and id in (?, ?)) p \
             where (`city`= ?) and (age < ?);"
        );
        assert_eq!(
            params,
            vec![
                SqlValue::Int(1),
                SqlValue::Int(2),
                SqlValue::from("Oslo"),
                SqlValue::Int(30),
            ]
        );
    }

    #[test]
    fn test_query_caller_placeholder_without_param() {
        let err = Statement::query("select * from t where id = ?", QueryOptions::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, DbError::BuilderValidationFailed { .. }));
    }

    #[test]
    fn test_statement_kind() {
        assert_eq!(Statement::raw("select 1", vec![]).kind(), StatementKind::Raw);
        assert_eq!(
            Statement::update("t", UpdateOptions::new()).kind().to_string(),
            "update"
        );
    }

    #[test]
    fn test_build_is_pure() {
        let statement = Statement::select(
            "t",
            SelectOptions::new()
                .where_eq("a", 1)
                .literal_where("b in (?)")
                .param(SqlValue::List(vec![1.into(), 2.into()])),
        );
        assert_eq!(statement.build().unwrap(), statement.build().unwrap());
    }
}
