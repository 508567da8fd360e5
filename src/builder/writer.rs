//! SQL text accumulation.
//!
//! [`SqlWriter`] appends SQL text and parameters side by side so that the
//! parameter list always matches placeholder emission order. Literal
//! fragments are copied verbatim; each `?` outside a quoted region consumes
//! the next caller-supplied parameter.

use crate::builder::options::{Filter, Limit, Order};
use crate::error::{DbError, DbResult};
use crate::models::{Record, SqlValue};

/// Back-tick quote a column identifier. Embedded back-ticks are doubled.
pub fn quote_ident(name: &str) -> DbResult<String> {
    if name.trim().is_empty() {
        return Err(DbError::validation("column name cannot be empty"));
    }
    Ok(format!("`{}`", name.replace('`', "``")))
}

pub(crate) struct SqlWriter<'a> {
    sql: String,
    params: Vec<SqlValue>,
    explicit: &'a [SqlValue],
    consumed: usize,
}

impl<'a> SqlWriter<'a> {
    pub fn new(head: impl Into<String>, explicit: &'a [SqlValue]) -> Self {
        Self {
            sql: head.into(),
            params: Vec::new(),
            explicit,
            consumed: 0,
        }
    }

    pub fn push_str(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    /// Emit one placeholder bound to `value`.
    pub fn push_param(&mut self, value: SqlValue) {
        self.sql.push('?');
        self.params.push(value);
    }

    /// Copy a trusted fragment, binding its placeholders to explicit params.
    pub fn push_literal(&mut self, fragment: &str) -> DbResult<()> {
        let mut quote: Option<char> = None;
        let mut chars = fragment.chars();
        while let Some(c) = chars.next() {
            match (quote, c) {
                (Some(_), '\\') => {
                    self.sql.push(c);
                    if let Some(escaped) = chars.next() {
                        self.sql.push(escaped);
                    }
                }
                (Some(q), c) if c == q => {
                    quote = None;
                    self.sql.push(c);
                }
                (None, '\'' | '"' | '`') => {
                    quote = Some(c);
                    self.sql.push(c);
                }
                (None, '?') => self.bind_explicit(fragment)?,
                _ => self.sql.push(c),
            }
        }
        Ok(())
    }

    fn bind_explicit(&mut self, fragment: &str) -> DbResult<()> {
        let value = self.explicit.get(self.consumed).ok_or_else(|| {
            DbError::validation(format!(
                "not enough params: placeholder #{} in '{}' has no value ({} supplied)",
                self.consumed + 1,
                fragment,
                self.explicit.len()
            ))
        })?;
        self.consumed += 1;

        match value {
            SqlValue::List(items) if items.is_empty() => Err(DbError::validation(format!(
                "empty list bound to placeholder in '{}'",
                fragment
            ))),
            SqlValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.push_param(item.clone());
                }
                Ok(())
            }
            other => {
                self.push_param(other.clone());
                Ok(())
            }
        }
    }

    /// Emit `` `col`= ? `` for each set entry, comma separated.
    /// Returns the number of assignments written.
    pub fn push_assignments(&mut self, record: &Record) -> DbResult<usize> {
        let mut written = 0;
        for (column, value) in record.set_entries() {
            if written > 0 {
                self.sql.push(',');
            }
            self.sql.push_str(&quote_ident(column)?);
            self.sql.push_str("= ");
            self.push_param(value.clone());
            written += 1;
        }
        Ok(written)
    }

    /// Emit ` where (`a`= ?) and (`b`= ?) and (literal)`.
    pub fn push_filter(&mut self, filter: &Filter) -> DbResult<()> {
        if filter.is_empty() {
            return Ok(());
        }
        self.sql.push_str(" where ");

        let mut first = true;
        for (column, value) in filter.where_eq.set_entries() {
            if !first {
                self.sql.push_str(" and ");
            }
            self.sql.push('(');
            self.sql.push_str(&quote_ident(column)?);
            self.sql.push_str("= ");
            self.push_param(value.clone());
            self.sql.push(')');
            first = false;
        }
        for fragment in &filter.literal_where {
            if !first {
                self.sql.push_str(" and ");
            }
            self.sql.push('(');
            self.push_literal(fragment)?;
            self.sql.push(')');
            first = false;
        }
        Ok(())
    }

    /// Emit ` group by `col`` and, with a group, ` having (a) and (b)`.
    pub fn push_group(&mut self, group: Option<&str>, having: &[String]) -> DbResult<()> {
        let Some(group) = group else {
            return Ok(());
        };
        self.sql.push_str(" group by ");
        self.sql.push_str(&quote_ident(group)?);
        if !having.is_empty() {
            self.sql.push_str(" having ");
            for (i, condition) in having.iter().enumerate() {
                if i > 0 {
                    self.sql.push_str(" and ");
                }
                self.sql.push('(');
                self.push_literal(condition)?;
                self.sql.push(')');
            }
        }
        Ok(())
    }

    pub fn push_orders(&mut self, orders: &[Order]) -> DbResult<()> {
        if orders.is_empty() {
            return Ok(());
        }
        self.sql.push_str(" order by ");
        for (i, order) in orders.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.sql.push_str(&quote_ident(&order.column)?);
            self.sql.push(' ');
            self.sql.push_str(order.effective_direction().as_sql());
        }
        Ok(())
    }

    /// Limit values are inlined; they are integers by construction.
    pub fn push_limit(&mut self, limit: Option<&Limit>) {
        if let Some(limit) = limit {
            self.sql.push_str(&format!(
                " limit {},{}",
                limit.effective_offset(),
                limit.effective_size()
            ));
        }
    }

    pub fn push_end(&mut self, end: Option<&str>) -> DbResult<()> {
        match end {
            Some(end) if !end.trim().is_empty() => {
                if !end.starts_with(char::is_whitespace) {
                    self.sql.push(' ');
                }
                self.push_literal(end)
            }
            _ => Ok(()),
        }
    }

    /// Trim, terminate with `;` and check every explicit param was consumed.
    pub fn finish(self) -> DbResult<(String, Vec<SqlValue>)> {
        if self.consumed != self.explicit.len() {
            return Err(DbError::validation(format!(
                "too many params: {} supplied but only {} placeholders in caller SQL and literal clauses",
                self.explicit.len(),
                self.consumed
            )));
        }
        Ok((terminate(&self.sql), self.params))
    }
}

/// Trim trailing whitespace and append `;` unless already present.
pub fn terminate(sql: &str) -> String {
    let trimmed = sql.trim();
    if trimmed.ends_with(';') {
        trimmed.to_string()
    } else {
        format!("{};", trimmed)
    }
}
