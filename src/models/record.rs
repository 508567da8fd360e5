//! Ordered column → value mappings.
//!
//! A [`Record`] keeps entries in insertion order, which is the order the
//! builder emits columns and placeholders in. An entry can be *unset*
//! (`None`): unset entries are skipped by single-row inserts, assignments and
//! equality filters, but still count toward the column union of a multi-row
//! insert.

use crate::models::SqlValue;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Option<SqlValue>)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value, replacing an existing entry in place.
    pub fn set(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.set_opt(column, Some(value.into()))
    }

    /// Set an optional column value. `None` keeps the column but leaves it unset.
    pub fn set_opt(mut self, column: impl Into<String>, value: Option<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Insert or replace an entry, keeping the position of an existing column.
    pub fn insert(&mut self, column: impl Into<String>, value: Option<SqlValue>) {
        let column = column.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Get the value of a column. Returns `None` for missing and unset columns.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.entries.iter().any(|(c, _)| c == column)
    }

    /// All columns, including unset ones.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    /// Columns with a value, in order.
    pub fn set_entries(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries
            .iter()
            .filter_map(|(c, v)| v.as_ref().map(|v| (c.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<SqlValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, Some(v.into()));
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (column, value) in self.set_entries() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of column names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
        let mut record = Record::new();
        while let Some((column, value)) = access.next_entry::<String, SqlValue>()? {
            record.insert(column, Some(value));
        }
        Ok(record)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}
