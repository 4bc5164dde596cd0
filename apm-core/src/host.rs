// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Host-provided request tables.
//!
//! The runtime being observed exposes request state as loosely typed
//! key-value tables. Lookups go through typed accessors so that a missing key
//! and a value of the wrong shape look the same to callers: `None`.

use std::collections::HashMap;
use std::fmt::Write;

/// Category of per-request table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Server and request variables (URI, headers, timestamps).
    Server,
    Cookie,
    /// Posted form fields.
    Post,
}

/// A dynamically typed value held in a host table.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Table(HostTable),
}

impl HostValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&HostTable> {
        match self {
            HostValue::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Str(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::Str(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Int(value)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Float(value)
    }
}

impl From<HostTable> for HostValue {
    fn from(value: HostTable) -> Self {
        HostValue::Table(value)
    }
}

/// Insertion-ordered key-value table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostTable {
    entries: Vec<(String, HostValue)>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HostValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HostValue::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(HostValue::as_int)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render the table in the nested `Array ( [key] => value )` form.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        dump_table(self, 0, &mut out);
        out
    }
}

impl<K: Into<String>, V: Into<HostValue>> FromIterator<(K, V)> for HostTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = HostTable::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

fn dump_table(table: &HostTable, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    let _ = writeln!(out, "Array");
    let _ = writeln!(out, "{pad}(");
    for (key, value) in table.iter() {
        let _ = write!(out, "{pad}    [{key}] => ");
        match value {
            HostValue::Table(inner) => {
                dump_table(inner, indent + 8, out);
                out.push('\n');
            }
            scalar => {
                write_scalar(scalar, out);
                out.push('\n');
            }
        }
    }
    let _ = writeln!(out, "{pad})");
}

fn write_scalar(value: &HostValue, out: &mut String) {
    match value {
        HostValue::Null => {}
        HostValue::Bool(true) => out.push('1'),
        HostValue::Bool(false) => {}
        HostValue::Int(i) => {
            let _ = write!(out, "{i}");
        }
        HostValue::Float(f) => {
            let _ = write!(out, "{f}");
        }
        HostValue::Str(s) => out.push_str(s),
        HostValue::Table(_) => {}
    }
}

/// Read-only access to the current request's tables.
///
/// Any table may be missing, for example when the host runs from a command
/// line and has no cookies.
pub trait RequestSource {
    fn table(&self, kind: TableKind) -> Option<&HostTable>;
}

/// Source with no tables at all, used outside of a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySource;

impl RequestSource for EmptySource {
    fn table(&self, _kind: TableKind) -> Option<&HostTable> {
        None
    }
}

/// Source backed by tables captured up front.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    tables: HashMap<TableKind, HostTable>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, kind: TableKind, table: HostTable) -> Self {
        self.tables.insert(kind, table);
        self
    }
}

impl RequestSource for StaticSource {
    fn table(&self, kind: TableKind) -> Option<&HostTable> {
        self.tables.get(&kind)
    }
}
