use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single scalar produced by a row cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// One row of a table, keyed by column name in select order.
///
/// Records are built fresh for every row and handed to the consumer by
/// value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Record {
            fields: IndexMap::with_capacity(cap),
        }
    }

    /// Set a column. Re-inserting an existing column keeps its original
    /// position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, (col, val)) in self.fields.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{col}: {val}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_preserves_column_order() {
        let mut record = Record::new();
        record.insert("id", 1);
        record.insert("name", "A");
        record.insert("age", 20);
        record.insert("id", 2);

        let cols: Vec<_> = record.columns().collect();
        assert_eq!(vec!["id", "name", "age"], cols);
        assert_eq!(Some(&Value::Integer(2)), record.get("id"));
    }

    #[test]
    fn record_serializes_as_object() {
        let record: Record = [
            ("id", Value::Integer(1)),
            ("name", Value::from("A")),
            ("contact", Value::Null),
            ("score", Value::Real(1.5)),
        ]
        .into_iter()
        .collect();

        let out = serde_json::to_string(&record).unwrap();
        assert_eq!(r#"{"id":1,"name":"A","contact":null,"score":1.5}"#, out);
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Some(20.0), Value::Integer(20).as_f64());
        assert_eq!(Some(2.5), Value::Real(2.5).as_f64());
        assert_eq!(None, Value::from("20").as_f64());
        assert_eq!(None, Value::Real(2.5).as_i64());
        assert!(Value::from(None::<i64>).is_null());
    }

    #[test]
    fn display_record() {
        let record: Record = [("id", Value::Integer(3)), ("name", Value::from("C"))]
            .into_iter()
            .collect();
        assert_eq!("(id: 3, name: C)", record.to_string());
    }
}
