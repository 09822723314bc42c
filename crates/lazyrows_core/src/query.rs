use std::fmt;

use crate::errors::{Operation, Result, invalid_argument};
use crate::value::Value;

/// Columns of the user table every operation selects from.
pub const USER_COLUMNS: &[&str] = &["id", "name", "contact", "age"];

/// Column holding the age scalar used by the aggregations.
pub const AGE_COLUMN: &str = "age";

const MAX_IDENT_LEN: usize = 64;

fn check_ident(op: Operation, kind: &str, ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if !valid_start
        || ident.len() > MAX_IDENT_LEN
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(invalid_argument!(op, "invalid {kind} name '{ident}'"));
    }

    Ok(())
}

/// A validated table identifier.
///
/// Identifiers are spliced into the rendered SQL, so only plain ascii
/// identifiers are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef(String);

impl TableRef {
    pub fn try_new(op: Operation, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_ident(op, "table", &name)?;
        Ok(TableRef(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single-table scan with an optional limit/offset window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanQuery {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ScanQuery {
    /// Scan of the user columns of `table`.
    pub fn users(table: TableRef) -> Self {
        ScanQuery {
            table,
            columns: USER_COLUMNS.iter().map(|c| c.to_string()).collect(),
            limit: None,
            offset: None,
        }
    }

    pub fn with_columns<S: AsRef<str>>(
        table: TableRef,
        op: Operation,
        columns: &[S],
    ) -> Result<Self> {
        if columns.is_empty() {
            return Err(invalid_argument!(op, "at least one column must be selected"));
        }

        let columns = columns
            .iter()
            .map(|c| {
                let c = c.as_ref();
                check_ident(op, "column", c)?;
                Ok(c.to_string())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ScanQuery {
            table,
            columns,
            limit: None,
            offset: None,
        })
    }

    /// Bound the scan to `limit` rows starting at `offset`.
    pub fn window(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Render the scan as parameterized SQL. Limit and offset are passed
    /// through `params`.
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.columns.join(", "), // SELECT <cols>
            self.table,              // FROM <table>
        );

        match (self.limit, self.offset) {
            (Some(_), Some(_)) => sql.push_str(" LIMIT ? OFFSET ?"),
            (Some(_), None) => sql.push_str(" LIMIT ?"),
            // SQLite and MySQL both require a LIMIT alongside OFFSET. -1 is
            // unbounded for SQLite.
            (None, Some(_)) => sql.push_str(" LIMIT -1 OFFSET ?"),
            (None, None) => (),
        }

        sql
    }

    /// Parameters for the placeholders in `to_sql`, in order.
    ///
    /// Values beyond `i64::MAX` are clamped to it; a negative bound would
    /// read as "no limit" to SQLite.
    pub fn params(&self) -> Vec<Value> {
        [self.limit, self.offset]
            .into_iter()
            .flatten()
            .map(|v| Value::Integer(i64::try_from(v).unwrap_or(i64::MAX)))
            .collect()
    }
}
