use crate::memory::MemoryConnector;
use crate::query::USER_COLUMNS;
use crate::value::{Record, Value};

/// The five user rows used across the tests.
pub fn user_rows() -> Vec<Vec<Value>> {
    [(1, "A", 20), (2, "B", 30), (3, "C", 40), (4, "D", 50), (5, "E", 60)]
        .into_iter()
        .map(|(id, name, age)| {
            vec![
                Value::Integer(id),
                Value::from(name),
                Value::from(format!("{}@example.com", name.to_lowercase())),
                Value::Integer(age),
            ]
        })
        .collect()
}

/// Connector serving `user_rows` as the `users` table.
pub fn users_fixture() -> MemoryConnector {
    users_fixture_with(user_rows())
}

pub fn users_fixture_with(rows: Vec<Vec<Value>>) -> MemoryConnector {
    let connector = MemoryConnector::new();
    connector.insert_table("users", USER_COLUMNS, rows).unwrap();
    connector
}

/// `n` synthetic user rows with ids 1..=n.
pub fn generated_rows(n: usize) -> Vec<Vec<Value>> {
    (1..=n as i64)
        .map(|id| {
            vec![
                Value::Integer(id),
                Value::from(format!("user{id}")),
                Value::from(format!("user{id}@example.com")),
                Value::Integer(18 + id % 50),
            ]
        })
        .collect()
}

pub fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .map(|r| r.get("id").and_then(|v| v.as_i64()).unwrap())
        .collect()
}
