//! Conversions between typed models and backend rows

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Query, Row, RowGateway, Table};

/// Serialize a model into a row. Fails if it doesn't serialize to an object.
pub fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value).context("Failed to serialize row")? {
        Value::Object(map) => Ok(map),
        other => bail!("Expected a JSON object for a row, got {}", other),
    }
}

/// Deserialize a row into a model
pub fn from_row<T: DeserializeOwned>(table: Table, row: Row) -> Result<T> {
    serde_json::from_value(Value::Object(row))
        .with_context(|| format!("Failed to decode {} row", table))
}

/// Deserialize a batch of rows
pub fn from_rows<T: DeserializeOwned>(table: Table, rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(|r| from_row(table, r)).collect()
}

/// Run a select and decode every row
pub fn select_as<T: DeserializeOwned>(gateway: &dyn RowGateway, query: &Query) -> Result<Vec<T>> {
    let rows = gateway.select(query)?;
    from_rows(query.table, rows)
}

/// Run a select expecting at most one row
pub fn select_optional<T: DeserializeOwned>(
    gateway: &dyn RowGateway,
    query: &Query,
) -> Result<Option<T>> {
    let query = query.clone().limit(1);
    let mut rows = gateway.select(&query)?;
    match rows.pop() {
        Some(row) => Ok(Some(from_row(query.table, row)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Tag, TagId};

    #[test]
    fn test_to_row_rejects_non_objects() {
        assert!(to_row(&"just a string").is_err());
        assert!(to_row(&vec![1, 2]).is_err());
    }

    #[test]
    fn test_row_round_trip_for_tag() {
        let tag = Tag {
            id: TagId::new("t1"),
            name: "urgent".to_string(),
            color: "red".to_string(),
            created_at: None,
        };
        let row = to_row(&tag).unwrap();
        assert_eq!(row["name"], "urgent");
        let back: Tag = from_row(Table::Tags, row).unwrap();
        assert_eq!(back, tag);
    }
}
