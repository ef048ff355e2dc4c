use std::sync::Arc;

use async_trait::async_trait;

use super::table::MemoryTable;
use crate::error::{GridError, Result};
use crate::model::Value;
use crate::source::InputTable;

/// Keyed write path into a [`MemoryTable`].
#[derive(Debug)]
pub struct MemoryInputTable {
    table: Arc<MemoryTable>,
    key_columns: Vec<String>,
    key_indexes: Vec<usize>,
}

impl MemoryInputTable {
    /// Creates an input table keyed by `key_columns`.
    pub fn new<I, S>(table: Arc<MemoryTable>, key_columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_columns: Vec<String> = key_columns.into_iter().map(Into::into).collect();
        let key_indexes = key_columns
            .iter()
            .map(|name| table.column_index(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            table,
            key_columns,
            key_indexes,
        })
    }

    /// The table this input table writes to.
    pub fn table(&self) -> &Arc<MemoryTable> {
        &self.table
    }
}

#[async_trait]
impl InputTable for MemoryInputTable {
    fn key_columns(&self) -> Vec<String> {
        self.key_columns.clone()
    }

    async fn add_rows(&self, rows: Vec<Vec<Value>>) -> Result<()> {
        self.table.upsert(&self.key_indexes, rows)
    }

    async fn delete_rows(&self, keys: Vec<Vec<Value>>) -> Result<()> {
        if let Some(bad) = keys.iter().find(|k| k.len() != self.key_indexes.len()) {
            return Err(GridError::source_failed(format!(
                "expected {} key values, got {}",
                self.key_indexes.len(),
                bad.len()
            )));
        }
        self.table.delete_keys(&self.key_indexes, &keys)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, ColumnType};
    use crate::source::TableSource;

    #[tokio::test]
    async fn test_add_and_delete_rows() {
        let table = Arc::new(
            MemoryTable::new(
                "orders",
                vec![
                    Column::new("Id", ColumnType::Int),
                    Column::new("Qty", ColumnType::Int),
                ],
                vec![vec![1i64.into(), 10i64.into()]],
            )
            .unwrap(),
        );
        let input = MemoryInputTable::new(table.clone(), ["Id"]).unwrap();

        input
            .add_rows(vec![vec![1i64.into(), 11i64.into()], vec![2i64.into(), 20i64.into()]])
            .await
            .unwrap();
        assert_eq!(table.size(), 2);
        assert_eq!(table.value(0, 1), Value::Int(11));

        input.delete_rows(vec![vec![2i64.into()]]).await.unwrap();
        assert_eq!(table.size(), 1);

        let err = input.delete_rows(vec![vec![]]).await.unwrap_err();
        assert!(matches!(err, GridError::Source(_)));
    }

    #[test]
    fn test_unknown_key_column() {
        let table = Arc::new(MemoryTable::new("t", vec![Column::new("A", ColumnType::Int)], vec![]).unwrap());
        assert!(MemoryInputTable::new(table, ["B"]).is_err());
    }
}
