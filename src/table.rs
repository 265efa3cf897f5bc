use serde::Serialize;

/// One cell of a report table. Values that could not be computed are `Missing`, never a
/// zero or NaN stand-in.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TableValue {
    Float(f64),
    Int(i64),
    Text(String),
    Bool(bool),
    Missing,
}

impl From<f64> for TableValue {
    fn from(value: f64) -> Self {
        TableValue::Float(value)
    }
}

impl From<i64> for TableValue {
    fn from(value: i64) -> Self {
        TableValue::Int(value)
    }
}

impl From<i32> for TableValue {
    fn from(value: i32) -> Self {
        TableValue::Int(value.into())
    }
}

impl From<u32> for TableValue {
    fn from(value: u32) -> Self {
        TableValue::Int(value.into())
    }
}

impl From<usize> for TableValue {
    fn from(value: usize) -> Self {
        TableValue::Int(value as i64)
    }
}

impl From<bool> for TableValue {
    fn from(value: bool) -> Self {
        TableValue::Bool(value)
    }
}

impl From<&str> for TableValue {
    fn from(value: &str) -> Self {
        TableValue::Text(value.to_string())
    }
}

impl From<String> for TableValue {
    fn from(value: String) -> Self {
        TableValue::Text(value)
    }
}

impl<T: Into<TableValue>> From<Option<T>> for TableValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(TableValue::Missing, Into::into)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<TableValue>,
}

/// Ordered named columns, the shape reporting and plotting consumers expect.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column<T: Into<TableValue>>(
        mut self,
        name: &str,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.push_column(name, values);
        self
    }

    pub fn push_column<T: Into<TableValue>>(&mut self, name: &str, values: impl IntoIterator<Item = T>) {
        self.columns.push(Column {
            name: name.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
    }

    pub fn column(&self, name: &str) -> Option<&[TableValue]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }
}

/// Results that can be flattened into a [`Table`].
pub trait TabularReport {
    fn to_table(&self) -> Table;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_values_become_missing() {
        let table = Table::new()
            .with_column("lap", [1u32, 2])
            .with_column("time", [Some(90.5), None]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("time").unwrap()[1], TableValue::Missing);
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["lap", "time"]);
    }

    #[test]
    fn test_serializes_untagged() {
        let table = Table::new().with_column("x", [TableValue::Float(1.5), TableValue::Missing]);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"columns":[{"name":"x","values":[1.5,null]}]}"#);
    }
}
