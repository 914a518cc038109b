use std::sync::Arc;

use crate::field_index::FieldIndex;

/// One decoded data row.
///
/// Values are positional; names resolve through the shared
/// [`FieldIndex`]. An empty unenclosed field is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Option<String>>,
    index: Arc<FieldIndex>,
}

impl Row {
    pub fn new(values: Vec<Option<String>>, index: Arc<FieldIndex>) -> Self {
        Self { values, index }
    }

    /// Value at `position`.
    pub fn get(&self, position: usize) -> Option<&str> {
        self.values.get(position)?.as_deref()
    }

    /// Value of the field called `name`.
    pub fn by_name(&self, name: &str) -> Option<&str> {
        self.get(self.index.position(name)?)
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Option<String>> {
        self.values
    }

    pub fn field_index(&self) -> &FieldIndex {
        &self.index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Named values in field order. Values beyond the header are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.index
            .names()
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }
}

impl AsRef<[Option<String>]> for Row {
    fn as_ref(&self) -> &[Option<String>] {
        &self.values
    }
}

/// A row as surfaced by a reader: data, or a kept blank line.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Row(Row),
    /// An empty physical line, surfaced when blank lines are not skipped.
    Blank,
}

impl Record {
    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Record::Row(row) => Some(row),
            Record::Blank => None,
        }
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            Record::Row(row) => Some(row),
            Record::Blank => None,
        }
    }

    #[inline]
    pub fn is_blank(&self) -> bool {
        matches!(self, Record::Blank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_index::FieldMapping;

    #[test]
    fn test_named_access() {
        let index = Arc::new(FieldIndex::build(&["id", "name"], &FieldMapping::new()).unwrap());
        let row = Row::new(vec![Some("7".into()), None], index);
        assert_eq!(row.by_name("id"), Some("7"));
        assert_eq!(row.by_name("name"), None);
        assert_eq!(row.by_name("nope"), None);
        assert_eq!(
            row.iter().collect::<Vec<_>>(),
            vec![("id", Some("7")), ("name", None)]
        );

        let record = Record::Row(row.clone());
        assert_eq!(record.as_row(), Some(&row));
        assert!(Record::Blank.is_blank());
        assert_eq!(Record::Blank.into_row(), None);
    }
}
