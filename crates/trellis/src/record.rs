//! Raw records and the field storage built from them.
//!
//! Application data enters a source as a [`RawRecord`]. The source maps it
//! onto its accessors and stores the result in a row or node.

use std::collections::BTreeMap;

use trellis_core::{Result, SourceError};

use crate::accessors::Accessors;
use crate::row::Row;
use crate::value::Value;

/// Application data supplied to a source.
#[derive(Debug, Clone)]
pub enum RawRecord {
    /// Named fields. Keys that are not accessors become extra attributes.
    Mapping(Vec<(String, Value)>),
    /// Positional fields, assigned to accessors in order. Surplus values
    /// are ignored.
    Sequence(Vec<Value>),
    /// A single value, assigned to the first accessor.
    Scalar(Value),
    /// An existing row, used as-is by list sources.
    Row(Row),
}

impl RawRecord {
    /// Named fields from any iterator of pairs.
    pub fn mapping<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Mapping(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Positional fields from any iterator of values.
    pub fn sequence<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Sequence(values.into_iter().map(Into::into).collect())
    }

    /// A single value for the first accessor.
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Scalar(value.into())
    }

    /// Returns `true` if an item whose attributes are read through `lookup`
    /// matches every field of this record.
    ///
    /// Mapping queries compare by name, sequence queries compare against
    /// `accessors` positionally, scalar queries compare the first accessor,
    /// and row queries compare all of the row's fields.
    pub(crate) fn matches(&self, accessors: &Accessors, lookup: impl Fn(&str) -> Option<Value>) -> bool {
        let field_eq = |name: &str, expected: &Value| lookup(name).is_some_and(|actual| actual == *expected);
        match self {
            RawRecord::Mapping(fields) => fields.iter().all(|(name, value)| field_eq(name.as_str(), value)),
            RawRecord::Sequence(values) => accessors
                .iter()
                .zip(values)
                .all(|(name, value)| field_eq(name.as_str(), value)),
            RawRecord::Scalar(value) => accessors.first().is_some_and(|name| field_eq(name.as_str(), value)),
            RawRecord::Row(row) => row
                .fields()
                .iter()
                .all(|(name, value)| field_eq(name.as_str(), value)),
        }
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for RawRecord {
    fn from(value: &str) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<Vec<Value>> for RawRecord {
    fn from(values: Vec<Value>) -> Self {
        Self::Sequence(values)
    }
}

impl From<Vec<(String, Value)>> for RawRecord {
    fn from(fields: Vec<(String, Value)>) -> Self {
        Self::Mapping(fields)
    }
}

impl From<Row> for RawRecord {
    fn from(row: Row) -> Self {
        Self::Row(row)
    }
}

/// A raw record plus its children, for building trees.
///
/// `children: None` builds a leaf that cannot hold children until something
/// is inserted under it. `Some(vec![])` builds an empty branch.
#[derive(Debug, Clone)]
pub struct TreeRecord {
    pub record: RawRecord,
    pub children: Option<Vec<TreeRecord>>,
}

impl TreeRecord {
    /// A record with no child collection.
    pub fn leaf(record: impl Into<RawRecord>) -> Self {
        Self {
            record: record.into(),
            children: None,
        }
    }

    /// A record with the given children (possibly none).
    pub fn branch(record: impl Into<RawRecord>, children: Vec<TreeRecord>) -> Self {
        Self {
            record: record.into(),
            children: Some(children),
        }
    }
}

/// Field storage shared by rows and nodes.
#[derive(Debug, Clone)]
pub(crate) struct Fields {
    accessors: Accessors,
    values: Vec<Value>,
    extras: BTreeMap<String, Value>,
}

impl Fields {
    /// Map a raw record onto `accessors`.
    ///
    /// A `RawRecord::Row` contributes a copy of the row's fields.
    pub(crate) fn from_raw(raw: RawRecord, accessors: &Accessors, missing: &Value) -> Result<Self> {
        let mut values = vec![missing.clone(); accessors.len()];
        let mut extras = BTreeMap::new();

        match raw {
            RawRecord::Mapping(fields) => {
                for (name, value) in fields {
                    match accessors.position(&name) {
                        Some(position) => values[position] = value,
                        None => {
                            extras.insert(name, value);
                        }
                    }
                }
            }
            RawRecord::Sequence(items) => {
                for (slot, value) in values.iter_mut().zip(items) {
                    *slot = value;
                }
            }
            RawRecord::Scalar(value) => match values.first_mut() {
                Some(slot) => *slot = value,
                None => {
                    return Err(SourceError::configuration(
                        "cannot build a record from a single value without accessors",
                    ));
                }
            },
            RawRecord::Row(row) => {
                return Self::from_raw(RawRecord::Mapping(row.fields_with_extras()), accessors, missing);
            }
        }

        Ok(Self {
            accessors: accessors.clone(),
            values,
            extras,
        })
    }

    pub(crate) fn accessors(&self) -> &Accessors {
        &self.accessors
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        match self.accessors.position(name) {
            Some(position) => self.values.get(position),
            None => self.extras.get(name),
        }
    }

    /// Assign an existing field, returning the previous value.
    pub(crate) fn set(&mut self, name: &str, value: Value) -> Result<Value> {
        let slot = match self.accessors.position(name) {
            Some(position) => self.values.get_mut(position),
            None => self.extras.get_mut(name),
        };
        match slot {
            Some(slot) => Ok(std::mem::replace(slot, value)),
            None => Err(SourceError::unknown_field(name)),
        }
    }

    /// Accessor fields in accessor order.
    pub(crate) fn pairs(&self) -> Vec<(String, Value)> {
        self.accessors.iter().cloned().zip(self.values.iter().cloned()).collect()
    }

    /// Extra attributes in name order.
    pub(crate) fn extras(&self) -> Vec<(String, Value)> {
        self.extras.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}
