//! Columns: how a table or tree widget reads a cell from a row.

use trellis_core::{Result, SourceError};

use crate::accessors::{AccessorOverrides, build_accessors, to_accessor};
use crate::node::Node;
use crate::row::Row;
use crate::value::Value;

/// Anything a column can read named attributes from.
pub trait Attributes {
    /// Value of the attribute `name`, if the item has one.
    fn attribute(&self, name: &str) -> Option<Value>;
}

impl Attributes for Row {
    fn attribute(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}

impl Attributes for Node {
    fn attribute(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}

/// A single column of a table or tree.
///
/// Only [`heading`](Column::heading) and [`value`](Column::value) are
/// required; the display methods derive from the value.
pub trait Column: Send + Sync {
    /// Heading text.
    fn heading(&self) -> &str;

    /// The cell value for `row`; `Value::None` if there is none.
    fn value(&self, row: &dyn Attributes) -> Value;

    /// Text to display for `row`. A `None` value displays `default`.
    fn text(&self, row: &dyn Attributes, default: Option<&str>) -> Option<String> {
        match self.value(row) {
            Value::None => default.map(str::to_string),
            value => Some(value.to_string()),
        }
    }

    /// Icon to display for `row`, if any.
    fn icon(&self, row: &dyn Attributes) -> Option<Value> {
        let _ = row;
        None
    }
}

/// A column that reads one accessor from each row.
///
/// A two-element [`Value::List`] is read as an `(icon, text)` pair; any
/// other value is displayed as text.
///
/// # Example
///
/// ```
/// use trellis::{AccessorColumn, Column, ListSource, SourceConfig, Value};
///
/// let source = ListSource::new(SourceConfig::new(["name", "status"]).unwrap());
/// let row = source
///     .append(vec![Value::from("build"), Value::from(vec![Value::from("ok.png"), Value::from("passing")])])
///     .unwrap();
///
/// let status = AccessorColumn::new(Some("Status"), None).unwrap();
/// assert_eq!(status.accessor(), "status");
/// assert_eq!(status.text(&row, None).as_deref(), Some("passing"));
/// assert_eq!(status.icon(&row), Some(Value::from("ok.png")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessorColumn {
    heading: Option<String>,
    accessor: String,
}

impl AccessorColumn {
    /// Create a column from a heading, an accessor, or both. Given only a
    /// heading, the accessor is generated with [`to_accessor`].
    ///
    /// # Errors
    ///
    /// [`SourceError::Configuration`] if neither is given, or the accessor
    /// cannot be generated from the heading.
    pub fn new(heading: Option<&str>, accessor: Option<&str>) -> Result<Self> {
        let accessor = match (heading, accessor) {
            (_, Some(accessor)) => accessor.to_string(),
            (Some(heading), None) => to_accessor(heading)?,
            (None, None) => {
                return Err(SourceError::configuration(
                    "cannot create a column without either a heading or an accessor",
                ));
            }
        };
        Ok(Self {
            heading: heading.map(str::to_string),
            accessor,
        })
    }

    /// The accessor this column reads.
    pub fn accessor(&self) -> &str {
        &self.accessor
    }

    /// Build columns for a table.
    ///
    /// Headings are cut at their first line break. Without explicit
    /// accessors, they are generated from the headings. Without headings,
    /// the columns have blank headings.
    ///
    /// # Errors
    ///
    /// [`SourceError::Configuration`] if neither list is given, the lists
    /// differ in length, or accessors cannot be generated or are not unique.
    pub fn columns_from_headings_and_accessors(
        headings: Option<&[&str]>,
        accessors: Option<&[&str]>,
    ) -> Result<Vec<AccessorColumn>> {
        match (headings, accessors) {
            (Some(headings), accessors) => {
                let headings: Vec<&str> = headings
                    .iter()
                    .map(|heading| heading.lines().next().unwrap_or_default())
                    .collect();
                let overrides = match accessors {
                    Some(accessors) => {
                        AccessorOverrides::Positional(accessors.iter().map(|a| Some(a.to_string())).collect())
                    }
                    None => AccessorOverrides::None,
                };
                let accessors = build_accessors(&headings, overrides)?;
                Ok(headings
                    .into_iter()
                    .zip(accessors)
                    .map(|(heading, accessor)| AccessorColumn {
                        heading: Some(heading.to_string()),
                        accessor,
                    })
                    .collect())
            }
            (None, Some(accessors)) => Ok(accessors
                .iter()
                .map(|accessor| AccessorColumn {
                    heading: None,
                    accessor: accessor.to_string(),
                })
                .collect()),
            (None, None) => Err(SourceError::configuration(
                "cannot create columns without either headings or accessors",
            )),
        }
    }
}

impl Column for AccessorColumn {
    fn heading(&self) -> &str {
        self.heading.as_deref().unwrap_or_default()
    }

    fn value(&self, row: &dyn Attributes) -> Value {
        row.attribute(&self.accessor).unwrap_or_default()
    }

    fn text(&self, row: &dyn Attributes, default: Option<&str>) -> Option<String> {
        let value = self.value(row);
        let text = match value.as_list() {
            Some([_, text]) => text,
            _ => &value,
        };
        match text {
            Value::None => default.map(str::to_string),
            text => Some(text.to_string()),
        }
    }

    fn icon(&self, row: &dyn Attributes) -> Option<Value> {
        match self.value(row).as_list() {
            Some([icon, _]) if icon.is_some() => Some(icon.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessors::SourceConfig;
    use crate::record::{RawRecord, TreeRecord};

    fn row(values: Vec<Value>) -> Row {
        Row::new(&SourceConfig::new(["name", "status"]).unwrap(), values).unwrap()
    }

    #[test]
    fn test_new_requires_heading_or_accessor() {
        let err = AccessorColumn::new(None, None).unwrap_err();
        assert!(matches!(err, SourceError::Configuration(_)));

        let column = AccessorColumn::new(Some("Release Year"), None).unwrap();
        assert_eq!(column.heading(), "Release Year");
        assert_eq!(column.accessor(), "release_year");

        let column = AccessorColumn::new(None, Some("year")).unwrap();
        assert_eq!(column.heading(), "");
        assert_eq!(column.accessor(), "year");
    }

    #[test]
    fn test_text() {
        let column = AccessorColumn::new(None, Some("name")).unwrap();
        assert_eq!(column.text(&row(vec![Value::from(7.0)]), None).as_deref(), Some("7.0"));
        assert_eq!(column.text(&row(vec![Value::None]), Some("-")).as_deref(), Some("-"));
        assert_eq!(column.text(&row(vec![Value::None]), None), None);
    }

    #[test]
    fn test_icon_text_pair() {
        let column = AccessorColumn::new(None, Some("status")).unwrap();
        let pair = row(vec![
            Value::from("job"),
            Value::from(vec![Value::from("warn.png"), Value::None]),
        ]);
        assert_eq!(column.text(&pair, Some("n/a")).as_deref(), Some("n/a"));
        assert_eq!(column.icon(&pair), Some(Value::from("warn.png")));

        let plain = row(vec![Value::from("job"), Value::from("done")]);
        assert_eq!(column.icon(&plain), None);
        assert_eq!(column.text(&plain, None).as_deref(), Some("done"));
    }

    #[test]
    fn test_missing_attribute_is_none() {
        let column = AccessorColumn::new(None, Some("owner")).unwrap();
        let item = row(vec![Value::from("job")]);
        assert!(column.value(&item).is_none());
        assert_eq!(column.text(&item, Some("nobody")).as_deref(), Some("nobody"));
    }

    #[test]
    fn test_reads_tree_nodes() {
        let config = SourceConfig::new(["name", "status"]).unwrap();
        let node = Node::new(&config, TreeRecord::leaf(RawRecord::mapping([("name", "src")]))).unwrap();
        let column = AccessorColumn::new(Some("Name"), None).unwrap();
        assert_eq!(column.text(&node, None).as_deref(), Some("src"));
    }

    #[test]
    fn test_columns_from_headings() {
        let headings = ["Title", "Year\nof release"];
        let columns = AccessorColumn::columns_from_headings_and_accessors(Some(&headings[..]), None).unwrap();
        let summary: Vec<(&str, &str)> = columns.iter().map(|c| (c.heading(), c.accessor())).collect();
        assert_eq!(summary, vec![("Title", "title"), ("Year", "year")]);
    }

    #[test]
    fn test_columns_from_headings_and_accessors() {
        let columns = AccessorColumn::columns_from_headings_and_accessors(
            Some(&["Title", "Year"][..]),
            Some(&["name", "released"][..]),
        )
        .unwrap();
        assert_eq!(columns[1].heading(), "Year");
        assert_eq!(columns[1].accessor(), "released");

        let err =
            AccessorColumn::columns_from_headings_and_accessors(Some(&["Title"][..]), Some(&["a", "b"][..]))
                .unwrap_err();
        assert!(matches!(err, SourceError::Configuration(_)));
    }

    #[test]
    fn test_columns_from_accessors_only() {
        let columns =
            AccessorColumn::columns_from_headings_and_accessors(None, Some(&["a", "b"][..])).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].heading(), "");
        assert!(AccessorColumn::columns_from_headings_and_accessors(None, None).is_err());
    }

    #[test]
    fn test_custom_column() {
        struct Shout;
        impl Column for Shout {
            fn heading(&self) -> &str {
                "NAME"
            }

            fn value(&self, row: &dyn Attributes) -> Value {
                match row.attribute("name") {
                    Some(Value::String(name)) => Value::from(name.to_uppercase()),
                    _ => Value::None,
                }
            }
        }

        let columns: Vec<Box<dyn Column>> = vec![
            Box::new(Shout),
            Box::new(AccessorColumn::new(None, Some("name")).unwrap()),
        ];
        let item = row(vec![Value::from("ada")]);
        let texts: Vec<Option<String>> = columns.iter().map(|c| c.text(&item, None)).collect();
        assert_eq!(texts, vec![Some("ADA".to_string()), Some("ada".to_string())]);
        assert_eq!(columns[0].icon(&item), None);
    }
}
