//! Accessor names and source configuration.
//!
//! An accessor is the attribute name under which a row exposes one field.
//! Sources carry an ordered list of accessors; positional raw records are
//! mapped onto them in order.

use std::collections::{BTreeMap, HashSet};
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use trellis_core::{Result, SourceError};

use crate::value::Value;

/// An ordered, duplicate-free list of accessor names.
///
/// Cheap to clone; every row of a source shares the same list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessors(Arc<[String]>);

impl Accessors {
    /// Build an accessor list.
    ///
    /// # Errors
    ///
    /// [`SourceError::Configuration`] if a name is empty or appears twice.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.is_empty() {
                return Err(SourceError::configuration("accessor names cannot be empty"));
            }
            if !seen.insert(name.as_str()) {
                return Err(SourceError::configuration(format!(
                    "data accessors are not unique: '{name}' appears more than once"
                )));
            }
        }
        Ok(Self(names.into()))
    }

    /// Position of `name` in the list.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|accessor| accessor == name)
    }

    /// Returns `true` if `name` is one of the accessors.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}

impl Deref for Accessors {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

/// Configuration shared by list and tree sources.
///
/// # Example
///
/// ```
/// use trellis::{SourceConfig, Value};
///
/// let config = SourceConfig::new(["title", "year"])
///     .unwrap()
///     .with_missing_value(Value::from("?"));
/// assert_eq!(config.accessors().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SourceConfig {
    accessors: Accessors,
    missing_value: Value,
}

impl SourceConfig {
    /// Configuration with the given accessors and `Value::None` as the
    /// missing value.
    ///
    /// # Errors
    ///
    /// [`SourceError::Configuration`] if there are no accessors, or if any
    /// is empty or duplicated.
    pub fn new<I, S>(accessors: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let accessors = Accessors::new(accessors)?;
        if accessors.is_empty() {
            return Err(SourceError::configuration("a source needs at least one accessor"));
        }
        Ok(Self {
            accessors,
            missing_value: Value::None,
        })
    }

    /// Configuration whose accessors are derived from column headings.
    ///
    /// See [`build_accessors`].
    pub fn from_headings<S: AsRef<str>>(headings: &[S], overrides: AccessorOverrides) -> Result<Self> {
        Self::new(build_accessors(headings, overrides)?)
    }

    /// Sets the value reported for fields a raw record did not supply.
    pub fn with_missing_value(mut self, value: impl Into<Value>) -> Self {
        self.missing_value = value.into();
        self
    }

    /// The accessor list.
    pub fn accessors(&self) -> &Accessors {
        &self.accessors
    }

    /// The missing-value sentinel.
    pub fn missing_value(&self) -> &Value {
        &self.missing_value
    }
}

/// Explicit accessor names to use instead of generated ones.
#[derive(Debug, Clone, Default)]
pub enum AccessorOverrides {
    /// Generate every accessor from its heading.
    #[default]
    None,
    /// One entry per heading; `None` entries are generated.
    Positional(Vec<Option<String>>),
    /// Overrides keyed by heading text; other headings are generated.
    ByHeading(BTreeMap<String, String>),
}

type CachedRegex = OnceLock<std::result::Result<Regex, regex::Error>>;

fn compiled(slot: &'static CachedRegex, pattern: &str) -> Result<&'static Regex> {
    slot.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| SourceError::configuration(format!("invalid accessor pattern: {e}")))
}

/// Derive an accessor name from a column heading.
///
/// The heading is lower-cased, characters other than word characters and
/// spaces are dropped, and runs of spaces become a single `_`.
///
/// # Errors
///
/// [`SourceError::Configuration`] if the result is empty or starts with a
/// digit.
///
/// # Example
///
/// ```
/// use trellis::to_accessor;
///
/// assert_eq!(to_accessor("Release Year").unwrap(), "release_year");
/// assert_eq!(to_accessor("Rating (IMDb)").unwrap(), "rating_imdb");
/// assert!(to_accessor("2nd").is_err());
/// ```
pub fn to_accessor(heading: &str) -> Result<String> {
    static NON_ACCESSOR: CachedRegex = OnceLock::new();
    static WHITESPACE: CachedRegex = OnceLock::new();

    let lowered = heading.to_lowercase();
    let stripped = compiled(&NON_ACCESSOR, r"[^\w ]")?.replace_all(&lowered, "");
    let collapsed = compiled(&WHITESPACE, r"\s+")?.replace_all(stripped.trim(), " ");
    let accessor = collapsed.replace(' ', "_");

    match accessor.chars().next() {
        None => Err(SourceError::configuration(format!(
            "unable to generate an accessor from heading '{heading}'"
        ))),
        Some(first) if first.is_numeric() => Err(SourceError::configuration(
            format!("accessor generated from heading '{heading}' would start with a digit"),
        )),
        Some(_) => Ok(accessor),
    }
}

/// Build the accessor list for a set of column headings.
///
/// # Errors
///
/// [`SourceError::Configuration`] if positional overrides do not match the
/// number of headings, an accessor cannot be generated, or the resulting
/// accessors are not unique.
///
/// # Example
///
/// ```
/// use trellis::{AccessorOverrides, build_accessors};
///
/// let accessors = build_accessors(
///     &["Title", "Year"],
///     AccessorOverrides::Positional(vec![None, Some("released".into())]),
/// )
/// .unwrap();
/// assert_eq!(accessors, vec!["title", "released"]);
/// ```
pub fn build_accessors<S: AsRef<str>>(headings: &[S], overrides: AccessorOverrides) -> Result<Vec<String>> {
    let accessors = match overrides {
        AccessorOverrides::None => headings
            .iter()
            .map(|heading| to_accessor(heading.as_ref()))
            .collect::<Result<Vec<_>>>()?,
        AccessorOverrides::Positional(explicit) => {
            if explicit.len() != headings.len() {
                return Err(SourceError::configuration(format!(
                    "number of accessors ({}) must match number of headings ({})",
                    explicit.len(),
                    headings.len()
                )));
            }
            headings
                .iter()
                .zip(explicit)
                .map(|(heading, accessor)| match accessor {
                    Some(accessor) => Ok(accessor),
                    None => to_accessor(heading.as_ref()),
                })
                .collect::<Result<Vec<_>>>()?
        }
        AccessorOverrides::ByHeading(mut explicit) => headings
            .iter()
            .map(|heading| match explicit.remove(heading.as_ref()) {
                Some(accessor) => Ok(accessor),
                None => to_accessor(heading.as_ref()),
            })
            .collect::<Result<Vec<_>>>()?,
    };

    // Reuse the uniqueness check.
    Accessors::new(accessors.iter().cloned())?;
    Ok(accessors)
}
