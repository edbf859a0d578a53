//! Secondary index descriptors.
//!
//! A secondary index is declared once, alongside the table's cache, as an
//! ordered list of field extractors. Each extractor turns a row into one
//! [`FieldValue`]; the values together form the row's [`IndexKey`].

use std::fmt;

use rdr_core::{HpoId, OrganizationId, RecordId, SiteId};

/// A single indexed field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

macro_rules! field_value_from_record_id {
    ($($id:ty),*) => {
        $(
            impl From<$id> for FieldValue {
                fn from(value: $id) -> Self {
                    FieldValue::Int(value.as_i64())
                }
            }
        )*
    };
}

field_value_from_record_id!(HpoId, OrganizationId, SiteId);

/// Composite key of a secondary index: one value per indexed field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey(Vec<FieldValue>);

impl IndexKey {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self(values)
    }

    /// Number of fields in the key.
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.0
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{}", single),
            values => {
                write!(f, "(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Conversion into an [`IndexKey`] for lookups.
///
/// Implemented for single values and for 2- and 3-tuples, so callers can
/// write `get_by("google_group", "hpo-site-a")` or
/// `get_by("organization_site_name", (org_id, "Main"))`.
pub trait IntoIndexKey {
    fn into_index_key(self) -> IndexKey;
}

impl IntoIndexKey for IndexKey {
    fn into_index_key(self) -> IndexKey {
        self
    }
}

macro_rules! single_field_key {
    ($($ty:ty),*) => {
        $(
            impl IntoIndexKey for $ty {
                fn into_index_key(self) -> IndexKey {
                    IndexKey(vec![self.into()])
                }
            }
        )*
    };
}

single_field_key!(FieldValue, i64, bool, &str, String, HpoId, OrganizationId, SiteId);

impl<A, B> IntoIndexKey for (A, B)
where
    A: Into<FieldValue>,
    B: Into<FieldValue>,
{
    fn into_index_key(self) -> IndexKey {
        IndexKey(vec![self.0.into(), self.1.into()])
    }
}

impl<A, B, C> IntoIndexKey for (A, B, C)
where
    A: Into<FieldValue>,
    B: Into<FieldValue>,
    C: Into<FieldValue>,
{
    fn into_index_key(self) -> IndexKey {
        IndexKey(vec![self.0.into(), self.1.into(), self.2.into()])
    }
}

/// Named extractor for one indexed field.
pub struct FieldExtractor<E> {
    pub name: &'static str,
    extract: fn(&E) -> FieldValue,
}

impl<E> FieldExtractor<E> {
    pub fn new(name: &'static str, extract: fn(&E) -> FieldValue) -> Self {
        Self { name, extract }
    }

    pub fn extract(&self, entity: &E) -> FieldValue {
        (self.extract)(entity)
    }
}

impl<E> Clone for FieldExtractor<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            extract: self.extract,
        }
    }
}

impl<E> fmt::Debug for FieldExtractor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldExtractor").field(&self.name).finish()
    }
}

/// Declaration of one secondary index over a reference table.
pub struct IndexSpec<E> {
    name: &'static str,
    fields: Vec<FieldExtractor<E>>,
}

impl<E> IndexSpec<E> {
    /// Index keyed by a single field.
    pub fn single(name: &'static str, extract: fn(&E) -> FieldValue) -> Self {
        Self {
            name,
            fields: vec![FieldExtractor::new(name, extract)],
        }
    }

    /// Index keyed by several fields, in the given order.
    pub fn composite(name: &'static str, fields: Vec<FieldExtractor<E>>) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }

    /// Key of `entity` under this index.
    pub fn key_for(&self, entity: &E) -> IndexKey {
        IndexKey(self.fields.iter().map(|field| field.extract(entity)).collect())
    }
}

impl<E> Clone for IndexSpec<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            fields: self.fields.clone(),
        }
    }
}

impl<E> fmt::Debug for IndexSpec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSpec")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}
