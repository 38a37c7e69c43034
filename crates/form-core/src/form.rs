//! Result of binding one instance document.

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::UnknownControlError;
use crate::schema::ControlIndex;
use crate::value::Value;

/// Decoded value of one control.
///
/// Controls beneath repeated binds yield one [`Bound::Repeated`] layer per
/// repeated ancestor, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Single(Value),
    Repeated(Vec<Bound>),
}

impl Bound {
    /// The value of a non-repeated control.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Bound::Single(value) => Some(value),
            Bound::Repeated(_) => None,
        }
    }

    pub fn as_repeated(&self) -> Option<&[Bound]> {
        match self {
            Bound::Repeated(items) => Some(items),
            Bound::Single(_) => None,
        }
    }

    pub fn is_repeated(&self) -> bool {
        matches!(self, Bound::Repeated(_))
    }

    /// Iteration `idx` of a repeated value.
    pub fn at(&self, idx: usize) -> Option<&Bound> {
        self.as_repeated()?.get(idx)
    }
}

impl Default for Bound {
    fn default() -> Self {
        Bound::Single(Value::Null)
    }
}

impl From<Value> for Bound {
    fn from(value: Value) -> Self {
        Bound::Single(value)
    }
}

impl Serialize for Bound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Bound::Single(value) => value.serialize(serializer),
            Bound::Repeated(items) => serializer.collect_seq(items),
        }
    }
}

/// Values of every control in the schema, addressable by normalized name.
#[derive(Debug, Clone)]
pub struct BoundForm {
    index: Arc<ControlIndex>,
    values: Vec<Bound>,
}

impl BoundForm {
    pub(crate) fn new(index: Arc<ControlIndex>, values: Vec<Bound>) -> Self {
        debug_assert_eq!(index.names.len(), values.len());
        Self { index, values }
    }

    /// Value by control name, normalized before lookup.
    pub fn get(&self, name: &str) -> Result<&Bound, UnknownControlError> {
        self.index
            .lookup_name(name)
            .map(|idx| &self.values[idx])
            .ok_or_else(|| UnknownControlError::new(name))
    }

    /// Value by raw control id, without normalization.
    pub fn get_by_id(&self, id: &str) -> Result<&Bound, UnknownControlError> {
        self.index
            .by_id
            .get(id)
            .map(|&idx| &self.values[idx])
            .ok_or_else(|| UnknownControlError::new(id))
    }

    /// Shorthand for `get(name)?.value()`.
    pub fn value(&self, name: &str) -> Result<Option<&Value>, UnknownControlError> {
        self.get(name).map(Bound::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.lookup_name(name).is_some()
    }

    /// `(normalized name, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bound)> {
        self.index
            .names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object keyed by normalized name.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl Serialize for BoundForm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
