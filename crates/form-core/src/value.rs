//! Raw values handed to decoders and the decoded values they return.

use std::collections::BTreeMap;
use std::fmt;

use form_xml::Element;
use serde::ser::{self, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

/// Raw instance value of one control, before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawValue<'a> {
    /// No instance node, or a node without content.
    Absent,
    /// Character data of a text control, whitespace preserved.
    Text(&'a str),
    /// Element of a structured control such as an attachment.
    Node(&'a Element),
}

impl<'a> RawValue<'a> {
    pub fn is_absent(&self) -> bool {
        matches!(self, RawValue::Absent)
    }

    /// Text view of the value; for nodes, the element's non-blank character data.
    pub fn text(&self) -> Option<&'a str> {
        match self {
            RawValue::Absent => None,
            RawValue::Text(text) => Some(text),
            RawValue::Node(element) => element.value_text(),
        }
    }

    pub fn node(&self) -> Option<&'a Element> {
        match self {
            RawValue::Node(element) => Some(element),
            _ => None,
        }
    }
}

/// Decoded application-level value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Bool(bool),
    Integer(i64),
    Decimal(f64),
    Date(Date),
    Time(Time),
    DateTime(PrimitiveDateTime),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a map value from key/value pairs.
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Decimal(value) => Some(*value),
            Value::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Field of a map-shaped value, e.g. `uri` of an attachment.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(key)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Option<&str>> for Value {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Value::Null, Value::from)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Decimal(value)
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Value::Date(value)
    }
}

impl From<Time> for Value {
    fn from(value: Time) -> Self {
        Value::Time(value)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

pub(crate) fn parse_date(text: &str) -> Option<Date> {
    Date::parse(text.trim(), format_description!("[year]-[month]-[day]")).ok()
}

pub(crate) fn parse_time(text: &str) -> Option<Time> {
    Time::parse(
        text.trim(),
        format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .ok()
}

pub(crate) fn parse_datetime(text: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(
        text.trim(),
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
        ),
    )
    .ok()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(text) => f.write_str(text),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Decimal(value) => write!(f, "{value}"),
            Value::Date(date) => write!(f, "{date}"),
            Value::Time(clock) => write!(f, "{clock}"),
            Value::DateTime(datetime) => write!(f, "{} {}", datetime.date(), datetime.time()),
            Value::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Text(text) => serializer.serialize_str(text),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::Date(date) => {
                let text = date
                    .format(format_description!("[year]-[month]-[day]"))
                    .map_err(ser::Error::custom)?;
                serializer.serialize_str(&text)
            }
            Value::Time(clock) => {
                let text = if clock.nanosecond() == 0 {
                    clock.format(format_description!("[hour]:[minute]:[second]"))
                } else {
                    clock.format(format_description!("[hour]:[minute]:[second].[subsecond]"))
                }
                .map_err(ser::Error::custom)?;
                serializer.serialize_str(&text)
            }
            Value::DateTime(datetime) => {
                let text = if datetime.nanosecond() == 0 {
                    datetime.format(format_description!(
                        "[year]-[month]-[day]T[hour]:[minute]:[second]"
                    ))
                } else {
                    datetime.format(format_description!(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"
                    ))
                }
                .map_err(ser::Error::custom)?;
                serializer.serialize_str(&text)
            }
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn temporal_parsing() {
        assert_eq!(parse_date("2017-07-01"), Some(date!(2017 - 07 - 01)));
        assert_eq!(parse_date(" 2017-07-01\n"), Some(date!(2017 - 07 - 01)));
        assert_eq!(parse_date("07/01/2017"), None);
        assert_eq!(parse_time("13:45:00"), Some(time!(13:45:00)));
        assert_eq!(
            parse_time("13:45:00.250"),
            Time::from_hms_milli(13, 45, 0, 250).ok()
        );
        assert_eq!(
            parse_datetime("2017-07-01T08:30:00"),
            Some(datetime!(2017-07-01 08:30:00))
        );
        assert_eq!(parse_datetime("2017-07-01"), None);
    }

    #[test]
    fn raw_value_text_views() {
        let node = Element::new("photo").with_text("/fr/a.bin");
        assert_eq!(RawValue::Node(&node).text(), Some("/fr/a.bin"));
        assert_eq!(RawValue::Text("John").text(), Some("John"));
        assert!(RawValue::Absent.text().is_none());
        assert!(RawValue::Absent.is_absent());
        assert!(RawValue::Text("x").node().is_none());
    }

    #[test]
    fn serializes_to_plain_json() {
        let value = Value::map([
            ("born", Value::Date(date!(2017 - 07 - 11))),
            ("name", Value::from("John")),
            ("tags", Value::List(vec![Value::from("a"), Value::Null])),
            ("age", Value::Integer(42)),
        ]);
        let json = serde_json::to_value(&value).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "born": "2017-07-11",
                "name": "John",
                "tags": ["a", null],
                "age": 42
            })
        );
    }

    #[test]
    fn subseconds_survive_serialization() {
        let json = |value: Value| serde_json::to_value(&value).expect("serialize");
        assert_eq!(json(Value::Time(time!(13:45:00))), "13:45:00");
        assert_eq!(
            json(Value::DateTime(datetime!(2017-07-01 08:30:00))),
            "2017-07-01T08:30:00"
        );

        let clock = parse_time("13:45:00.250").expect("time");
        let text = json(Value::Time(clock));
        assert_eq!(text.as_str().and_then(parse_time), Some(clock));

        let stamp = parse_datetime("2017-07-01T08:30:00.125").expect("datetime");
        let text = json(Value::DateTime(stamp));
        assert_eq!(text.as_str().and_then(parse_datetime), Some(stamp));
    }

    #[test]
    fn map_accessors() {
        let value = Value::map([("uri", Value::from("/a")), ("value", Value::from("/a"))]);
        assert_eq!(value.get("uri").and_then(Value::as_str), Some("/a"));
        assert!(value.get("missing").is_none());
        assert!(Value::from("x").get("uri").is_none());
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(value.to_string(), "{uri: /a, value: /a}");
    }
}
