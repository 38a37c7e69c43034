//! Decoder capability, registry and the built-in decoders.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::BoxError;
use crate::value::{parse_date, parse_datetime, parse_time, RawValue, Value};

/// Built-in control type tags.
pub mod tags {
    pub const STRING: &str = "string";
    pub const DATE: &str = "date";
    pub const TIME: &str = "time";
    pub const DATETIME: &str = "datetime";
    pub const BOOLEAN: &str = "boolean";
    pub const DECIMAL: &str = "decimal";
    pub const INTEGER: &str = "integer";
    pub const SELECT: &str = "select";
    pub const SELECT1: &str = "select1";
    /// Attachment or static reference.
    pub const ANY_URI: &str = "any_uri";
    pub const IMAGE_ANNOTATION: &str = "image_annotation";
}

/// Converts the raw instance value of a control into an application value.
///
/// A decoder may be called any number of times per binding pass, possibly
/// from several threads at once, and must define its own result for
/// [`RawValue::Absent`].
pub trait Decoder: Send + Sync {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError>;
}

impl<F> Decoder for F
where
    F: Fn(RawValue<'_>) -> Result<Value, BoxError> + Send + Sync,
{
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        self(raw)
    }
}

/// Table of decoders keyed by control type tag.
///
/// Tags without a registration fall back to [`IdentityDecoder`].
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Arc<dyn Decoder>>,
    fallback: Arc<dyn Decoder>,
}

impl DecoderRegistry {
    /// Registry preloaded with the built-in decoders.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(tags::STRING, IdentityDecoder);
        registry.register(tags::DATE, DateDecoder);
        registry.register(tags::TIME, TimeDecoder);
        registry.register(tags::DATETIME, DateTimeDecoder);
        registry.register(tags::BOOLEAN, BooleanDecoder);
        registry.register(tags::DECIMAL, DecimalDecoder);
        registry.register(tags::INTEGER, IntegerDecoder);
        registry.register(tags::SELECT, SelectDecoder);
        registry.register(tags::SELECT1, IdentityDecoder);
        registry.register(tags::ANY_URI, AnyUriDecoder);
        registry.register(tags::IMAGE_ANNOTATION, ImageAnnotationDecoder);
        registry
    }

    /// Registry without any registration; every tag decodes as identity.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
            fallback: Arc::new(IdentityDecoder),
        }
    }

    /// Register `decoder` for `tag`, returning the decoder it replaces.
    pub fn register<T, D>(&mut self, tag: T, decoder: D) -> Option<Arc<dyn Decoder>>
    where
        T: Into<String>,
        D: Decoder + 'static,
    {
        self.register_shared(tag, Arc::new(decoder))
    }

    /// Register an already shared decoder for `tag`.
    pub fn register_shared<T: Into<String>>(
        &mut self,
        tag: T,
        decoder: Arc<dyn Decoder>,
    ) -> Option<Arc<dyn Decoder>> {
        let tag = tag.into();
        let previous = self.decoders.insert(tag.clone(), decoder);
        if previous.is_some() {
            debug!(tag = %tag, "replaced decoder");
        }
        previous
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T, D>(mut self, tag: T, decoder: D) -> Self
    where
        T: Into<String>,
        D: Decoder + 'static,
    {
        self.register(tag, decoder);
        self
    }

    /// Remove the registration for `tag`; it then decodes as identity.
    pub fn unregister(&mut self, tag: &str) -> Option<Arc<dyn Decoder>> {
        self.decoders.remove(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Registered tags, in no particular order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    /// Decoder used for `tag`, falling back to identity.
    pub fn get(&self, tag: &str) -> &dyn Decoder {
        match self.decoders.get(tag) {
            Some(decoder) => decoder.as_ref(),
            None => {
                trace!(tag, "no decoder registered, using identity");
                self.fallback.as_ref()
            }
        }
    }

    pub fn decode(&self, tag: &str, raw: RawValue<'_>) -> Result<Value, BoxError> {
        self.get(tag).decode(raw)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.tags().collect();
        tags.sort_unstable();
        f.debug_struct("DecoderRegistry").field("tags", &tags).finish()
    }
}

/// Returns the raw text unchanged, `Null` when absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityDecoder;

impl Decoder for IdentityDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        Ok(raw.text().into())
    }
}

// The typed passthroughs keep unparseable text as-is: submissions may hold
// values a user never finished editing.

/// `xs:date` text to [`Value::Date`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DateDecoder;

impl Decoder for DateDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        Ok(typed_or_text(raw, |text| parse_date(text).map(Value::Date)))
    }
}

/// `xs:time` text to [`Value::Time`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeDecoder;

impl Decoder for TimeDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        Ok(typed_or_text(raw, |text| parse_time(text).map(Value::Time)))
    }
}

/// `xs:dateTime` text to [`Value::DateTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeDecoder;

impl Decoder for DateTimeDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        Ok(typed_or_text(raw, |text| {
            parse_datetime(text).map(Value::DateTime)
        }))
    }
}

/// `xs:boolean` lexical forms to [`Value::Bool`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanDecoder;

impl Decoder for BooleanDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        Ok(typed_or_text(raw, |text| match text.trim() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalDecoder;

impl Decoder for DecimalDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        Ok(typed_or_text(raw, |text| {
            text.trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(Value::Decimal)
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerDecoder;

impl Decoder for IntegerDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        Ok(typed_or_text(raw, |text| {
            text.trim().parse::<i64>().ok().map(Value::Integer)
        }))
    }
}

/// Space-separated selection to a list of values; absent is an empty list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectDecoder;

impl Decoder for SelectDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        let items = raw
            .text()
            .map(|text| text.split_whitespace().map(Value::from).collect())
            .unwrap_or_default();
        Ok(Value::List(items))
    }
}

/// Attachment or static reference to a map with `uri`, `value`, `filename`,
/// `mediatype` and `size`.
///
/// `uri` and `value` both carry the reference; the file attributes are only
/// available when the raw value is an element.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyUriDecoder;

impl Decoder for AnyUriDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        Ok(attachment(raw))
    }
}

/// Image annotation element to a map from child name (`image`,
/// `annotation`) to the attachment it holds. Absent is an empty map.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageAnnotationDecoder;

impl Decoder for ImageAnnotationDecoder {
    fn decode(&self, raw: RawValue<'_>) -> Result<Value, BoxError> {
        let Some(node) = raw.node() else {
            return Ok(Value::map(Vec::<(String, Value)>::new()));
        };
        Ok(Value::map(node.children().map(|child| {
            let part = if child.is_blank() {
                RawValue::Absent
            } else {
                RawValue::Node(child)
            };
            (child.local_name().to_string(), attachment(part))
        })))
    }
}

fn typed_or_text(raw: RawValue<'_>, parse: impl FnOnce(&str) -> Option<Value>) -> Value {
    match raw.text() {
        None => Value::Null,
        Some(text) => parse(text).unwrap_or_else(|| {
            trace!(text, "keeping unparseable value as text");
            Value::from(text)
        }),
    }
}

fn attachment(raw: RawValue<'_>) -> Value {
    let uri: Value = raw.text().map(str::trim).into();
    let node = raw.node();
    let attr = |name: &str| -> Value {
        node.and_then(|element| element.attr(name))
            .filter(|value| !value.trim().is_empty())
            .into()
    };
    let size = match node.and_then(|element| element.attr("size")) {
        Some(size) => match size.trim().parse::<i64>() {
            Ok(bytes) => Value::Integer(bytes),
            Err(_) => attr("size"),
        },
        None => Value::Null,
    };
    Value::map([
        ("uri", uri.clone()),
        ("value", uri),
        ("filename", attr("filename")),
        ("mediatype", attr("mediatype")),
        ("size", size),
    ])
}
