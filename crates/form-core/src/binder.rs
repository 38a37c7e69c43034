//! Binding instance documents against a compiled [`Schema`].

use std::collections::HashMap;

use form_xml::{Document, Element};
use tracing::{debug, trace};

use crate::decode::DecoderRegistry;
use crate::error::{BindError, DecodeError, FormError};
use crate::form::{Bound, BoundForm};
use crate::schema::{BindId, CompileOptions, RawShape, Schema};
use crate::value::{RawValue, Value};

/// Where the schema for a binding pass comes from.
#[derive(Debug, Clone, Copy)]
pub enum SchemaSource<'a> {
    /// A schema compiled ahead of time and reused across passes.
    Compiled(&'a Schema),
    /// A definition compiled for this pass only.
    Definition {
        document: &'a Document,
        options: &'a CompileOptions,
    },
}

impl<'a> From<&'a Schema> for SchemaSource<'a> {
    fn from(schema: &'a Schema) -> Self {
        SchemaSource::Compiled(schema)
    }
}

/// Bind an instance document, decoding every control with `decoders`.
pub fn bind(
    instance: &Document,
    schema: &Schema,
    decoders: &DecoderRegistry,
) -> Result<BoundForm, FormError> {
    Binder { schema, decoders }.run(instance.root())
}

/// Bind an instance document against either a compiled schema or a
/// definition compiled on the spot.
pub fn bind_source(
    instance: &Document,
    source: SchemaSource<'_>,
    decoders: &DecoderRegistry,
) -> Result<BoundForm, FormError> {
    match source {
        SchemaSource::Compiled(schema) => bind(instance, schema, decoders),
        SchemaSource::Definition { document, options } => {
            let schema = Schema::compile(document, options)?;
            bind(instance, &schema, decoders)
        }
    }
}

/// Decoded values keyed by control index.
type Slots = HashMap<usize, Bound>;

struct Binder<'s> {
    schema: &'s Schema,
    decoders: &'s DecoderRegistry,
}

impl<'s> Binder<'s> {
    fn run(&self, root: &Element) -> Result<BoundForm, FormError> {
        if let Some(expected) = self.schema.root_element() {
            if root.local_name() != expected {
                return Err(BindError::RootMismatch {
                    expected: expected.to_string(),
                    found: root.local_name().to_string(),
                }
                .into());
            }
        }

        let mut slots = self.visit(self.schema.root(), Some(root))?;
        let values: Vec<Bound> = (0..self.schema.controls().len())
            .map(|idx| slots.remove(&idx).unwrap_or_default())
            .collect();
        debug!(
            root = %root.local_name(),
            controls = values.len(),
            "bound instance document"
        );
        Ok(BoundForm::new(self.schema.index().clone(), values))
    }

    /// Values for every control beneath `bind`, with `element` as the bind's
    /// matched instance node (`None` when the instance has no such node).
    fn visit(&self, bind: BindId, element: Option<&Element>) -> Result<Slots, FormError> {
        let mut slots = Slots::new();
        if let Some(control) = self.schema.bind(bind).control_index() {
            slots.insert(control, Bound::Single(self.decode(control, element)?));
        }

        for &child in self.schema.bind(bind).children() {
            let name = self.schema.bind(child).name.as_str();
            let matches: Vec<&Element> = element
                .map(|element| element.children_named(name).collect())
                .unwrap_or_default();

            if self.schema.bind(child).repeated {
                trace!(bind = %self.schema.bind(child).id, iterations = matches.len(), "binding repeat");
                let iterations = matches
                    .into_iter()
                    .map(|node| self.visit(child, Some(node)))
                    .collect::<Result<Vec<_>, _>>()?;
                self.fold_iterations(child, iterations, &mut slots);
                continue;
            }

            if matches.len() > 1 {
                return Err(BindError::Cardinality {
                    bind: self.schema.bind(child).id.clone(),
                    count: matches.len(),
                }
                .into());
            }
            slots.extend(self.visit(child, matches.first().copied())?);
        }
        Ok(slots)
    }

    fn fold_iterations(&self, bind: BindId, mut iterations: Vec<Slots>, out: &mut Slots) {
        for &control in self.schema.subtree_controls(bind) {
            let items = iterations
                .iter_mut()
                .map(|slots| slots.remove(&control).unwrap_or_default())
                .collect();
            out.insert(control, Bound::Repeated(items));
        }
    }

    fn decode(&self, control: usize, element: Option<&Element>) -> Result<Value, DecodeError> {
        let control = self.schema.control_at(control);
        let raw = match (control.raw_shape(), element) {
            (RawShape::Static, _) => control.default_raw(),
            (_, None) => RawValue::Absent,
            (RawShape::Text, Some(element)) => {
                element.value_text().map_or(RawValue::Absent, RawValue::Text)
            }
            (RawShape::Node, Some(element)) if element.is_blank() => RawValue::Absent,
            (RawShape::Node, Some(element)) => RawValue::Node(element),
        };
        trace!(control = %control.id, type_tag = %control.type_tag, absent = raw.is_absent(), "decoding");
        control.decode(self.decoders, raw)
    }
}
