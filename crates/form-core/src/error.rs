//! Error types for schema compilation, binding and lookup.

use form_xml::XmlError;
use thiserror::Error;

/// Boxed error returned by decoders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The definition document cannot be compiled into a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The definition tree is structurally unusable.
    #[error("malformed definition: {0}")]
    Malformed(#[from] XmlError),
    /// No `xf:bind` section was found inside the form model.
    #[error("definition has no bind section")]
    MissingBindSection,
    /// Two binds share the same id.
    #[error("duplicate bind id: {0}")]
    DuplicateBindId(String),
    /// Bind declarations do not form a single tree in pre-order: the first
    /// bind must be the only root and every parent must precede its child.
    #[error("bind {bind} has invalid parent {parent:?}")]
    InvalidBindTree { bind: String, parent: Option<usize> },
    /// A control or container references a bind id that does not exist.
    #[error("{element} references unknown bind {bind}")]
    UnknownBind { element: String, bind: String },
    /// Two controls reference the same bind.
    #[error("bind {bind} is referenced by both {first} and {second}")]
    SharedBind {
        bind: String,
        first: String,
        second: String,
    },
    /// Two control ids collapse to the same normalized name.
    #[error("controls {first} and {second} both normalize to {name}")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },
}

/// The instance document does not fit the schema's bind tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    /// A non-repeated bind matched more than one instance element.
    #[error("bind {bind} is not repeated but matched {count} instance nodes")]
    Cardinality { bind: String, count: usize },
    /// The instance root element differs from the definition's data template.
    #[error("instance root element is <{found}>, expected <{expected}>")]
    RootMismatch { expected: String, found: String },
}

/// A decoder rejected the raw value of a control.
#[derive(Debug, Error)]
#[error("decoder for control {control_id} (type {type_tag}) failed: {cause}")]
pub struct DecodeError {
    pub control_id: String,
    pub type_tag: String,
    #[source]
    pub cause: BoxError,
}

/// Lookup of a control name or id that the schema does not declare.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown control: {name}")]
pub struct UnknownControlError {
    pub name: String,
}

impl UnknownControlError {
    pub(crate) fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

/// Umbrella error for the compile/bind pipeline.
#[derive(Debug, Error)]
pub enum FormError {
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    UnknownControl(#[from] UnknownControlError),
}
