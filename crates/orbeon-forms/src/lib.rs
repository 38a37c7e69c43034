#![cfg_attr(docsrs, feature(doc_cfg))]
//! High level facade that re-exports the workspace crates and wraps a
//! compiled form definition for repeated binding.
//!
//! ```rust,no_run
//! use orbeon_forms::{CompileOptions, DecoderRegistry, OrbeonError, Runner};
//!
//! # fn run() -> Result<(), OrbeonError> {
//! let runner = Runner::from_definition_file(
//!     "controls.xhtml",
//!     &CompileOptions::new("en").with_fallbacks(["fr"]),
//!     DecoderRegistry::new(),
//! )?;
//! let form = runner.bind_str("<form><input>John</input></form>")?;
//! println!("input = {:?}", form.value("input")?);
//! # Ok(())
//! # }
//! ```
//!
//! Decoders are looked up by type tag; anything the caller registers takes
//! precedence over the built-ins:
//!
//! ```rust,no_run
//! use orbeon_forms::{tags, BoxError, DecoderRegistry, RawValue, Value};
//!
//! let shout = |raw: RawValue<'_>| -> Result<Value, BoxError> {
//!     Ok(raw.text().map_or(Value::Null, |text| Value::from(text.to_uppercase())))
//! };
//! let decoders = DecoderRegistry::new().with(tags::STRING, shout);
//! # let _ = decoders;
//! ```

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

pub use form_core as form;
pub use form_xml as xml;

pub use form_core::{
    bind, bind_source, normalize_name, tags, BindError, Bound, BoundForm, BoxError,
    CompileOptions, Control, ControlKind, DecodeError, Decoder, DecoderRegistry, FormError,
    FormMetadata, RawValue, Schema, SchemaError, SchemaSource, UnknownControlError, Value,
};
pub use form_xml::{parse, Document};

/// Error type produced by the facade.
#[derive(Debug, Error)]
pub enum OrbeonError {
    /// Compiling, binding or lookup failed.
    #[error(transparent)]
    Form(#[from] FormError),
    /// Reading a document from disk failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<SchemaError> for OrbeonError {
    fn from(err: SchemaError) -> Self {
        OrbeonError::Form(err.into())
    }
}

impl From<form_xml::XmlError> for OrbeonError {
    fn from(err: form_xml::XmlError) -> Self {
        OrbeonError::Form(err.into())
    }
}

impl From<UnknownControlError> for OrbeonError {
    fn from(err: UnknownControlError) -> Self {
        OrbeonError::Form(err.into())
    }
}

/// A compiled form definition paired with the decoders used for binding.
///
/// Cloning is cheap; clones share the schema and registry, so one runner can
/// be handed to many threads.
#[derive(Debug, Clone)]
pub struct Runner {
    schema: Arc<Schema>,
    decoders: Arc<DecoderRegistry>,
}

impl Runner {
    /// Wrap an already compiled schema.
    pub fn new(schema: impl Into<Arc<Schema>>, decoders: DecoderRegistry) -> Self {
        Self {
            schema: schema.into(),
            decoders: Arc::new(decoders),
        }
    }

    /// Compile a definition document held in memory.
    pub fn from_definition(
        xml: &str,
        options: &CompileOptions,
        decoders: DecoderRegistry,
    ) -> Result<Self, OrbeonError> {
        let document = form_xml::parse(xml)?;
        let schema = Schema::compile(&document, options)?;
        info!(
            form = schema.metadata().form_name.as_deref().unwrap_or("?"),
            controls = schema.controls().len(),
            locale = schema.locale().unwrap_or("none"),
            "form definition compiled"
        );
        Ok(Self::new(schema, decoders))
    }

    /// Compile a definition document read from `path`.
    pub fn from_definition_file(
        path: impl AsRef<Path>,
        options: &CompileOptions,
        decoders: DecoderRegistry,
    ) -> Result<Self, OrbeonError> {
        let xml = read_file(path.as_ref())?;
        Self::from_definition(&xml, options, decoders)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    /// Bind a parsed instance document.
    pub fn bind(&self, instance: &Document) -> Result<BoundForm, FormError> {
        form_core::bind(instance, &self.schema, &self.decoders)
    }

    /// Parse and bind an instance document.
    pub fn bind_str(&self, instance: &str) -> Result<BoundForm, FormError> {
        let document = form_xml::parse(instance)?;
        self.bind(&document)
    }

    /// Read, parse and bind an instance document from `path`.
    pub fn bind_file(&self, path: impl AsRef<Path>) -> Result<BoundForm, OrbeonError> {
        let xml = read_file(path.as_ref())?;
        Ok(self.bind_str(&xml)?)
    }
}

/// Compile `definition` and bind `instance` in one go.
///
/// The schema is discarded afterwards; callers binding many instances of the
/// same form should keep a [`Runner`] instead.
pub fn bind_once(
    definition: &str,
    instance: &str,
    options: &CompileOptions,
    decoders: &DecoderRegistry,
) -> Result<BoundForm, FormError> {
    let definition = form_xml::parse(definition)?;
    let instance = form_xml::parse(instance)?;
    debug!("binding against a freshly compiled definition");
    form_core::bind_source(
        &instance,
        SchemaSource::Definition {
            document: &definition,
            options,
        },
        decoders,
    )
}

fn read_file(path: &Path) -> Result<String, OrbeonError> {
    std::fs::read_to_string(path).map_err(|source| OrbeonError::Io {
        path: path.display().to_string(),
        source,
    })
}
