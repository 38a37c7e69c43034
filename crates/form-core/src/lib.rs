//! Form schema compilation and instance binding.
//!
//! A form definition compiles once into an immutable [`Schema`]: the bind
//! tree, the catalog of value-holding controls and their localized labels.
//! Instance documents are then bound against that schema, producing a
//! [`BoundForm`] whose values were decoded by a caller-supplied
//! [`DecoderRegistry`].
//!
//! ```no_run
//! use form_core::{bind, CompileOptions, DecoderRegistry, Schema};
//!
//! # fn main() -> Result<(), form_core::FormError> {
//! let definition = form_xml::parse(&std::fs::read_to_string("form.xhtml").unwrap_or_default())?;
//! let schema = Schema::compile(&definition, &CompileOptions::new("en"))?;
//! let instance = form_xml::parse("<form/>")?;
//! let form = bind(&instance, &schema, &DecoderRegistry::new())?;
//! for (name, value) in form.iter() {
//!     println!("{name}: {value:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod binder;
mod decode;
mod error;
mod form;
mod schema;
mod value;

pub use binder::{bind, bind_source, SchemaSource};
pub use decode::{
    tags, AnyUriDecoder, BooleanDecoder, DateDecoder, DateTimeDecoder, DecimalDecoder, Decoder,
    DecoderRegistry, IdentityDecoder, ImageAnnotationDecoder, IntegerDecoder, SelectDecoder,
    TimeDecoder,
};
pub use error::{BindError, BoxError, DecodeError, FormError, SchemaError, UnknownControlError};
pub use form::{Bound, BoundForm};
pub use schema::{
    compile, normalize_name, Bind, BindId, Choice, CompileOptions, Control, ControlKind,
    FormMetadata, RawShape, Schema,
};
pub use value::{RawValue, Value};
