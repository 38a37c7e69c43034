//! Owned XML trees and Orbeon form definition declarations, parsed with
//! quick-xml.
//!
//! [`parse`] turns a document into an owned [`Element`] tree that can be
//! shared freely between threads; [`parse_definition`] lifts the parts of a
//! form definition that matter for data binding (binds, controls, resources,
//! data template, metadata) into plain declarations.

use thiserror::Error;

pub mod definition;
pub mod tree;

pub use definition::{
    parse_definition, BindDecl, ContainerDecl, ControlDecl, DefinitionModel, MetadataDecl,
    ResourceEntry, ResourceItem, ResourceSet, TextSource,
};
pub use tree::{parse, parse_bytes, Attribute, Descendants, Document, Element};

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml: {0}")]
    Xml(String),
    #[error("invalid document: {0}")]
    Invalid(String),
}
