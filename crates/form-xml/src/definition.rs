//! Raw declarations extracted from an Orbeon form definition document.
//!
//! Nothing here validates cross references: duplicate ids, dangling bind
//! references and locale selection are the schema compiler's business. This
//! layer only knows where things live in the definition tree.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::tree::{Document, Element};
use crate::XmlError;

/// Id of the data template instance inside the form model.
pub const FORM_INSTANCE_ID: &str = "fr-form-instance";
/// Id of the localized resources instance.
pub const FORM_RESOURCES_ID: &str = "fr-form-resources";
/// Id of the metadata instance.
pub const FORM_METADATA_ID: &str = "fr-form-metadata";

const RESOURCE_REF_PREFIX: &str = "$form-resources/";

/// Body elements that lay out other controls rather than hold a value.
const CONTAINER_ELEMENTS: &[&str] = &["section", "grid", "repeat"];

/// Everything the schema compiler needs from a definition document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionModel {
    /// Whether a bind section was found at all.
    pub has_bind_section: bool,
    /// Bind declarations in pre-order; `parent` indexes into this vector.
    pub binds: Vec<BindDecl>,
    /// Value-holding controls in body order.
    pub controls: Vec<ControlDecl>,
    /// Sections, grids and legacy repeats that reference a bind.
    pub containers: Vec<ContainerDecl>,
    /// Localized resource sets in document order.
    pub resources: Vec<ResourceSet>,
    /// Root element of the data template instance.
    pub template: Option<Element>,
    /// Form metadata.
    pub metadata: MetadataDecl,
}

/// Declaration of a single `xf:bind` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindDecl {
    pub id: String,
    /// Name used to match instance elements.
    pub name: String,
    /// The `ref` (or legacy `nodeset`) expression as written.
    pub reference: Option<String>,
    /// Declared `type`, e.g. `xf:date`.
    pub datatype: Option<String>,
    /// Index of the enclosing bind declaration.
    pub parent: Option<usize>,
    /// The bind element itself declares iteration semantics.
    pub repeat: bool,
}

/// Where a piece of display text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    /// Literal text written inside the label/hint/alert element.
    Inline(String),
    /// `$form-resources/<key>/<field>` reference into the resources instance.
    Resource { key: String, field: String },
    /// Any other reference, e.g. to Form Runner's own resources.
    External(String),
}

/// Declaration of a value-holding body control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDecl {
    /// Element prefix, e.g. `fr`.
    pub prefix: Option<String>,
    /// Element local name, e.g. `input` or `image-attachment`.
    pub element: String,
    /// The control element's `id` attribute.
    pub element_id: Option<String>,
    /// Referenced bind id.
    pub bind: String,
    pub appearance: Option<String>,
    pub label: Option<TextSource>,
    pub hint: Option<TextSource>,
    pub alert: Option<TextSource>,
    /// Resource key of an `xf:itemset` bound to `$form-resources/<key>/item`.
    pub itemset: Option<String>,
}

/// Declaration of a layout container referencing a bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDecl {
    pub element: String,
    pub element_id: Option<String>,
    pub bind: String,
    /// `repeat="content"`, `repeat="true"`, or a legacy `fr:repeat` element.
    pub repeat: bool,
}

/// All resources for one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSet {
    pub lang: String,
    pub entries: HashMap<String, ResourceEntry>,
}

/// Resources of one control: simple text fields plus selection items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Child element name to trimmed text; blank fields map to `None`.
    pub fields: HashMap<String, Option<String>>,
    pub items: Vec<ResourceItem>,
}

impl ResourceEntry {
    /// Text of a field; `None` for both missing and blank fields.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|value| value.as_deref())
    }

    /// Whether the field element exists at all, blank or not.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

/// One `<item>` of a selection control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceItem {
    pub label: String,
    pub value: String,
}

/// Content of the metadata instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDecl {
    pub application_name: Option<String>,
    pub form_name: Option<String>,
    /// `(lang, title)` pairs in document order.
    pub titles: Vec<(String, String)>,
}

/// Extract declarations from a parsed definition document.
pub fn parse_definition(doc: &Document) -> Result<DefinitionModel, XmlError> {
    let root = doc.root();
    let mut model = DefinitionModel::default();

    let form_model = root
        .child("head")
        .and_then(|head| head.child("model"))
        .or_else(|| root.find("model"));
    if let Some(form_model) = form_model {
        if let Some(bind_root) = form_model.child("bind") {
            model.has_bind_section = true;
            collect_binds(bind_root, None, &mut model.binds)?;
        }
        for instance in form_model.children_named("instance") {
            match instance.id() {
                Some(FORM_INSTANCE_ID) => {
                    model.template = instance.children().next().cloned();
                }
                Some(FORM_RESOURCES_ID) => {
                    if let Some(resources) = instance.child("resources") {
                        model.resources = collect_resources(resources);
                    }
                }
                Some(FORM_METADATA_ID) => {
                    if let Some(metadata) = instance.child("metadata") {
                        model.metadata = collect_metadata(metadata);
                    }
                }
                other => trace!(instance = ?other, "ignoring model instance"),
            }
        }
    }

    // Instance data and resources may hold elements named `body`, so the
    // document body is looked up as a child of the root first.
    let body = root
        .child("body")
        .or_else(|| {
            root.children()
                .filter(|child| child.local_name() != "head")
                .find_map(|child| child.find("body"))
        })
        .unwrap_or(root);
    collect_body(body, &mut model);

    debug!(
        binds = model.binds.len(),
        controls = model.controls.len(),
        containers = model.containers.len(),
        locales = model.resources.len(),
        "parsed form definition"
    );
    Ok(model)
}

fn collect_binds(
    element: &Element,
    parent: Option<usize>,
    out: &mut Vec<BindDecl>,
) -> Result<(), XmlError> {
    let reference = element
        .attr("ref")
        .or_else(|| element.attr("nodeset"))
        .map(str::to_string);
    let name = element
        .attr("name")
        .map(str::to_string)
        .or_else(|| reference.as_deref().filter(|r| is_simple_name(r)).map(str::to_string));
    let id = element.id().map(str::to_string);
    let (id, name) = match (id, name) {
        (Some(id), Some(name)) => (id, name),
        (Some(id), None) => (id.clone(), id),
        (None, Some(name)) => (format!("{name}-bind"), name),
        (None, None) => {
            return Err(XmlError::Invalid(format!(
                "bind without id or name (ref: {})",
                reference.as_deref().unwrap_or("none")
            )))
        }
    };
    let repeat = element.attr("repeat").map_or(false, declares_repeat);
    let index = out.len();
    out.push(BindDecl {
        id,
        name,
        reference,
        datatype: element.attr("type").map(str::to_string),
        parent,
        repeat,
    });
    for child in element.children_named("bind") {
        collect_binds(child, Some(index), out)?;
    }
    Ok(())
}

fn collect_body(element: &Element, model: &mut DefinitionModel) {
    for child in element.children() {
        match child.attr("bind") {
            Some(bind) if CONTAINER_ELEMENTS.contains(&child.local_name()) => {
                model.containers.push(ContainerDecl {
                    element: child.local_name().to_string(),
                    element_id: child.id().map(str::to_string),
                    bind: bind.to_string(),
                    repeat: child.local_name() == "repeat"
                        || child.attr("repeat").map_or(false, declares_repeat),
                });
                collect_body(child, model);
            }
            Some(bind) => model.controls.push(control_decl(child, bind)),
            None => collect_body(child, model),
        }
    }
}

fn control_decl(element: &Element, bind: &str) -> ControlDecl {
    let itemset = element
        .child("itemset")
        .and_then(|itemset| itemset.attr("ref"))
        .and_then(resource_ref)
        .map(|(key, _)| key);
    ControlDecl {
        prefix: element.prefix.clone(),
        element: element.local_name().to_string(),
        element_id: element.id().map(str::to_string),
        bind: bind.to_string(),
        appearance: element.attr("appearance").map(str::to_string),
        label: text_source(element, "label"),
        hint: text_source(element, "hint"),
        alert: text_source(element, "alert"),
        itemset,
    }
}

fn text_source(control: &Element, name: &str) -> Option<TextSource> {
    let element = control.child(name)?;
    match element.attr("ref") {
        Some(reference) => Some(match resource_ref(reference) {
            Some((key, field)) => TextSource::Resource { key, field },
            None => TextSource::External(reference.to_string()),
        }),
        None => element
            .trimmed_text()
            .map(|text| TextSource::Inline(text.to_string())),
    }
}

/// Split `$form-resources/<key>/<field>` into its key and field.
fn resource_ref(reference: &str) -> Option<(String, String)> {
    let rest = reference.trim().strip_prefix(RESOURCE_REF_PREFIX)?;
    let (key, field) = rest.split_once('/')?;
    if key.is_empty() || field.is_empty() {
        return None;
    }
    Some((key.to_string(), field.to_string()))
}

fn collect_resources(resources: &Element) -> Vec<ResourceSet> {
    resources
        .children_named("resource")
        .filter_map(|resource| {
            let lang = resource.lang()?;
            let entries = resource
                .children()
                .map(|entry| (entry.local_name().to_string(), resource_entry(entry)))
                .collect();
            Some(ResourceSet {
                lang: lang.to_string(),
                entries,
            })
        })
        .collect()
}

fn resource_entry(element: &Element) -> ResourceEntry {
    let mut entry = ResourceEntry::default();
    for field in element.children() {
        if field.local_name() == "item" {
            entry.items.push(ResourceItem {
                label: child_text(field, "label").unwrap_or_default(),
                value: child_text(field, "value").unwrap_or_default(),
            });
        } else {
            entry
                .fields
                .entry(field.local_name().to_string())
                .or_insert_with(|| field.trimmed_text().map(str::to_string));
        }
    }
    entry
}

fn collect_metadata(metadata: &Element) -> MetadataDecl {
    MetadataDecl {
        application_name: child_text(metadata, "application-name"),
        form_name: child_text(metadata, "form-name"),
        titles: metadata
            .children_named("title")
            .filter_map(|title| {
                Some((title.lang()?.to_string(), title.trimmed_text()?.to_string()))
            })
            .collect(),
    }
}

fn child_text(element: &Element, name: &str) -> Option<String> {
    element
        .child(name)
        .and_then(Element::trimmed_text)
        .map(str::to_string)
}

fn declares_repeat(value: &str) -> bool {
    matches!(value.trim(), "true" | "content")
}

fn is_simple_name(reference: &str) -> bool {
    !reference.is_empty()
        && reference
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
