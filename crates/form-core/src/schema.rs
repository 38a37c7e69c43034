//! Compiled form schema: bind tree plus control catalog.
//!
//! A [`Schema`] is built once per definition document and locale and is
//! immutable afterwards. It holds no interior mutability, so one instance can
//! back any number of concurrent binding passes.

use std::collections::HashMap;
use std::sync::Arc;

use form_xml::{
    parse_definition, ControlDecl, DefinitionModel, Document, Element, ResourceSet, TextSource,
};
use tracing::{debug, trace, warn};

use crate::decode::{tags, DecoderRegistry};
use crate::error::{DecodeError, FormError, SchemaError, UnknownControlError};
use crate::value::{RawValue, Value};

/// Locale selection for labels, hints, alerts and choices.
///
/// Resources are looked up in the requested locale first, then in each
/// fallback in order. Nothing else is consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    locale: Option<String>,
    fallbacks: Vec<String>,
}

impl CompileOptions {
    pub fn new<S: Into<String>>(locale: S) -> Self {
        Self {
            locale: Some(locale.into()),
            fallbacks: Vec::new(),
        }
    }

    /// Append fallback locales, tried in order after the requested one.
    pub fn with_fallbacks<I, S>(mut self, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallbacks.extend(fallbacks.into_iter().map(Into::into));
        self
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Requested locale followed by the fallbacks.
    pub fn chain(&self) -> impl Iterator<Item = &str> {
        self.locale
            .iter()
            .chain(self.fallbacks.iter())
            .map(String::as_str)
    }
}

/// Index of a bind inside its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindId(usize);

impl BindId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Node of the bind tree.
#[derive(Debug, Clone)]
pub struct Bind {
    pub id: String,
    /// Name matched against instance element names.
    pub name: String,
    pub reference: Option<String>,
    pub datatype: Option<String>,
    /// Matching instance elements form an ordered sequence.
    pub repeated: bool,
    parent: Option<BindId>,
    children: Vec<BindId>,
    control: Option<usize>,
}

impl Bind {
    pub fn parent(&self) -> Option<BindId> {
        self.parent
    }

    pub fn children(&self) -> &[BindId] {
        &self.children
    }

    pub(crate) fn control_index(&self) -> Option<usize> {
        self.control
    }
}

/// Closed set of control kinds, derived from the body element name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Input,
    Textarea,
    Secret,
    Output,
    HtmlEditor,
    Number,
    Date,
    Time,
    DateTime,
    Boolean,
    Select1,
    Select,
    Attachment,
    ImageAttachment,
    /// Image whose reference is part of the form definition.
    StaticImage,
    ImageAnnotation,
    /// Any other element; its local name doubles as type tag.
    Other(String),
}

/// What the binder hands to a control's decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawShape {
    /// The instance element's character data.
    Text,
    /// The instance element itself.
    Node,
    /// The definition's default value; the instance is not consulted.
    Static,
}

impl ControlKind {
    pub fn from_element(local_name: &str) -> Self {
        match local_name {
            "input" => ControlKind::Input,
            "textarea" => ControlKind::Textarea,
            "secret" => ControlKind::Secret,
            "output" => ControlKind::Output,
            "tinymce" => ControlKind::HtmlEditor,
            "number" | "currency" => ControlKind::Number,
            "date" | "dropdown-date" | "fields-date" => ControlKind::Date,
            "time" => ControlKind::Time,
            "datetime" => ControlKind::DateTime,
            "yesno-input" | "checkbox-input" => ControlKind::Boolean,
            "select1" | "dropdown-select1" | "open-select1" | "autocomplete"
            | "databound-select1" => ControlKind::Select1,
            "select" | "box-select" => ControlKind::Select,
            "upload" | "attachment" => ControlKind::Attachment,
            "image-attachment" => ControlKind::ImageAttachment,
            "image" => ControlKind::StaticImage,
            "wpaint" => ControlKind::ImageAnnotation,
            other => ControlKind::Other(other.to_string()),
        }
    }

    /// Type tag before the bind datatype is taken into account.
    pub fn default_tag(&self) -> &str {
        match self {
            ControlKind::Input
            | ControlKind::Textarea
            | ControlKind::Secret
            | ControlKind::Output
            | ControlKind::HtmlEditor => tags::STRING,
            ControlKind::Number => tags::DECIMAL,
            ControlKind::Date => tags::DATE,
            ControlKind::Time => tags::TIME,
            ControlKind::DateTime => tags::DATETIME,
            ControlKind::Boolean => tags::BOOLEAN,
            ControlKind::Select1 => tags::SELECT1,
            ControlKind::Select => tags::SELECT,
            ControlKind::Attachment | ControlKind::ImageAttachment | ControlKind::StaticImage => {
                tags::ANY_URI
            }
            ControlKind::ImageAnnotation => tags::IMAGE_ANNOTATION,
            ControlKind::Other(name) => name,
        }
    }

    pub fn raw_shape(&self) -> RawShape {
        match self {
            ControlKind::Attachment | ControlKind::ImageAttachment | ControlKind::ImageAnnotation => {
                RawShape::Node
            }
            ControlKind::StaticImage => RawShape::Static,
            _ => RawShape::Text,
        }
    }
}

/// One item of a selection control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub value: String,
}

/// A value-holding control of the form.
#[derive(Debug, Clone)]
pub struct Control {
    /// Control name, taken from its bind's name.
    pub id: String,
    /// Id of the body element, e.g. `input-control`.
    pub element_id: Option<String>,
    pub normalized_name: String,
    pub kind: ControlKind,
    pub type_tag: String,
    pub label: Option<String>,
    pub hint: Option<String>,
    pub alert: Option<String>,
    pub choices: Vec<Choice>,
    /// Text of the control's node in the definition's data template, undecoded.
    pub default_raw_value: Option<String>,
    /// Template node for node-shaped controls, when it has content.
    default_node: Option<Element>,
    bind: BindId,
}

impl Control {
    pub fn bind(&self) -> BindId {
        self.bind
    }

    pub fn raw_shape(&self) -> RawShape {
        self.kind.raw_shape()
    }

    /// Raw value taken from the definition's data template.
    pub fn default_raw(&self) -> RawValue<'_> {
        match (self.raw_shape(), &self.default_node) {
            (RawShape::Node, Some(node)) => RawValue::Node(node),
            (RawShape::Node, None) => RawValue::Absent,
            _ => self
                .default_raw_value
                .as_deref()
                .map_or(RawValue::Absent, RawValue::Text),
        }
    }

    pub(crate) fn decode(
        &self,
        registry: &DecoderRegistry,
        raw: RawValue<'_>,
    ) -> Result<Value, DecodeError> {
        registry
            .decode(&self.type_tag, raw)
            .map_err(|cause| DecodeError {
                control_id: self.id.clone(),
                type_tag: self.type_tag.clone(),
                cause,
            })
    }
}

/// Identity information of the form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormMetadata {
    pub application_name: Option<String>,
    pub form_name: Option<String>,
    /// Title in the first locale of the chain that has one.
    pub title: Option<String>,
}

/// Name and id lookup tables shared between a schema and its bound forms.
#[derive(Debug)]
pub(crate) struct ControlIndex {
    pub(crate) names: Vec<String>,
    pub(crate) by_name: HashMap<String, usize>,
    pub(crate) by_id: HashMap<String, usize>,
}

impl ControlIndex {
    pub(crate) fn lookup_name(&self, name: &str) -> Option<usize> {
        self.by_name
            .get(name)
            .or_else(|| self.by_name.get(&normalize_name(name)))
            .copied()
    }
}

/// Immutable compiled form definition.
#[derive(Debug)]
pub struct Schema {
    binds: Vec<Bind>,
    bind_ids: HashMap<String, BindId>,
    controls: Vec<Control>,
    /// Controls attached to each bind's subtree, in schema order.
    subtree_controls: Vec<Vec<usize>>,
    index: Arc<ControlIndex>,
    root_element: Option<String>,
    locale: Option<String>,
    metadata: FormMetadata,
}

impl Schema {
    /// Compile a parsed definition document.
    pub fn compile(definition: &Document, options: &CompileOptions) -> Result<Self, SchemaError> {
        let model = parse_definition(definition)?;
        Self::from_model(model, options)
    }

    /// Compile already extracted definition declarations.
    pub fn from_model(model: DefinitionModel, options: &CompileOptions) -> Result<Self, SchemaError> {
        if !model.has_bind_section || model.binds.is_empty() {
            return Err(SchemaError::MissingBindSection);
        }

        let mut binds: Vec<Bind> = Vec::with_capacity(model.binds.len());
        let mut bind_ids = HashMap::with_capacity(model.binds.len());
        for decl in model.binds {
            let id = BindId(binds.len());
            if bind_ids.insert(decl.id.clone(), id).is_some() {
                return Err(SchemaError::DuplicateBindId(decl.id));
            }
            let valid = match decl.parent {
                None => id.0 == 0,
                Some(parent) => parent < id.0,
            };
            if !valid {
                return Err(SchemaError::InvalidBindTree {
                    bind: decl.id,
                    parent: decl.parent,
                });
            }
            let parent = decl.parent.map(BindId);
            if let Some(parent) = parent {
                binds[parent.0].children.push(id);
            }
            binds.push(Bind {
                id: decl.id,
                name: decl.name,
                reference: decl.reference,
                datatype: decl.datatype,
                repeated: decl.repeat,
                parent,
                children: Vec::new(),
                control: None,
            });
        }

        let locales = LocaleChain::new(&model.resources, options);
        let mut controls: Vec<Control> = Vec::with_capacity(model.controls.len());
        let mut by_name: HashMap<String, usize> = HashMap::with_capacity(model.controls.len());
        for decl in &model.controls {
            let bind_id = resolve_bind(&bind_ids, &decl.bind, || describe(decl))?;
            let bind = &binds[bind_id.0];
            if let Some(existing) = bind.control {
                return Err(SchemaError::SharedBind {
                    bind: bind.id.clone(),
                    first: controls[existing].id.clone(),
                    second: describe(decl),
                });
            }

            let id = bind.name.clone();
            let normalized_name = normalize_name(&id);
            let index = controls.len();
            if let Some(&other) = by_name.get(&normalized_name) {
                return Err(SchemaError::NameCollision {
                    name: normalized_name,
                    first: controls[other].id.clone(),
                    second: id,
                });
            }
            by_name.insert(normalized_name.clone(), index);

            let kind = ControlKind::from_element(&decl.element);
            let type_tag = refine_tag(&kind, bind.datatype.as_deref()).to_string();
            let choices_key = decl.itemset.as_deref().unwrap_or(&id);
            let default_element = model
                .template
                .as_ref()
                .and_then(|template| template_node(template, &binds, bind_id));
            let default_node = default_element
                .filter(|node| kind.raw_shape() == RawShape::Node && !node.is_blank())
                .cloned();
            let control = Control {
                element_id: decl.element_id.clone(),
                normalized_name,
                type_tag,
                label: locales.text(decl.label.as_ref()),
                hint: locales.text(decl.hint.as_ref()),
                alert: locales.text(decl.alert.as_ref()),
                choices: locales.choices(choices_key),
                default_raw_value: default_element
                    .and_then(Element::value_text)
                    .map(str::to_string),
                default_node,
                kind,
                bind: bind_id,
                id,
            };
            trace!(
                control = %control.id,
                bind = %binds[bind_id.0].id,
                type_tag = %control.type_tag,
                "compiled control"
            );
            binds[bind_id.0].control = Some(index);
            controls.push(control);
        }

        for container in &model.containers {
            let id = resolve_bind(&bind_ids, &container.bind, || {
                container
                    .element_id
                    .clone()
                    .unwrap_or_else(|| container.element.clone())
            })?;
            if !container.repeat {
                continue;
            }
            // Current layouts wrap each iteration in a single control-less
            // bind; older layouts repeat the container bind itself.
            let target = match binds[id.0].children.as_slice() {
                [iteration] if binds[iteration.0].control.is_none() => *iteration,
                _ => id,
            };
            trace!(bind = %binds[target.0].id, "marking bind as repeated");
            binds[target.0].repeated = true;
        }

        let subtree_controls = collect_subtree_controls(&binds);
        let index = Arc::new(ControlIndex {
            names: controls.iter().map(|c| c.normalized_name.clone()).collect(),
            by_id: controls
                .iter()
                .enumerate()
                .map(|(idx, c)| (c.id.clone(), idx))
                .collect(),
            by_name,
        });
        let metadata = FormMetadata {
            application_name: model.metadata.application_name,
            form_name: model.metadata.form_name,
            title: locales.pick(&model.metadata.titles),
        };

        debug!(
            binds = binds.len(),
            controls = controls.len(),
            locale = ?locales.resolved(),
            "compiled form schema"
        );
        Ok(Self {
            binds,
            bind_ids,
            controls,
            subtree_controls,
            index,
            root_element: model.template.map(|template| template.name),
            locale: locales.resolved().map(str::to_string),
            metadata,
        })
    }

    /// Root of the bind tree.
    pub fn root(&self) -> BindId {
        BindId(0)
    }

    pub fn bind(&self, id: BindId) -> &Bind {
        &self.binds[id.0]
    }

    pub fn bind_by_id(&self, id: &str) -> Option<&Bind> {
        self.bind_ids.get(id).map(|id| &self.binds[id.0])
    }

    /// All binds in definition order.
    pub fn binds(&self) -> &[Bind] {
        &self.binds
    }

    pub fn parent(&self, id: BindId) -> Option<BindId> {
        self.binds[id.0].parent
    }

    pub fn children(&self, id: BindId) -> &[BindId] {
        &self.binds[id.0].children
    }

    /// Bind names from the root's first child down to `id`.
    pub fn bind_path(&self, id: BindId) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(bind_id) = current {
            let bind = &self.binds[bind_id.0];
            if bind.parent.is_some() {
                path.push(bind.name.as_str());
            }
            current = bind.parent;
        }
        path.reverse();
        path
    }

    /// The control attached to a bind, if any.
    pub fn control_of(&self, id: BindId) -> Option<&Control> {
        self.binds[id.0].control.map(|idx| &self.controls[idx])
    }

    /// Controls attached to `id` or any bind beneath it, in body order.
    pub fn controls_of(&self, id: BindId) -> impl Iterator<Item = &Control> {
        self.subtree_controls[id.0]
            .iter()
            .map(move |&idx| &self.controls[idx])
    }

    /// Control by normalized name; un-normalized names are accepted too.
    pub fn control(&self, name: &str) -> Option<&Control> {
        self.index.lookup_name(name).map(|idx| &self.controls[idx])
    }

    /// Control by its raw id (the bind name).
    pub fn control_by_id(&self, id: &str) -> Option<&Control> {
        self.index.by_id.get(id).map(|&idx| &self.controls[idx])
    }

    /// All controls in body order.
    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Whether a control sits beneath at least one repeated bind.
    pub fn is_repeated(&self, control: &Control) -> bool {
        let mut current = Some(control.bind);
        while let Some(id) = current {
            if self.binds[id.0].repeated {
                return true;
            }
            current = self.binds[id.0].parent;
        }
        false
    }

    /// Locale the resources were resolved in, if any matched.
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn metadata(&self) -> &FormMetadata {
        &self.metadata
    }

    /// Decode a control's default raw value with the given registry.
    pub fn default_value(&self, name: &str, registry: &DecoderRegistry) -> Result<Value, FormError> {
        let control = self
            .control(name)
            .ok_or_else(|| UnknownControlError::new(name))?;
        Ok(control.decode(registry, control.default_raw())?)
    }

    pub(crate) fn root_element(&self) -> Option<&str> {
        self.root_element.as_deref()
    }

    pub(crate) fn subtree_controls(&self, id: BindId) -> &[usize] {
        &self.subtree_controls[id.0]
    }

    pub(crate) fn control_at(&self, index: usize) -> &Control {
        &self.controls[index]
    }

    pub(crate) fn index(&self) -> &Arc<ControlIndex> {
        &self.index
    }
}

/// Lookup key for a control name: `-`, `_`, `.` and whitespace removed,
/// ASCII letters lowercased.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_' | '.') && !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Compile a parsed definition document into a [`Schema`].
pub fn compile(definition: &Document, options: &CompileOptions) -> Result<Schema, SchemaError> {
    Schema::compile(definition, options)
}

fn resolve_bind(
    bind_ids: &HashMap<String, BindId>,
    bind: &str,
    element: impl FnOnce() -> String,
) -> Result<BindId, SchemaError> {
    bind_ids
        .get(bind)
        .copied()
        .ok_or_else(|| SchemaError::UnknownBind {
            element: element(),
            bind: bind.to_string(),
        })
}

fn describe(decl: &ControlDecl) -> String {
    decl.element_id
        .clone()
        .unwrap_or_else(|| format!("<{}>", decl.element))
}

fn refine_tag<'a>(kind: &'a ControlKind, datatype: Option<&str>) -> &'a str {
    if *kind != ControlKind::Input {
        return kind.default_tag();
    }
    let local = datatype
        .map(|datatype| datatype.rsplit(':').next().unwrap_or(datatype))
        .unwrap_or_default();
    match local {
        "date" => tags::DATE,
        "time" => tags::TIME,
        "dateTime" => tags::DATETIME,
        "boolean" => tags::BOOLEAN,
        "decimal" | "double" | "float" => tags::DECIMAL,
        "integer" | "int" | "long" | "short" | "nonNegativeInteger" | "positiveInteger" => {
            tags::INTEGER
        }
        _ => kind.default_tag(),
    }
}

/// Node of `bind` in the data template, taking the first match at each level.
fn template_node<'a>(template: &'a Element, binds: &[Bind], bind: BindId) -> Option<&'a Element> {
    let mut chain = Vec::new();
    let mut current = Some(bind);
    while let Some(id) = current {
        if binds[id.0].parent.is_some() {
            chain.push(id);
        }
        current = binds[id.0].parent;
    }
    chain
        .iter()
        .rev()
        .try_fold(template, |node, id| node.child(&binds[id.0].name))
}

fn collect_subtree_controls(binds: &[Bind]) -> Vec<Vec<usize>> {
    let mut subtree: Vec<Vec<usize>> = vec![Vec::new(); binds.len()];
    // Binds are stored in pre-order, so children always follow their parent.
    for idx in (0..binds.len()).rev() {
        let mut own: Vec<usize> = binds[idx].control.into_iter().collect();
        for child in &binds[idx].children {
            own.extend_from_slice(&subtree[child.0]);
        }
        own.sort_unstable();
        subtree[idx] = own;
    }
    subtree
}

/// Resource sets ordered by the locale chain.
struct LocaleChain<'a> {
    sets: Vec<&'a ResourceSet>,
}

impl<'a> LocaleChain<'a> {
    fn new(resources: &'a [ResourceSet], options: &CompileOptions) -> Self {
        let mut sets: Vec<&ResourceSet> = Vec::new();
        for locale in options.chain() {
            match resources.iter().find(|set| set.lang == locale) {
                Some(set) if !sets.iter().any(|known| known.lang == set.lang) => sets.push(set),
                Some(_) => {}
                None => debug!(locale, "no resources for locale"),
            }
        }
        if sets.is_empty() && !resources.is_empty() {
            let available: Vec<&str> = resources.iter().map(|set| set.lang.as_str()).collect();
            warn!(
                requested = ?options.chain().collect::<Vec<_>>(),
                ?available,
                "no resources match the locale chain; labels will be empty"
            );
        }
        Self { sets }
    }

    fn resolved(&self) -> Option<&str> {
        self.sets.first().map(|set| set.lang.as_str())
    }

    fn text(&self, source: Option<&TextSource>) -> Option<String> {
        match source? {
            TextSource::Inline(text) => Some(text.clone()),
            TextSource::Resource { key, field } => self
                .sets
                .iter()
                .filter_map(|set| set.entries.get(key))
                .find(|entry| entry.has_field(field))
                .and_then(|entry| entry.field(field))
                .map(str::to_string),
            TextSource::External(reference) => {
                trace!(reference = %reference, "skipping text outside the form resources");
                None
            }
        }
    }

    fn choices(&self, key: &str) -> Vec<Choice> {
        self.sets
            .iter()
            .filter_map(|set| set.entries.get(key))
            .find(|entry| !entry.items.is_empty())
            .map(|entry| {
                entry
                    .items
                    .iter()
                    .map(|item| Choice {
                        label: item.label.clone(),
                        value: item.value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn pick(&self, localized: &[(String, String)]) -> Option<String> {
        self.sets.iter().find_map(|set| {
            localized
                .iter()
                .find(|(lang, _)| *lang == set.lang)
                .map(|(_, text)| text.clone())
        })
    }
}
