//! Owned element tree assembled from quick-xml events.
//!
//! The tree keeps what form processing needs and nothing more: element
//! prefixes and local names, attributes, element children in document order
//! and the concatenated character data of each element. Comments, processing
//! instructions and the relative order of text and child elements are
//! dropped.

use std::borrow::Cow;
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::trace;

use crate::XmlError;

/// A single attribute with its namespace prefix split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Namespace prefix such as `xml` in `xml:lang`.
    pub prefix: Option<String>,
    /// Local attribute name.
    pub name: String,
    /// Unescaped attribute value.
    pub value: String,
}

/// Element node of an owned XML tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Namespace prefix such as `xf` in `xf:input`.
    pub prefix: Option<String>,
    /// Local element name.
    pub name: String,
    /// Attributes in declaration order.
    pub attributes: Vec<Attribute>,
    /// Element children in document order.
    pub children: Vec<Element>,
    /// Concatenated, unescaped character data directly inside the element.
    pub text: String,
}

impl Element {
    /// Create an empty element with the given local name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            prefix: None,
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    /// Local element name without prefix.
    pub fn local_name(&self) -> &str {
        &self.name
    }

    /// Element name as written in the source, `prefix:name` when prefixed.
    pub fn qualified_name(&self) -> Cow<'_, str> {
        match &self.prefix {
            Some(prefix) => Cow::Owned(format!("{prefix}:{}", self.name)),
            None => Cow::Borrowed(&self.name),
        }
    }

    /// Value of the first attribute with the given local name, whatever its
    /// prefix.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == local)
            .map(|attr| attr.value.as_str())
    }

    /// Value of the attribute `prefix:local`.
    pub fn attr_qualified(&self, prefix: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == local && attr.prefix.as_deref() == Some(prefix))
            .map(|attr| attr.value.as_str())
    }

    /// The `xml:lang` attribute.
    pub fn lang(&self) -> Option<&str> {
        self.attr_qualified("xml", "lang")
    }

    /// The `id` attribute.
    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Raw character data, whitespace preserved.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Character data if it holds anything besides whitespace.
    pub fn value_text(&self) -> Option<&str> {
        if self.text.trim().is_empty() {
            None
        } else {
            Some(&self.text)
        }
    }

    /// Character data trimmed, `None` when blank.
    pub fn trimmed_text(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    /// True when the element has neither element children nor non-blank text.
    pub fn is_blank(&self) -> bool {
        self.children.is_empty() && self.value_text().is_none()
    }

    /// Element children in document order.
    pub fn children(&self) -> std::slice::Iter<'_, Element> {
        self.children.iter()
    }

    /// Element children with the given local name.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == local)
    }

    /// First element child with the given local name.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == local)
    }

    /// Pre-order traversal starting with `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// First element in pre-order (including `self`) with the given local name.
    pub fn find(&self, local: &str) -> Option<&Element> {
        self.descendants().find(|element| element.name == local)
    }

    /// Builder helper used by callers assembling trees by hand.
    pub fn with_attr<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.attributes.push(Attribute {
            prefix: None,
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Builder helper appending a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Builder helper setting the character data.
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = text.into();
        self
    }
}

/// Pre-order iterator over an element and its descendants.
#[derive(Debug)]
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Parsed XML document owning its root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Wrap an already assembled root element.
    pub fn from_root(root: Element) -> Self {
        Self { root }
    }

    /// The document element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Consume the document, returning its root element.
    pub fn into_root(self) -> Element {
        self.root
    }
}

impl FromStr for Document {
    type Err = XmlError;

    fn from_str(xml: &str) -> Result<Self, Self::Err> {
        parse(xml)
    }
}

/// Parse UTF-8 bytes into a [`Document`].
pub fn parse_bytes(bytes: &[u8]) -> Result<Document, XmlError> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|err| XmlError::Xml(format!("invalid UTF-8: {err}")))?;
    parse(xml)
}

/// Parse an XML string into a [`Document`].
pub fn parse(xml: &str) -> Result<Document, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(open_element(&e)?);
            }
            Ok(Event::Empty(e)) => {
                let element = open_element(&e)?;
                attach(element, &mut stack, &mut root)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Invalid("unbalanced end tag".into()))?;
                attach(element, &mut stack, &mut root)?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| syntax_error(&reader, err.to_string()))?;
                append_text(&mut stack, &text);
            }
            Ok(Event::CData(e)) => {
                let data = e.into_inner();
                append_text(&mut stack, &String::from_utf8_lossy(&data));
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(syntax_error(&reader, err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Invalid(format!(
            "unclosed element <{}>",
            open.qualified_name()
        )));
    }
    let root = root.ok_or_else(|| XmlError::Invalid("document has no root element".into()))?;
    trace!(root = %root.qualified_name(), "parsed xml document");
    Ok(Document { root })
}

fn open_element(event: &BytesStart<'_>) -> Result<Element, XmlError> {
    let name = event.name();
    let mut element = Element::new(utf8(name.local_name().as_ref())?);
    element.prefix = name
        .prefix()
        .map(|prefix| utf8(prefix.as_ref()))
        .transpose()?;
    for attr in event.attributes() {
        let attr = attr.map_err(|err| XmlError::Xml(err.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Xml(err.to_string()))?;
        element.attributes.push(Attribute {
            prefix: attr
                .key
                .prefix()
                .map(|prefix| utf8(prefix.as_ref()))
                .transpose()?,
            name: utf8(attr.key.local_name().as_ref())?,
            value: value.into_owned(),
        });
    }
    Ok(element)
}

fn attach(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::Invalid(format!(
            "second root element <{}>",
            element.qualified_name()
        )));
    }
    *root = Some(element);
    Ok(())
}

fn append_text(stack: &mut [Element], text: &str) {
    // Character data outside the root element is whitespace in well-formed input.
    if let Some(current) = stack.last_mut() {
        current.text.push_str(text);
    }
}

fn utf8(bytes: &[u8]) -> Result<String, XmlError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| XmlError::Xml(format!("invalid UTF-8 in name: {err}")))
}

fn syntax_error(reader: &Reader<&[u8]>, message: String) -> XmlError {
    XmlError::Xml(format!("at byte {}: {message}", reader.buffer_position()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_elements_and_attributes() {
        let xml = r#"<?xml version="1.0"?>
            <form xmlns:fr="http://orbeon.org/oxf/xml/form-runner" fr:data-format-version="4.0.0">
                <section>
                    <name>John &amp; Jane</name>
                    <photo filename="a.png" mediatype="image/png">/fr/a.bin</photo>
                    <empty/>
                </section>
                <notes><![CDATA[<b>raw</b>]]></notes>
            </form>"#;
        let doc = parse(xml).expect("parse document");
        let root = doc.root();
        assert_eq!(root.local_name(), "form");
        assert_eq!(root.attr("data-format-version"), Some("4.0.0"));
        assert_eq!(root.attr_qualified("fr", "data-format-version"), Some("4.0.0"));

        let section = root.child("section").expect("section");
        assert_eq!(section.children().count(), 3);
        assert_eq!(section.child("name").map(Element::text), Some("John & Jane"));
        let photo = section.child("photo").expect("photo");
        assert_eq!(photo.attr("filename"), Some("a.png"));
        assert_eq!(photo.value_text(), Some("/fr/a.bin"));
        assert!(section.child("empty").expect("empty").is_blank());
        assert!(!section.is_blank());
        assert_eq!(root.child("notes").map(Element::text), Some("<b>raw</b>"));
    }

    #[test]
    fn prefixes_are_split_from_local_names() {
        let doc: Document = r#"<xh:html xmlns:xh="x" xmlns:xf="f"><xf:input xml:lang="en" bind="b"/></xh:html>"#
            .parse()
            .expect("parse");
        let input = doc.root().child("input").expect("input");
        assert_eq!(input.prefix.as_deref(), Some("xf"));
        assert_eq!(input.qualified_name(), "xf:input");
        assert_eq!(input.lang(), Some("en"));
        assert_eq!(input.attr("bind"), Some("b"));
    }

    #[test]
    fn descendants_follow_document_order() {
        let doc = parse("<a><b><c/></b><d/></a>").expect("parse");
        let names: Vec<_> = doc.root().descendants().map(Element::local_name).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        assert_eq!(doc.root().find("d").map(Element::local_name), Some("d"));
    }

    #[test]
    fn repeated_children_keep_order() {
        let doc = parse("<r><i>1</i><x/><i>2</i><i>3</i></r>").expect("parse");
        let values: Vec<_> = doc.root().children_named("i").map(Element::text).collect();
        assert_eq!(values, ["1", "2", "3"]);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(parse("<a><b></a>"), Err(XmlError::Xml(_))));
        assert!(parse("<a>").is_err());
        assert!(matches!(parse(""), Err(XmlError::Invalid(_))));
        assert!(parse_bytes(&[0x3c, 0xff, 0x3e]).is_err());
    }

    #[test]
    fn whitespace_only_text_counts_as_blank() {
        let doc = parse("<a>\n   <b>  </b>\n</a>").expect("parse");
        let b = doc.root().child("b").expect("b");
        assert_eq!(b.text(), "  ");
        assert_eq!(b.value_text(), None);
        assert_eq!(b.trimmed_text(), None);
        assert!(b.is_blank());
    }
}
