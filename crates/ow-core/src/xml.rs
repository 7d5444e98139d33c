//! Minimal XML element tree.
//!
//! The engine's script and turbine files are shallow documents where nearly
//! every leaf is an empty element carrying a `value` attribute. This module
//! reads such documents into an owned tree and writes them back pretty-printed
//! with an XML declaration and a `DOCTYPE` naming the root element.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::{CoreError, CoreResult};

const INDENT_WIDTH: usize = 2;

/// One XML element with attributes, optional text and child elements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    /// Comment written as the first item inside the element.
    pub comment: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Empty element carrying a single `value` attribute.
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut el = Self::new(name);
        el.set_attr("value", value);
        el
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut el = Self::new(name);
        el.text = Some(text.into());
        el
    }

    pub fn push(&mut self, child: Element) -> &mut Self {
        self.children.push(child);
        self
    }

    /// Append `<name value="..."/>`.
    pub fn push_value(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.push(Element::with_value(name, value))
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// The `value` attribute.
    pub fn value(&self) -> Option<&str> {
        self.attr("value")
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// `value` attribute of the named child, if both exist.
    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::value)
    }

    /// Like [`Element::child_value`] but failing with a message naming the
    /// element path.
    pub fn require_value(&self, name: &str) -> CoreResult<&str> {
        self.child_value(name)
            .ok_or_else(|| CoreError::MalformedXml {
                what: format!("<{}> is missing <{} value=...>", self.name, name),
            })
    }
}

/// A parsed or to-be-written document.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    /// Name given in `<!DOCTYPE ...>`, usually the root element name.
    pub doctype: Option<String>,
    pub root: Element,
}

impl XmlDocument {
    /// Document whose `DOCTYPE` names the root element.
    pub fn new(root: Element) -> Self {
        Self {
            doctype: Some(root.name.clone()),
            root,
        }
    }

    pub fn parse(text: &str) -> CoreResult<Self> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut doctype = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let el = element_from_start(&e)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::End(_) => {
                    let el = stack.pop().ok_or_else(|| CoreError::MalformedXml {
                        what: "closing tag without an open element".to_string(),
                    })?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    append_text(&mut stack, &text);
                }
                Event::CData(c) => {
                    let raw = c.into_inner();
                    append_text(&mut stack, &String::from_utf8_lossy(&raw));
                }
                Event::Comment(c) => {
                    if let Some(top) = stack.last_mut() {
                        if top.children.is_empty() && top.comment.is_none() {
                            top.comment = Some(c.unescape()?.into_owned());
                        }
                    }
                }
                Event::DocType(d) => {
                    doctype = Some(d.unescape()?.trim().to_string());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(CoreError::MalformedXml {
                what: format!("element <{}> is never closed", open.name),
            });
        }
        let root = root.ok_or_else(|| CoreError::MalformedXml {
            what: "document has no root element".to_string(),
        })?;
        Ok(Self { doctype, root })
    }

    /// Serialize with declaration, `DOCTYPE` and two-space indentation.
    pub fn to_xml_string(&self) -> CoreResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT_WIDTH);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        if let Some(doctype) = &self.doctype {
            writer.write_event(Event::DocType(BytesText::from_escaped(doctype.as_str())))?;
        }
        write_element(&mut writer, &self.root)?;

        let mut out = String::from_utf8(writer.into_inner()).map_err(|e| CoreError::MalformedXml {
            what: format!("serialized document is not UTF-8: {e}"),
        })?;
        out.push('\n');
        Ok(out)
    }
}

fn element_from_start(e: &BytesStart<'_>) -> CoreResult<Element> {
    let mut el = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> CoreResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
        return Ok(());
    }
    if root.is_some() {
        return Err(CoreError::MalformedXml {
            what: format!("second root element <{}>", el.name),
        });
    }
    *root = Some(el);
    Ok(())
}

fn append_text(stack: &mut [Element], text: &str) {
    if let Some(top) = stack.last_mut() {
        match &mut top.text {
            Some(existing) => existing.push_str(text),
            None => top.text = Some(text.to_string()),
        }
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> CoreResult<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if el.children.is_empty() && el.text.is_none() && el.comment.is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if let Some(comment) = &el.comment {
        writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?;
    }
    if let Some(text) = &el.text {
        writer.write_event(Event::Text(BytesText::new(text.as_str())))?;
    }
    for child in &el.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}
