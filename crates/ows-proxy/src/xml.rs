//! A small owned XML tree for request bodies the gate has to inspect.
//!
//! WFS payloads name their elements after layers and attributes, so no fixed
//! schema fits them. The tree keeps qualified names, attributes and child
//! order as written; matching is done on local names.

use access_policy::local_name;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::GateError;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    /// Qualified name, prefix included (`wfs:Query`).
    pub name: String,
    /// Attributes in document order with unescaped values.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone)]
pub struct XmlDocument {
    pub declaration: Option<BytesDecl<'static>>,
    pub root: XmlElement,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// Namespace prefix of the element name, if it has one.
    pub fn prefix(&self) -> Option<&str> {
        self.name.rfind(':').map(|pos| &self.name[..pos])
    }

    /// Attribute value looked up by local name. Namespace declarations are
    /// never matched.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .filter(|(k, _)| k != "xmlns" && !k.starts_with("xmlns:"))
            .find(|(k, _)| local_name(k) == local)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.local_name() == local)
    }

    /// Concatenated text and CDATA content of the direct children, trimmed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out.trim().to_string()
    }
}

impl XmlDocument {
    /// Parse a complete document. DTDs and trailing content are rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self, GateError> {
        let text = std::str::from_utf8(bytes).map_err(GateError::malformed)?;
        let mut reader = Reader::from_str(text);

        let mut declaration = None;
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event().map_err(GateError::malformed)?;
            match event {
                Event::Decl(decl) => declaration = Some(decl.into_owned()),
                Event::DocType(_) => return Err(GateError::malformed("DOCTYPE is not allowed")),
                Event::Start(start) => stack.push(element_from(&start)?),
                Event::Empty(start) => {
                    let el = element_from(&start)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| GateError::malformed("unbalanced end tag"))?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(GateError::malformed)?.into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Text(text)),
                        None if text.trim().is_empty() => {}
                        None => return Err(GateError::malformed("text outside the root element")),
                    }
                }
                Event::CData(c) => {
                    let text = String::from_utf8(c.into_inner().into_owned())
                        .map_err(GateError::malformed)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::CData(text));
                    }
                }
                Event::Comment(c) => {
                    let text = std::str::from_utf8(&c).map_err(GateError::malformed)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Comment(text.to_string()));
                    }
                }
                Event::PI(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(GateError::malformed("unexpected end of document"));
        }
        let root = root.ok_or_else(|| GateError::malformed("document has no root element"))?;
        Ok(Self { declaration, root })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, GateError> {
        let mut writer = Writer::new(Vec::new());
        if let Some(decl) = &self.declaration {
            writer
                .write_event(Event::Decl(decl.clone()))
                .map_err(GateError::malformed)?;
        }
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner())
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, GateError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(GateError::malformed)?
        .to_string();
    let mut el = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(GateError::malformed)?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(GateError::malformed)?
            .to_string();
        let value = attr.unescape_value().map_err(GateError::malformed)?.into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
) -> Result<(), GateError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None if root.is_none() => *root = Some(el),
        None => return Err(GateError::malformed("more than one root element")),
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &XmlElement) -> Result<(), GateError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if el.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(GateError::malformed);
    }

    writer
        .write_event(Event::Start(start))
        .map_err(GateError::malformed)?;
    for node in &el.children {
        let event = match node {
            XmlNode::Element(child) => {
                write_element(writer, child)?;
                continue;
            }
            XmlNode::Text(t) => Event::Text(BytesText::new(t)),
            XmlNode::CData(t) => Event::CData(BytesCData::new(t.as_str())),
            XmlNode::Comment(t) => Event::Comment(BytesText::from_escaped(t.as_str())),
        };
        writer.write_event(event).map_err(GateError::malformed)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(GateError::malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GET_FEATURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs" service="WFS" version="1.1.0">
  <wfs:Query typeName="ns:roads" srsName="EPSG:3857">
    <wfs:PropertyName>name</wfs:PropertyName>
    <ogc:Filter xmlns:ogc="http://www.opengis.net/ogc"><ogc:FeatureId fid="roads.1"/></ogc:Filter>
  </wfs:Query>
</wfs:GetFeature>"#;

    #[test]
    fn parses_names_attributes_and_text() {
        let doc = XmlDocument::parse(GET_FEATURE.as_bytes()).unwrap();
        assert!(doc.declaration.is_some());
        assert_eq!(doc.root.name, "wfs:GetFeature");
        assert_eq!(doc.root.local_name(), "GetFeature");
        assert_eq!(doc.root.attribute("version"), Some("1.1.0"));
        assert_eq!(doc.root.attribute("wfs"), None);

        let query = doc.root.elements_named("Query").next().unwrap();
        assert_eq!(query.prefix(), Some("wfs"));
        assert_eq!(query.attribute("typeName"), Some("ns:roads"));
        let props: Vec<String> = query.elements_named("PropertyName").map(|p| p.text()).collect();
        assert_eq!(props, ["name"]);
        assert_eq!(query.elements().count(), 2);
    }

    #[test]
    fn serialization_preserves_structure() {
        let doc = XmlDocument::parse(GET_FEATURE.as_bytes()).unwrap();
        let bytes = doc.to_bytes().unwrap();
        let again = XmlDocument::parse(&bytes).unwrap();
        assert_eq!(again.root, doc.root);
    }

    #[test]
    fn escapes_text_and_attributes() {
        let mut root = XmlElement::new("a");
        root.attributes.push(("title".into(), "x < y & \"z\"".into()));
        root.children.push(XmlNode::Element(XmlElement::new("b").with_text("1 < 2 & 3")));
        let doc = XmlDocument {
            declaration: None,
            root,
        };
        let bytes = doc.to_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(!text.contains("1 < 2"));
        let again = XmlDocument::parse(&bytes).unwrap();
        assert_eq!(again.root.attribute("title"), Some("x < y & \"z\""));
        assert_eq!(again.root.elements().next().unwrap().text(), "1 < 2 & 3");
    }

    #[test]
    fn rejects_malformed_documents() {
        for bad in [
            "",
            "<a>",
            "<a></b>",
            "<a/><b/>",
            "text",
            "<a>&unknown;</a>",
            "<!DOCTYPE a [<!ENTITY x \"y\">]><a>&x;</a>",
        ] {
            let err = XmlDocument::parse(bad.as_bytes()).unwrap_err();
            assert!(matches!(err, GateError::MalformedRequestBody(_)), "{bad:?}");
        }
        assert!(XmlDocument::parse(&[0xff, 0xfe, b'<']).is_err());
    }

    #[test]
    fn keeps_cdata_as_text() {
        let doc = XmlDocument::parse(b"<a><![CDATA[x < y]]></a>").unwrap();
        assert_eq!(doc.root.text(), "x < y");
    }
}
