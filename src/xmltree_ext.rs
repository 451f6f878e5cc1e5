use std::borrow::Cow;
use std::io::Write;

use xml::common::XmlVersion;
use xml::writer::EventWriter;
use xml::writer::XmlEvent as XmlWEvent;
use xml::EmitterConfig;
use xmltree::{Element, XMLNode};

use crate::util::MemBuffer;
use crate::DavResult;

pub(crate) trait ElementExt {
    /// Parse a request body.
    fn parse2<R: std::io::Read>(r: R) -> DavResult<Element>;
    /// Child elements, text and comments skipped.
    fn child_elems_iter<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Element> + 'a>;
    /// First child whose local name matches.
    fn child_by_name(&self, name: &str) -> Option<&Element>;
    /// Namespace URI, empty if there is none.
    fn namespace_uri(&self) -> &str;
    /// Text content, trimmed.
    fn text(&self) -> Option<Cow<str>>;
}

impl ElementExt for Element {
    fn parse2<R: std::io::Read>(r: R) -> DavResult<Element> {
        Ok(Element::parse(r)?)
    }

    fn child_elems_iter<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Element> + 'a> {
        Box::new(self.children.iter().filter_map(|n| n.as_element()))
    }

    fn child_by_name(&self, name: &str) -> Option<&Element> {
        self.child_elems_iter().find(|e| e.name == name)
    }

    fn namespace_uri(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }

    fn text(&self) -> Option<Cow<str>> {
        self.children.iter().find_map(|n| match n {
            XMLNode::Text(t) | XMLNode::CData(t) => {
                let t = t.trim();
                (!t.is_empty()).then(|| Cow::Borrowed(t))
            }
            _ => None,
        })
    }
}

/// Start an XML document with the `D` prefix bound to `DAV:` on its root.
pub(crate) fn emitter(root: &str) -> DavResult<EventWriter<MemBuffer>> {
    let mut xw = EventWriter::new_with_config(
        MemBuffer::new(),
        EmitterConfig::new().perform_indent(false),
    );
    xw.write(XmlWEvent::StartDocument {
        version: XmlVersion::Version10,
        encoding: Some("utf-8"),
        standalone: None,
    })?;
    xw.write(XmlWEvent::start_element(root).ns("D", "DAV:"))?;
    Ok(xw)
}

/// Close the root element and return the document.
pub(crate) fn finish(mut xw: EventWriter<MemBuffer>) -> DavResult<bytes::Bytes> {
    xw.write(XmlWEvent::end_element())?;
    Ok(xw.into_inner().take())
}

/// `<name>text</name>`, or `<name/>` when the text is empty.
pub(crate) fn write_elem<W: Write>(
    xw: &mut EventWriter<W>,
    name: &str,
    text: &str,
) -> DavResult<()> {
    xw.write(XmlWEvent::start_element(name))?;
    if !text.is_empty() {
        xw.write(XmlWEvent::characters(text))?;
    }
    xw.write(XmlWEvent::end_element())?;
    Ok(())
}
