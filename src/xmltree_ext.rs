//
// Bridge between parsed `xmltree` elements and the `xml-rs` event
// writer, used to echo client supplied fragments (lock owners) back
// into a response document.
//
use std::io::Write;

use xml::writer::{EventWriter, XmlEvent};
use xmltree::{Element, XMLNode};

use crate::DavResult;

// elements in the DAV: namespace get our "D" prefix, anything else is
// written with its plain name.
fn qualified_name(elem: &Element) -> String {
    match elem.namespace.as_deref() {
        Some("DAV:") => format!("D:{}", elem.name),
        _ => elem.name.clone(),
    }
}

pub(crate) fn emit_element<W: Write>(w: &mut EventWriter<W>, elem: &Element) -> DavResult<()> {
    let name = qualified_name(elem);
    let mut start = XmlEvent::start_element(name.as_str());
    for (key, value) in &elem.attributes {
        start = start.attr(key.as_str(), value);
    }
    w.write(start)?;
    for child in &elem.children {
        match child {
            XMLNode::Element(e) => emit_element(w, e)?,
            XMLNode::Text(t) => w.write(XmlEvent::characters(t))?,
            XMLNode::CData(t) => w.write(XmlEvent::cdata(t))?,
            _ => {}
        }
    }
    w.write(XmlEvent::end_element())?;
    Ok(())
}
