//! XML to element tree.

use crate::{Element, Result, SceneError};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

pub(crate) fn parse_document(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(parse_start(&e)?);
            }
            Ok(Event::Empty(e)) => {
                let element = parse_start(&e)?;
                close(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(&t);
                    let text = unescape(&raw).map_err(|e| SceneError::InvalidScene(e.to_string()))?;
                    top.text.push_str(text.trim());
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(String::from_utf8_lossy(&c).trim());
                }
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SceneError::InvalidScene("unbalanced end tag".to_string()))?;
                close(&mut stack, &mut root, element)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SceneError::XmlError(e)),
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(SceneError::InvalidScene(format!(
            "unclosed element <{}>",
            open.tag
        )));
    }
    root.ok_or_else(|| SceneError::InvalidScene("document has no root element".to_string()))
}

fn parse_start(e: &BytesStart) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()).to_string());
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SceneError::InvalidScene(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape(&raw).map_err(|e| SceneError::InvalidScene(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn close(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_some() {
        return Err(SceneError::InvalidScene(
            "document has more than one root element".to_string(),
        ));
    } else {
        *root = Some(element);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCAN: &str = r#"
        <collision name="laser">
            <pose>0.1 0 0.2 0 0 0</pose>
            <geometry>
                <ray>
                    <scan>
                        <horizontal>
                            <samples>5</samples>
                            <min_angle>-0.5</min_angle>
                            <max_angle>0.5</max_angle>
                        </horizontal>
                    </scan>
                    <range><min>0.1</min><max>10</max></range>
                </ray>
            </geometry>
            <!-- comment is ignored -->
            <fiducial/>
        </collision>
    "#;

    #[test]
    fn test_parse_nested_document() {
        let root = parse_document(SCAN).unwrap();
        assert_eq!(root.tag, "collision");
        assert_eq!(root.attr("name"), Some("laser"));
        let ray = root.required_child("geometry").unwrap().required_child("ray").unwrap();
        let horizontal = ray
            .required_child("scan")
            .unwrap()
            .required_child("horizontal")
            .unwrap();
        assert_eq!(horizontal.required_value::<u32>("samples").unwrap(), 5);
        assert_eq!(ray.required_child("range").unwrap().children.len(), 2);
        assert!(root.child("fiducial").unwrap().text.is_empty());
    }

    #[test]
    fn test_entities_are_unescaped() {
        let root = parse_document(r#"<a note="x &amp; y">1 &lt; 2</a>"#).unwrap();
        assert_eq!(root.attr("note"), Some("x & y"));
        assert_eq!(root.text, "1 < 2");
    }

    #[test]
    fn test_rejects_malformed_documents() {
        assert!(parse_document("").is_err());
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("<a/><b/>").is_err());
    }
}
