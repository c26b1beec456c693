//! SVG parsing from XML.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::ast::*;
use crate::error::SvagError;

/// Parse an SVG string into a Document.
///
/// Attribute names are unique on every element of the result; a duplicated
/// attribute is a parse error.
pub fn parse_svg(svg: &str) -> Result<Document, SvagError> {
    let mut reader = Reader::from_str(svg);

    let mut xml_declaration = None;
    let mut doctype = None;
    // Open elements, innermost last.
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        let event = reader.read_event()?;

        if stack.is_empty() {
            match event {
                Event::Decl(decl) => {
                    xml_declaration = Some(XmlDeclaration {
                        version: String::from_utf8_lossy(decl.version()?.as_ref()).into_owned(),
                        encoding: decl
                            .encoding()
                            .transpose()
                            .ok()
                            .flatten()
                            .map(|e| String::from_utf8_lossy(e.as_ref()).into_owned()),
                        standalone: decl
                            .standalone()
                            .transpose()
                            .ok()
                            .flatten()
                            .map(|s| &*s == b"yes"),
                    });
                }
                Event::DocType(dt) => {
                    doctype = Some(String::from_utf8_lossy(&dt).trim().to_string());
                }
                Event::Start(start) => stack.push(element_start(&start)?),
                Event::Empty(start) => {
                    root = Some(element_start(&start)?);
                    break;
                }
                Event::Eof => break,
                // Comments, whitespace and PIs before the root are dropped.
                _ => {}
            }
            continue;
        }

        let node = match event {
            Event::Start(start) => {
                stack.push(element_start(&start)?);
                continue;
            }
            Event::End(_) => {
                let Some(done) = stack.pop() else {
                    return Err(SvagError::InvalidSvg("Unbalanced end tag".into()));
                };
                match stack.last_mut() {
                    Some(parent) => {
                        parent.children.push(Node::Element(done));
                        continue;
                    }
                    None => {
                        root = Some(done);
                        break;
                    }
                }
            }
            Event::Empty(start) => Node::Element(element_start(&start)?),
            Event::Text(text) => {
                let text = text.unescape()?;
                let parent_empty = stack.last().is_some_and(|e| e.children.is_empty());
                if text.trim().is_empty() && parent_empty && !stack.iter().any(Element::holds_text) {
                    continue;
                }
                Node::Text(text.into_owned())
            }
            Event::Comment(comment) => Node::Comment(String::from_utf8_lossy(&comment).into_owned()),
            Event::CData(cdata) => Node::CData(String::from_utf8_lossy(&cdata).into_owned()),
            Event::PI(pi) => {
                let content = String::from_utf8_lossy(&pi).into_owned();
                let (target, rest) = content
                    .split_once(char::is_whitespace)
                    .map(|(t, r)| (t.to_string(), Some(r.trim().to_string())))
                    .unwrap_or_else(|| (content.clone(), None));
                Node::ProcessingInstruction { target, content: rest }
            }
            Event::Eof => {
                return Err(SvagError::InvalidSvg("Unexpected end of file".into()));
            }
            _ => continue,
        };

        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
    }

    let root = root.ok_or_else(|| SvagError::InvalidSvg("No root element found".into()))?;

    Ok(Document {
        xml_declaration,
        doctype,
        root,
    })
}

fn element_start(start: &BytesStart) -> Result<Element, SvagError> {
    let name = std::str::from_utf8(start.name().as_ref())?.to_string();

    let mut element = Element::new(&name);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| SvagError::InvalidSvg(format!("Invalid attribute on <{name}>: {e}")))?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let value = attr.unescape_value()?;
        element.attributes.push(Attribute {
            name: QName::parse(key),
            value: value.into_owned(),
        });
    }

    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_svg() {
        let svg = r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
    <rect x="10" y="10" width="80" height="80" fill="red"/>
</svg>"#;

        let doc = parse_svg(svg).unwrap();
        assert!(doc.xml_declaration.is_some());
        assert!(doc.root.is("svg"));
        assert_eq!(doc.root.get_attr("width"), Some("100"));
        assert_eq!(doc.root.child_elements().count(), 1);
    }

    #[test]
    fn test_parse_with_comments() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
    <!-- This is a comment -->
    <rect/>
</svg>"#;

        let doc = parse_svg(svg).unwrap();
        let comments = doc
            .root
            .children
            .iter()
            .filter(|n| matches!(n, Node::Comment(_)))
            .count();
        assert_eq!(comments, 1);
    }

    #[test]
    fn test_parse_nested() {
        let svg = r#"<svg><g><g><rect/></g><circle/></g></svg>"#;
        let doc = parse_svg(svg).unwrap();

        let outer = doc.root.child_elements().next().unwrap();
        assert!(outer.is("g"));
        let names: Vec<_> = outer.child_elements().map(|e| e.name.local.as_str()).collect();
        assert_eq!(names, ["g", "circle"]);
    }

    #[test]
    fn test_parse_namespaced() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">
    <use xlink:href="#foo"/>
</svg>"##;

        let doc = parse_svg(svg).unwrap();
        let ns = doc.root.namespaces();
        assert!(ns.contains_key(&None));
        assert!(ns.contains_key(&Some("xlink")));
        let used = doc.root.child_elements().next().unwrap();
        assert_eq!(used.get_attr("xlink:href"), Some("#foo"));
    }

    #[test]
    fn test_parse_keeps_whitespace_inside_text() {
        let doc = parse_svg("<svg> <text>a<tspan> </tspan>b</text></svg>").unwrap();
        assert_eq!(doc.root.children.len(), 1);
        let text = doc.root.child_elements().next().unwrap();
        let tspan = text.child_elements().next().unwrap();
        assert_eq!(tspan.children, vec![Node::Text(" ".into())]);
    }

    #[test]
    fn test_parse_rejects_duplicate_attributes() {
        assert!(parse_svg(r#"<svg x="1" x="2"/>"#).is_err());
    }

    #[test]
    fn test_parse_requires_root() {
        assert!(matches!(parse_svg("<!-- nothing -->"), Err(SvagError::InvalidSvg(_))));
    }
}
