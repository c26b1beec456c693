//! SVG serialization to XML text.

use serde::Deserialize;

use crate::ast::*;

/// Output formatting (`js2svg` in config files).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerializeOptions {
    /// Put every element on its own line.
    pub pretty: bool,
    /// Spaces per nesting level when `pretty` is set.
    pub indent: usize,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: 4,
        }
    }
}

/// Serialize a Document to an SVG string.
///
/// The output is a pure function of the tree and the options; the multipass
/// controller compares successive outputs to detect convergence.
pub fn serialize(doc: &Document, options: &SerializeOptions) -> String {
    let mut writer = Writer {
        out: String::new(),
        options,
    };

    if let Some(ref decl) = doc.xml_declaration {
        let out = &mut writer.out;
        out.push_str("<?xml version=\"");
        out.push_str(&decl.version);
        out.push('"');
        if let Some(ref enc) = decl.encoding {
            out.push_str(" encoding=\"");
            out.push_str(enc);
            out.push('"');
        }
        if let Some(standalone) = decl.standalone {
            out.push_str(" standalone=\"");
            out.push_str(if standalone { "yes" } else { "no" });
            out.push('"');
        }
        out.push_str("?>");
        writer.newline();
    }

    if let Some(ref dt) = doc.doctype {
        writer.out.push_str("<!DOCTYPE ");
        writer.out.push_str(dt);
        writer.out.push('>');
        writer.newline();
    }

    writer.element(&doc.root, 0);
    writer.newline();

    writer.out
}

struct Writer<'a> {
    out: String,
    options: &'a SerializeOptions,
}

impl Writer<'_> {
    fn newline(&mut self) {
        if self.options.pretty {
            self.out.push('\n');
        }
    }

    fn indent(&mut self, depth: usize) {
        for _ in 0..depth * self.options.indent {
            self.out.push(' ');
        }
    }

    fn element(&mut self, elem: &Element, depth: usize) {
        self.write_element(elem, depth, self.options.pretty);
    }

    fn write_element(&mut self, elem: &Element, depth: usize, pretty: bool) {
        self.out.push('<');
        self.out.push_str(&elem.name.full_name());

        for attr in &elem.attributes {
            self.out.push(' ');
            self.out.push_str(&attr.name.full_name());
            self.out.push_str("=\"");
            push_escaped_attr(&mut self.out, &attr.value);
            self.out.push('"');
        }

        if elem.children.is_empty() {
            self.out.push_str("/>");
            return;
        }

        self.out.push('>');

        // Mixed content and text elements are written inline so
        // pretty-printing never adds or drops whitespace in text.
        let pretty = pretty
            && !elem.holds_text()
            && !elem
                .children
                .iter()
                .any(|c| matches!(c, Node::Text(t) if !t.trim().is_empty()));

        for child in &elem.children {
            if pretty {
                if matches!(child, Node::Text(_)) {
                    continue;
                }
                self.out.push('\n');
                self.indent(depth + 1);
            }
            self.node(child, depth + 1, pretty);
        }

        if pretty {
            self.out.push('\n');
            self.indent(depth);
        }
        self.out.push_str("</");
        self.out.push_str(&elem.name.full_name());
        self.out.push('>');
    }

    fn node(&mut self, node: &Node, depth: usize, pretty: bool) {
        match node {
            Node::Element(elem) => self.write_element(elem, depth, pretty),
            Node::Text(text) => push_escaped_text(&mut self.out, text),
            Node::Comment(comment) => {
                self.out.push_str("<!--");
                self.out.push_str(comment);
                self.out.push_str("-->");
            }
            Node::CData(data) => {
                self.out.push_str("<![CDATA[");
                self.out.push_str(data);
                self.out.push_str("]]>");
            }
            Node::ProcessingInstruction { target, content } => {
                self.out.push_str("<?");
                self.out.push_str(target);
                if let Some(c) = content {
                    self.out.push(' ');
                    self.out.push_str(c);
                }
                self.out.push_str("?>");
            }
        }
    }
}

fn push_escaped_attr(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("&quot;"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn push_escaped_text(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_svg;

    #[test]
    fn test_serialize_simple() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><rect/></svg>"#;
        let doc = parse_svg(svg).unwrap();
        let out = serialize(&doc, &SerializeOptions::default());
        assert_eq!(out, r#"<svg xmlns="http://www.w3.org/2000/svg"><rect/></svg>"#);
    }

    #[test]
    fn test_serialize_keeps_declaration_and_comments() {
        let svg = r#"<?xml version="1.0"?><svg><!-- note --><rect/></svg>"#;
        let doc = parse_svg(svg).unwrap();
        let out = serialize(&doc, &SerializeOptions::default());
        assert_eq!(out, r#"<?xml version="1.0"?><svg><!-- note --><rect/></svg>"#);
    }

    #[test]
    fn test_serialize_preserves_attribute_order() {
        let doc = parse_svg(r#"<svg><rect y="1" x="2" fill="red"/></svg>"#).unwrap();
        let out = serialize(&doc, &SerializeOptions::default());
        assert_eq!(out, r#"<svg><rect y="1" x="2" fill="red"/></svg>"#);
    }

    #[test]
    fn test_serialize_pretty() {
        let doc = parse_svg(
            r#"<svg><g><rect/></g><text>a <tspan>b</tspan></text><text><tspan>c</tspan> <tspan>d</tspan></text></svg>"#,
        )
        .unwrap();
        let options = SerializeOptions {
            pretty: true,
            indent: 2,
        };
        let out = serialize(&doc, &options);
        assert_eq!(
            out,
            "<svg>\n  <g>\n    <rect/>\n  </g>\n  <text>a <tspan>b</tspan></text>\n  <text><tspan>c</tspan> <tspan>d</tspan></text>\n</svg>\n"
        );
    }

    #[test]
    fn test_serialize_keeps_text_verbatim() {
        let svg = r#"<svg><text x="1"> a &amp; <tspan>b</tspan> </text></svg>"#;
        let doc = parse_svg(svg).unwrap();
        assert_eq!(serialize(&doc, &SerializeOptions::default()), svg);
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let doc = parse_svg(r#"<svg a="1"><g b="2">t</g></svg>"#).unwrap();
        let options = SerializeOptions::default();
        assert_eq!(serialize(&doc, &options), serialize(&doc, &options));
    }
}
