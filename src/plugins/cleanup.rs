//! Attribute and text cleanups.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{NodePass, PassInfo, Visit};
use crate::ast::Node;
use crate::error::BoxError;
use crate::number;

static NEWLINES_NEED_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S)\r?\n(\S)").expect("valid regex"));
static NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n").expect("valid regex"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Strips newlines, surrounding and repeated whitespace from attribute values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupAttrs {
    pub newlines: bool,
    pub trim: bool,
    pub spaces: bool,
}

impl Default for CleanupAttrs {
    fn default() -> Self {
        Self {
            newlines: true,
            trim: true,
            spaces: true,
        }
    }
}

impl CleanupAttrs {
    fn clean(&self, value: &str) -> String {
        let mut value = value.to_string();
        if self.newlines {
            // A newline between two words stands in for a space.
            value = NEWLINES_NEED_SPACE.replace_all(&value, "$1 $2").into_owned();
            value = NEWLINES.replace_all(&value, "").into_owned();
        }
        if self.trim {
            value = value.trim().to_string();
        }
        if self.spaces {
            value = SPACES.replace_all(&value, " ").into_owned();
        }
        value
    }
}

impl NodePass for CleanupAttrs {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        if let Node::Element(elem) = node {
            for attr in &mut elem.attributes {
                attr.value = self.clean(&attr.value);
            }
        }
        Ok(Visit::Keep)
    }
}

static NUMERIC_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([-+]?\d*\.?\d+([eE][-+]?\d+)?)(px|pt|pc|mm|cm|m|in|ft|em|ex|%)?$")
        .expect("valid regex")
});
static VIEWBOX_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s,?\s*|,\s*").expect("valid regex"));

/// Pixels per absolute unit.
fn px_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "cm" => Some(96.0 / 2.54),
        "mm" => Some(96.0 / 25.4),
        "in" => Some(96.0),
        "pt" => Some(4.0 / 3.0),
        "pc" => Some(16.0),
        _ => None,
    }
}

/// Rounds numeric attribute values and drops redundant units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CleanupNumericValues {
    pub float_precision: u8,
    pub leading_zero: bool,
    pub default_px: bool,
    pub convert_to_px: bool,
}

impl Default for CleanupNumericValues {
    fn default() -> Self {
        Self {
            float_precision: 3,
            leading_zero: true,
            default_px: true,
            convert_to_px: true,
        }
    }
}

impl CleanupNumericValues {
    fn view_box(&self, value: &str) -> String {
        VIEWBOX_SEPARATOR
            .split(value.trim())
            .map(|part| match part.parse::<f64>() {
                Ok(n) => number::format(number::round(n, self.float_precision)),
                Err(_) => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn value(&self, value: &str) -> Option<String> {
        let caps = NUMERIC_VALUE.captures(value)?;
        let raw: f64 = caps.get(1)?.as_str().parse().ok()?;

        let mut num = number::round(raw, self.float_precision);
        let mut units = caps.get(3).map_or("", |m| m.as_str());

        if self.convert_to_px
            && let Some(factor) = px_per_unit(units)
        {
            let px = number::round(factor * raw, self.float_precision);
            if number::format(px).len() < value.len() {
                num = px;
                units = "px";
            }
        }

        let mut out = number::format(num);
        if self.leading_zero {
            out = number::remove_leading_zero(&out);
        }
        if self.default_px && units == "px" {
            units = "";
        }
        out.push_str(units);
        Some(out)
    }
}

impl NodePass for CleanupNumericValues {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        let Node::Element(elem) = node else {
            return Ok(Visit::Keep);
        };

        if let Some(view_box) = elem.get_attr("viewBox") {
            let rounded = self.view_box(view_box);
            elem.set_attr("viewBox", rounded);
        }

        for attr in &mut elem.attributes {
            // `version` is a string that happens to look like a number.
            if attr.name.matches("version") {
                continue;
            }
            if let Some(value) = self.value(&attr.value) {
                attr.value = value;
            }
        }

        Ok(Visit::Keep)
    }
}

/// Drops whitespace-only text children of elements where whitespace cannot
/// render. Text content elements and links (which may sit inside `<text>`)
/// keep theirs.
pub struct CleanupWhitespace;

impl NodePass for CleanupWhitespace {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        if let Node::Element(elem) = node
            && !elem.holds_text()
            && !elem.is("a")
        {
            elem.children
                .retain(|child| !matches!(child, Node::Text(text) if text.trim().is_empty()));
        }
        Ok(Visit::Keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Element;

    fn element_with(name: &str, value: &str) -> Node {
        let mut elem = Element::new("rect");
        elem.set_attr(name, value);
        Node::Element(elem)
    }

    fn attr(node: &Node, name: &str) -> String {
        node.as_element().unwrap().get_attr(name).unwrap().to_string()
    }

    #[test]
    fn test_cleanup_attrs_defaults() {
        let mut node = element_with("value", "a  \n b");
        CleanupAttrs::default()
            .visit(&mut node, &PassInfo::default())
            .unwrap();
        assert_eq!(attr(&node, "value"), "a b");
    }

    #[test]
    fn test_cleanup_attrs_newline_between_words() {
        let mut node = element_with("class", "  one\ntwo  ");
        CleanupAttrs::default()
            .visit(&mut node, &PassInfo::default())
            .unwrap();
        assert_eq!(attr(&node, "class"), "one two");
    }

    #[test]
    fn test_cleanup_attrs_respects_disabled_options() {
        let mut pass = CleanupAttrs {
            newlines: false,
            trim: false,
            spaces: true,
        };
        let mut node = element_with("class", " a   b ");
        pass.visit(&mut node, &PassInfo::default()).unwrap();
        assert_eq!(attr(&node, "class"), " a b ");
    }

    #[test]
    fn test_numeric_values() {
        let pass = CleanupNumericValues::default();
        assert_eq!(pass.value("10.12345").as_deref(), Some("10.123"));
        assert_eq!(pass.value("0.5px").as_deref(), Some(".5"));
        assert_eq!(pass.value("1in").as_deref(), Some("96"));
        assert_eq!(pass.value("50%").as_deref(), Some("50%"));
        assert_eq!(pass.value("1.0em").as_deref(), Some("1em"));
        assert_eq!(pass.value("none"), None);
    }

    #[test]
    fn test_numeric_values_zero_precision() {
        let pass = CleanupNumericValues {
            float_precision: 0,
            ..Default::default()
        };
        assert_eq!(pass.value("10.6").as_deref(), Some("11"));
    }

    #[test]
    fn test_numeric_values_view_box_and_version() {
        let mut elem = Element::new("svg");
        elem.set_attr("viewBox", "0, 0  100.00001 50.5");
        elem.set_attr("version", "1.10");
        let mut node = Node::Element(elem);

        CleanupNumericValues::default()
            .visit(&mut node, &PassInfo::default())
            .unwrap();

        assert_eq!(attr(&node, "viewBox"), "0 0 100 50.5");
        assert_eq!(attr(&node, "version"), "1.10");
    }

    #[test]
    fn test_cleanup_whitespace() {
        let mut g = Element::new("g");
        g.children = vec![
            Node::Text(" \n ".into()),
            Node::Element(Element::new("rect")),
            Node::Text(" hi ".into()),
        ];
        let mut node = Node::Element(g);
        CleanupWhitespace.visit(&mut node, &PassInfo::default()).unwrap();
        assert_eq!(
            node.as_element().unwrap().children,
            vec![Node::Element(Element::new("rect")), Node::Text(" hi ".into())]
        );
    }

    #[test]
    fn test_cleanup_whitespace_keeps_text_spacing() {
        let info = PassInfo::default();
        for name in ["text", "tspan", "a"] {
            let mut elem = Element::new(name);
            elem.children = vec![Node::Element(Element::new("tspan")), Node::Text(" ".into())];
            let mut node = Node::Element(elem);
            CleanupWhitespace.visit(&mut node, &info).unwrap();
            assert_eq!(node.as_element().unwrap().children.len(), 2, "{name}");
        }

        let mut preserved = Element::new("g");
        preserved.set_attr("xml:space", "preserve");
        preserved.children = vec![Node::Text("  ".into())];
        let mut node = Node::Element(preserved);
        CleanupWhitespace.visit(&mut node, &info).unwrap();
        assert_eq!(node.as_element().unwrap().children.len(), 1);
    }
}
