//! Value conversions: colors and path data.

use serde::{Deserialize, Serialize};

use super::{NodePass, PassInfo, Visit};
use crate::ast::Node;
use crate::error::BoxError;
use crate::path::{parse_path, serialize_path};

const COLOR_PROPERTIES: [&str; 6] = [
    "fill",
    "stroke",
    "stop-color",
    "flood-color",
    "lighting-color",
    "color",
];

/// Rewrites colors in presentation attributes and inline styles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertColors {
    /// `#aabbcc` -> `#abc`
    pub shorthex: bool,
    /// Swap between a name and a hex code when the other is shorter.
    pub shortname: bool,
}

impl Default for ConvertColors {
    fn default() -> Self {
        Self {
            shorthex: true,
            shortname: true,
        }
    }
}

impl ConvertColors {
    fn convert(&self, color: &str) -> String {
        let color = color.trim();
        let lower = color.to_ascii_lowercase();

        if self.shortname {
            match lower.as_str() {
                "white" | "#ffffff" | "#fff" => return "#fff".into(),
                "black" | "#000000" | "#000" => return "#000".into(),
                "#ff0000" | "#f00" | "red" => return "red".into(),
                "#0000ff" | "#00f" | "blue" => return "blue".into(),
                _ => {}
            }
        }

        if self.shorthex && lower.len() == 7 && lower.starts_with('#') {
            let hex = lower.as_bytes();
            if hex[1..].iter().all(u8::is_ascii_hexdigit)
                && hex[1] == hex[2]
                && hex[3] == hex[4]
                && hex[5] == hex[6]
            {
                return format!(
                    "#{}{}{}",
                    char::from(hex[1]),
                    char::from(hex[3]),
                    char::from(hex[5])
                );
            }
            return lower;
        }

        color.to_string()
    }

    fn convert_style(&self, style: &str) -> String {
        let mut result = String::new();
        for decl in style.split(';') {
            let decl = decl.trim();
            if decl.is_empty() {
                continue;
            }
            if !result.is_empty() {
                result.push(';');
            }
            match decl.split_once(':') {
                Some((prop, value)) => {
                    let prop = prop.trim();
                    result.push_str(prop);
                    result.push(':');
                    if COLOR_PROPERTIES.contains(&prop) {
                        result.push_str(&self.convert(value));
                    } else {
                        result.push_str(value.trim());
                    }
                }
                None => result.push_str(decl),
            }
        }
        result
    }
}

impl NodePass for ConvertColors {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        let Node::Element(elem) = node else {
            return Ok(Visit::Keep);
        };

        for attr in &mut elem.attributes {
            if attr.name.prefix.is_none() && COLOR_PROPERTIES.contains(&attr.name.local.as_str()) {
                attr.value = self.convert(&attr.value);
            }
        }

        if let Some(style) = elem.get_attr("style") {
            let converted = self.convert_style(style);
            elem.set_attr("style", converted);
        }

        Ok(Visit::Keep)
    }
}

/// Rounds and compacts the `d` attribute of `<path>` elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConvertPathData {
    pub float_precision: u8,
}

impl Default for ConvertPathData {
    fn default() -> Self {
        Self { float_precision: 3 }
    }
}

impl NodePass for ConvertPathData {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        if let Node::Element(elem) = node
            && elem.is("path")
            && let Some(d) = elem.get_attr("d")
        {
            // Unparseable data is left for the renderer to judge.
            match parse_path(d) {
                Ok(segments) => {
                    let minified = serialize_path(&segments, self.float_precision);
                    if minified.len() <= d.len() {
                        elem.set_attr("d", minified);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "leaving path data untouched"),
            }
        }
        Ok(Visit::Keep)
    }
}
