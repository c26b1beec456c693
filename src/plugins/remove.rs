//! Passes that drop nodes, attributes and declarations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::styles::parse_declarations;
use super::{DocumentPass, NodePass, PassInfo, Visit, is_inherited};
use crate::ast::*;
use crate::error::BoxError;

pub struct RemoveDoctype;

impl DocumentPass for RemoveDoctype {
    fn run(&mut self, doc: &mut Document, _info: &PassInfo) -> Result<(), BoxError> {
        doc.doctype = None;
        Ok(())
    }
}

pub struct RemoveXmlProcInst;

impl DocumentPass for RemoveXmlProcInst {
    fn run(&mut self, doc: &mut Document, _info: &PassInfo) -> Result<(), BoxError> {
        doc.xml_declaration = None;
        Ok(())
    }
}

/// Removes comments, except `<!--! ... -->` which marks a comment to keep.
pub struct RemoveComments;

impl NodePass for RemoveComments {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        match node {
            Node::Comment(text) if !text.starts_with('!') => Ok(Visit::Remove),
            _ => Ok(Visit::Keep),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoveMetadata {
    /// Local names of the elements to drop.
    pub elements: Vec<String>,
}

impl Default for RemoveMetadata {
    fn default() -> Self {
        Self {
            elements: vec!["metadata".into(), "title".into(), "desc".into()],
        }
    }
}

impl NodePass for RemoveMetadata {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        match node {
            Node::Element(e) if self.elements.iter().any(|name| e.is(name)) => Ok(Visit::Remove),
            _ => Ok(Visit::Keep),
        }
    }
}

const EDITOR_PREFIXES: [&str; 2] = ["sodipodi", "inkscape"];

/// Removes elements and attributes in editor namespaces (Inkscape, Sodipodi).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoveEditorsNsData {
    pub additional_prefixes: Vec<String>,
}

impl RemoveEditorsNsData {
    fn is_editor_prefix(&self, prefix: Option<&str>) -> bool {
        let Some(prefix) = prefix else { return false };
        EDITOR_PREFIXES.contains(&prefix) || self.additional_prefixes.iter().any(|p| p == prefix)
    }
}

impl NodePass for RemoveEditorsNsData {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        let Node::Element(elem) = node else {
            return Ok(Visit::Keep);
        };

        if self.is_editor_prefix(elem.name.prefix.as_deref()) {
            return Ok(Visit::Remove);
        }

        // Namespace declarations are left for removeUnusedNS.
        let before = elem.attributes.len();
        elem.attributes
            .retain(|attr| !self.is_editor_prefix(attr.name.prefix.as_deref()));
        if elem.attributes.len() != before {
            tracing::trace!(element = %elem.name.full_name(), "dropped editor attributes");
        }

        Ok(Visit::Keep)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoveDefaultAttrs {
    /// Drop attributes whose value is the SVG default.
    pub default_attrs: bool,
    /// Keep `data-*` attributes.
    pub keep_data_attrs: bool,
}

impl Default for RemoveDefaultAttrs {
    fn default() -> Self {
        Self {
            default_attrs: true,
            keep_data_attrs: true,
        }
    }
}

impl DocumentPass for RemoveDefaultAttrs {
    fn run(&mut self, doc: &mut Document, _info: &PassInfo) -> Result<(), BoxError> {
        let cascade = Cascade::new(&doc.root);
        self.clean(&mut doc.root, &cascade);
        Ok(())
    }
}

impl RemoveDefaultAttrs {
    fn clean(&self, elem: &mut Element, cascade: &Cascade) {
        let element = elem.name.local.clone();
        elem.attributes.retain(|attr| {
            let name = &attr.name;
            if !self.keep_data_attrs && name.prefix.is_none() && name.local.starts_with("data-") {
                return false;
            }
            !(self.default_attrs
                && name.prefix.is_none()
                && cascade.is_redundant(&element, &name.local, &attr.value))
        });

        let inner = cascade.enter(elem);
        for child in elem.child_elements_mut() {
            self.clean(child, &inner);
        }
    }
}

/// Inherited properties that an ancestor sets to something other than their
/// initial value. Restating the initial value below such an ancestor is not
/// redundant: it stops the ancestor's value from reaching the element.
#[derive(Debug, Clone)]
pub(super) struct Cascade {
    overridden: HashSet<String>,
    /// A stylesheet can set any property on any element.
    styled: bool,
}

impl Cascade {
    /// The cascade at `root`.
    pub(super) fn new(root: &Element) -> Self {
        Self {
            overridden: HashSet::new(),
            styled: root.is("style") || root.any_descendant(&|e: &Element| e.is("style")),
        }
    }

    pub(super) fn styled(&self) -> bool {
        self.styled
    }

    /// Whether `property: value` on `element` restates what the element gets
    /// without it.
    pub(super) fn is_redundant(&self, element: &str, property: &str, value: &str) -> bool {
        if !is_default_value(element, property, value) {
            return false;
        }
        !is_inherited(property) || (!self.styled && !self.overridden.contains(property))
    }

    /// The cascade seen by the children of `elem`.
    pub(super) fn enter(&self, elem: &Element) -> Self {
        let mut inner = self.clone();
        let attributes = elem
            .attributes
            .iter()
            .filter(|attr| attr.name.prefix.is_none())
            .map(|attr| (attr.name.local.clone(), attr.value.clone()));
        // Inline declarations come last; they win over attributes.
        let declarations = elem.get_attr("style").map(parse_declarations).unwrap_or_default();

        for (property, value) in attributes.chain(declarations) {
            if !is_inherited(&property) {
                continue;
            }
            if is_default_value(&elem.name.local, &property, &value) {
                inner.overridden.remove(&property);
            } else {
                inner.overridden.insert(property);
            }
        }
        inner
    }
}

fn is_default_value(element: &str, attr: &str, value: &str) -> bool {
    match (element, attr, value) {
        // SVG element defaults
        ("svg", "version", "1.1") => true,
        ("svg", "baseProfile", "full") => true,
        (_, "preserveAspectRatio", "xMidYMid meet") => true,

        // Presentation attribute defaults
        (_, "fill-opacity" | "stroke-opacity" | "opacity", "1") => true,
        (_, "stroke-width", "1") => true,
        (_, "stroke-linecap", "butt") => true,
        (_, "stroke-linejoin", "miter") => true,
        (_, "stroke-miterlimit", "4") => true,
        (_, "fill-rule" | "clip-rule", "nonzero") => true,
        (_, "font-style", "normal") => true,
        (_, "font-weight", "normal" | "400") => true,
        (_, "text-anchor", "start") => true,
        (_, "dominant-baseline", "auto") => true,
        (_, "visibility", "visible") => true,
        (_, "display", "inline") => true,

        // Specific element defaults
        ("rect", "rx" | "ry", "0") => true,
        ("circle" | "ellipse", "cx" | "cy", "0") => true,
        ("line", "x1" | "y1" | "x2" | "y2", "0") => true,

        _ => false,
    }
}

/// Removes elements that can never render.
pub struct RemoveHiddenElems;

impl NodePass for RemoveHiddenElems {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        match node {
            Node::Element(e) if is_hidden(e) => Ok(Visit::Remove),
            _ => Ok(Visit::Keep),
        }
    }
}

fn is_hidden(elem: &Element) -> bool {
    if elem.get_attr("display") == Some("none") || style_value(elem, "display").as_deref() == Some("none") {
        return true;
    }

    // A descendant can turn itself visible again.
    if elem.get_attr("visibility") == Some("hidden") && !elem.any_descendant(&sets_visibility) {
        return true;
    }

    if let Some(opacity) = elem.get_attr("opacity")
        && opacity.trim().parse::<f64>().ok() == Some(0.0)
    {
        return true;
    }

    false
}

fn sets_visibility(elem: &Element) -> bool {
    elem.has_attr("visibility") || style_value(elem, "visibility").is_some()
}

/// Value of `property` in the element's inline style.
pub(super) fn style_value(elem: &Element, property: &str) -> Option<String> {
    parse_declarations(elem.get_attr("style")?)
        .into_iter()
        .rev()
        .find_map(|(name, value)| (name == property).then_some(value))
}

const CONTAINER_ELEMENTS: [&str; 7] = [
    "g", "defs", "symbol", "marker", "clipPath", "mask", "pattern",
];

/// Removes container elements left without children. Runs children first,
/// so nested empty containers disappear in one walk.
pub struct RemoveEmptyContainers;

impl NodePass for RemoveEmptyContainers {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        match node {
            Node::Element(e)
                if CONTAINER_ELEMENTS.contains(&e.name.local.as_str())
                    && e.children.is_empty()
                    && !e.has_attr("id") =>
            {
                Ok(Visit::Remove)
            }
            _ => Ok(Visit::Keep),
        }
    }
}

/// Removes `xmlns:prefix` declarations on the root that nothing uses.
pub struct RemoveUnusedNs;

impl DocumentPass for RemoveUnusedNs {
    fn run(&mut self, doc: &mut Document, _info: &PassInfo) -> Result<(), BoxError> {
        let mut used: HashSet<String> = HashSet::new();
        doc.for_each_element(|elem| {
            if let Some(prefix) = &elem.name.prefix {
                used.insert(prefix.clone());
            }
            for attr in &elem.attributes {
                if let Some(prefix) = &attr.name.prefix
                    && !attr.name.is_xmlns()
                {
                    used.insert(prefix.clone());
                }
            }
        });

        doc.root.attributes.retain(|attr| {
            attr.name.prefix.as_deref() != Some("xmlns") || used.contains(&attr.name.local)
        });
        Ok(())
    }
}
