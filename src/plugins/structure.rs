//! Passes that reshape the tree or reorder attributes.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::remove::style_value;
use super::{NodePass, PassInfo, Visit, is_inherited};
use crate::ast::*;
use crate::error::BoxError;

/// Removes `<g>` wrappers that do nothing. An attribute-free group gives its
/// children to the parent. A group around a single element moves its
/// attributes onto that element first, when the element renders the same
/// either way. Runs children first, so chains of wrappers unwind in a single
/// walk.
pub struct CollapseGroups;

impl NodePass for CollapseGroups {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        let Node::Element(elem) = node else {
            return Ok(Visit::Keep);
        };
        if !elem.child_elements().any(|c| c.is("g")) {
            return Ok(Visit::Keep);
        }

        let mut children = Vec::with_capacity(elem.children.len());
        for child in std::mem::take(&mut elem.children) {
            match child {
                Node::Element(mut group) => {
                    if dissolve(&mut group) {
                        children.append(&mut group.children);
                    } else {
                        children.push(Node::Element(group));
                    }
                }
                other => children.push(other),
            }
        }
        elem.children = children;

        Ok(Visit::Keep)
    }
}

const ANIMATION_ELEMENTS: [&str; 5] = ["animate", "animateColor", "animateMotion", "animateTransform", "set"];

/// Prepare `group` to be replaced by its children. Leaves it untouched and
/// returns false when that would change the rendering.
fn dissolve(group: &mut Element) -> bool {
    if !group.is("g") {
        return false;
    }
    // Animations target their parent.
    if group
        .child_elements()
        .any(|c| ANIMATION_ELEMENTS.contains(&c.name.local.as_str()))
    {
        return false;
    }
    if group.attributes.is_empty() {
        return true;
    }

    let [Node::Element(child)] = group.children.as_mut_slice() else {
        return false;
    };
    // Anything referencing the child by id would see the moved attributes.
    if child.has_attr("id") || !group.attributes.iter().all(|attr| can_move(attr, child)) {
        return false;
    }

    for attr in std::mem::take(&mut group.attributes) {
        let name = attr.name.local.as_str();
        if name == "transform" {
            let transform = match child.get_attr("transform") {
                Some(inner) => format!("{} {inner}", attr.value),
                None => attr.value.clone(),
            };
            child.set_attr("transform", transform);
        } else if !child.has_attr(name) {
            child.attributes.push(attr);
        }
    }
    true
}

/// Whether the group's `attr` means the same on its only child.
fn can_move(attr: &Attribute, child: &Element) -> bool {
    if attr.name.prefix.is_some() {
        return false;
    }
    let name = attr.name.local.as_str();
    match name {
        // The child's own value already wins over an inherited one.
        _ if is_inherited(name) => true,
        "transform" => true,
        // Group opacity equals element opacity when there is one element.
        "opacity" => !child.has_attr(name) && style_value(child, name).is_none(),
        // Clips, masks and filters apply in the group's coordinate system
        // and to the group as a whole.
        _ => false,
    }
}

/// Where namespace declarations go when sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum XmlnsOrder {
    Front,
    Alphabetical,
}

/// Sorts attributes into a fixed, gzip-friendly order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SortAttrs {
    pub order: Vec<String>,
    pub xmlns_order: XmlnsOrder,
}

impl Default for SortAttrs {
    fn default() -> Self {
        let order = [
            "id", "width", "height", "x", "x1", "x2", "y", "y1", "y2", "cx", "cy", "r", "fill",
            "stroke", "marker", "d", "points",
        ];
        Self {
            order: order.into_iter().map(String::from).collect(),
            xmlns_order: XmlnsOrder::Front,
        }
    }
}

impl SortAttrs {
    /// Position in `order`, doubled; `fill-opacity` sorts right after `fill`.
    fn rank(&self, name: &str) -> usize {
        let mut rank = self.order.len() * 2 + 2;
        for (i, key) in self.order.iter().enumerate() {
            if name == key {
                rank = i * 2;
            } else if name.strip_prefix(key.as_str()).is_some_and(|rest| rest.starts_with('-')) {
                rank = i * 2 + 1;
            }
        }
        rank
    }

    fn compare(&self, a: &Attribute, b: &Attribute) -> Ordering {
        let a_prefix = namespace_prefix(a);
        let b_prefix = namespace_prefix(b);

        if a_prefix != b_prefix {
            if self.xmlns_order == XmlnsOrder::Front {
                if a_prefix == Some("xmlns") {
                    return Ordering::Less;
                }
                if b_prefix == Some("xmlns") {
                    return Ordering::Greater;
                }
            }
            return a_prefix.cmp(&b_prefix);
        }

        let a_name = a.name.full_name();
        let b_name = b.name.full_name();
        self.rank(&a_name)
            .cmp(&self.rank(&b_name))
            .then_with(|| a_name.cmp(&b_name))
    }
}

/// `xmlns` itself counts as being in the xmlns group.
fn namespace_prefix(attr: &Attribute) -> Option<&str> {
    if attr.name.is_xmlns() {
        Some("xmlns")
    } else {
        attr.name.prefix.as_deref()
    }
}

impl NodePass for SortAttrs {
    fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
        if let Node::Element(elem) = node {
            elem.attributes.sort_by(|a, b| self.compare(a, b));
        }
        Ok(Visit::Keep)
    }
}
