//! Builtin passes and the registry that catalogs them.
//!
//! Every builtin is a variant of [`BuiltinPass`]. Its execution kind, default
//! state and default parameters are fixed at compile time; the registry
//! materializes the defaults once per process and is never written to
//! afterwards. Resolution copies parameters out of it, so concurrent
//! optimizations never observe each other's overrides.

mod cleanup;
mod convert;
mod remove;
mod structure;
mod styles;

use std::path::PathBuf;
use std::sync::LazyLock;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::ast::{Document, Node};
use crate::error::BoxError;

pub use styles::{UsageData, collect_usage, minify_stylesheet};

/// Pass parameters: option name to JSON value.
pub type Params = Map<String, Value>;

/// How a pass walks the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Runs once against the whole tree.
    WholeDocument,
    /// Visits every node, parents before children.
    PerNodeForward,
    /// Visits every node, children before parents.
    PerNodeReverse,
}

impl PassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PassKind::WholeDocument => "full",
            PassKind::PerNodeForward => "perItem",
            PassKind::PerNodeReverse => "perItemReverse",
        }
    }
}

/// What a per-node pass wants done with the node it just visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Keep,
    /// Drop the node and its subtree. Later passes never see it.
    Remove,
}

/// Context handed to every pass invocation.
#[derive(Debug, Clone, Default)]
pub struct PassInfo {
    /// Path of the file being optimized, when there is one.
    pub path: Option<PathBuf>,
    /// Zero-based index of the current pipeline run.
    pub multipass_count: usize,
}

/// A pass that sees one node at a time.
pub trait NodePass {
    fn visit(&mut self, node: &mut Node, info: &PassInfo) -> Result<Visit, BoxError>;
}

/// A pass that receives the whole document.
pub trait DocumentPass {
    fn run(&mut self, doc: &mut Document, info: &PassInfo) -> Result<(), BoxError>;
}

/// A builtin pass with its parameters decoded, ready to execute.
pub enum Instance {
    Document(Box<dyn DocumentPass>),
    Node(Box<dyn NodePass>),
}

/// Every builtin pass, in no particular order. [`BuiltinPass::ALL`] holds the
/// canonical pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinPass {
    RemoveDoctype,
    RemoveXmlProcInst,
    RemoveComments,
    RemoveMetadata,
    RemoveEditorsNsData,
    CleanupAttrs,
    MinifyStyles,
    ConvertColors,
    RemoveDefaultAttrs,
    RemoveHiddenElems,
    CleanupNumericValues,
    ConvertPathData,
    CleanupWhitespace,
    RemoveEmptyContainers,
    CollapseGroups,
    RemoveUnusedNs,
    SortAttrs,
}

impl BuiltinPass {
    /// Default pipeline order.
    pub const ALL: [BuiltinPass; 17] = [
        BuiltinPass::RemoveDoctype,
        BuiltinPass::RemoveXmlProcInst,
        BuiltinPass::RemoveComments,
        BuiltinPass::RemoveMetadata,
        BuiltinPass::RemoveEditorsNsData,
        BuiltinPass::CleanupAttrs,
        BuiltinPass::MinifyStyles,
        BuiltinPass::ConvertColors,
        BuiltinPass::RemoveDefaultAttrs,
        BuiltinPass::RemoveHiddenElems,
        BuiltinPass::CleanupNumericValues,
        BuiltinPass::ConvertPathData,
        BuiltinPass::CleanupWhitespace,
        BuiltinPass::RemoveEmptyContainers,
        BuiltinPass::CollapseGroups,
        BuiltinPass::RemoveUnusedNs,
        BuiltinPass::SortAttrs,
    ];

    /// The name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            BuiltinPass::RemoveDoctype => "removeDoctype",
            BuiltinPass::RemoveXmlProcInst => "removeXMLProcInst",
            BuiltinPass::RemoveComments => "removeComments",
            BuiltinPass::RemoveMetadata => "removeMetadata",
            BuiltinPass::RemoveEditorsNsData => "removeEditorsNSData",
            BuiltinPass::CleanupAttrs => "cleanupAttrs",
            BuiltinPass::MinifyStyles => "minifyStyles",
            BuiltinPass::ConvertColors => "convertColors",
            BuiltinPass::RemoveDefaultAttrs => "removeDefaultAttrs",
            BuiltinPass::RemoveHiddenElems => "removeHiddenElems",
            BuiltinPass::CleanupNumericValues => "cleanupNumericValues",
            BuiltinPass::ConvertPathData => "convertPathData",
            BuiltinPass::CleanupWhitespace => "cleanupWhitespace",
            BuiltinPass::RemoveEmptyContainers => "removeEmptyContainers",
            BuiltinPass::CollapseGroups => "collapseGroups",
            BuiltinPass::RemoveUnusedNs => "removeUnusedNS",
            BuiltinPass::SortAttrs => "sortAttrs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|pass| pass.name() == name)
    }

    pub fn kind(self) -> PassKind {
        match self {
            BuiltinPass::RemoveDoctype
            | BuiltinPass::RemoveXmlProcInst
            | BuiltinPass::MinifyStyles
            | BuiltinPass::RemoveDefaultAttrs
            | BuiltinPass::RemoveUnusedNs => PassKind::WholeDocument,
            BuiltinPass::RemoveEmptyContainers | BuiltinPass::CollapseGroups => {
                PassKind::PerNodeReverse
            }
            _ => PassKind::PerNodeForward,
        }
    }

    pub fn active_by_default(self) -> bool {
        !matches!(self, BuiltinPass::SortAttrs)
    }

    pub fn description(self) -> &'static str {
        match self {
            BuiltinPass::RemoveDoctype => "removes doctype declaration",
            BuiltinPass::RemoveXmlProcInst => "removes XML processing instructions",
            BuiltinPass::RemoveComments => "removes comments",
            BuiltinPass::RemoveMetadata => "removes <metadata>, <title> and <desc>",
            BuiltinPass::RemoveEditorsNsData => "removes editors namespaces, elements and attributes",
            BuiltinPass::CleanupAttrs => {
                "cleanups attributes from newlines, trailing and repeating spaces"
            }
            BuiltinPass::MinifyStyles => {
                "minifies styles and removes unused styles based on usage data"
            }
            BuiltinPass::ConvertColors => "converts colors to their shortest form",
            BuiltinPass::RemoveDefaultAttrs => "removes attributes set to their default value",
            BuiltinPass::RemoveHiddenElems => "removes hidden elements",
            BuiltinPass::CleanupNumericValues => {
                "rounds numeric values to the fixed precision, removes default 'px' units"
            }
            BuiltinPass::ConvertPathData => "rounds and compacts path data",
            BuiltinPass::CleanupWhitespace => "removes whitespace-only text nodes",
            BuiltinPass::RemoveEmptyContainers => "removes empty container elements",
            BuiltinPass::CollapseGroups => "collapses useless groups",
            BuiltinPass::RemoveUnusedNs => "removes unused namespaces declaration",
            BuiltinPass::SortAttrs => "sorts element attributes (disabled by default)",
        }
    }

    fn default_params(self) -> Params {
        match self {
            BuiltinPass::RemoveMetadata => params_of::<remove::RemoveMetadata>(),
            BuiltinPass::RemoveEditorsNsData => params_of::<remove::RemoveEditorsNsData>(),
            BuiltinPass::CleanupAttrs => params_of::<cleanup::CleanupAttrs>(),
            BuiltinPass::MinifyStyles => params_of::<styles::MinifyStyles>(),
            BuiltinPass::ConvertColors => params_of::<convert::ConvertColors>(),
            BuiltinPass::RemoveDefaultAttrs => params_of::<remove::RemoveDefaultAttrs>(),
            BuiltinPass::CleanupNumericValues => params_of::<cleanup::CleanupNumericValues>(),
            BuiltinPass::ConvertPathData => params_of::<convert::ConvertPathData>(),
            BuiltinPass::SortAttrs => params_of::<structure::SortAttrs>(),
            _ => Params::new(),
        }
    }

    /// Decode `params` and build a runnable pass.
    pub fn instantiate(self, params: &Params) -> Result<Instance, serde_json::Error> {
        Ok(match self {
            BuiltinPass::RemoveDoctype => Instance::Document(Box::new(remove::RemoveDoctype)),
            BuiltinPass::RemoveXmlProcInst => {
                Instance::Document(Box::new(remove::RemoveXmlProcInst))
            }
            BuiltinPass::RemoveComments => Instance::Node(Box::new(remove::RemoveComments)),
            BuiltinPass::RemoveMetadata => {
                Instance::Node(Box::new(decode::<remove::RemoveMetadata>(params)?))
            }
            BuiltinPass::RemoveEditorsNsData => {
                Instance::Node(Box::new(decode::<remove::RemoveEditorsNsData>(params)?))
            }
            BuiltinPass::CleanupAttrs => {
                Instance::Node(Box::new(decode::<cleanup::CleanupAttrs>(params)?))
            }
            BuiltinPass::MinifyStyles => {
                Instance::Document(Box::new(decode::<styles::MinifyStyles>(params)?))
            }
            BuiltinPass::ConvertColors => {
                Instance::Node(Box::new(decode::<convert::ConvertColors>(params)?))
            }
            BuiltinPass::RemoveDefaultAttrs => {
                Instance::Document(Box::new(decode::<remove::RemoveDefaultAttrs>(params)?))
            }
            BuiltinPass::RemoveHiddenElems => Instance::Node(Box::new(remove::RemoveHiddenElems)),
            BuiltinPass::CleanupNumericValues => {
                Instance::Node(Box::new(decode::<cleanup::CleanupNumericValues>(params)?))
            }
            BuiltinPass::ConvertPathData => {
                Instance::Node(Box::new(decode::<convert::ConvertPathData>(params)?))
            }
            BuiltinPass::CleanupWhitespace => Instance::Node(Box::new(cleanup::CleanupWhitespace)),
            BuiltinPass::RemoveEmptyContainers => {
                Instance::Node(Box::new(remove::RemoveEmptyContainers))
            }
            BuiltinPass::CollapseGroups => Instance::Node(Box::new(structure::CollapseGroups)),
            BuiltinPass::RemoveUnusedNs => Instance::Document(Box::new(remove::RemoveUnusedNs)),
            BuiltinPass::SortAttrs => {
                Instance::Node(Box::new(decode::<structure::SortAttrs>(params)?))
            }
        })
    }
}

/// A builtin pass with its default parameters.
#[derive(Debug)]
pub struct RegistryEntry {
    pub pass: BuiltinPass,
    pub params: Params,
}

static REGISTRY: LazyLock<Vec<RegistryEntry>> = LazyLock::new(|| {
    BuiltinPass::ALL
        .into_iter()
        .map(|pass| RegistryEntry {
            pass,
            params: pass.default_params(),
        })
        .collect()
});

/// All builtin passes with their defaults, in canonical order.
pub fn registry() -> &'static [RegistryEntry] {
    &REGISTRY
}

/// Find a builtin pass by its configuration name.
pub fn lookup(name: &str) -> Option<&'static RegistryEntry> {
    registry().iter().find(|entry| entry.pass.name() == name)
}

/// Presentation attributes whose value passes from an element to its
/// descendants.
const INHERITED_PROPERTIES: [&str; 44] = [
    "clip-rule",
    "color",
    "color-interpolation",
    "color-interpolation-filters",
    "color-profile",
    "color-rendering",
    "cursor",
    "direction",
    "dominant-baseline",
    "fill",
    "fill-opacity",
    "fill-rule",
    "font",
    "font-family",
    "font-size",
    "font-size-adjust",
    "font-stretch",
    "font-style",
    "font-variant",
    "font-weight",
    "glyph-orientation-horizontal",
    "glyph-orientation-vertical",
    "image-rendering",
    "letter-spacing",
    "marker",
    "marker-end",
    "marker-mid",
    "marker-start",
    "paint-order",
    "pointer-events",
    "shape-rendering",
    "stroke",
    "stroke-dasharray",
    "stroke-dashoffset",
    "stroke-linecap",
    "stroke-linejoin",
    "stroke-miterlimit",
    "stroke-opacity",
    "stroke-width",
    "text-anchor",
    "text-rendering",
    "visibility",
    "word-spacing",
    "writing-mode",
];

fn is_inherited(property: &str) -> bool {
    INHERITED_PROPERTIES.contains(&property)
}

fn params_of<T: Serialize + Default>() -> Params {
    match serde_json::to_value(T::default()) {
        Ok(Value::Object(map)) => map,
        _ => Params::new(),
    }
}

fn decode<T: DeserializeOwned>(params: &Params) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(params.clone()))
}
