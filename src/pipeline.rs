//! Pass descriptors, grouping and execution.
//!
//! Active descriptors are partitioned into maximal runs of the same
//! [`PassKind`]. Each per-node group shares a single walk of the tree: at
//! every node the group's passes run in their resolved order, and a node
//! any of them removes is gone for the rest of the walk and for every later
//! group. Passes in one group must therefore not rely on seeing the effects
//! of a same-kind pass anywhere but on the node currently being visited.

use crate::ast::{Document, Element, Node};
use crate::custom::{CustomPass, CustomPlugin};
use crate::error::PassError;
use crate::plugins::{BuiltinPass, Instance, NodePass, Params, PassInfo, PassKind, RegistryEntry, Visit};

/// What actually runs when a descriptor executes.
#[derive(Debug, Clone)]
pub enum PassBody {
    Builtin(BuiltinPass),
    Custom(CustomPass),
}

/// A pass as resolved for one pipeline: its final name, kind, state and
/// parameters. Parameters are always owned, never shared with the registry.
#[derive(Debug, Clone)]
pub struct PassDescriptor {
    pub name: String,
    pub kind: PassKind,
    pub active: bool,
    pub params: Params,
    pub body: PassBody,
}

impl PassDescriptor {
    pub fn builtin(entry: &RegistryEntry) -> Self {
        Self {
            name: entry.pass.name().to_string(),
            kind: entry.pass.kind(),
            active: entry.pass.active_by_default(),
            params: entry.params.clone(),
            body: PassBody::Builtin(entry.pass),
        }
    }

    /// Custom passes always see the whole document and start out active.
    pub fn custom(name: &str, plugin: &CustomPlugin) -> Self {
        Self {
            name: name.to_string(),
            kind: PassKind::WholeDocument,
            active: true,
            params: plugin.params.clone(),
            body: PassBody::Custom(plugin.pass.clone()),
        }
    }
}

// Custom bodies are opaque, so equality covers what configuration decides.
impl PartialEq for PassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.active == other.active
            && self.params == other.params
    }
}

/// A maximal run of contiguous active passes sharing a kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PassGroup {
    pub kind: PassKind,
    pub passes: Vec<PassDescriptor>,
}

/// Partition the active descriptors into groups without reordering them.
pub fn group(descriptors: &[PassDescriptor]) -> Vec<PassGroup> {
    let mut groups: Vec<PassGroup> = Vec::new();
    for descriptor in descriptors.iter().filter(|d| d.active) {
        match groups.last_mut() {
            Some(last) if last.kind == descriptor.kind => last.passes.push(descriptor.clone()),
            _ => groups.push(PassGroup {
                kind: descriptor.kind,
                passes: vec![descriptor.clone()],
            }),
        }
    }
    groups
}

/// Run every group against `doc`, in order.
pub fn execute(groups: &[PassGroup], doc: &mut Document, info: &PassInfo) -> Result<(), PassError> {
    for group in groups {
        tracing::trace!(
            kind = group.kind.as_str(),
            passes = group.passes.len(),
            "running group"
        );
        match group.kind {
            PassKind::WholeDocument => {
                for descriptor in &group.passes {
                    run_whole(descriptor, doc, info)?;
                }
            }
            PassKind::PerNodeForward | PassKind::PerNodeReverse => {
                let passes = group
                    .passes
                    .iter()
                    .map(node_pass)
                    .collect::<Result<Vec<_>, _>>()?;
                let mut walker = Walker {
                    passes,
                    reverse: group.kind == PassKind::PerNodeReverse,
                    info,
                    path: Vec::new(),
                };
                walker.walk_document(doc)?;
            }
        }
    }
    Ok(())
}

fn instantiate(descriptor: &PassDescriptor, pass: BuiltinPass) -> Result<Instance, PassError> {
    pass.instantiate(&descriptor.params)
        .map_err(|e| PassError::new(&descriptor.name, None, e))
}

fn kind_mismatch(descriptor: &PassDescriptor) -> PassError {
    PassError::new(
        &descriptor.name,
        None,
        format!("cannot run as {}", descriptor.kind.as_str()),
    )
}

fn run_whole(descriptor: &PassDescriptor, doc: &mut Document, info: &PassInfo) -> Result<(), PassError> {
    match &descriptor.body {
        PassBody::Builtin(pass) => match instantiate(descriptor, *pass)? {
            Instance::Document(mut body) => body
                .run(doc, info)
                .map_err(|e| PassError::new(&descriptor.name, None, e)),
            Instance::Node(_) => Err(kind_mismatch(descriptor)),
        },
        PassBody::Custom(pass) => pass.run(&descriptor.name, doc, &descriptor.params, info),
    }
}

struct NamedPass<'g> {
    name: &'g str,
    pass: Box<dyn NodePass>,
}

fn node_pass(descriptor: &PassDescriptor) -> Result<NamedPass<'_>, PassError> {
    match &descriptor.body {
        PassBody::Builtin(pass) => match instantiate(descriptor, *pass)? {
            Instance::Node(pass) => Ok(NamedPass {
                name: &descriptor.name,
                pass,
            }),
            Instance::Document(_) => Err(kind_mismatch(descriptor)),
        },
        PassBody::Custom(_) => Err(kind_mismatch(descriptor)),
    }
}

/// One traversal shared by every pass of a per-node group.
struct Walker<'g> {
    passes: Vec<NamedPass<'g>>,
    reverse: bool,
    info: &'g PassInfo,
    /// Labels from the root down to the node being visited.
    path: Vec<String>,
}

impl Walker<'_> {
    fn walk_document(&mut self, doc: &mut Document) -> Result<(), PassError> {
        let root = std::mem::replace(&mut doc.root, Element::new("svg"));
        let mut node = Node::Element(root);

        self.path.push(node.label());
        let result = self.walk(&mut node);
        self.path.pop();

        if let Node::Element(root) = node {
            doc.root = root;
        }
        result.map(|_| ())
    }

    fn walk(&mut self, node: &mut Node) -> Result<Visit, PassError> {
        if !self.reverse && self.visit(node)? == Visit::Remove {
            return Ok(Visit::Remove);
        }
        if let Node::Element(elem) = node {
            self.walk_children(elem)?;
        }
        if self.reverse {
            return self.visit(node);
        }
        Ok(Visit::Keep)
    }

    fn walk_children(&mut self, elem: &mut Element) -> Result<(), PassError> {
        let mut i = 0;
        let mut index = 0;
        while i < elem.children.len() {
            self.path.push(format!("{}[{index}]", elem.children[i].label()));
            let visit = self.walk(&mut elem.children[i]);
            self.path.pop();

            match visit? {
                Visit::Remove => {
                    elem.children.remove(i);
                }
                Visit::Keep => i += 1,
            }
            index += 1;
        }
        Ok(())
    }

    /// Run the group's passes on one node. Stops at the first removal.
    fn visit(&mut self, node: &mut Node) -> Result<Visit, PassError> {
        let at_root = self.path.len() == 1;
        for named in &mut self.passes {
            let visit = named
                .pass
                .visit(node, self.info)
                .map_err(|e| PassError::new(named.name, Some(node_path(&self.path)), e))?;

            if at_root {
                if !matches!(node, Node::Element(_)) {
                    return Err(PassError::new(
                        named.name,
                        Some(node_path(&self.path)),
                        "replaced the root element with a non-element node",
                    ));
                }
                if visit == Visit::Remove {
                    tracing::warn!(pass = named.name, "ignoring request to remove the root element");
                }
                continue;
            }
            if visit == Visit::Remove {
                return Ok(Visit::Remove);
            }
        }
        Ok(Visit::Keep)
    }
}

fn node_path(labels: &[String]) -> String {
    format!("/{}", labels.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::parse::parse_svg;
    use crate::plugins::registry;
    use crate::serialize::{SerializeOptions, serialize};
    use std::sync::{Arc, Mutex};

    fn descriptors() -> Vec<PassDescriptor> {
        registry().iter().map(PassDescriptor::builtin).collect()
    }

    fn walk(passes: Vec<NamedPass<'static>>, reverse: bool, doc: &mut Document) -> Result<(), PassError> {
        static INFO: PassInfo = PassInfo {
            path: None,
            multipass_count: 0,
        };
        Walker {
            passes,
            reverse,
            info: &INFO,
            path: Vec::new(),
        }
        .walk_document(doc)
    }

    /// Records every node label it sees.
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl NodePass for Recorder {
        fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
            self.0.lock().unwrap().push(node.label());
            Ok(Visit::Keep)
        }
    }

    /// Removes every element with the given local name.
    struct Remover(&'static str);

    impl NodePass for Remover {
        fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
            Ok(match node {
                Node::Element(e) if e.is(self.0) => Visit::Remove,
                _ => Visit::Keep,
            })
        }
    }

    struct FailOn(&'static str);

    impl NodePass for FailOn {
        fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
            match node {
                Node::Element(e) if e.is(self.0) => Err(format!("cannot handle <{}>", self.0).into()),
                _ => Ok(Visit::Keep),
            }
        }
    }

    struct ReplaceWithText;

    impl NodePass for ReplaceWithText {
        fn visit(&mut self, node: &mut Node, _info: &PassInfo) -> Result<Visit, BoxError> {
            *node = Node::Text("gone".into());
            Ok(Visit::Keep)
        }
    }

    fn named(name: &'static str, pass: impl NodePass + 'static) -> NamedPass<'static> {
        NamedPass {
            name,
            pass: Box::new(pass),
        }
    }

    #[test]
    fn test_default_grouping() {
        let groups = group(&descriptors());
        let kinds: Vec<_> = groups.iter().map(|g| g.kind).collect();
        assert_eq!(
            kinds,
            [
                PassKind::WholeDocument,
                PassKind::PerNodeForward,
                PassKind::WholeDocument,
                PassKind::PerNodeForward,
                PassKind::WholeDocument,
                PassKind::PerNodeForward,
                PassKind::PerNodeReverse,
                PassKind::WholeDocument,
            ]
        );
        // sortAttrs is inactive and must not produce a trailing group.
        assert!(groups.iter().flat_map(|g| &g.passes).all(|p| p.name != "sortAttrs"));
    }

    #[test]
    fn test_grouping_is_idempotent_and_order_preserving() {
        let mut all = descriptors();
        all[3].active = false;
        all.push(all[0].clone());

        let first = group(&all);
        let second = group(&all);
        assert_eq!(first, second);

        let flattened: Vec<_> = first.iter().flat_map(|g| g.passes.iter().cloned()).collect();
        let active: Vec<_> = all.into_iter().filter(|d| d.active).collect();
        assert_eq!(flattened, active);
    }

    #[test]
    fn test_groups_are_maximal() {
        for pair in group(&descriptors()).windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind);
        }
    }

    #[test]
    fn test_removed_nodes_are_not_visited_again() {
        let mut doc = parse_svg("<svg><g><rect/></g><circle/></svg>").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        walk(
            vec![named("removeG", Remover("g")), named("record", Recorder(seen.clone()))],
            false,
            &mut doc,
        )
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), ["svg", "circle"]);
        assert_eq!(serialize(&doc, &SerializeOptions::default()), "<svg><circle/></svg>");
    }

    #[test]
    fn test_reverse_walk_visits_children_first() {
        let mut doc = parse_svg("<svg><g><rect/></g><circle/></svg>").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        walk(vec![named("record", Recorder(seen.clone()))], true, &mut doc).unwrap();
        assert_eq!(*seen.lock().unwrap(), ["rect", "g", "circle", "svg"]);
    }

    #[test]
    fn test_removal_is_seen_by_later_groups() {
        let mut doc = parse_svg("<svg><g><rect/></g><circle/></svg>").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        walk(vec![named("removeRect", Remover("rect"))], false, &mut doc).unwrap();
        walk(vec![named("record", Recorder(seen.clone()))], true, &mut doc).unwrap();
        assert_eq!(*seen.lock().unwrap(), ["g", "circle", "svg"]);
    }

    #[test]
    fn test_root_removal_is_ignored() {
        let mut doc = parse_svg("<svg><rect/></svg>").unwrap();
        walk(vec![named("removeSvg", Remover("svg"))], false, &mut doc).unwrap();
        assert_eq!(serialize(&doc, &SerializeOptions::default()), "<svg><rect/></svg>");
    }

    #[test]
    fn test_root_replacement_is_an_error() {
        let mut doc = parse_svg("<svg/>").unwrap();
        let err = walk(vec![named("vandal", ReplaceWithText)], false, &mut doc).unwrap_err();
        assert_eq!(err.pass, "vandal");
        assert_eq!(err.path.as_deref(), Some("/svg"));
    }

    #[test]
    fn test_pass_error_carries_node_path() {
        let mut doc = parse_svg("<svg><g><circle/><rect/></g></svg>").unwrap();
        let err = walk(vec![named("picky", FailOn("rect"))], false, &mut doc).unwrap_err();
        assert_eq!(err.pass, "picky");
        assert_eq!(err.path.as_deref(), Some("/svg/g[0]/rect[1]"));
        assert!(err.to_string().contains("cannot handle <rect>"));
    }

    #[test]
    fn test_execute_custom_whole_document_pass() {
        let plugin = CustomPlugin::new(|doc, _, info| {
            doc.root.set_attr("data-run", info.multipass_count.to_string());
            Ok(())
        });
        let groups = group(&[PassDescriptor::custom("stamp", &plugin)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].kind, PassKind::WholeDocument);

        let mut doc = parse_svg("<svg/>").unwrap();
        let info = PassInfo {
            path: None,
            multipass_count: 4,
        };
        execute(&groups, &mut doc, &info).unwrap();
        assert_eq!(doc.root.get_attr("data-run"), Some("4"));
    }

    #[test]
    fn test_custom_pass_in_node_group_is_rejected() {
        let plugin = CustomPlugin::new(|_, _, _| Ok(()));
        let mut descriptor = PassDescriptor::custom("odd", &plugin);
        descriptor.kind = PassKind::PerNodeForward;

        let mut doc = parse_svg("<svg/>").unwrap();
        let err = execute(&group(&[descriptor]), &mut doc, &PassInfo::default()).unwrap_err();
        assert_eq!(err.pass, "odd");
    }
}
