//! Stylesheet and inline style minification.
//!
//! Usage data is gathered in one read-only walk before anything is rewritten.
//! Selectors that name an id, class or tag the document never uses are
//! dropped, unless the document runs scripts that could add them later.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::remove::Cascade;
use super::{DocumentPass, PassInfo};
use crate::ast::{Document, Element, Node};
use crate::error::BoxError;

static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
static COMBINATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([>+~])\s*").expect("valid regex"));
static BLOCK_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([{};])\s*").expect("valid regex"));

/// Which kinds of selectors may be dropped for lack of use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageOptions {
    /// Filter even when the document has scripts.
    pub force: bool,
    pub ids: bool,
    pub classes: bool,
    pub tags: bool,
}

impl Default for UsageOptions {
    fn default() -> Self {
        Self {
            force: false,
            ids: true,
            classes: true,
            tags: true,
        }
    }
}

/// `usage: false` disables filtering, `usage: true` enables it with defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Usage {
    Enabled(bool),
    Options(UsageOptions),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinifyStyles {
    pub usage: Usage,
}

impl Default for MinifyStyles {
    fn default() -> Self {
        Self {
            usage: Usage::Options(UsageOptions::default()),
        }
    }
}

impl MinifyStyles {
    fn usage_filter(&self, root: &Element) -> Option<UsageData> {
        let options = match self.usage {
            Usage::Enabled(false) => return None,
            Usage::Enabled(true) => UsageOptions::default(),
            Usage::Options(options) => options,
        };

        let mut usage = collect_usage(root);
        if !usage.safe && !options.force {
            tracing::debug!("document runs scripts, keeping every style rule");
            return None;
        }
        if !options.ids {
            usage.ids = None;
        }
        if !options.classes {
            usage.classes = None;
        }
        if !options.tags {
            usage.tags = None;
        }
        Some(usage)
    }
}

impl DocumentPass for MinifyStyles {
    fn run(&mut self, doc: &mut Document, _info: &PassInfo) -> Result<(), BoxError> {
        let usage = self.usage_filter(&doc.root);
        let cascade = Cascade::new(&doc.root);
        minify_element(&mut doc.root, usage.as_ref(), &cascade);
        Ok(())
    }
}

fn minify_element(elem: &mut Element, usage: Option<&UsageData>, cascade: &Cascade) {
    if let Some(style) = elem.get_attr("style") {
        let minified = minify_declarations(elem, style, cascade);
        if minified.is_empty() {
            elem.remove_attr("style");
        } else {
            elem.set_attr("style", minified);
        }
    }

    if elem.is("style") {
        let css = minify_stylesheet(&elem.text_content(), usage);
        elem.children = if css.is_empty() {
            Vec::new()
        } else if css.contains(['<', '>']) {
            vec![Node::CData(css)]
        } else {
            vec![Node::Text(css)]
        };
        return;
    }

    let inner = cascade.enter(elem);
    for child in elem.child_elements_mut() {
        minify_element(child, usage, &inner);
    }
    elem.children
        .retain(|child| !child.as_element().is_some_and(|e| e.is("style") && e.children.is_empty()));
}

/// Ids, classes and tags present in a document. A `None` set is not
/// tracked and never causes a selector to be dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageData {
    pub ids: Option<BTreeSet<String>>,
    pub classes: Option<BTreeSet<String>>,
    pub tags: Option<BTreeSet<String>>,
    /// False when scripts or event handlers could touch selectors at runtime.
    pub safe: bool,
}

/// Walk `root` and record everything a selector could match.
pub fn collect_usage(root: &Element) -> UsageData {
    let mut usage = UsageData {
        ids: Some(BTreeSet::new()),
        classes: Some(BTreeSet::new()),
        tags: Some(BTreeSet::new()),
        safe: true,
    };
    usage.record(root);
    usage
}

impl UsageData {
    fn record(&mut self, elem: &Element) {
        if elem.is("script") {
            self.safe = false;
        }
        if let Some(tags) = &mut self.tags {
            tags.insert(elem.name.local.clone());
        }

        for attr in elem.attributes.iter().filter(|a| a.name.prefix.is_none()) {
            match attr.name.local.as_str() {
                "id" => {
                    if let Some(ids) = &mut self.ids {
                        ids.insert(attr.value.clone());
                    }
                }
                "class" => {
                    if let Some(classes) = &mut self.classes {
                        classes.extend(attr.value.split_whitespace().map(String::from));
                    }
                }
                name if name.starts_with("on") => self.safe = false,
                _ => {}
            }
        }

        for child in elem.child_elements() {
            self.record(child);
        }
    }

    /// Whether every id, class and tag named by `selector` occurs.
    fn selector_used(&self, selector: &str) -> bool {
        let mut rest = selector;
        let mut compound_start = true;
        let mut depth = 0usize;

        while let Some(c) = rest.chars().next() {
            match c {
                '(' => {
                    depth += 1;
                    rest = &rest[1..];
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    rest = &rest[1..];
                }
                // Arguments of :not(), :nth-child() and friends.
                _ if depth > 0 => rest = &rest[c.len_utf8()..],
                '[' => rest = rest.find(']').map_or("", move |i| &rest[i + 1..]),
                '#' | '.' => {
                    let (name, tail) = ident(&rest[1..]);
                    let set = if c == '#' { &self.ids } else { &self.classes };
                    if !tracked_contains(set, name) {
                        return false;
                    }
                    rest = tail;
                    compound_start = false;
                }
                ':' => {
                    let (_, tail) = ident(rest.trim_start_matches(':'));
                    rest = tail;
                    compound_start = false;
                }
                c if c.is_whitespace() || matches!(c, '>' | '+' | '~') => {
                    rest = &rest[c.len_utf8()..];
                    compound_start = true;
                }
                _ if compound_start => {
                    let (name, tail) = ident(rest);
                    if name.is_empty() {
                        rest = &rest[c.len_utf8()..];
                    } else {
                        if !tracked_contains(&self.tags, name) {
                            return false;
                        }
                        rest = tail;
                    }
                    compound_start = false;
                }
                _ => rest = &rest[c.len_utf8()..],
            }
        }
        true
    }
}

fn tracked_contains(set: &Option<BTreeSet<String>>, name: &str) -> bool {
    set.as_ref().is_none_or(|s| s.contains(name))
}

fn ident(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()))
        .unwrap_or(s.len());
    s.split_at(end)
}

enum Rule {
    Style {
        selectors: Vec<String>,
        declarations: Vec<(String, String)>,
    },
    /// `@media` and `@supports` blocks, which hold further rules.
    Group { prelude: String, rules: Vec<Rule> },
    /// Any other at-rule, kept as written apart from whitespace.
    Raw(String),
}

/// Minify a stylesheet, dropping rules `usage` proves unused.
pub fn minify_stylesheet(css: &str, usage: Option<&UsageData>) -> String {
    let css = COMMENTS.replace_all(css, "");
    let mut rules = Parser { src: &css, pos: 0 }.rules(false);
    if let Some(usage) = usage {
        retain_used(&mut rules, usage);
    }

    let mut out = String::new();
    write_rules(&rules, &mut out);
    out
}

fn retain_used(rules: &mut [Rule], usage: &UsageData) {
    for rule in rules {
        match rule {
            Rule::Style { selectors, .. } => selectors.retain(|s| usage.selector_used(s)),
            Rule::Group { rules, .. } => retain_used(rules, usage),
            Rule::Raw(_) => {}
        }
    }
}

fn write_rules(rules: &[Rule], out: &mut String) {
    for rule in rules {
        match rule {
            Rule::Style {
                selectors,
                declarations,
            } => {
                if selectors.is_empty() || declarations.is_empty() {
                    continue;
                }
                out.push_str(&selectors.join(","));
                out.push('{');
                out.push_str(&join_declarations(declarations));
                out.push('}');
            }
            Rule::Group { prelude, rules } => {
                let mut inner = String::new();
                write_rules(rules, &mut inner);
                if !inner.is_empty() {
                    out.push_str(prelude);
                    out.push('{');
                    out.push_str(&inner);
                    out.push('}');
                }
            }
            Rule::Raw(raw) => out.push_str(raw),
        }
    }
}

/// Minify a `style` attribute, dropping declarations that restate defaults.
/// Inline declarations outrank stylesheets and the element's own attributes,
/// so a default is only dropped when neither could take its place.
fn minify_declarations(elem: &Element, style: &str, cascade: &Cascade) -> String {
    let declarations: Vec<_> = parse_declarations(style)
        .into_iter()
        .filter(|(property, value)| {
            cascade.styled()
                || elem.has_attr(property)
                || !cascade.is_redundant(&elem.name.local, property, value)
        })
        .collect();
    join_declarations(&declarations)
}

fn join_declarations(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(property, value)| format!("{property}:{value}"))
        .collect::<Vec<_>>()
        .join(";")
}

pub(super) fn parse_declarations(body: &str) -> Vec<(String, String)> {
    split_top_level(body, ';')
        .into_iter()
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim();
            let value = collapse_whitespace(value).replace(" !important", "!important");
            (!property.is_empty() && !value.is_empty()).then(|| (property.to_string(), value))
        })
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split on `sep` outside of quotes and parentheses.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, c) if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn rules(&mut self, nested: bool) -> Vec<Rule> {
        let mut rules = Vec::new();
        loop {
            let (prelude, stop) = self.until(&['{', ';', '}']);
            let prelude = collapse_whitespace(prelude);

            match stop {
                Some('{') if is_group(&prelude) => {
                    let inner = self.rules(true);
                    rules.push(Rule::Group {
                        prelude,
                        rules: inner,
                    });
                }
                Some('{') if prelude.starts_with('@') => {
                    let body = collapse_whitespace(self.block_body());
                    let body = BLOCK_PUNCTUATION.replace_all(&body, "$1");
                    rules.push(Rule::Raw(format!("{prelude}{{{body}}}")));
                }
                Some('{') => {
                    let declarations = parse_declarations(self.block_body());
                    let selectors = split_top_level(&prelude, ',')
                        .into_iter()
                        .map(|s| COMBINATOR.replace_all(s.trim(), "$1").into_owned())
                        .filter(|s| !s.is_empty())
                        .collect();
                    rules.push(Rule::Style {
                        selectors,
                        declarations,
                    });
                }
                Some(';') => {
                    if prelude.starts_with('@') {
                        rules.push(Rule::Raw(format!("{prelude};")));
                    }
                }
                Some(_) => {
                    if nested {
                        break;
                    }
                }
                None => break,
            }
        }
        rules
    }

    /// Consume up to and including the first of `stops` outside quotes and
    /// parentheses. Returns the text before it.
    fn until(&mut self, stops: &[char]) -> (&'a str, Option<char>) {
        let rest = self.rest();
        let mut depth = 0usize;
        let mut quote = None;

        for (i, c) in rest.char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => depth = depth.saturating_sub(1),
                (None, c) if depth == 0 && stops.contains(&c) => {
                    self.pos += i + c.len_utf8();
                    return (&rest[..i], Some(c));
                }
                _ => {}
            }
        }
        self.pos = self.src.len();
        (rest, None)
    }

    /// Consume a block body through its matching `}`.
    fn block_body(&mut self) -> &'a str {
        let rest = self.rest();
        let mut depth = 0usize;
        let mut quote = None;

        for (i, c) in rest.char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '{') => depth += 1,
                (None, '}') if depth == 0 => {
                    self.pos += i + 1;
                    return &rest[..i];
                }
                (None, '}') => depth -= 1,
                _ => {}
            }
        }
        self.pos = self.src.len();
        rest
    }
}

fn is_group(prelude: &str) -> bool {
    ["@media", "@supports", "@document"]
        .iter()
        .any(|at| prelude.starts_with(at))
}
