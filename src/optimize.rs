//! The optimizer: resolution, grouping and the multipass loop.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::ast::Document;
use crate::config::{DataUri, ResolvedConfig, UserConfig, resolve};
use crate::error::{ConfigWarning, PassError, SvagError};
use crate::parse::parse_svg;
use crate::pipeline::{PassGroup, execute, group};
use crate::plugins::PassInfo;
use crate::serialize::serialize;

/// Result of one optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Serialized document, wrapped in a data URI when configured.
    pub data: String,
    /// Pipeline runs performed, including a final one that did not help.
    pub runs: usize,
    pub warnings: Vec<ConfigWarning>,
}

/// A resolved, grouped pipeline. Build once and reuse across documents and
/// threads; nothing in it changes while optimizing.
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: ResolvedConfig,
    groups: Vec<PassGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running { run: usize },
    Comparing { run: usize },
    Done,
}

impl Optimizer {
    pub fn new(config: &UserConfig) -> Result<Self, SvagError> {
        Ok(Self::from_resolved(resolve(config)?))
    }

    pub fn from_resolved(config: ResolvedConfig) -> Self {
        let groups = group(&config.plugins);
        Self { config, groups }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn groups(&self) -> &[PassGroup] {
        &self.groups
    }

    /// Optimize `svg`. `path` is handed to passes as context only.
    pub fn optimize(&self, svg: &str, path: Option<&Path>) -> Result<Output, SvagError> {
        let mut doc = parse_svg(svg)?;
        let (data, runs) = self.run(&mut doc, path)?;
        let data = match self.config.datauri {
            Some(kind) => encode_data_uri(&data, kind),
            None => data,
        };
        Ok(Output {
            data,
            runs,
            warnings: self.config.warnings.clone(),
        })
    }

    /// Run the pipeline until the serialization stops shrinking or the run
    /// budget is spent. `doc` is left as the returned serialization
    /// describes it.
    pub fn run(&self, doc: &mut Document, path: Option<&Path>) -> Result<(String, usize), PassError> {
        let max_runs = self.config.multipass.max_runs();
        let mut best = String::new();
        let mut snapshot: Option<Document> = None;
        let mut runs = 0;
        let mut state = State::Idle;

        while state != State::Done {
            state = match state {
                State::Idle => State::Running { run: 0 },
                State::Running { run } => {
                    if run > 0 {
                        snapshot = Some(doc.clone());
                    }
                    let info = PassInfo {
                        path: path.map(Path::to_path_buf),
                        multipass_count: run,
                    };
                    execute(&self.groups, doc, &info)?;
                    runs = run + 1;
                    State::Comparing { run }
                }
                State::Comparing { run } => {
                    let output = serialize(doc, &self.config.js2svg);
                    if run == 0 || output.len() < best.len() {
                        tracing::debug!(run, bytes = output.len(), "pipeline run finished");
                        best = output;
                        if run + 1 < max_runs {
                            State::Running { run: run + 1 }
                        } else {
                            if max_runs > 1 {
                                tracing::debug!(max_runs, "multipass budget spent");
                            }
                            State::Done
                        }
                    } else {
                        if output != best
                            && let Some(previous) = snapshot.take()
                        {
                            *doc = previous;
                        }
                        tracing::debug!(run, "no further gain, stopping");
                        State::Done
                    }
                }
                State::Done => State::Done,
            };
        }

        Ok((best, runs))
    }
}

fn encode_data_uri(svg: &str, kind: DataUri) -> String {
    const PREFIX: &str = "data:image/svg+xml";
    match kind {
        DataUri::Base64 => format!("{PREFIX};base64,{}", STANDARD.encode(svg)),
        DataUri::Enc => format!("{PREFIX},{}", encode_uri_component(svg)),
        DataUri::Unenc => format!("{PREFIX},{svg}"),
    }
}

/// Percent-encode everything but `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
fn encode_uri_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(char::from(byte)),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Multipass, PluginEntry};
    use crate::custom::CustomPlugin;
    use crate::plugins::Params;

    fn full(entries: Vec<PluginEntry>, multipass: Multipass) -> UserConfig {
        UserConfig {
            full: true,
            plugins: Some(entries),
            multipass,
            ..Default::default()
        }
    }

    fn custom(name: &str, plugin: CustomPlugin) -> PluginEntry {
        PluginEntry::Custom(name.into(), plugin)
    }

    /// Drops the first child element, once per run, while any are left.
    fn drop_first_child() -> CustomPlugin {
        CustomPlugin::new(|doc, _, _| {
            if let Some(i) = doc.root.children.iter().position(|c| c.as_element().is_some()) {
                doc.root.children.remove(i);
            }
            Ok(())
        })
    }

    #[test]
    fn test_single_run_without_multipass() {
        let config = full(vec![custom("drop", drop_first_child())], Multipass::Off);
        let output = Optimizer::new(&config)
            .unwrap()
            .optimize("<svg><a/><b/><c/></svg>", None)
            .unwrap();
        assert_eq!(output.data, "<svg><b/><c/></svg>");
        assert_eq!(output.runs, 1);
    }

    #[test]
    fn test_stops_when_output_is_stable() {
        let config = full(vec![custom("drop", drop_first_child())], Multipass::Runs(10));
        let output = Optimizer::new(&config)
            .unwrap()
            .optimize("<svg><a/></svg>", None)
            .unwrap();
        assert_eq!(output.data, "<svg/>");
        assert_eq!(output.runs, 2);
    }

    #[test]
    fn test_respects_run_budget() {
        let config = full(vec![custom("drop", drop_first_child())], Multipass::Runs(3));
        let output = Optimizer::new(&config)
            .unwrap()
            .optimize("<svg><a/><b/><c/><d/><e/></svg>", None)
            .unwrap();
        assert_eq!(output.data, "<svg><d/><e/></svg>");
        assert_eq!(output.runs, 3);
    }

    #[test]
    fn test_never_returns_a_larger_result() {
        // Shrinks on the first run, then grows on every later one.
        let grow = CustomPlugin::new(|doc, _, info| {
            if info.multipass_count == 0 {
                doc.root.children.clear();
            } else {
                doc.root.set_attr("class", "x".repeat(info.multipass_count * 10));
            }
            Ok(())
        });
        let optimizer = Optimizer::new(&full(vec![custom("grow", grow)], Multipass::Runs(5))).unwrap();

        let mut doc = parse_svg("<svg><rect/></svg>").unwrap();
        let (data, runs) = optimizer.run(&mut doc, None).unwrap();
        assert_eq!(data, "<svg/>");
        assert_eq!(runs, 2);
        // The tree is rolled back to match the returned text.
        assert_eq!(serialize(&doc, &Default::default()), data);
    }

    #[test]
    fn test_same_size_but_different_output_is_rolled_back() {
        let flip = CustomPlugin::new(|doc, _, info| {
            let value = if info.multipass_count % 2 == 0 { "a" } else { "b" };
            doc.root.set_attr("id", value);
            Ok(())
        });
        let optimizer = Optimizer::new(&full(vec![custom("flip", flip)], Multipass::Runs(4))).unwrap();

        let mut doc = parse_svg("<svg/>").unwrap();
        let (data, runs) = optimizer.run(&mut doc, None).unwrap();
        assert_eq!(data, r#"<svg id="a"/>"#);
        assert_eq!(runs, 2);
        assert_eq!(doc.root.get_attr("id"), Some("a"));
    }

    #[test]
    fn test_pass_info_carries_path() {
        let check = CustomPlugin::new(|doc, _, info| {
            let name = info
                .path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            doc.root.set_attr("data-file", name);
            Ok(())
        });
        let optimizer = Optimizer::new(&full(vec![custom("check", check)], Multipass::Off)).unwrap();
        let output = optimizer
            .optimize("<svg/>", Some(Path::new("icons/star.svg")))
            .unwrap();
        assert_eq!(output.data, r#"<svg data-file="star.svg"/>"#);
    }

    #[test]
    fn test_pass_failure_aborts() {
        let fail = CustomPlugin::new(|_, _, _| Err("nope".into()));
        let optimizer = Optimizer::new(&full(vec![custom("fail", fail)], Multipass::Off)).unwrap();
        let err = optimizer.optimize("<svg/>", None).unwrap_err();
        assert!(matches!(err, SvagError::Pass(ref e) if e.pass == "fail"));
    }

    #[test]
    fn test_custom_params_reach_the_body() {
        let mut params = Params::new();
        params.insert("id".into(), "logo".into());
        let set_id = CustomPlugin::new(|doc, params, _| {
            if let Some(id) = params.get("id").and_then(|v| v.as_str()) {
                doc.root.set_attr("id", id);
            }
            Ok(())
        })
        .with_params(params);
        let optimizer = Optimizer::new(&full(vec![custom("setId", set_id)], Multipass::Off)).unwrap();
        assert_eq!(optimizer.optimize("<svg/>", None).unwrap().data, r#"<svg id="logo"/>"#);
    }

    #[test]
    fn test_data_uri_encodings() {
        let svg = r#"<svg a="1 2"/>"#;
        assert_eq!(
            encode_data_uri(svg, DataUri::Base64),
            "data:image/svg+xml;base64,PHN2ZyBhPSIxIDIiLz4="
        );
        assert_eq!(
            encode_data_uri(svg, DataUri::Enc),
            "data:image/svg+xml,%3Csvg%20a%3D%221%202%22%2F%3E"
        );
        assert_eq!(encode_data_uri(svg, DataUri::Unenc), "data:image/svg+xml,<svg a=\"1 2\"/>");
    }

    #[test]
    fn test_encode_uri_component_utf8() {
        assert_eq!(encode_uri_component("é (x)"), "%C3%A9%20(x)");
    }

    #[test]
    fn test_optimizer_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Optimizer>();
    }
}
