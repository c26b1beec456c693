use std::fmt;

use thiserror::Error;

/// Boxed error returned by pass bodies; the executor attaches the pass name
/// and node path before it reaches the caller.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum SvagError {
    #[error("XML parsing error: {0}")]
    XmlParse(#[from] quick_xml::Error),

    #[error("Invalid SVG: {0}")]
    InvalidSvg(String),

    #[error("Invalid path data: {0}")]
    InvalidPath(String),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pass(#[from] PassError),
}

/// A configuration that cannot produce a pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid plugins list: 'plugins' in config should be an array")]
    InvalidPluginList,

    #[error("Invalid value for '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("Invalid params for plugin '{pass}': {source}")]
    InvalidParams {
        pass: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not read config: {0}")]
    Io(#[from] std::io::Error),
}

/// Non-fatal configuration problems. Resolution skips the offending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// `name: null`, usually a badly indented config file.
    MissingDefinition(String),
    /// The name matches neither a builtin pass nor a custom definition.
    UnknownPlugin(String),
    /// The entry is neither a name, a toggle, nor a params object.
    UnsupportedEntry(String),
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::MissingDefinition(name) => {
                write!(f, "plugin '{name}' is misconfigured: its definition is empty")
            }
            ConfigWarning::UnknownPlugin(name) => write!(f, "unknown plugin '{name}'"),
            ConfigWarning::UnsupportedEntry(name) => {
                write!(f, "plugin '{name}' has an unsupported definition")
            }
        }
    }
}

/// A pass failed while transforming the document.
#[derive(Debug, Error)]
#[error("plugin '{pass}' failed{}: {source}", at(.path))]
pub struct PassError {
    /// Name of the pass as it appears in the resolved pipeline.
    pub pass: String,
    /// Node path at the time of failure, e.g. `/svg/g[1]/path[0]`.
    pub path: Option<String>,
    #[source]
    pub source: BoxError,
}

impl PassError {
    pub fn new(pass: impl Into<String>, path: Option<String>, source: impl Into<BoxError>) -> Self {
        Self {
            pass: pass.into(),
            path,
            source: source.into(),
        }
    }
}

fn at(path: &Option<String>) -> String {
    match path {
        Some(path) => format!(" at {path}"),
        None => String::new(),
    }
}
