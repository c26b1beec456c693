//! User-supplied passes.
//!
//! A custom pass is a closure over the whole document. It runs wherever its
//! entry sits in the plugin list and is always scheduled as a whole-document
//! pass, whatever it does internally.

use std::fmt;
use std::sync::Arc;

use crate::ast::Document;
use crate::error::{BoxError, PassError};
use crate::plugins::{Params, PassInfo};

type Body = dyn Fn(&mut Document, &Params, &PassInfo) -> Result<(), BoxError> + Send + Sync;

/// An opaque, cheaply clonable handle to a transformation function.
#[derive(Clone)]
pub struct CustomPass {
    body: Arc<Body>,
}

impl CustomPass {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut Document, &Params, &PassInfo) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
        }
    }

    /// Run the body, attributing any failure to `name`.
    pub(crate) fn run(
        &self,
        name: &str,
        doc: &mut Document,
        params: &Params,
        info: &PassInfo,
    ) -> Result<(), PassError> {
        (self.body)(doc, params, info).map_err(|source| PassError::new(name, None, source))
    }
}

impl fmt::Debug for CustomPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomPass(..)")
    }
}

/// A custom pass together with the parameters it is handed on every run.
#[derive(Debug, Clone)]
pub struct CustomPlugin {
    pub pass: CustomPass,
    pub params: Params,
}

impl CustomPlugin {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut Document, &Params, &PassInfo) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            pass: CustomPass::new(body),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}
