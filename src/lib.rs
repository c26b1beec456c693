//! svag - An SVG optimizer
//!
//! svag runs an SVG document through a configurable pipeline of passes,
//! optionally repeating the pipeline while the output keeps shrinking.
//!
//! ```no_run
//! use svag::{Optimizer, UserConfig};
//!
//! let config = UserConfig::from_json_str(r#"{"multipass": true, "plugins": ["sortAttrs"]}"#)?;
//! let optimizer = Optimizer::new(&config)?;
//! let output = optimizer.optimize(r#"<svg><g><rect/></g></svg>"#, None)?;
//! println!("{} ({} runs)", output.data, output.runs);
//! # Ok::<(), svag::SvagError>(())
//! ```

mod ast;
mod config;
mod custom;
mod error;
mod number;
mod optimize;
mod parse;
mod path;
mod pipeline;
pub mod plugins;
mod serialize;

pub use ast::*;
pub use config::*;
pub use custom::*;
pub use error::*;
pub use optimize::*;
pub use parse::*;
pub use path::{Segment, parse_path, serialize_path};
pub use pipeline::*;
pub use serialize::*;

/// Minify an SVG string with the default pipeline.
pub fn minify(svg: &str) -> Result<String, SvagError> {
    minify_with_config(svg, &UserConfig::default())
}

/// Minify an SVG string with a custom configuration.
pub fn minify_with_config(svg: &str, config: &UserConfig) -> Result<String, SvagError> {
    Ok(Optimizer::new(config)?.optimize(svg, None)?.data)
}
