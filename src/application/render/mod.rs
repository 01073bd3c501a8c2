//! Renderer seam: the trait workers call, its per-call settings, and the
//! command-line adapter used in production.

mod command;
mod profile;
mod types;

pub use command::CommandRenderer;
pub use profile::RenderProfile;
pub use types::{RenderError, RenderInvocation, Renderer};
