//! # Templates
//!
//! Parameterized request bodies: resolving template references to data
//! objects and rendering bodies against them.

pub mod dialect;
mod helpers;
pub mod normalize;
pub mod renderer;
pub mod resolver;

pub use renderer::{build_values, BodyRenderer, RenderError};
pub use resolver::{NamespacePolicy, ReferenceResolver, ResolveError};
