//! Descriptor set management that lives outside the graph.
//!
//! The graph allocates descriptor sets for its own resources and uniform buffers. Anything else a pass wants to bind,
//! such as material textures, goes through [`static_textures`].

pub mod static_textures;
