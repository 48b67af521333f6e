//! Graphics pipelines for graph passes.
//!
//! Every pass gets exactly one pipeline, built from the vertex and fragment shader named in its
//! [`PassDescriptor`](crate::PassDescriptor). Shader code is obtained through a [`ShaderLoader`](shader::ShaderLoader),
//! [`ShaderDirectory`](shader::ShaderDirectory) loads SPIR-V binaries from disk.
//!
//! The fixed function state is that of a simple forward pass: triangle lists, back face culling with counter-clockwise
//! front faces, no blending, and dynamic viewport and scissor state. Depth testing and writing are enabled only for passes
//! that write a depth resource.

pub mod shader;

pub(crate) mod builder;
