//! Exposes the structs used to store graph construction parameters.

/// Construction parameters for a [`Graph`](crate::Graph).
///
/// # Example
/// ```
/// # use whisper_graph::*;
/// let settings = GraphBuilder::new()
///     .name("main")
///     .extent(1280, 720)
///     .ubo_size(256)
///     .build();
/// assert_eq!(settings.ubo_size, Some(256));
/// ```
#[derive(Debug, Clone)]
pub struct GraphSettings {
    /// Prefix used when naming every GPU object the graph creates.
    pub name: String,
    /// Initial output width. Screen-relative resources are sized to this.
    pub width: u32,
    /// Initial output height.
    pub height: u32,
    /// Size in bytes of the per-frame uniform buffer. Required when any compiled pass reads the uniform.
    pub ubo_size: Option<usize>,
    /// Capacity of the descriptor pool backing sampled resources, in descriptor sets.
    pub max_sampler_sets: u32,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            name: String::from("graph"),
            width: 0,
            height: 0,
            ubo_size: None,
            max_sampler_sets: 500,
        }
    }
}

/// Used to easily construct [`GraphSettings`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    inner: GraphSettings,
}

impl GraphBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug name of the graph.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Set the initial output extent.
    pub fn extent(mut self, width: u32, height: u32) -> Self {
        self.inner.width = width;
        self.inner.height = height;
        self
    }

    /// Set the uniform buffer size in bytes.
    pub fn ubo_size(mut self, size: usize) -> Self {
        self.inner.ubo_size = Some(size);
        self
    }

    pub fn max_sampler_sets(mut self, count: u32) -> Self {
        self.inner.max_sampler_sets = count;
        self
    }

    pub fn build(self) -> GraphSettings {
        self.inner
    }
}
