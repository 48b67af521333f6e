//! Declarative description of a graph resource.

use ash::vk;

/// Whether a resource is rendered to as a color or a depth attachment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRole {
    Color,
    Depth,
}

/// One of the samplers owned by the graph. See [`Graph::sampler()`](crate::Graph::sampler).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    /// Linear filtering, clamp to edge, depth compare enabled.
    Depth,
    /// Linear filtering, clamp to edge.
    ColorClamped,
    /// Linear filtering, repeating address mode.
    ColorRepeated,
}

/// Describes one logical image in the graph. Register it with [`Graph::new_resource()`](crate::Graph::new_resource).
///
/// An extent of `0x0` makes the resource screen-relative: it tracks the output extent of the graph and is rebuilt on
/// every [`Graph::resize()`](crate::Graph::resize).
///
/// # Example
/// ```
/// # use whisper_graph::prelude::*;
/// let shadow_map = ResourceDescriptor::depth("shadow_map", vk::Format::D32_SFLOAT)
///     .extent(2048, 2048)
///     .sampler(SamplerKind::Depth);
/// assert!(!shadow_map.is_screen_relative());
/// ```
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ResourceDescriptor {
    /// Debug name, used for every GPU object backing this resource.
    pub name: String,
    pub format: vk::Format,
    /// Explicit extent, or `0x0` to follow the graph's output extent.
    pub extent: vk::Extent2D,
    /// Value this resource is cleared to at the start of every pass that writes it.
    #[derivative(Debug = "ignore")]
    pub clear: vk::ClearValue,
    pub role: ResourceRole,
    /// Sampler used when the resource is read. Defaults by role when not set.
    pub sampler: Option<SamplerKind>,
}

impl ResourceDescriptor {
    /// A screen-relative color resource, cleared to opaque black.
    pub fn color(name: impl Into<String>, format: vk::Format) -> Self {
        Self {
            name: name.into(),
            format,
            extent: vk::Extent2D::default(),
            clear: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            role: ResourceRole::Color,
            sampler: None,
        }
    }

    /// A screen-relative depth resource, cleared to a depth of `1.0`.
    pub fn depth(name: impl Into<String>, format: vk::Format) -> Self {
        Self {
            name: name.into(),
            format,
            extent: vk::Extent2D::default(),
            clear: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
            role: ResourceRole::Depth,
            sampler: None,
        }
    }

    pub fn extent(mut self, width: u32, height: u32) -> Self {
        self.extent = vk::Extent2D {
            width,
            height,
        };
        self
    }

    pub fn clear(mut self, clear: vk::ClearValue) -> Self {
        self.clear = clear;
        self
    }

    pub fn sampler(mut self, kind: SamplerKind) -> Self {
        self.sampler = Some(kind);
        self
    }

    /// True if this resource follows the output extent of the graph.
    pub fn is_screen_relative(&self) -> bool {
        self.extent.width == 0 && self.extent.height == 0
    }

    /// The sampler this resource is read through.
    pub fn sampler_kind(&self) -> SamplerKind {
        self.sampler.unwrap_or(match self.role {
            ResourceRole::Color => SamplerKind::ColorClamped,
            ResourceRole::Depth => SamplerKind::Depth,
        })
    }

    pub(crate) fn aspect(&self) -> vk::ImageAspectFlags {
        match self.role {
            ResourceRole::Color => vk::ImageAspectFlags::COLOR,
            ResourceRole::Depth => vk::ImageAspectFlags::DEPTH,
        }
    }
}
