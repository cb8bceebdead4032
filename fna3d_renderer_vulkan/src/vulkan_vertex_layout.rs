/// Vertex input layouts keyed by (vertex shader, vertex declarations)
///
/// A layout's index is what pipeline keys store, so two draws with the same
/// declarations and vertex shader share pipelines.

use ash::vk;
use rustc_hash::FxHashMap;
use fna3d::fna3d::render::{VertexBufferBinding, VertexDeclaration, VertexElementUsage};
use fna3d::engine_warn;

use crate::mojoshader::ShaderHandle;
use crate::vulkan_format::vertex_format_to_vk;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VertexLayoutKey {
    vertex_shader: ShaderHandle,
    streams: Vec<(VertexDeclaration, i32)>,
}

#[derive(Debug, Clone, Default)]
pub struct VertexInputLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

/// Build the binding and attribute descriptions for a set of vertex streams
///
/// `location` maps an element usage to the shader input it feeds; elements
/// the shader does not read are left out.
pub fn build_vertex_input_layout(
    streams: &[VertexBufferBinding],
    location: impl Fn(VertexElementUsage, u32) -> Option<u32>,
) -> VertexInputLayout {
    let mut layout = VertexInputLayout::default();
    let mut used = Vec::new();

    for (binding, stream) in streams.iter().enumerate() {
        let input_rate = if stream.instance_frequency > 0 {
            vk::VertexInputRate::INSTANCE
        } else {
            vk::VertexInputRate::VERTEX
        };
        layout.bindings.push(
            vk::VertexInputBindingDescription::default()
                .binding(binding as u32)
                .stride(stream.vertex_declaration.vertex_stride)
                .input_rate(input_rate),
        );

        for element in &stream.vertex_declaration.elements {
            if used.contains(&(element.usage, element.usage_index)) {
                engine_warn!("fna3d::vulkan",
                    "Vertex element {:?}{} declared twice, ignoring the duplicate",
                    element.usage, element.usage_index);
                continue;
            }
            used.push((element.usage, element.usage_index));

            let Some(location) = location(element.usage, element.usage_index) else {
                continue;
            };
            layout.attributes.push(
                vk::VertexInputAttributeDescription::default()
                    .location(location)
                    .binding(binding as u32)
                    .format(vertex_format_to_vk(element.format))
                    .offset(element.offset),
            );
        }
    }

    layout
}

#[derive(Default)]
pub struct VertexInputLayoutCache {
    indices: FxHashMap<VertexLayoutKey, u32>,
    layouts: Vec<VertexInputLayout>,
}

impl VertexInputLayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the layout for these streams, building it on first use
    pub fn fetch_or_build(
        &mut self,
        vertex_shader: ShaderHandle,
        streams: &[VertexBufferBinding],
        location: impl Fn(VertexElementUsage, u32) -> Option<u32>,
    ) -> u32 {
        let key = VertexLayoutKey {
            vertex_shader,
            streams: streams
                .iter()
                .map(|stream| (stream.vertex_declaration.clone(), stream.instance_frequency))
                .collect(),
        };
        if let Some(&index) = self.indices.get(&key) {
            return index;
        }

        let index = self.layouts.len() as u32;
        self.layouts.push(build_vertex_input_layout(streams, location));
        self.indices.insert(key, index);
        index
    }

    pub fn layout(&self, index: u32) -> Option<&VertexInputLayout> {
        self.layouts.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

#[cfg(test)]
#[path = "vulkan_vertex_layout_tests.rs"]
mod tests;
