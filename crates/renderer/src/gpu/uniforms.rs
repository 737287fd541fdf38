use std::num::NonZeroU64;

use tracing::warn;

use crate::compile::{UniformBlock, UniformLocation};

const STD140_BLOCK_ALIGN: u32 = 16;

/// CPU copy of one uniform block; only uploaded when something changed.
#[derive(Debug, Clone)]
pub(crate) struct StagedBlock {
    group: u32,
    binding: u32,
    bytes: Vec<u8>,
    dirty: bool,
}

impl StagedBlock {
    pub fn new(block: &UniformBlock) -> Self {
        let size = block.size.max(4).next_multiple_of(STD140_BLOCK_ALIGN) as usize;
        Self {
            group: block.group,
            binding: block.binding,
            bytes: vec![0; size],
            dirty: true,
        }
    }

    pub fn slot(&self) -> (u32, u32) {
        (self.group, self.binding)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Copies `values` to `offset`; returns false when they do not fit.
    pub fn write(&mut self, offset: u32, values: &[f32]) -> bool {
        let data: &[u8] = bytemuck::cast_slice(values);
        let start = offset as usize;
        let Some(target) = self.bytes.get_mut(start..start + data.len()) else {
            return false;
        };
        if target != data {
            target.copy_from_slice(data);
            self.dirty = true;
        }
        true
    }

    /// Bytes to upload, if any write landed since the last call.
    pub fn take_dirty(&mut self) -> Option<&[u8]> {
        if std::mem::take(&mut self.dirty) {
            Some(&self.bytes)
        } else {
            None
        }
    }
}

struct UniformBuffer {
    staged: StagedBlock,
    buffer: wgpu::Buffer,
}

/// Uniform buffers, bind group layouts and bind groups for one program.
///
/// Layouts cover every group from 0 to the highest one used so the
/// pipeline layout can index them directly; unused groups get an empty
/// layout and bind group.
pub(crate) struct ProgramUniforms {
    buffers: Vec<UniformBuffer>,
    layouts: Vec<wgpu::BindGroupLayout>,
    bind_groups: Vec<wgpu::BindGroup>,
}

impl ProgramUniforms {
    pub fn new(device: &wgpu::Device, blocks: &[UniformBlock]) -> Self {
        let buffers: Vec<UniformBuffer> = blocks
            .iter()
            .map(|block| {
                let staged = StagedBlock::new(block);
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("uniform buffer"),
                    size: staged.size(),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                UniformBuffer { staged, buffer }
            })
            .collect();

        let group_count = blocks
            .iter()
            .map(|block| block.group + 1)
            .max()
            .unwrap_or(0);
        let mut layouts = Vec::with_capacity(group_count as usize);
        let mut bind_groups = Vec::with_capacity(group_count as usize);
        for group in 0..group_count {
            let members: Vec<&UniformBuffer> = buffers
                .iter()
                .filter(|uniform| uniform.staged.group == group)
                .collect();
            let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = members
                .iter()
                .map(|uniform| wgpu::BindGroupLayoutEntry {
                    binding: uniform.staged.binding,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(uniform.staged.size()),
                    },
                    count: None,
                })
                .collect();
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("uniform layout"),
                entries: &layout_entries,
            });
            let entries: Vec<wgpu::BindGroupEntry> = members
                .iter()
                .map(|uniform| wgpu::BindGroupEntry {
                    binding: uniform.staged.binding,
                    resource: uniform.buffer.as_entire_binding(),
                })
                .collect();
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("uniform bind group"),
                layout: &layout,
                entries: &entries,
            });
            layouts.push(layout);
            bind_groups.push(bind_group);
        }

        Self {
            buffers,
            layouts,
            bind_groups,
        }
    }

    pub fn layouts(&self) -> Vec<&wgpu::BindGroupLayout> {
        self.layouts.iter().collect()
    }

    pub fn bind_groups(&self) -> impl Iterator<Item = (u32, &wgpu::BindGroup)> {
        self.bind_groups
            .iter()
            .enumerate()
            .map(|(group, bind_group)| (group as u32, bind_group))
    }

    pub fn write(&mut self, location: &UniformLocation, values: &[f32]) {
        let slot = (location.group, location.binding);
        let written = self
            .buffers
            .iter_mut()
            .find(|uniform| uniform.staged.slot() == slot)
            .is_some_and(|uniform| uniform.staged.write(location.offset, values));
        if !written {
            warn!(?location, "uniform write outside any bound block ignored");
        }
    }

    pub fn flush(&mut self, queue: &wgpu::Queue) {
        for uniform in &mut self.buffers {
            if let Some(bytes) = uniform.staged.take_dirty() {
                queue.write_buffer(&uniform.buffer, 0, bytes);
            }
        }
    }
}
