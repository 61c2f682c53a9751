use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2};
use wgpu::util::DeviceExt;

/// Quad vertex: position in window pixels (top-left origin), UV coords.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2,  // position
        1 => Float32x2,  // uv
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Uniform block shared by both shader stages. 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Globals {
    pub screen_size: [f32; 2],
    pub opacity: f32,
    pub _pad: f32,
}

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Frames are premultiplied in their stored (gamma) encoding, so the texture
/// must not be sRGB or sampling would linearize after the multiply.
pub const SPRITE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Quad of `sprite` size centered in a `screen` sized surface.
pub fn centered_quad(screen: UVec2, sprite: UVec2) -> [Vertex; 4] {
    let min = ((screen.as_vec2() - sprite.as_vec2()) * 0.5).floor();
    let max = min + sprite.as_vec2();
    let corner = |p: Vec2, uv: [f32; 2]| Vertex {
        position: p.into(),
        uv,
    };
    [
        corner(Vec2::new(min.x, min.y), [0.0, 0.0]), // top-left
        corner(Vec2::new(max.x, min.y), [1.0, 0.0]), // top-right
        corner(Vec2::new(max.x, max.y), [1.0, 1.0]), // bottom-right
        corner(Vec2::new(min.x, max.y), [0.0, 1.0]), // bottom-left
    ]
}

/// GPU resources for drawing the companion's current frame.
pub struct SpritePipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub globals_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
    texture_size: UVec2,
    /// (asset identity, frame index) of the uploaded frame.
    uploaded: Option<(usize, usize)>,
}

impl SpritePipeline {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/sprite.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // Render pipeline, premultiplied alpha blending
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sprite_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sprite_vertex_buffer"),
            size: (4 * std::mem::size_of::<Vertex>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sprite_index_buffer"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        // Initialized to 1x1 opaque, updated on resize / settings load
        let globals_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sprite_globals_buffer"),
            contents: bytemuck::bytes_of(&Globals {
                screen_size: [1.0, 1.0],
                opacity: 1.0,
                _pad: 0.0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sprite_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let texture_size = UVec2::ONE;
        let texture = create_texture(device, texture_size);
        let bind_group = create_bind_group(device, &bind_group_layout, &globals_buffer, &texture, &sampler);

        Self {
            pipeline,
            vertex_buffer,
            index_buffer,
            globals_buffer,
            bind_group_layout,
            sampler,
            texture,
            bind_group,
            texture_size,
            uploaded: None,
        }
    }

    pub fn has_sprite(&self) -> bool {
        self.uploaded.is_some()
    }

    /// Forget the uploaded frame so nothing is drawn.
    pub fn clear_sprite(&mut self) {
        self.uploaded = None;
    }

    /// Upload premultiplied RGBA8 pixels unless `key` is already on the GPU.
    pub fn upload_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        screen: UVec2,
        key: (usize, usize),
        image: &image::RgbaImage,
    ) {
        if self.uploaded == Some(key) {
            return;
        }

        let size = UVec2::from(image.dimensions());
        if size.x == 0 || size.y == 0 {
            self.uploaded = None;
            return;
        }

        if size != self.texture_size {
            self.texture = create_texture(device, size);
            self.bind_group = create_bind_group(
                device,
                &self.bind_group_layout,
                &self.globals_buffer,
                &self.texture,
                &self.sampler,
            );
            self.texture_size = size;
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.x),
                rows_per_image: Some(size.y),
            },
            wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
        );

        self.write_quad(queue, screen);
        self.uploaded = Some(key);
    }

    /// Reposition the quad for a new surface size.
    pub fn write_quad(&self, queue: &wgpu::Queue, screen: UVec2) {
        let quad = centered_quad(screen, self.texture_size);
        queue.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&quad));
    }

    pub fn update_globals(&self, queue: &wgpu::Queue, screen: UVec2, opacity: f32) {
        let globals = Globals {
            screen_size: screen.as_vec2().into(),
            opacity,
            _pad: 0.0,
        };
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));
    }
}

fn create_texture(device: &wgpu::Device, size: UVec2) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("sprite_texture"),
        size: wgpu::Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: SPRITE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    globals: &wgpu::Buffer,
    texture: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("sprite_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: globals.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_is_centered() {
        let quad = centered_quad(UVec2::new(128, 128), UVec2::new(64, 32));
        assert_eq!(quad[0].position, [32.0, 48.0]);
        assert_eq!(quad[2].position, [96.0, 80.0]);
        assert_eq!(quad[3].uv, [0.0, 1.0]);
    }

    #[test]
    fn globals_block_is_16_bytes() {
        assert_eq!(std::mem::size_of::<Globals>(), 16);
    }
}
