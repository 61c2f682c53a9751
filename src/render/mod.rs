pub mod pipeline;

use std::sync::Arc;

use glam::UVec2;
use winit::window::Window;

use crate::sequencer::DisplayFrame;

use self::pipeline::SpritePipeline;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("failed to create wgpu surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter found: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create wgpu device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

/// Extra drawing layered over the sprite in the same frame.
pub trait Overlay {
    /// Upload resources. Returned command buffers are submitted before the frame.
    fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Vec<wgpu::CommandBuffer>;

    fn paint(&self, pass: &mut wgpu::RenderPass<'static>);

    /// Release per-frame resources after submission.
    fn finish(&mut self);
}

/// Surface format for premultiplied gamma-space pixels: the first non-sRGB
/// 8-bit format, so values reach the compositor exactly as blended.
pub fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    const PREFERRED: [wgpu::TextureFormat; 2] =
        [wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8Unorm];
    PREFERRED
        .into_iter()
        .find(|f| formats.contains(f))
        .or_else(|| formats.iter().copied().find(|f| !f.is_srgb()))
        .or_else(|| formats.first().copied())
}

/// Device, queue, surface and the sprite pipeline.
pub struct GpuState {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub surface_config: wgpu::SurfaceConfiguration,
    pub sprite_pipeline: SpritePipeline,
    opacity: f32,
}

impl GpuState {
    /// Initialize wgpu and the sprite pipeline for `window`.
    pub fn new(window: Arc<Window>, opacity: f32) -> Result<Self, RenderError> {
        let size = window.inner_size();

        // DX12 only on Windows: Vulkan WSI doesn't support transparent composition.
        // Use DirectComposition presentation for per-pixel alpha transparency.
        #[cfg(windows)]
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::DX12,
            backend_options: wgpu::BackendOptions {
                dx12: wgpu::Dx12BackendOptions {
                    presentation_system: wgpu_types::Dx12SwapchainKind::DxgiFromVisual,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        });
        #[cfg(not(windows))]
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        log::info!(
            "GPU adapter: {:?} ({:?})",
            adapter.get_info().name,
            adapter.get_info().backend
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("pettoy_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
        ))?;

        let surface_caps = surface.get_capabilities(&adapter);

        let format =
            pick_surface_format(&surface_caps.formats).ok_or(RenderError::NoSurfaceFormat)?;

        log::info!("Available alpha modes: {:?}", surface_caps.alpha_modes);

        let alpha_mode = if surface_caps
            .alpha_modes
            .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else if surface_caps
            .alpha_modes
            .contains(&wgpu::CompositeAlphaMode::PostMultiplied)
        {
            wgpu::CompositeAlphaMode::PostMultiplied
        } else {
            wgpu::CompositeAlphaMode::Auto
        };

        log::info!("Surface: format={:?}, alpha_mode={:?}", format, alpha_mode);

        // The companion redraws only when its frame changes, Fifo is plenty.
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let sprite_pipeline = SpritePipeline::new(&device, format);
        sprite_pipeline.update_globals(&queue, surface_size(&surface_config), opacity);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            sprite_pipeline,
            opacity,
        })
    }

    /// Resize the surface.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);

        let screen = surface_size(&self.surface_config);
        self.sprite_pipeline
            .update_globals(&self.queue, screen, self.opacity);
        self.sprite_pipeline.write_quad(&self.queue, screen);
    }

    /// Make `frame` the sprite to draw, or draw nothing for `None`.
    pub fn set_frame(&mut self, frame: Option<DisplayFrame<'_>>) {
        match frame {
            Some(frame) => {
                let screen = surface_size(&self.surface_config);
                self.sprite_pipeline.upload_frame(
                    &self.device,
                    &self.queue,
                    screen,
                    frame.key,
                    frame.image,
                );
            }
            None => self.sprite_pipeline.clear_sprite(),
        }
    }

    /// Clear to transparent, draw the sprite and any overlay, present.
    pub fn render_frame(&self, mut overlay: Option<&mut dyn Overlay>) {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("GPU out of memory");
                return;
            }
            Err(e) => {
                log::warn!("Surface error: {e:?}");
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sprite_render_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.0,
                            g: 0.0,
                            b: 0.0,
                            a: 0.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let p = &self.sprite_pipeline;
            if p.has_sprite() {
                render_pass.set_pipeline(&p.pipeline);
                render_pass.set_bind_group(0, &p.bind_group, &[]);
                render_pass.set_vertex_buffer(0, p.vertex_buffer.slice(..));
                render_pass.set_index_buffer(p.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(0..6, 0, 0..1);
            }
        }

        let mut extra_cmd_bufs = Vec::new();
        if let Some(overlay) = overlay.as_deref_mut() {
            extra_cmd_bufs = overlay.prepare(&self.device, &self.queue, &mut encoder);
            let mut pass = begin_overlay_pass(&mut encoder, &view);
            overlay.paint(&mut pass);
        }

        self.queue.submit(
            extra_cmd_bufs
                .into_iter()
                .chain(std::iter::once(encoder.finish())),
        );
        output.present();

        if let Some(overlay) = overlay {
            overlay.finish();
        }
    }
}

/// Render pass that keeps what the sprite pass drew (LoadOp::Load).
fn begin_overlay_pass(
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
) -> wgpu::RenderPass<'static> {
    let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("overlay_render_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            depth_slice: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.forget_lifetime()
}

fn surface_size(config: &wgpu::SurfaceConfiguration) -> UVec2 {
    UVec2::new(config.width, config.height)
}
