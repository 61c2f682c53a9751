//! In-window "Exit" popup drawn with egui, for hosts without a native menu.

use glam::{IVec2, UVec2};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{Key, NamedKey};
use winit::window::Window;

use super::MenuChoice;
use crate::render::{GpuState, Overlay};

/// Size of the single menu item, in physical pixels.
const ITEM_SIZE: IVec2 = IVec2::new(56, 22);

/// Where the popup sits and what the user picked. No egui involved.
#[derive(Debug, Default)]
pub struct Popup {
    /// Top-left of the item in window pixels, while open.
    anchor: Option<IVec2>,
    cursor: IVec2,
    choice: Option<MenuChoice>,
}

impl Popup {
    /// Open at `at` (window pixels), shifted so the item stays inside `window`.
    pub fn open(&mut self, at: IVec2, window: UVec2) {
        let max = (window.as_ivec2() - ITEM_SIZE).max(IVec2::ZERO);
        self.anchor = Some(at.clamp(IVec2::ZERO, max));
        self.cursor = at;
        self.choice = None;
    }

    pub fn is_open(&self) -> bool {
        self.anchor.is_some()
    }

    /// Item bounds as (min, max), while open.
    pub fn rect(&self) -> Option<(IVec2, IVec2)> {
        self.anchor.map(|min| (min, min + ITEM_SIZE))
    }

    pub fn cursor_moved(&mut self, at: IVec2) {
        self.cursor = at;
    }

    /// A press anywhere but the item closes the menu.
    pub fn pressed(&mut self) {
        if let Some((min, max)) = self.rect() {
            let inside = self.cursor.cmpge(min).all() && self.cursor.cmplt(max).all();
            if !inside {
                self.close(MenuChoice::Dismissed);
            }
        }
    }

    pub fn close(&mut self, choice: MenuChoice) {
        if self.anchor.take().is_some() {
            self.choice = Some(choice);
        }
    }

    pub fn take_choice(&mut self) -> Option<MenuChoice> {
        self.choice.take()
    }
}

/// Draw the item at `rect` (points). Returns true when it was clicked.
fn draw_menu(ctx: &egui::Context, rect: egui::Rect) -> bool {
    let mut clicked = false;
    let frame = egui::Frame::NONE
        .fill(egui::Color32::from_rgba_unmultiplied(30, 30, 30, 235))
        .corner_radius(4.0);

    egui::Area::new(egui::Id::new("exit_menu"))
        .fixed_pos(rect.min)
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            frame.show(ui, |ui| {
                ui.style_mut().visuals.override_text_color = Some(egui::Color32::from_gray(230));
                clicked = ui.add_sized(rect.size(), egui::Button::new("Exit")).clicked();
            });
        });
    clicked
}

struct PaintJob {
    primitives: Vec<egui::epaint::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
    screen: egui_wgpu::ScreenDescriptor,
}

/// Right-click menu for the companion window.
pub struct ContextMenu {
    ctx: egui::Context,
    state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    popup: Popup,
    job: Option<PaintJob>,
}

impl ContextMenu {
    pub fn new(window: &Window, gpu: &GpuState) -> Self {
        let ctx = egui::Context::default();

        let state = egui_winit::State::new(
            ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(gpu.device.limits().max_texture_dimension_2d as usize),
        );

        let renderer = egui_wgpu::Renderer::new(
            &gpu.device,
            gpu.surface_config.format,
            egui_wgpu::RendererOptions {
                depth_stencil_format: None,
                msaa_samples: 1,
                dithering: true,
                predictable_texture_filtering: false,
            },
        );

        Self {
            ctx,
            state,
            renderer,
            popup: Popup::default(),
            job: None,
        }
    }

    /// Show the menu at global position `at`. The choice arrives later
    /// through [`ContextMenu::take_choice`].
    pub fn open(&mut self, window: &Window, at: IVec2) -> Option<MenuChoice> {
        let origin = window
            .outer_position()
            .map(|p| IVec2::new(p.x, p.y))
            .unwrap_or(IVec2::ZERO);
        let size = window.inner_size();
        self.popup.open(at - origin, UVec2::new(size.width, size.height));
        window.request_redraw();
        None
    }

    /// Feed a window event to the menu. Returns true if the menu swallowed it.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        if !self.popup.is_open() {
            return false;
        }
        let _ = self.state.on_window_event(window, event);

        let swallowed = match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.popup
                    .cursor_moved(IVec2::new(position.x as i32, position.y as i32));
                true
            }
            WindowEvent::MouseInput { state, .. } => {
                if *state == ElementState::Pressed {
                    self.popup.pressed();
                }
                true
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.popup.close(MenuChoice::Dismissed);
                true
            }
            WindowEvent::KeyboardInput { .. } | WindowEvent::MouseWheel { .. } => true,
            WindowEvent::Focused(false) => {
                self.popup.close(MenuChoice::Dismissed);
                false
            }
            _ => false,
        };
        if swallowed {
            window.request_redraw();
        }
        swallowed
    }

    pub fn take_choice(&mut self) -> Option<MenuChoice> {
        self.popup.take_choice()
    }

    /// Run one egui frame if the menu is open and hand it to the renderer.
    pub fn overlay(&mut self, window: &Window) -> Option<&mut dyn Overlay> {
        let (min, max) = self.popup.rect()?;

        let raw_input = self.state.take_egui_input(window);
        let ppp = self.ctx.pixels_per_point();
        let rect = egui::Rect::from_min_max(
            egui::pos2(min.x as f32 / ppp, min.y as f32 / ppp),
            egui::pos2(max.x as f32 / ppp, max.y as f32 / ppp),
        );

        let mut clicked = false;
        let ctx = self.ctx.clone();
        let full_output = ctx.run(raw_input, |ctx| {
            clicked = draw_menu(ctx, rect);
        });
        if clicked {
            self.popup.close(MenuChoice::Exit);
        }

        self.state
            .handle_platform_output(window, full_output.platform_output);
        // Areas size themselves on their first frame and ask for another.
        if self.ctx.has_requested_repaint() {
            window.request_redraw();
        }

        let pixels_per_point = full_output.pixels_per_point;
        let size = window.inner_size();
        self.job = Some(PaintJob {
            primitives: self.ctx.tessellate(full_output.shapes, pixels_per_point),
            textures_delta: full_output.textures_delta,
            screen: egui_wgpu::ScreenDescriptor {
                size_in_pixels: [size.width, size.height],
                pixels_per_point,
            },
        });
        Some(self as &mut dyn Overlay)
    }
}

impl Overlay for ContextMenu {
    fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
    ) -> Vec<wgpu::CommandBuffer> {
        let Some(job) = &self.job else {
            return Vec::new();
        };
        for (id, image_delta) in &job.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, image_delta);
        }
        self.renderer
            .update_buffers(device, queue, encoder, &job.primitives, &job.screen)
    }

    fn paint(&self, pass: &mut wgpu::RenderPass<'static>) {
        if let Some(job) = &self.job {
            self.renderer.render(pass, &job.primitives, &job.screen);
        }
    }

    fn finish(&mut self) {
        if let Some(job) = self.job.take() {
            for id in &job.textures_delta.free {
                self.renderer.free_texture(id);
            }
        }
    }
}
