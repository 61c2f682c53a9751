use std::sync::Arc;

use glam::{IVec2, UVec2};
use instant::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{CursorIcon, Window, WindowAttributes, WindowId, WindowLevel};

use crate::asset::{AssetCache, DirSource};
use crate::config::{self, Paths};
use crate::interaction::PointerButton;
use crate::pet::{Companion, HostCommand};
use crate::platform::{self, ContextMenu, MenuChoice};
use crate::render::GpuState;
use crate::settings::SettingsStore;

/// Top-level application state.
struct App {
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    companion: Option<Companion>,
    menu: Option<ContextMenu>,

    // Zero point for every timestamp handed to the companion
    epoch: Instant,

    // Last cursor position inside the window (physical pixels)
    cursor: IVec2,

    // Frame currently on screen, to skip redundant redraws
    shown: Option<(usize, usize)>,

    // Startup failure, reported from run()
    fatal: Option<Box<dyn std::error::Error>>,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            gpu: None,
            companion: None,
            menu: None,
            epoch: Instant::now(),
            cursor: IVec2::ZERO,
            shown: None,
            fatal: None,
        }
    }

    fn now(&self) -> std::time::Duration {
        self.epoch.elapsed()
    }

    /// Window top-left in screen coordinates.
    fn window_origin(&self) -> IVec2 {
        let fallback = self
            .companion
            .as_ref()
            .map(Companion::window_pos)
            .unwrap_or(IVec2::ZERO);
        self.window
            .as_ref()
            .and_then(|w| w.outer_position().ok())
            .map(|p| IVec2::new(p.x, p.y))
            .unwrap_or(fallback)
    }

    fn cursor_global(&self) -> IVec2 {
        self.window_origin() + self.cursor
    }

    fn apply(&mut self, event_loop: &ActiveEventLoop, command: HostCommand) {
        let Some(window) = self.window.clone() else {
            return;
        };
        match command {
            HostCommand::None => {}
            HostCommand::MoveWindow(pos) => {
                window.set_outer_position(PhysicalPosition::new(pos.x, pos.y));
            }
            HostCommand::ShowExitMenu(at) => {
                let choice = self.menu.as_mut().and_then(|menu| menu.open(&window, at));
                if let Some(choice) = choice {
                    self.menu_closed(event_loop, choice);
                }
            }
        }
    }

    fn menu_closed(&mut self, event_loop: &ActiveEventLoop, choice: MenuChoice) {
        match choice {
            MenuChoice::Exit => {
                log::info!("Exit chosen from menu");
                self.shutdown(event_loop);
            }
            MenuChoice::Dismissed => {
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }
        }
    }

    fn poll_menu(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(choice) = self.menu.as_mut().and_then(ContextMenu::take_choice) {
            self.menu_closed(event_loop, choice);
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(companion) = &mut self.companion {
            companion.exit();
        }
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn std::error::Error>> {
        let paths = Paths::from_env();
        let settings = SettingsStore::load(paths.settings_file());
        let pet = settings.settings().pet_type.clone();
        let opacity = settings.settings().effective_opacity();

        let screen = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .map(|m| UVec2::new(m.size().width, m.size().height))
            .ok_or("no monitor found")?;

        let position = match settings.settings().window_position() {
            Some((x, y)) => IVec2::new(x, y),
            None => config::default_position(screen, config::WINDOW_SIZE),
        };

        // Windows gets its transparency from DirectComposition, and
        // with_transparent(true) would add WS_EX_LAYERED on top of it.
        // Start hidden until styles and GPU resources are ready.
        let attrs = WindowAttributes::default()
            .with_title("PetToy")
            .with_decorations(false)
            .with_resizable(false)
            .with_visible(false)
            .with_transparent(cfg!(not(windows)))
            .with_window_level(WindowLevel::AlwaysOnTop)
            .with_inner_size(PhysicalSize::new(config::WINDOW_SIZE.x, config::WINDOW_SIZE.y))
            .with_position(PhysicalPosition::new(position.x, position.y));

        let window = Arc::new(event_loop.create_window(attrs)?);
        window.set_cursor(CursorIcon::Pointer);
        platform::prepare_window(&window);

        log::info!(
            "Companion window created at {position} on a {}x{} screen",
            screen.x,
            screen.y
        );

        let gpu = GpuState::new(window.clone(), opacity)?;
        let menu = ContextMenu::new(&window, &gpu);
        log::info!("wgpu + sprite pipeline initialized");

        let mut cache = AssetCache::new(DirSource::new(paths.sprite_dir(&pet)));
        log::info!("Loading sprites from {}", cache.source().root().display());
        let companion = Companion::load(&mut cache, settings, config::WINDOW_SIZE, position, self.now());
        log::info!("Companion '{pet}' ready in state {:?}", companion.state());

        window.set_visible(true);

        self.gpu = Some(gpu);
        self.menu = Some(menu);
        self.companion = Some(companion);
        self.window = Some(window);
        Ok(())
    }
}

fn pointer_button(button: MouseButton) -> PointerButton {
    match button {
        MouseButton::Left => PointerButton::Primary,
        MouseButton::Right => PointerButton::Secondary,
        _ => PointerButton::Other,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            self.fatal = Some(e);
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = self.now();
        let Some(companion) = &mut self.companion else {
            return;
        };

        let changed = companion.tick(now);
        let key = companion.current_frame(now).map(|f| f.key);
        if changed || key != self.shown {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }

        match companion.next_deadline(now) {
            Some(at) => event_loop.set_control_flow(ControlFlow::WaitUntil(self.epoch + at)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let (Some(window), Some(menu)) = (&self.window, &mut self.menu) {
            if menu.handle_event(window, &event) {
                self.poll_menu(event_loop);
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting");
                self.shutdown(event_loop);
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
                log::info!("ESC pressed, exiting");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(new_size.width, new_size.height);
                }
                self.shown = None;
            }
            WindowEvent::Moved(pos) => {
                if let Some(companion) = &mut self.companion {
                    companion.window_moved(IVec2::new(pos.x, pos.y));
                }
            }
            WindowEvent::Focused(false) => {
                if let Some(companion) = &mut self.companion {
                    companion.cancel_gesture();
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = IVec2::new(position.x as i32, position.y as i32);
                let global = self.cursor_global();
                let command = match &mut self.companion {
                    Some(companion) => companion.pointer_moved(global),
                    None => HostCommand::None,
                };
                self.apply(event_loop, command);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let global = self.cursor_global();
                let now = self.now();
                let button = pointer_button(button);
                let command = match (&mut self.companion, state) {
                    (Some(companion), ElementState::Pressed) => companion.pointer_down(button, global),
                    (Some(companion), ElementState::Released) => {
                        companion.pointer_up(button, global, now);
                        HostCommand::None
                    }
                    (None, _) => HostCommand::None,
                };
                self.apply(event_loop, command);
            }
            WindowEvent::RedrawRequested => {
                let now = self.now();
                if let (Some(gpu), Some(companion), Some(window)) =
                    (&mut self.gpu, &self.companion, &self.window)
                {
                    let frame = companion.current_frame(now);
                    self.shown = frame.as_ref().map(|f| f.key);
                    gpu.set_frame(frame);
                    let overlay = self.menu.as_mut().and_then(|menu| menu.overlay(window));
                    gpu.render_frame(overlay);
                }
            }
            _ => {}
        }

        self.poll_menu(event_loop);
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(companion) = &mut self.companion {
            companion.exit();
        }
    }
}

/// Entry point: create the event loop and run until the companion exits.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let event_loop = EventLoop::new()?;
    let mut app = App::new();
    event_loop.run_app(&mut app)?;
    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
