//! Windowed driver for the engine.
//!
//! Opens the window, builds the [`Engine`], feeds it keyboard actions and
//! asks it for a frame on every redraw. This is the only place that decides
//! to stop on an error: it logs the error chain, exits the event loop, and
//! `main` returns the error.

use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use renderer_core::{EngineConfig, Timer};
use renderer_platform::{Action, InputState, Window};
use renderer_renderer::Engine;

struct App {
    config: EngineConfig,
    // Dropped before the window: the surface must not outlive it.
    engine: Option<Engine>,
    window: Option<Window>,
    input: InputState,
    timer: Timer,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            engine: None,
            window: None,
            input: InputState::new(),
            timer: Timer::new(),
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config).context("Failed to create window")?;
        let engine = Engine::new(&window, &self.config).context("Failed to initialize engine")?;
        info!("Initialization complete, entering main loop");
        self.engine = Some(engine);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.fatal = Some(err);
        event_loop.exit();
    }

    /// Applies queued actions. Returns false if the user asked to quit.
    fn apply_input(&mut self) -> bool {
        for action in self.input.drain_actions() {
            if action == Action::Quit {
                return false;
            }
            if let Some(engine) = self.engine.as_mut() {
                engine.handle_action(action);
            }
        }
        true
    }

    fn shutdown(&mut self) {
        if let Some(engine) = self.engine.take() {
            let frames = engine.frame_number();
            drop(engine);
            info!(
                "Rendered {} frames in {:.1}s",
                frames,
                self.timer.elapsed().as_secs_f64()
            );
        }
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.input.on_quit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(engine) = self.engine.as_mut() {
                    engine.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key, event.repeat);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if !self.apply_input() {
                    event_loop.exit();
                    return;
                }
                let Some(engine) = self.engine.as_mut() else {
                    return;
                };
                if let Err(e) = engine.draw() {
                    let err = anyhow::Error::new(e).context("Frame failed");
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if !self.apply_input() {
            event_loop.exit();
            return;
        }
        if let Some(window) = self.window.as_ref()
            && !window.is_minimized()
        {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    renderer_core::init_logging();
    info!("Starting Vulkan engine");

    let config = EngineConfig::from_env().context("Invalid engine configuration")?;
    info!("Configuration: {:?}", config);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    app.shutdown();

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
