//! Platform layer: the winit window, its Vulkan surface and keyboard input.

mod input;
mod window;

pub use input::{Action, InputEvent, InputState, KeyCode};
pub use window::{Surface, Window};

pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
