//! Keyboard input as a polled stream of discrete events.
//!
//! The event loop feeds raw winit key events into [`InputState`]; once per
//! tick the engine drains the queued [`InputEvent`]s and maps each key to an
//! [`Action`].

use std::collections::{HashSet, VecDeque};

pub use winit::keyboard::KeyCode;

/// Something the window reported since the last tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// The window was closed or the user asked to quit.
    Quit,
    /// A key went down. `repeat` is set for auto-repeat presses.
    KeyDown { key: KeyCode, repeat: bool },
}

/// Engine-level meaning of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MoveForward,
    MoveBack,
    MoveLeft,
    MoveRight,
    /// Swap the debug triangle between its two pipelines.
    ToggleShader,
    Quit,
}

impl Action {
    /// Maps a key to its action, if it has one.
    pub fn from_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::KeyW => Some(Action::MoveForward),
            KeyCode::KeyS => Some(Action::MoveBack),
            KeyCode::KeyA => Some(Action::MoveLeft),
            KeyCode::KeyD => Some(Action::MoveRight),
            KeyCode::Space => Some(Action::ToggleShader),
            KeyCode::Escape => Some(Action::Quit),
            _ => None,
        }
    }

    /// Whether auto-repeat presses should trigger the action again.
    pub fn repeats(self) -> bool {
        matches!(
            self,
            Action::MoveForward | Action::MoveBack | Action::MoveLeft | Action::MoveRight
        )
    }
}

/// Queue of input events between ticks plus the set of held keys.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    events: VecDeque<InputEvent>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a key press event.
    pub fn on_key_pressed(&mut self, key: KeyCode, repeat: bool) {
        self.pressed_keys.insert(key);
        self.events.push_back(InputEvent::KeyDown { key, repeat });
    }

    /// Handle a key release event.
    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Queue a quit request (window close).
    pub fn on_quit(&mut self) {
        self.events.push_back(InputEvent::Quit);
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Takes every event queued since the previous call, oldest first.
    pub fn drain_events(&mut self) -> impl Iterator<Item = InputEvent> + '_ {
        self.events.drain(..)
    }

    /// Drains the queue and resolves it to actions, dropping keys with no
    /// action and auto-repeats of one-shot actions.
    pub fn drain_actions(&mut self) -> Vec<Action> {
        self.drain_events()
            .filter_map(|event| match event {
                InputEvent::Quit => Some(Action::Quit),
                InputEvent::KeyDown { key, repeat } => {
                    Action::from_key(key).filter(|action| !repeat || action.repeats())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(Action::from_key(KeyCode::KeyW), Some(Action::MoveForward));
        assert_eq!(Action::from_key(KeyCode::KeyS), Some(Action::MoveBack));
        assert_eq!(Action::from_key(KeyCode::KeyA), Some(Action::MoveLeft));
        assert_eq!(Action::from_key(KeyCode::KeyD), Some(Action::MoveRight));
        assert_eq!(Action::from_key(KeyCode::Space), Some(Action::ToggleShader));
        assert_eq!(Action::from_key(KeyCode::Escape), Some(Action::Quit));
        assert_eq!(Action::from_key(KeyCode::KeyQ), None);
    }

    #[test]
    fn test_events_drain_in_order() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW, false);
        input.on_quit();

        let events: Vec<_> = input.drain_events().collect();
        assert_eq!(
            events,
            vec![
                InputEvent::KeyDown {
                    key: KeyCode::KeyW,
                    repeat: false
                },
                InputEvent::Quit
            ]
        );
        assert_eq!(input.drain_events().count(), 0);
    }

    #[test]
    fn test_repeat_filtering() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space, false);
        input.on_key_pressed(KeyCode::Space, true);
        input.on_key_pressed(KeyCode::KeyA, false);
        input.on_key_pressed(KeyCode::KeyA, true);
        input.on_key_pressed(KeyCode::KeyZ, false);

        assert_eq!(
            input.drain_actions(),
            vec![Action::ToggleShader, Action::MoveLeft, Action::MoveLeft]
        );
    }

    #[test]
    fn test_held_keys() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyD, false);
        assert!(input.is_key_pressed(KeyCode::KeyD));
        input.on_key_released(KeyCode::KeyD);
        assert!(!input.is_key_pressed(KeyCode::KeyD));
    }
}
