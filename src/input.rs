use glam::Vec2;
use std::collections::HashMap;
use winit::event::{DeviceEvent, ElementState, MouseButton, WindowEvent};
use winit::keyboard::{Key, NamedKey};

use crate::camera3d::CameraInput;

/// One-shot commands triggered on key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    ToggleShadowMode,
    CycleShadowResolution,
    ToggleFollowCamera,
    ToggleCascadeDebug,
    ToggleShadowMapView,
    ToggleBackfaceCulling,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HeldAction {
    Forward,
    Backward,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Command(Command),
    Held(HeldAction),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyBinding {
    Character(String),
    Escape,
}

impl KeyBinding {
    fn character(ch: &str) -> Self {
        Self::Character(ch.to_lowercase())
    }

    fn from_event_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(ch) if !ch.is_empty() => Some(Self::Character(ch.to_lowercase())),
            Key::Named(NamedKey::Escape) => Some(Self::Escape),
            _ => None,
        }
    }
}

fn default_bindings() -> HashMap<KeyBinding, Binding> {
    use Binding::{Command as C, Held as H};
    HashMap::from([
        (KeyBinding::character("m"), C(Command::ToggleShadowMode)),
        (KeyBinding::character("r"), C(Command::CycleShadowResolution)),
        (KeyBinding::character("f"), C(Command::ToggleFollowCamera)),
        (KeyBinding::character("c"), C(Command::ToggleCascadeDebug)),
        (KeyBinding::character("v"), C(Command::ToggleShadowMapView)),
        (KeyBinding::character("b"), C(Command::ToggleBackfaceCulling)),
        (KeyBinding::Escape, C(Command::Quit)),
        (KeyBinding::character("w"), H(HeldAction::Forward)),
        (KeyBinding::character("s"), H(HeldAction::Backward)),
        (KeyBinding::character("a"), H(HeldAction::Left)),
        (KeyBinding::character("d"), H(HeldAction::Right)),
    ])
}

/// Keyboard and mouse state accumulated between frames.
pub struct Input {
    bindings: HashMap<KeyBinding, Binding>,
    held: HashMap<HeldAction, bool>,
    commands: Vec<Command>,
    mouse_delta: Vec2,
    look_button_held: bool,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                self.apply_key(&event.logical_key, event.state == ElementState::Pressed, event.repeat);
            }
            WindowEvent::MouseInput { state, button: MouseButton::Right, .. } => {
                self.look_button_held = *state == ElementState::Pressed;
            }
            WindowEvent::Focused(false) => {
                self.held.clear();
                self.look_button_held = false;
            }
            _ => {}
        }
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if self.look_button_held {
                self.mouse_delta += Vec2::new(*dx as f32, *dy as f32);
            }
        }
    }

    fn apply_key(&mut self, key: &Key, pressed: bool, repeat: bool) {
        let Some(binding) = KeyBinding::from_event_key(key).and_then(|k| self.bindings.get(&k).copied()) else {
            return;
        };
        match binding {
            Binding::Command(command) => {
                if pressed && !repeat {
                    self.commands.push(command);
                }
            }
            Binding::Held(action) => {
                self.held.insert(action, pressed);
            }
        }
    }

    fn is_held(&self, action: HeldAction) -> bool {
        self.held.get(&action).copied().unwrap_or(false)
    }

    /// Commands pressed since the last call, in press order.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Movement axes from the held keys plus the pointer motion since the last call.
    pub fn take_camera_input(&mut self) -> CameraInput {
        let axis = |positive: bool, negative: bool| (positive as i32 - negative as i32) as f32;
        CameraInput {
            forward: axis(self.is_held(HeldAction::Forward), self.is_held(HeldAction::Backward)),
            right: axis(self.is_held(HeldAction::Right), self.is_held(HeldAction::Left)),
            look_delta: std::mem::take(&mut self.mouse_delta),
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self {
            bindings: default_bindings(),
            held: HashMap::new(),
            commands: Vec::new(),
            mouse_delta: Vec2::ZERO,
            look_button_held: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::SmolStr;

    fn press(input: &mut Input, ch: &str, pressed: bool) {
        input.apply_key(&Key::Character(SmolStr::new(ch)), pressed, false);
    }

    #[test]
    fn command_keys_queue_once_per_press() {
        let mut input = Input::new();
        press(&mut input, "m", true);
        input.apply_key(&Key::Character(SmolStr::new("m")), true, true);
        press(&mut input, "m", false);
        press(&mut input, "R", true);
        input.apply_key(&Key::Named(NamedKey::Escape), true, false);
        assert_eq!(
            input.take_commands(),
            vec![Command::ToggleShadowMode, Command::CycleShadowResolution, Command::Quit]
        );
        assert!(input.take_commands().is_empty());
    }

    #[test]
    fn held_keys_drive_camera_axes() {
        let mut input = Input::new();
        press(&mut input, "w", true);
        press(&mut input, "a", true);
        let axes = input.take_camera_input();
        assert_eq!((axes.forward, axes.right), (1.0, -1.0));

        press(&mut input, "s", true);
        press(&mut input, "a", false);
        let axes = input.take_camera_input();
        assert_eq!((axes.forward, axes.right), (0.0, 0.0));
    }

    #[test]
    fn mouse_motion_only_counts_while_looking() {
        let mut input = Input::new();
        input.handle_device_event(&DeviceEvent::MouseMotion { delta: (4.0, 2.0) });
        assert_eq!(input.take_camera_input().look_delta, Vec2::ZERO);

        input.look_button_held = true;
        input.handle_device_event(&DeviceEvent::MouseMotion { delta: (4.0, 2.0) });
        input.handle_device_event(&DeviceEvent::MouseMotion { delta: (1.0, -1.0) });
        assert_eq!(input.take_camera_input().look_delta, Vec2::new(5.0, 1.0));
        assert_eq!(input.take_camera_input().look_delta, Vec2::ZERO);
    }
}
