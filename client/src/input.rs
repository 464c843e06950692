//! Pointer and keyboard input for the paint client

use macroquad::prelude::*;

/// Pointer transitions the game turns into stroke calls
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
    /// Pointer left the canvas with the button held
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    SelectColor(usize),
    CycleBrush,
    ClearCanvas,
    Resync,
    ToggleGrid,
}

/// Turns sampled pointer state into [`PointerEvent`]s.
///
/// A press only starts a stroke inside the canvas. Holding the button after
/// leaving the canvas does nothing until it is released and pressed again.
#[derive(Debug, Default)]
pub struct PointerTracker {
    drawing: bool,
    was_down: bool,
    last: Option<(f32, f32)>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// `position` is `None` while the pointer is outside the canvas.
    pub fn update(&mut self, position: Option<(f32, f32)>, button_down: bool) -> Option<PointerEvent> {
        let pressed = button_down && !self.was_down;
        self.was_down = button_down;

        if self.drawing {
            if !button_down {
                self.drawing = false;
                self.last = None;
                return Some(PointerEvent::Up);
            }
            return match position {
                None => {
                    self.drawing = false;
                    self.last = None;
                    Some(PointerEvent::Left)
                }
                Some((x, y)) if self.last != Some((x, y)) => {
                    self.last = Some((x, y));
                    Some(PointerEvent::Move { x, y })
                }
                Some(_) => None,
            };
        }

        match position {
            Some((x, y)) if pressed => {
                self.drawing = true;
                self.last = Some((x, y));
                Some(PointerEvent::Down { x, y })
            }
            _ => None,
        }
    }
}

pub fn control_for_key(key: KeyCode) -> Option<ControlAction> {
    let action = match key {
        KeyCode::Key1 => ControlAction::SelectColor(0),
        KeyCode::Key2 => ControlAction::SelectColor(1),
        KeyCode::Key3 => ControlAction::SelectColor(2),
        KeyCode::Key4 => ControlAction::SelectColor(3),
        KeyCode::Key5 => ControlAction::SelectColor(4),
        KeyCode::Key6 => ControlAction::SelectColor(5),
        KeyCode::B => ControlAction::CycleBrush,
        KeyCode::C => ControlAction::ClearCanvas,
        KeyCode::R => ControlAction::Resync,
        KeyCode::G => ControlAction::ToggleGrid,
        _ => return None,
    };
    Some(action)
}

const CONTROL_KEYS: [KeyCode; 10] = [
    KeyCode::Key1,
    KeyCode::Key2,
    KeyCode::Key3,
    KeyCode::Key4,
    KeyCode::Key5,
    KeyCode::Key6,
    KeyCode::B,
    KeyCode::C,
    KeyCode::R,
    KeyCode::G,
];

/// Samples macroquad's input state once per frame
pub struct InputManager {
    pointer: PointerTracker,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            pointer: PointerTracker::new(),
        }
    }

    /// Returns the control keys pressed this frame and the pointer event, if
    /// any, for a canvas drawn at the window origin.
    pub fn update(&mut self, canvas_width: f32, canvas_height: f32) -> (Vec<ControlAction>, Option<PointerEvent>) {
        let actions = CONTROL_KEYS
            .iter()
            .filter(|key| is_key_pressed(**key))
            .filter_map(|key| control_for_key(*key))
            .collect();

        let (x, y) = mouse_position();
        let inside = x >= 0.0 && y >= 0.0 && x < canvas_width && y < canvas_height;
        let position = inside.then_some((x, y));
        let pointer = self
            .pointer
            .update(position, is_mouse_button_down(MouseButton::Left));

        (actions, pointer)
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
