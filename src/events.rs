// Posture Coach — System Events

// ---------------------------------------------------------------------------
// Buttons
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Cycles the menu cursor.
    Navigate,
    /// Confirms the menu choice; leaves continuous monitoring.
    Select,
}

/// One debounced press. Raised once per physical press, never per level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
}

impl ButtonEvent {
    pub fn navigate() -> Self {
        Self { button: Button::Navigate }
    }

    pub fn select() -> Self {
        Self { button: Button::Select }
    }
}

/// Depth of the queue between the input manager and the mode controller.
pub const EVENT_QUEUE_DEPTH: usize = 8;
