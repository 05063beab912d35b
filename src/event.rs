//! Semantic input events delivered to the embedding application.
//!
//! Every event produced by a device dispatcher is one of the variants of
//! [`InputEvent`]. Timestamps are milliseconds on the monotonic clock, taken
//! from the raw kernel event that caused the emission (or from the expiry
//! time for tap-timeout clicks).

use crate::utils::Fixed;

/// State of a key on a keyboard. Either pressed or released.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum KeyState {
    /// Key is released
    Released,
    /// Key is pressed
    Pressed,
}

/// State of a button on a pointer device. Either pressed or released.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ButtonState {
    /// Button is released
    Released,
    /// Button is pressed
    Pressed,
}

/// Axis of a scroll emission.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Axis {
    /// Vertical axis
    Vertical,
    /// Horizontal axis
    Horizontal,
}

/// Phase of a touch point's lifetime.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TouchKind {
    /// A new touch point appeared
    Down,
    /// An existing touch point moved
    Motion,
    /// A touch point disappeared
    Up,
}

bitflags::bitflags! {
    /// Keyboard LEDs addressable through [`Device::led_update`].
    ///
    /// [`Device::led_update`]: crate::Device::led_update
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Led: u32 {
        /// Num lock
        const NUM_LOCK = 1 << 0;
        /// Caps lock
        const CAPS_LOCK = 1 << 1;
        /// Scroll lock
        const SCROLL_LOCK = 1 << 2;
    }
}

/// A normalized input event.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InputEvent {
    /// Relative pointer motion, accelerated.
    PointerMotion {
        /// Timestamp in milliseconds
        time: u64,
        /// Horizontal delta
        dx: Fixed,
        /// Vertical delta
        dy: Fixed,
    },
    /// Absolute pointer motion in calibrated screen coordinates.
    PointerMotionAbsolute {
        /// Timestamp in milliseconds
        time: u64,
        /// Horizontal position
        x: Fixed,
        /// Vertical position
        y: Fixed,
    },
    /// A pointer button changed state.
    PointerButton {
        /// Timestamp in milliseconds
        time: u64,
        /// Button code, one of the `BTN_*` kernel codes
        button: u32,
        /// New state of the button
        state: ButtonState,
    },
    /// Movement along a scroll axis.
    PointerAxis {
        /// Timestamp in milliseconds
        time: u64,
        /// Axis the movement applies to
        axis: Axis,
        /// Signed scroll amount
        value: Fixed,
    },
    /// A touch point changed.
    Touch {
        /// Timestamp in milliseconds
        time: u64,
        /// Multi-touch slot the point is tracked in
        slot: i32,
        /// Horizontal position (zero for `Up`)
        x: Fixed,
        /// Vertical position (zero for `Up`)
        y: Fixed,
        /// Phase of the touch point
        kind: TouchKind,
    },
    /// A keyboard key changed state.
    KeyboardKey {
        /// Timestamp in milliseconds
        time: u64,
        /// Key code, one of the `KEY_*` kernel codes
        key: u32,
        /// New state of the key
        state: KeyState,
    },
}

impl InputEvent {
    /// Timestamp of the event in milliseconds on the monotonic clock.
    pub fn time(&self) -> u64 {
        match *self {
            InputEvent::PointerMotion { time, .. }
            | InputEvent::PointerMotionAbsolute { time, .. }
            | InputEvent::PointerButton { time, .. }
            | InputEvent::PointerAxis { time, .. }
            | InputEvent::Touch { time, .. }
            | InputEvent::KeyboardKey { time, .. } => time,
        }
    }
}
