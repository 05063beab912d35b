//! Touchpad event dispatching.
//!
//! Touchpads report absolute finger coordinates, but the desktop expects
//! relative pointer motion. This dispatcher tracks the touch and finger
//! state of the pad, conditions the coordinate stream (dead-zone hysteresis
//! followed by a short smoothing history), accelerates the resulting deltas
//! and emits pointer motion, two-finger scrolling and tap gestures.

use std::fmt;

use rustix::io::Errno;

use crate::evdev::{codes, RawEvent};
use crate::event::{Axis, ButtonState, InputEvent};
use crate::utils::Fixed;

use super::{DeviceConfig, DeviceError};

use filter::{DiagonalProfile, MotionFilter, PointerAccelerator};
use tap::{TapEvent, TapMachine};

mod filter;
mod tap;

const ACCEL_NUMERATOR: f64 = 50.0;
const MIN_ACCEL_FACTOR: f64 = 0.16;
const MAX_ACCEL_FACTOR: f64 = 1.0;
const HYSTERESIS_MARGIN_DENOMINATOR: f64 = 700.0;

/// Samples kept for smoothing; no motion is reported until the window fills.
const HISTORY_LENGTH: usize = 4;
const MIN_SAMPLES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TouchpadModel {
    Unknown,
    Synaptics,
    Alps,
    Appletouch,
    Elantech,
}

/// Vendor/product table for pads needing model-specific tuning.
/// A zero product matches the whole vendor.
const MODEL_TABLE: &[(u16, u16, TouchpadModel)] = &[
    (0x0002, 0x0007, TouchpadModel::Synaptics),
    (0x0002, 0x0008, TouchpadModel::Alps),
    (0x05ac, 0x0000, TouchpadModel::Appletouch),
    (0x0002, 0x000e, TouchpadModel::Elantech),
];

fn model_for(vendor: u16, product: u16) -> TouchpadModel {
    for &(v, p, model) in MODEL_TABLE {
        if v == vendor && (p == 0 || p == product) {
            return model;
        }
    }
    TouchpadModel::Unknown
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct TouchState: u32 {
        const TOUCH = 1 << 0;
        const MOVE = 1 << 1;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Fingers: u32 {
        const ONE = 1 << 0;
        const TWO = 1 << 1;
        const THREE = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Accumulator for the frame protocol: processing is deferred until a
    /// report arrives that satisfies the current filter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct FrameMask: u32 {
        const ABSOLUTE_ANY = 1 << 0;
        const ABSOLUTE_X = 1 << 1;
        const ABSOLUTE_Y = 1 << 2;
        const REPORT = 1 << 3;
    }
}

/// Dead-zone filter around a moving center.
///
/// Inputs within `margin` of the center are absorbed; anything farther
/// moves the center by the overshoot, so real motion tracks without
/// long-term drift.
fn hysteresis(input: i32, center: i32, margin: i32) -> i32 {
    let diff = input - center;
    if diff.abs() <= margin {
        center
    } else if diff > margin {
        center + diff - margin
    } else {
        center + diff + margin
    }
}

/// Ring buffer of the last accepted positions.
#[derive(Debug, Default)]
struct MotionHistory {
    samples: [(i32, i32); HISTORY_LENGTH],
    index: usize,
    count: usize,
}

impl MotionHistory {
    fn clear(&mut self) {
        self.count = 0;
    }

    fn push(&mut self, x: i32, y: i32) {
        self.index = (self.index + 1) % HISTORY_LENGTH;
        self.samples[self.index] = (x, y);
        if self.count < HISTORY_LENGTH {
            self.count += 1;
        }
    }

    fn offset(&self, back: usize) -> (i32, i32) {
        self.samples[(self.index + HISTORY_LENGTH - back) % HISTORY_LENGTH]
    }

    /// Smoothed delta over the window; defined once the window is full.
    fn delta(&self) -> Option<(f64, f64)> {
        if self.count < MIN_SAMPLES {
            return None;
        }
        let (x0, y0) = self.offset(0);
        let (x1, y1) = self.offset(1);
        let (x2, y2) = self.offset(2);
        let (x3, y3) = self.offset(3);
        Some((
            ((x0 + x1 - x2 - x3) / 4) as f64,
            ((y0 + y1 - y2 - y3) / 4) as f64,
        ))
    }
}

pub(crate) struct TouchpadDispatch {
    model: TouchpadModel,
    touch_state: TouchState,
    finger_state: Fingers,
    last_finger_state: Fingers,
    reset: bool,

    event_mask: FrameMask,
    event_mask_filter: FrameMask,

    has_pressure: bool,
    pressure_low: i32,
    pressure_high: i32,

    margin_x: i32,
    margin_y: i32,
    center_x: i32,
    center_y: i32,

    hw_x: i32,
    hw_y: i32,
    motion: MotionHistory,

    filter: Box<dyn MotionFilter>,
    tap: TapMachine,
}

impl TouchpadDispatch {
    pub(crate) fn new(config: &DeviceConfig) -> Result<TouchpadDispatch, DeviceError> {
        let model = model_for(config.vendor, config.product);

        let (has_pressure, pressure_low, pressure_high) = match &config.pressure {
            Some(info) => {
                let (low, high) = pressure_thresholds(model, info.minimum, info.maximum);
                (true, low, high)
            }
            None => (false, 0, 0),
        };

        let width = (config.abs.max_x - config.abs.min_x).abs() as f64;
        let height = (config.abs.max_y - config.abs.min_y).abs() as f64;
        let diagonal = width.hypot(height).max(1.0);
        let margin = (diagonal / HYSTERESIS_MARGIN_DENOMINATOR) as i32;

        let filter = Box::new(PointerAccelerator::new(DiagonalProfile {
            constant: ACCEL_NUMERATOR / diagonal,
            min: MIN_ACCEL_FACTOR,
            max: MAX_ACCEL_FACTOR,
        }));

        let tap = TapMachine::new(!config.buttonpad).map_err(DeviceError::Timer)?;

        tracing::debug!(
            ?model,
            diagonal,
            margin,
            has_pressure,
            tap = tap.enabled(),
            "touchpad dispatcher configured"
        );

        Ok(TouchpadDispatch {
            model,
            touch_state: TouchState::empty(),
            finger_state: Fingers::empty(),
            last_finger_state: Fingers::empty(),
            reset: true,
            event_mask: FrameMask::empty(),
            event_mask_filter: FrameMask::empty(),
            has_pressure,
            pressure_low,
            pressure_high,
            margin_x: margin,
            margin_y: margin,
            center_x: 0,
            center_y: 0,
            hw_x: 0,
            hw_y: 0,
            motion: MotionHistory::default(),
            filter,
            tap,
        })
    }

    /// The tap timer fd, for event-loop registration.
    pub(crate) fn timer(&self) -> &crate::timer::Timer {
        self.tap.timer()
    }

    /// Drives the tap machine after the timer fd became readable.
    pub(crate) fn expire_timer(
        &mut self,
        now: u64,
        sink: &mut dyn FnMut(InputEvent),
    ) -> Result<(), Errno> {
        self.tap.expire(now, sink)
    }

    #[profiling::function]
    pub(crate) fn process(&mut self, event: &RawEvent, sink: &mut dyn FnMut(InputEvent)) {
        match event.kind {
            codes::EV_SYN => {
                if event.code == codes::SYN_REPORT {
                    self.event_mask |= FrameMask::REPORT;
                }
            }
            codes::EV_ABS => self.process_absolute(event),
            codes::EV_KEY => self.process_key(event, sink),
            _ => {}
        }

        self.update_state(event.time, sink);
    }

    fn on_touch(&mut self) {
        self.touch_state |= TouchState::TOUCH;
        self.tap.push(TapEvent::Touch);
    }

    fn on_release(&mut self) {
        self.reset = true;
        self.touch_state.remove(TouchState::TOUCH | TouchState::MOVE);
        self.tap.push(TapEvent::Release);
    }

    fn process_absolute(&mut self, event: &RawEvent) {
        match event.code {
            codes::ABS_PRESSURE => {
                if event.value > self.pressure_high && !self.touch_state.contains(TouchState::TOUCH)
                {
                    self.on_touch();
                } else if event.value < self.pressure_low
                    && self.touch_state.contains(TouchState::TOUCH)
                {
                    self.on_release();
                }
            }
            codes::ABS_X => {
                if self.touch_state.contains(TouchState::TOUCH) {
                    self.hw_x = event.value;
                    self.event_mask |= FrameMask::ABSOLUTE_ANY | FrameMask::ABSOLUTE_X;
                }
            }
            codes::ABS_Y => {
                if self.touch_state.contains(TouchState::TOUCH) {
                    self.hw_y = event.value;
                    self.event_mask |= FrameMask::ABSOLUTE_ANY | FrameMask::ABSOLUTE_Y;
                }
            }
            _ => {}
        }
    }

    fn process_key(&mut self, event: &RawEvent, sink: &mut dyn FnMut(InputEvent)) {
        match event.code {
            codes::BTN_TOUCH => {
                // Pressure-capable pads infer touch from thresholds instead.
                if !self.has_pressure {
                    if event.value != 0 && !self.touch_state.contains(TouchState::TOUCH) {
                        self.on_touch();
                    } else if event.value == 0 {
                        self.on_release();
                    }
                }
            }
            codes::BTN_LEFT..=codes::BTN_TASK => {
                // Physical click with two fingers resting means right click
                // on pads without tapping.
                let button = if !self.tap.enabled()
                    && event.code == codes::BTN_LEFT
                    && self.finger_state == Fingers::TWO
                {
                    codes::BTN_RIGHT
                } else {
                    event.code
                };
                sink(InputEvent::PointerButton {
                    time: event.time,
                    button: button as u32,
                    state: if event.value != 0 {
                        ButtonState::Pressed
                    } else {
                        ButtonState::Released
                    },
                });
            }
            codes::BTN_TOOL_PEN
            | codes::BTN_TOOL_RUBBER
            | codes::BTN_TOOL_BRUSH
            | codes::BTN_TOOL_PENCIL
            | codes::BTN_TOOL_AIRBRUSH
            | codes::BTN_TOOL_MOUSE
            | codes::BTN_TOOL_LENS => {
                self.reset = true;
            }
            codes::BTN_TOOL_FINGER => self.set_fingers(Fingers::ONE, event.value != 0),
            codes::BTN_TOOL_DOUBLETAP => self.set_fingers(Fingers::TWO, event.value != 0),
            codes::BTN_TOOL_TRIPLETAP => self.set_fingers(Fingers::THREE, event.value != 0),
            _ => {}
        }
    }

    fn set_fingers(&mut self, fingers: Fingers, present: bool) {
        self.finger_state.set(fingers, present);
    }

    fn update_state(&mut self, time: u64, sink: &mut dyn FnMut(InputEvent)) {
        if self.reset || self.last_finger_state != self.finger_state {
            self.reset = false;
            self.motion.clear();
            self.event_mask = FrameMask::empty();
            self.event_mask_filter = FrameMask::ABSOLUTE_X | FrameMask::ABSOLUTE_Y;
            self.last_finger_state = self.finger_state;
            self.tap.drain(time, sink);
            return;
        }
        self.last_finger_state = self.finger_state;

        if !self.event_mask.contains(FrameMask::REPORT) {
            return;
        }
        self.event_mask.remove(FrameMask::REPORT);

        if self.event_mask & self.event_mask_filter != self.event_mask_filter {
            return;
        }

        // The first frame after a reset must carry both axes; afterwards a
        // device resending only the changed axis is enough.
        self.event_mask_filter = FrameMask::ABSOLUTE_ANY;
        self.event_mask = FrameMask::empty();

        let (x, y) = if self.motion.count > 0 {
            (
                hysteresis(self.hw_x, self.center_x, self.margin_x),
                hysteresis(self.hw_y, self.center_y, self.margin_y),
            )
        } else {
            (self.hw_x, self.hw_y)
        };
        self.center_x = x;
        self.center_y = y;
        self.hw_x = x;
        self.hw_y = y;

        self.motion.push(x, y);

        let mut dx = 0.0;
        let mut dy = 0.0;
        if let Some((raw_dx, raw_dy)) = self.motion.delta() {
            let filtered = self.filter.dispatch(raw_dx, raw_dy, time);
            dx = filtered.0;
            dy = filtered.1;

            if self.finger_state == Fingers::ONE {
                if dx != 0.0 || dy != 0.0 {
                    sink(InputEvent::PointerMotion {
                        time,
                        dx: Fixed::from_f64(dx),
                        dy: Fixed::from_f64(dy),
                    });
                }
            } else if self.finger_state == Fingers::TWO {
                if dx != 0.0 {
                    sink(InputEvent::PointerAxis {
                        time,
                        axis: Axis::Horizontal,
                        value: Fixed::from_f64(dx),
                    });
                }
                if dy != 0.0 {
                    sink(InputEvent::PointerAxis {
                        time,
                        axis: Axis::Vertical,
                        value: Fixed::from_f64(dy),
                    });
                }
            }
        }

        if !self.touch_state.contains(TouchState::MOVE) && (dx as i32 != 0 || dy as i32 != 0) {
            self.touch_state |= TouchState::MOVE;
            self.tap.push(TapEvent::Motion);
        }

        self.tap.drain(time, sink);
    }
}

/// Thresholds for entering and leaving touch from the pressure axis.
///
/// The gap between the two suppresses flapping near the boundary; the
/// constants come from xf86-input-synaptics. Elantech pads report a clean
/// binary pressure, so any reading above the minimum counts.
fn pressure_thresholds(model: TouchpadModel, minimum: i32, maximum: i32) -> (i32, i32) {
    let range = maximum - minimum + 1;
    match model {
        TouchpadModel::Elantech => (minimum + 1, minimum + 1),
        _ => (
            (minimum as f64 + range as f64 * (25.0 / 256.0)) as i32,
            (minimum as f64 + range as f64 * (30.0 / 256.0)) as i32,
        ),
    }
}

impl fmt::Debug for TouchpadDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TouchpadDispatch")
            .field("model", &self.model)
            .field("touch_state", &self.touch_state)
            .field("finger_state", &self.finger_state)
            .field("reset", &self.reset)
            .field("event_mask", &self.event_mask)
            .field("event_mask_filter", &self.event_mask_filter)
            .field("motion", &self.motion)
            .field("tap", &self.tap)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{AbsRange, DeviceCapabilities, DeviceConfig};
    use super::*;
    use crate::evdev::AbsInfo;

    fn config(buttonpad: bool, pressure: Option<AbsInfo>) -> DeviceConfig {
        DeviceConfig {
            name: "test pad".into(),
            vendor: 0,
            product: 0,
            caps: DeviceCapabilities::MOTION_ABS | DeviceCapabilities::TOUCH,
            abs: AbsRange {
                min_x: 0,
                max_x: 2000,
                min_y: 0,
                max_y: 2000,
            },
            pressure,
            is_mt: false,
            initial_slot: 0,
            buttonpad,
            calibration: None,
        }
    }

    fn touchpad() -> TouchpadDispatch {
        TouchpadDispatch::new(&config(false, None)).unwrap()
    }

    fn frame(
        tp: &mut TouchpadDispatch,
        time: u64,
        events: &[(u16, u16, i32)],
        out: &mut Vec<InputEvent>,
    ) {
        for &(kind, code, value) in events {
            tp.process(
                &RawEvent {
                    time,
                    kind,
                    code,
                    value,
                },
                &mut |event| out.push(event),
            );
        }
        tp.process(
            &RawEvent {
                time,
                kind: codes::EV_SYN,
                code: codes::SYN_REPORT,
                value: 0,
            },
            &mut |event| out.push(event),
        );
    }

    fn button(time: u64, button: u16, state: ButtonState) -> InputEvent {
        InputEvent::PointerButton {
            time,
            button: button as u32,
            state,
        }
    }

    #[test]
    fn hysteresis_dead_zone_and_non_expansion() {
        for (input, center, margin) in [(10, 0, 10), (-7, 0, 7), (105, 100, 5), (95, 100, 5)] {
            assert_eq!(hysteresis(input, center, margin), center);
        }
        for (input, center, margin) in [(120, 100, 5), (80, 100, 5), (3, 0, 0), (-3, 0, 2)] {
            let out = hysteresis(input, center, margin);
            assert!((out - center).abs() <= (input - center).abs());
        }
        assert_eq!(hysteresis(120, 100, 5), 115);
        assert_eq!(hysteresis(80, 100, 5), 85);
    }

    #[test]
    fn history_bounds_and_warm_up() {
        let mut history = MotionHistory::default();
        assert_eq!(history.delta(), None);
        for i in 0..10 {
            history.push(i, 0);
            assert!(history.count <= HISTORY_LENGTH);
            assert!(history.index < HISTORY_LENGTH);
            if i < 3 {
                assert_eq!(history.delta(), None);
            }
        }
        // Steady progression of 1/sample smooths to exactly 1.
        assert_eq!(history.delta(), Some((1.0, 0.0)));
        history.clear();
        assert_eq!(history.delta(), None);
    }

    #[test]
    fn single_tap_clicks_at_timeout() {
        let mut tp = touchpad();
        let mut out = Vec::new();

        frame(
            &mut tp,
            0,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 1),
                (codes::EV_KEY, codes::BTN_TOUCH, 1),
                (codes::EV_ABS, codes::ABS_X, 1000),
                (codes::EV_ABS, codes::ABS_Y, 1000),
            ],
            &mut out,
        );
        frame(
            &mut tp,
            10,
            &[
                (codes::EV_KEY, codes::BTN_TOUCH, 0),
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 0),
            ],
            &mut out,
        );
        assert!(out.is_empty());
        assert!(tp.timer().is_armed());

        tp.expire_timer(110, &mut |event| out.push(event)).unwrap();
        assert_eq!(
            out,
            vec![
                button(110, codes::BTN_LEFT, ButtonState::Pressed),
                button(110, codes::BTN_LEFT, ButtonState::Released),
            ]
        );
    }

    #[test]
    fn double_tap_emits_press_on_second_touch() {
        let mut tp = touchpad();
        let mut out = Vec::new();

        frame(
            &mut tp,
            0,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 1),
                (codes::EV_KEY, codes::BTN_TOUCH, 1),
                (codes::EV_ABS, codes::ABS_X, 1000),
                (codes::EV_ABS, codes::ABS_Y, 1000),
            ],
            &mut out,
        );
        frame(
            &mut tp,
            10,
            &[
                (codes::EV_KEY, codes::BTN_TOUCH, 0),
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 0),
            ],
            &mut out,
        );
        frame(
            &mut tp,
            50,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 1),
                (codes::EV_KEY, codes::BTN_TOUCH, 1),
                (codes::EV_ABS, codes::ABS_X, 1000),
                (codes::EV_ABS, codes::ABS_Y, 1000),
            ],
            &mut out,
        );
        frame(
            &mut tp,
            60,
            &[
                (codes::EV_KEY, codes::BTN_TOUCH, 0),
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 0),
            ],
            &mut out,
        );

        assert_eq!(
            out,
            vec![
                button(50, codes::BTN_LEFT, ButtonState::Pressed),
                button(60, codes::BTN_LEFT, ButtonState::Released),
                button(60, codes::BTN_LEFT, ButtonState::Pressed),
                button(60, codes::BTN_LEFT, ButtonState::Released),
            ]
        );
    }

    #[test]
    fn tap_and_drag() {
        let mut tp = touchpad();
        let mut out = Vec::new();

        frame(
            &mut tp,
            0,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 1),
                (codes::EV_KEY, codes::BTN_TOUCH, 1),
                (codes::EV_ABS, codes::ABS_X, 500),
                (codes::EV_ABS, codes::ABS_Y, 500),
            ],
            &mut out,
        );
        frame(
            &mut tp,
            10,
            &[
                (codes::EV_KEY, codes::BTN_TOUCH, 0),
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 0),
            ],
            &mut out,
        );

        // Second touch enters the drag-pending state.
        frame(
            &mut tp,
            50,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 1),
                (codes::EV_KEY, codes::BTN_TOUCH, 1),
                (codes::EV_ABS, codes::ABS_X, 500),
                (codes::EV_ABS, codes::ABS_Y, 500),
            ],
            &mut out,
        );
        assert_eq!(out, vec![button(50, codes::BTN_LEFT, ButtonState::Pressed)]);
        out.clear();

        // Finger travels; once the smoothing window fills the deltas become
        // motion events and the machine converts the tap into a drag.
        for (i, time) in (60..=90).step_by(10).enumerate() {
            let x = 580 + 80 * i as i32;
            frame(
                &mut tp,
                time,
                &[
                    (codes::EV_ABS, codes::ABS_X, x),
                    (codes::EV_ABS, codes::ABS_Y, 500),
                ],
                &mut out,
            );
        }
        assert!(out
            .iter()
            .any(|event| matches!(event, InputEvent::PointerMotion { .. })));
        out.clear();

        frame(
            &mut tp,
            200,
            &[
                (codes::EV_KEY, codes::BTN_TOUCH, 0),
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 0),
            ],
            &mut out,
        );
        assert_eq!(out, vec![button(200, codes::BTN_LEFT, ButtonState::Released)]);
    }

    #[test]
    fn two_finger_scroll_is_vertical_only() {
        let mut tp = touchpad();
        let mut out = Vec::new();

        frame(
            &mut tp,
            0,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_DOUBLETAP, 1),
                (codes::EV_KEY, codes::BTN_TOUCH, 1),
                (codes::EV_ABS, codes::ABS_X, 1000),
                (codes::EV_ABS, codes::ABS_Y, 1000),
            ],
            &mut out,
        );
        for (i, y) in (1015..=1060).step_by(15).enumerate() {
            frame(
                &mut tp,
                10 * (i as u64 + 1),
                &[
                    (codes::EV_ABS, codes::ABS_X, 1000),
                    (codes::EV_ABS, codes::ABS_Y, y),
                ],
                &mut out,
            );
        }

        assert!(!out.is_empty());
        for event in &out {
            match event {
                InputEvent::PointerAxis { axis, value, .. } => {
                    assert_eq!(*axis, Axis::Vertical);
                    assert!(value.to_f64() > 0.0);
                }
                other => panic!("unexpected emission: {other:?}"),
            }
        }
    }

    #[test]
    fn jitter_within_margin_is_absorbed() {
        let mut tp = touchpad();
        let mut out = Vec::new();

        // Diagonal 2828 gives a margin of 4; wobble by up to 3 units.
        frame(
            &mut tp,
            0,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 1),
                (codes::EV_KEY, codes::BTN_TOUCH, 1),
                (codes::EV_ABS, codes::ABS_X, 500),
                (codes::EV_ABS, codes::ABS_Y, 500),
            ],
            &mut out,
        );
        for i in 1..40u64 {
            let noise = [3, -3, 1, -2][i as usize % 4];
            frame(
                &mut tp,
                10 * i,
                &[
                    (codes::EV_ABS, codes::ABS_X, 500 + noise),
                    (codes::EV_ABS, codes::ABS_Y, 500 - noise),
                ],
                &mut out,
            );
        }

        assert!(out.is_empty());
    }

    #[test]
    fn two_finger_click_is_right_button() {
        let mut tp = TouchpadDispatch::new(&config(true, None)).unwrap();
        let mut out = Vec::new();

        frame(
            &mut tp,
            0,
            &[(codes::EV_KEY, codes::BTN_TOOL_DOUBLETAP, 1)],
            &mut out,
        );
        frame(&mut tp, 5, &[(codes::EV_KEY, codes::BTN_LEFT, 1)], &mut out);
        frame(&mut tp, 20, &[(codes::EV_KEY, codes::BTN_LEFT, 0)], &mut out);

        assert_eq!(
            out,
            vec![
                button(5, codes::BTN_RIGHT, ButtonState::Pressed),
                button(20, codes::BTN_RIGHT, ButtonState::Released),
            ]
        );
    }

    #[test]
    fn one_finger_click_passes_through_on_buttonpad() {
        let mut tp = TouchpadDispatch::new(&config(true, None)).unwrap();
        let mut out = Vec::new();

        frame(
            &mut tp,
            0,
            &[(codes::EV_KEY, codes::BTN_TOOL_FINGER, 1)],
            &mut out,
        );
        frame(&mut tp, 5, &[(codes::EV_KEY, codes::BTN_LEFT, 1)], &mut out);

        assert_eq!(out, vec![button(5, codes::BTN_LEFT, ButtonState::Pressed)]);
    }

    #[test]
    fn pressure_thresholds_gate_touch() {
        let pressure = AbsInfo {
            value: 0,
            minimum: 0,
            maximum: 255,
            fuzz: 0,
            flat: 0,
            resolution: 0,
        };
        let mut tp = TouchpadDispatch::new(&config(false, Some(pressure))).unwrap();
        // 25/256 and 30/256 of the range.
        assert_eq!(tp.pressure_low, 25);
        assert_eq!(tp.pressure_high, 30);

        let mut out = Vec::new();
        // BTN_TOUCH is ignored on pressure-capable pads.
        frame(&mut tp, 0, &[(codes::EV_KEY, codes::BTN_TOUCH, 1)], &mut out);
        assert!(!tp.touch_state.contains(TouchState::TOUCH));

        frame(
            &mut tp,
            10,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 1),
                (codes::EV_ABS, codes::ABS_PRESSURE, 40),
            ],
            &mut out,
        );
        assert!(tp.touch_state.contains(TouchState::TOUCH));

        frame(
            &mut tp,
            20,
            &[(codes::EV_ABS, codes::ABS_PRESSURE, 10)],
            &mut out,
        );
        assert!(!tp.touch_state.contains(TouchState::TOUCH));
    }

    #[test]
    fn elantech_uses_binary_pressure() {
        let (low, high) = pressure_thresholds(TouchpadModel::Elantech, 0, 255);
        assert_eq!((low, high), (1, 1));
        assert_eq!(model_for(0x0002, 0x000e), TouchpadModel::Elantech);
        assert_eq!(model_for(0x05ac, 0x1234), TouchpadModel::Appletouch);
        assert_eq!(model_for(0x1234, 0x5678), TouchpadModel::Unknown);
    }

    #[test]
    fn single_axis_frames_emit_after_warm_up() {
        let mut tp = touchpad();
        let mut out = Vec::new();

        frame(
            &mut tp,
            0,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 1),
                (codes::EV_KEY, codes::BTN_TOUCH, 1),
                (codes::EV_ABS, codes::ABS_X, 500),
                (codes::EV_ABS, codes::ABS_Y, 500),
            ],
            &mut out,
        );
        // Only X changes from here on; the relaxed filter must accept it.
        for i in 1..8u64 {
            frame(
                &mut tp,
                10 * i,
                &[(codes::EV_ABS, codes::ABS_X, 500 + 80 * i as i32)],
                &mut out,
            );
        }

        assert!(out
            .iter()
            .any(|event| matches!(event, InputEvent::PointerMotion { .. })));
    }

    #[test]
    fn non_finger_tool_resets_pipeline() {
        let mut tp = touchpad();
        let mut out = Vec::new();

        frame(
            &mut tp,
            0,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_FINGER, 1),
                (codes::EV_KEY, codes::BTN_TOUCH, 1),
                (codes::EV_ABS, codes::ABS_X, 500),
                (codes::EV_ABS, codes::ABS_Y, 500),
            ],
            &mut out,
        );
        for i in 1..4u64 {
            frame(
                &mut tp,
                10 * i,
                &[
                    (codes::EV_ABS, codes::ABS_X, 500 + 40 * i as i32),
                    (codes::EV_ABS, codes::ABS_Y, 500),
                ],
                &mut out,
            );
        }
        assert_eq!(tp.motion.count, 4);

        frame(
            &mut tp,
            50,
            &[(codes::EV_KEY, codes::BTN_TOOL_PEN, 1)],
            &mut out,
        );
        assert_eq!(tp.motion.count, 0);
    }

    #[test]
    fn three_fingers_emit_nothing() {
        let mut tp = touchpad();
        let mut out = Vec::new();

        frame(
            &mut tp,
            0,
            &[
                (codes::EV_KEY, codes::BTN_TOOL_TRIPLETAP, 1),
                (codes::EV_KEY, codes::BTN_TOUCH, 1),
                (codes::EV_ABS, codes::ABS_X, 500),
                (codes::EV_ABS, codes::ABS_Y, 500),
            ],
            &mut out,
        );
        for i in 1..8u64 {
            frame(
                &mut tp,
                10 * i,
                &[
                    (codes::EV_ABS, codes::ABS_X, 500 + 80 * i as i32),
                    (codes::EV_ABS, codes::ABS_Y, 500),
                ],
                &mut out,
            );
        }

        assert!(out.is_empty());
    }
}
