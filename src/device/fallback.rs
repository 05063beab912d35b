//! Generic event dispatching for pointers, keyboards and touchscreens.
//!
//! Unlike the touchpad path this dispatcher is almost stateless: it keeps a
//! single pending event per frame so that coordinates arriving one axis at a
//! time coalesce into one emission, flushing whenever the event kind changes
//! or the frame ends.

use crate::evdev::{codes, RawEvent};
use crate::event::{Axis, ButtonState, InputEvent, KeyState, TouchKind};
use crate::utils::Fixed;
use crate::DeviceInterface;

use super::{DeviceCapabilities, DeviceConfig};

/// Distance reported per wheel click, in fixed-point units.
const AXIS_STEP_DISTANCE: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingEvent {
    None,
    RelativeMotion,
    AbsoluteMtDown,
    AbsoluteMtMotion,
    AbsoluteMtUp,
    AbsoluteTouchDown,
    AbsoluteMotion,
    AbsoluteTouchUp,
}

#[derive(Debug)]
pub(crate) struct FallbackDispatch {
    pending: PendingEvent,
    rel_dx: Fixed,
    rel_dy: Fixed,
    abs_x: i32,
    abs_y: i32,
    slot: i32,
    slots: Vec<(i32, i32)>,
}

impl FallbackDispatch {
    pub(crate) fn new(config: &DeviceConfig) -> FallbackDispatch {
        FallbackDispatch {
            pending: PendingEvent::None,
            rel_dx: Fixed::ZERO,
            rel_dy: Fixed::ZERO,
            abs_x: 0,
            abs_y: 0,
            slot: config.initial_slot,
            slots: Vec::new(),
        }
    }

    #[profiling::function]
    pub(crate) fn process(
        &mut self,
        config: &DeviceConfig,
        interface: &mut dyn DeviceInterface,
        event: &RawEvent,
        sink: &mut dyn FnMut(InputEvent),
    ) {
        match event.kind {
            codes::EV_REL => self.process_relative(config, event, sink),
            codes::EV_ABS => self.process_absolute(config, interface, event, sink),
            codes::EV_KEY => self.process_key(config, event, sink),
            codes::EV_SYN => self.flush_pending(config, event.time, sink),
            _ => {}
        }
    }

    fn flush_pending(
        &mut self,
        config: &DeviceConfig,
        time: u64,
        sink: &mut dyn FnMut(InputEvent),
    ) {
        let slot = self.slot;
        match self.pending {
            PendingEvent::None => return,
            PendingEvent::RelativeMotion => {
                sink(InputEvent::PointerMotion {
                    time,
                    dx: self.rel_dx,
                    dy: self.rel_dy,
                });
                self.rel_dx = Fixed::ZERO;
                self.rel_dy = Fixed::ZERO;
            }
            PendingEvent::AbsoluteMtDown => {
                let (x, y) = self.slot_point();
                sink(InputEvent::Touch {
                    time,
                    slot,
                    x: Fixed::from_int(x),
                    y: Fixed::from_int(y),
                    kind: TouchKind::Down,
                });
            }
            PendingEvent::AbsoluteMtMotion => {
                let (x, y) = self.slot_point();
                sink(InputEvent::Touch {
                    time,
                    slot,
                    x: Fixed::from_int(x),
                    y: Fixed::from_int(y),
                    kind: TouchKind::Motion,
                });
            }
            PendingEvent::AbsoluteMtUp => {
                sink(InputEvent::Touch {
                    time,
                    slot,
                    x: Fixed::ZERO,
                    y: Fixed::ZERO,
                    kind: TouchKind::Up,
                });
            }
            PendingEvent::AbsoluteTouchDown => {
                let (x, y) = self.transform_absolute(config);
                sink(InputEvent::Touch {
                    time,
                    slot: 0,
                    x: Fixed::from_int(x),
                    y: Fixed::from_int(y),
                    kind: TouchKind::Down,
                });
            }
            PendingEvent::AbsoluteMotion => {
                let (x, y) = self.transform_absolute(config);
                if config.caps.contains(DeviceCapabilities::TOUCH) {
                    sink(InputEvent::Touch {
                        time,
                        slot: 0,
                        x: Fixed::from_int(x),
                        y: Fixed::from_int(y),
                        kind: TouchKind::Down,
                    });
                } else {
                    sink(InputEvent::PointerMotionAbsolute {
                        time,
                        x: Fixed::from_int(x),
                        y: Fixed::from_int(y),
                    });
                }
            }
            PendingEvent::AbsoluteTouchUp => {
                sink(InputEvent::Touch {
                    time,
                    slot: 0,
                    x: Fixed::ZERO,
                    y: Fixed::ZERO,
                    kind: TouchKind::Up,
                });
            }
        }
        self.pending = PendingEvent::None;
    }

    fn process_touch_button(
        &mut self,
        config: &DeviceConfig,
        time: u64,
        value: i32,
        sink: &mut dyn FnMut(InputEvent),
    ) {
        if self.pending != PendingEvent::None && self.pending != PendingEvent::AbsoluteMotion {
            self.flush_pending(config, time, sink);
        }
        self.pending = if value != 0 {
            PendingEvent::AbsoluteTouchDown
        } else {
            PendingEvent::AbsoluteTouchUp
        };
    }

    fn process_key(
        &mut self,
        config: &DeviceConfig,
        event: &RawEvent,
        sink: &mut dyn FnMut(InputEvent),
    ) {
        // Kernel key repeat is regenerated by the consumer.
        if event.value == 2 {
            return;
        }

        if event.code == codes::BTN_TOUCH {
            if !config.is_mt {
                self.process_touch_button(config, event.time, event.value, sink);
            }
            return;
        }

        self.flush_pending(config, event.time, sink);

        match event.code {
            codes::BTN_LEFT..=codes::BTN_TASK => sink(InputEvent::PointerButton {
                time: event.time,
                button: event.code as u32,
                state: if event.value != 0 {
                    ButtonState::Pressed
                } else {
                    ButtonState::Released
                },
            }),
            _ => sink(InputEvent::KeyboardKey {
                time: event.time,
                key: event.code as u32,
                state: if event.value != 0 {
                    KeyState::Pressed
                } else {
                    KeyState::Released
                },
            }),
        }
    }

    fn process_absolute(
        &mut self,
        config: &DeviceConfig,
        interface: &mut dyn DeviceInterface,
        event: &RawEvent,
        sink: &mut dyn FnMut(InputEvent),
    ) {
        if config.is_mt {
            self.process_touch(config, interface, event, sink);
        } else {
            self.process_absolute_motion(config, interface, event);
        }
    }

    fn process_touch(
        &mut self,
        config: &DeviceConfig,
        interface: &mut dyn DeviceInterface,
        event: &RawEvent,
        sink: &mut dyn FnMut(InputEvent),
    ) {
        let (screen_width, screen_height) = interface.screen_dimensions();

        match event.code {
            codes::ABS_MT_SLOT => {
                self.flush_pending(config, event.time, sink);
                self.slot = event.value;
            }
            codes::ABS_MT_TRACKING_ID => {
                if self.pending != PendingEvent::None
                    && self.pending != PendingEvent::AbsoluteMtMotion
                {
                    self.flush_pending(config, event.time, sink);
                }
                self.pending = if event.value >= 0 {
                    PendingEvent::AbsoluteMtDown
                } else {
                    PendingEvent::AbsoluteMtUp
                };
            }
            codes::ABS_MT_POSITION_X => {
                self.slot_point_mut().0 =
                    scale_axis(event.value, config.abs.min_x, config.abs.max_x, screen_width);
                if self.pending == PendingEvent::None {
                    self.pending = PendingEvent::AbsoluteMtMotion;
                }
            }
            codes::ABS_MT_POSITION_Y => {
                self.slot_point_mut().1 =
                    scale_axis(event.value, config.abs.min_y, config.abs.max_y, screen_height);
                if self.pending == PendingEvent::None {
                    self.pending = PendingEvent::AbsoluteMtMotion;
                }
            }
            _ => {}
        }
    }

    fn process_absolute_motion(
        &mut self,
        config: &DeviceConfig,
        interface: &mut dyn DeviceInterface,
        event: &RawEvent,
    ) {
        let (screen_width, screen_height) = interface.screen_dimensions();

        match event.code {
            codes::ABS_X => {
                self.abs_x =
                    scale_axis(event.value, config.abs.min_x, config.abs.max_x, screen_width);
                if self.pending == PendingEvent::None {
                    self.pending = PendingEvent::AbsoluteMotion;
                }
            }
            codes::ABS_Y => {
                self.abs_y =
                    scale_axis(event.value, config.abs.min_y, config.abs.max_y, screen_height);
                if self.pending == PendingEvent::None {
                    self.pending = PendingEvent::AbsoluteMotion;
                }
            }
            _ => {}
        }
    }

    fn process_relative(
        &mut self,
        config: &DeviceConfig,
        event: &RawEvent,
        sink: &mut dyn FnMut(InputEvent),
    ) {
        match event.code {
            codes::REL_X => {
                if self.pending != PendingEvent::RelativeMotion {
                    self.flush_pending(config, event.time, sink);
                }
                self.rel_dx += Fixed::from_int(event.value);
                self.pending = PendingEvent::RelativeMotion;
            }
            codes::REL_Y => {
                if self.pending != PendingEvent::RelativeMotion {
                    self.flush_pending(config, event.time, sink);
                }
                self.rel_dy += Fixed::from_int(event.value);
                self.pending = PendingEvent::RelativeMotion;
            }
            codes::REL_WHEEL => {
                self.flush_pending(config, event.time, sink);
                if event.value == 1 || event.value == -1 {
                    // Positive wheel clicks scroll up; screen coordinates
                    // grow downwards.
                    sink(InputEvent::PointerAxis {
                        time: event.time,
                        axis: Axis::Vertical,
                        value: Fixed::from_int(-event.value * AXIS_STEP_DISTANCE),
                    });
                }
            }
            codes::REL_HWHEEL => {
                self.flush_pending(config, event.time, sink);
                if event.value == 1 || event.value == -1 {
                    sink(InputEvent::PointerAxis {
                        time: event.time,
                        axis: Axis::Horizontal,
                        value: Fixed::from_int(event.value * AXIS_STEP_DISTANCE),
                    });
                }
            }
            _ => {}
        }
    }

    fn transform_absolute(&self, config: &DeviceConfig) -> (i32, i32) {
        match config.calibration {
            Some(m) => (
                (self.abs_x as f32 * m[0] + self.abs_y as f32 * m[1] + m[2]) as i32,
                (self.abs_x as f32 * m[3] + self.abs_y as f32 * m[4] + m[5]) as i32,
            ),
            None => (self.abs_x, self.abs_y),
        }
    }

    fn slot_point(&self) -> (i32, i32) {
        self.slots
            .get(self.slot.max(0) as usize)
            .copied()
            .unwrap_or((0, 0))
    }

    fn slot_point_mut(&mut self) -> &mut (i32, i32) {
        let index = self.slot.max(0) as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, (0, 0));
        }
        &mut self.slots[index]
    }
}

fn scale_axis(value: i32, min: i32, max: i32, screen: u32) -> i32 {
    let range = (max - min).max(1) as i64;
    ((value - min) as i64 * screen as i64 / range) as i32
}
