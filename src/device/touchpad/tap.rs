//! Tap gesture state machine.
//!
//! Touch, release and motion signals are queued and applied in one place,
//! so the coordinate pipeline always observes a consistent machine within a
//! report frame. A single-shot monotonic timer distinguishes a tap from the
//! beginning of a slower gesture.

use std::time::Duration;

use rustix::io::Errno;
use smallvec::SmallVec;

use crate::event::{ButtonState, InputEvent};
use crate::evdev::codes;
use crate::timer::Timer;

/// Button synthesized for tap gestures.
const TAP_BUTTON: u32 = codes::BTN_LEFT as u32;

/// How long after a release a touch still counts as a tap.
pub(super) const TAP_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TapEvent {
    Touch,
    Release,
    Motion,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TapState {
    Idle,
    Touch,
    Tap,
    Tap2,
    Drag,
}

#[derive(Debug)]
pub(super) struct TapMachine {
    enabled: bool,
    state: TapState,
    queue: SmallVec<[TapEvent; 16]>,
    timer: Timer,
}

impl TapMachine {
    /// Creates the machine and its timer fd.
    ///
    /// `enabled` is false for buttonpads; a disabled machine ignores all
    /// input and never arms the timer.
    pub(super) fn new(enabled: bool) -> Result<TapMachine, Errno> {
        Ok(TapMachine {
            enabled,
            state: TapState::Idle,
            queue: SmallVec::new(),
            timer: Timer::new()?,
        })
    }

    pub(super) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(super) fn timer(&self) -> &Timer {
        &self.timer
    }

    pub(super) fn push(&mut self, event: TapEvent) {
        if !self.enabled {
            return;
        }
        self.queue.push(event);
    }

    /// Applies all queued events to the transition table.
    ///
    /// Each processed event records a timer request (disarm by default, the
    /// tap timeout when entering `Tap`); the request of the last processed
    /// event is applied once after the loop. This matches the established
    /// behavior: a later event in the same drain overrides an earlier
    /// event's arming.
    pub(super) fn drain(&mut self, time: u64, sink: &mut dyn FnMut(InputEvent)) {
        if !self.enabled || self.queue.is_empty() {
            return;
        }

        let mut rearm = None;
        let mut i = 0;
        while i < self.queue.len() {
            let event = self.queue[i];
            i += 1;
            rearm = Some(Duration::ZERO);

            self.state = match self.state {
                TapState::Idle => match event {
                    TapEvent::Touch => TapState::Touch,
                    _ => TapState::Idle,
                },
                TapState::Touch => match event {
                    TapEvent::Release => {
                        rearm = Some(TAP_TIMEOUT);
                        TapState::Tap
                    }
                    _ => TapState::Idle,
                },
                TapState::Tap => match event {
                    TapEvent::Timeout => {
                        self.click(time, sink);
                        TapState::Idle
                    }
                    TapEvent::Touch => {
                        self.button(time, ButtonState::Pressed, sink);
                        TapState::Tap2
                    }
                    _ => TapState::Idle,
                },
                TapState::Tap2 => match event {
                    TapEvent::Motion => TapState::Drag,
                    TapEvent::Release => {
                        self.button(time, ButtonState::Released, sink);
                        self.click(time, sink);
                        TapState::Idle
                    }
                    _ => TapState::Idle,
                },
                TapState::Drag => match event {
                    TapEvent::Release => {
                        self.button(time, ButtonState::Released, sink);
                        TapState::Idle
                    }
                    _ => TapState::Idle,
                },
            };
        }
        self.queue.clear();

        if let Some(timeout) = rearm {
            if let Err(err) = self.timer.set(timeout) {
                tracing::error!(%err, "failed to arm tap timer");
            }
        }
    }

    /// Handles an expiry of the tap timer.
    ///
    /// The timeout transition only applies from `Tap`, so an expiry racing a
    /// state-changing event is ignored. Events still queued at expiry take
    /// priority and the timeout is dropped, as they carry their own timer
    /// request.
    pub(super) fn expire(&mut self, now: u64, sink: &mut dyn FnMut(InputEvent)) -> Result<(), Errno> {
        self.timer.acknowledge()?;

        if self.queue.is_empty() {
            self.push(TapEvent::Timeout);
            self.drain(now, sink);
        }
        Ok(())
    }

    fn button(&self, time: u64, state: ButtonState, sink: &mut dyn FnMut(InputEvent)) {
        sink(InputEvent::PointerButton {
            time,
            button: TAP_BUTTON,
            state,
        });
    }

    fn click(&self, time: u64, sink: &mut dyn FnMut(InputEvent)) {
        self.button(time, ButtonState::Pressed, sink);
        self.button(time, ButtonState::Released, sink);
    }

    #[cfg(test)]
    pub(super) fn state(&self) -> TapState {
        self.state
    }
}
