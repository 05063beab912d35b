//! Pointer motion filtering.
//!
//! Filters transform raw `(dx, dy)` deltas before emission. The only
//! concrete filter is the pointer accelerator, which scales deltas by a
//! profile of the instantaneous pointer speed; keeping the trait seam makes
//! the dispatcher independent of the filter construction.

/// Transforms motion deltas, one call per reported delta.
pub(crate) trait MotionFilter {
    /// Maps a raw delta and its timestamp to the output delta.
    fn dispatch(&mut self, dx: f64, dy: f64, time: u64) -> (f64, f64);
}

/// Speed→factor profile consulted by the [`PointerAccelerator`].
pub(crate) trait AccelProfile {
    /// Acceleration factor for a pointer speed in device units per ms.
    fn factor(&self, velocity: f64, time: u64) -> f64;
}

/// Scales deltas by the profile of the instantaneous pointer speed.
///
/// Speed is estimated from the delta magnitude and the time elapsed since
/// the previous sample; the first sample after construction counts as
/// stationary.
pub(crate) struct PointerAccelerator<P> {
    profile: P,
    last_time: Option<u64>,
}

impl<P: AccelProfile> PointerAccelerator<P> {
    pub(crate) fn new(profile: P) -> PointerAccelerator<P> {
        PointerAccelerator {
            profile,
            last_time: None,
        }
    }
}

impl<P: AccelProfile> MotionFilter for PointerAccelerator<P> {
    fn dispatch(&mut self, dx: f64, dy: f64, time: u64) -> (f64, f64) {
        let velocity = match self.last_time {
            Some(last) if time > last => dx.hypot(dy) / (time - last) as f64,
            _ => 0.0,
        };
        self.last_time = Some(time);

        let factor = self.profile.factor(velocity, time);
        (dx * factor, dy * factor)
    }
}

/// Touchpad profile: linear in speed, clamped to a device-scaled band.
///
/// `constant` is `50 / diagonal` so that pads of different physical
/// resolution feel alike.
pub(crate) struct DiagonalProfile {
    pub constant: f64,
    pub min: f64,
    pub max: f64,
}

impl AccelProfile for DiagonalProfile {
    fn factor(&self, velocity: f64, _time: u64) -> f64 {
        (velocity * self.constant).clamp(self.min, self.max)
    }
}
