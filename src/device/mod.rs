//! Per-device handling: probing, classification and event dispatch.
//!
//! A [`Device`] wraps one kernel event-device fd. At construction the event
//! bits of the node are probed to classify it (rejecting joysticks and
//! accelerometer-like devices) and to pick a dispatcher: the stateful
//! touchpad dispatcher for pads, the generic fallback for everything else.
//! The device registers with a [`calloop`] event loop and delivers
//! [`InputEvent`]s through the source callback.

use std::fmt;
use std::mem::ManuallyDrop;
use std::os::unix::io::{AsFd, BorrowedFd, OwnedFd};
use std::path::Path;

use calloop::{EventSource, Interest, Mode, Poll, PostAction, Readiness, Token, TokenFactory};
use rustix::fs::OFlags;
use rustix::io::Errno;

use crate::evdev::{self, codes, AbsInfo, BitMask, KernelInputEvent, RawEvent, KEY_WORDS};
use crate::event::{InputEvent, Led};
use crate::utils::clock;
use crate::DeviceInterface;

use fallback::FallbackDispatch;
use touchpad::TouchpadDispatch;

mod fallback;
mod touchpad;

bitflags::bitflags! {
    /// What a device can report, derived from its event bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceCapabilities: u32 {
        /// Absolute positioning (`ABS_X`/`ABS_Y`)
        const MOTION_ABS = 1 << 0;
        /// Relative motion (`REL_X`/`REL_Y`)
        const MOTION_REL = 1 << 1;
        /// Keyboard keys or LEDs
        const KEYBOARD = 1 << 2;
        /// Touch contacts
        const TOUCH = 1 << 3;
        /// Mouse-style buttons
        const BUTTON = 1 << 4;
    }
}

/// Range of the absolute axes, from the axis probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AbsRange {
    pub(crate) min_x: i32,
    pub(crate) max_x: i32,
    pub(crate) min_y: i32,
    pub(crate) max_y: i32,
}

/// Everything the dispatchers need to know about the device.
#[derive(Debug, Clone)]
pub(crate) struct DeviceConfig {
    pub(crate) name: String,
    pub(crate) vendor: u16,
    pub(crate) product: u16,
    pub(crate) caps: DeviceCapabilities,
    pub(crate) abs: AbsRange,
    pub(crate) pressure: Option<AbsInfo>,
    pub(crate) is_mt: bool,
    pub(crate) initial_slot: i32,
    pub(crate) buttonpad: bool,
    pub(crate) calibration: Option<[f32; 6]>,
}

/// Errors surfaced when opening or driving a device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device class is not handled (joystick or accelerometer-like)
    #[error("device is not handled by this library")]
    UnhandledDevice,
    /// The embedder refused to open the device node
    #[error("failed to open device: {0}")]
    Open(Errno),
    /// An ioctl during capability probing failed
    #[error("failed to probe device: {0}")]
    Probe(Errno),
    /// The tap timer could not be created or read
    #[error("tap timer error: {0}")]
    Timer(Errno),
}

#[derive(Debug)]
enum DeviceDispatch {
    Touchpad(TouchpadDispatch),
    Fallback(FallbackDispatch),
}

/// A single input device feeding semantic events into the host event loop.
///
/// Register the device with a [`calloop`] loop to receive events; a
/// touchpad registers its tap-timer fd alongside the event fd. The device
/// node is closed through the embedder's
/// [`close_restricted`](DeviceInterface::close_restricted) on drop.
pub struct Device {
    fd: ManuallyDrop<OwnedFd>,
    config: DeviceConfig,
    dispatch: DeviceDispatch,
    interface: Box<dyn DeviceInterface>,
    token: Option<Token>,
    timer_token: Option<Token>,
    span: tracing::Span,
    read_buf: Vec<RawEvent>,
}

/// Current key/button state of a device, from [`Device::keys`].
#[derive(Debug, Clone, Copy)]
pub struct KeyMask(BitMask<KEY_WORDS>);

impl KeyMask {
    /// Whether the given `KEY_*`/`BTN_*` code is currently down.
    pub fn is_pressed(&self, code: u16) -> bool {
        self.0.contains(code)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ProbedBits {
    ev: BitMask<1>,
    abs: BitMask<1>,
    rel: BitMask<1>,
    key: BitMask<KEY_WORDS>,
    props: BitMask<1>,
}

#[derive(Debug, Clone, Copy)]
struct Classification {
    caps: DeviceCapabilities,
    is_mt: bool,
    touchpad: bool,
}

fn classify(bits: &ProbedBits) -> Result<Classification, DeviceError> {
    let mut caps = DeviceCapabilities::empty();
    let mut is_mt = false;
    let mut has_abs = false;
    let mut has_key = false;
    let mut touchpad = false;

    if bits.ev.contains(codes::EV_ABS) {
        has_abs = true;

        // Joysticks are left to the applications that understand them.
        if bits.abs.contains(codes::ABS_WHEEL)
            || bits.abs.contains(codes::ABS_GAS)
            || bits.abs.contains(codes::ABS_BRAKE)
            || bits.abs.contains(codes::ABS_HAT0X)
        {
            return Err(DeviceError::UnhandledDevice);
        }

        if bits.abs.contains(codes::ABS_X) || bits.abs.contains(codes::ABS_Y) {
            caps |= DeviceCapabilities::MOTION_ABS;
        }

        // Only the slotted protocol B is handled; protocol-A devices are
        // treated as single-touch through BTN_TOUCH.
        if bits.abs.contains(codes::ABS_MT_POSITION_X)
            && bits.abs.contains(codes::ABS_MT_POSITION_Y)
            && bits.abs.contains(codes::ABS_MT_SLOT)
        {
            is_mt = true;
            caps |= DeviceCapabilities::TOUCH;
        }
    }

    if bits.ev.contains(codes::EV_REL)
        && (bits.rel.contains(codes::REL_X) || bits.rel.contains(codes::REL_Y))
    {
        caps |= DeviceCapabilities::MOTION_REL;
    }

    if bits.ev.contains(codes::EV_KEY) {
        has_key = true;

        touchpad = has_abs
            && bits.key.contains(codes::BTN_TOOL_FINGER)
            && !bits.key.contains(codes::BTN_TOOL_PEN);

        for code in codes::KEY_ESC..codes::KEY_MAX {
            if (codes::BTN_MISC..codes::KEY_OK).contains(&code) {
                continue;
            }
            if bits.key.contains(code) {
                caps |= DeviceCapabilities::KEYBOARD;
                break;
            }
        }

        if bits.key.contains(codes::BTN_TOUCH) {
            caps |= DeviceCapabilities::TOUCH;
        }

        // A button-equipped absolute device is a tablet or a mouse, not a
        // touchscreen.
        for code in codes::BTN_MISC..codes::BTN_JOYSTICK {
            if bits.key.contains(code) {
                caps |= DeviceCapabilities::BUTTON;
                caps.remove(DeviceCapabilities::TOUCH);
                break;
            }
        }
    }

    if bits.ev.contains(codes::EV_LED) {
        caps |= DeviceCapabilities::KEYBOARD;
    }

    // Absolute axes but no keys at all: an accelerometer, not an input
    // device.
    if has_abs && !has_key && !is_mt {
        return Err(DeviceError::UnhandledDevice);
    }

    Ok(Classification {
        caps,
        is_mt,
        touchpad,
    })
}

fn probe(fd: BorrowedFd<'_>) -> Result<(DeviceConfig, bool), DeviceError> {
    let mut bits = ProbedBits {
        ev: evdev::event_bits(fd, 0).map_err(DeviceError::Probe)?,
        ..ProbedBits::default()
    };
    if bits.ev.contains(codes::EV_ABS) {
        bits.abs = evdev::event_bits(fd, codes::EV_ABS).map_err(DeviceError::Probe)?;
    }
    if bits.ev.contains(codes::EV_REL) {
        bits.rel = evdev::event_bits(fd, codes::EV_REL).map_err(DeviceError::Probe)?;
    }
    if bits.ev.contains(codes::EV_KEY) {
        bits.key = evdev::event_bits(fd, codes::EV_KEY).map_err(DeviceError::Probe)?;
    }
    bits.props = evdev::property_bits(fd).unwrap_or_default();

    let class = classify(&bits)?;

    let mut abs = AbsRange::default();
    let mut initial_slot = 0;
    if bits.abs.contains(codes::ABS_X) {
        let info = evdev::abs_info(fd, codes::ABS_X).map_err(DeviceError::Probe)?;
        abs.min_x = info.minimum;
        abs.max_x = info.maximum;
    }
    if bits.abs.contains(codes::ABS_Y) {
        let info = evdev::abs_info(fd, codes::ABS_Y).map_err(DeviceError::Probe)?;
        abs.min_y = info.minimum;
        abs.max_y = info.maximum;
    }
    if class.is_mt {
        let info = evdev::abs_info(fd, codes::ABS_MT_POSITION_X).map_err(DeviceError::Probe)?;
        abs.min_x = info.minimum;
        abs.max_x = info.maximum;
        let info = evdev::abs_info(fd, codes::ABS_MT_POSITION_Y).map_err(DeviceError::Probe)?;
        abs.min_y = info.minimum;
        abs.max_y = info.maximum;
        initial_slot = evdev::abs_info(fd, codes::ABS_MT_SLOT)
            .map_err(DeviceError::Probe)?
            .value;
    }

    let pressure = if bits.abs.contains(codes::ABS_PRESSURE) {
        Some(evdev::abs_info(fd, codes::ABS_PRESSURE).map_err(DeviceError::Probe)?)
    } else {
        None
    };

    let id = evdev::device_id(fd).map_err(DeviceError::Probe)?;
    let name = evdev::device_name(fd).unwrap_or_else(|_| "unknown".to_owned());

    Ok((
        DeviceConfig {
            name,
            vendor: id.vendor,
            product: id.product,
            caps: class.caps,
            abs,
            pressure,
            is_mt: class.is_mt,
            initial_slot,
            buttonpad: bits.props.contains(codes::INPUT_PROP_BUTTONPAD),
            calibration: None,
        },
        class.touchpad,
    ))
}

impl Device {
    /// Opens the event device at `path` through the embedder interface and
    /// probes it.
    ///
    /// Returns [`DeviceError::UnhandledDevice`] for device classes this
    /// library rejects; the fd is handed back to
    /// [`close_restricted`](DeviceInterface::close_restricted) in that case.
    pub fn open(path: &Path, mut interface: Box<dyn DeviceInterface>) -> Result<Device, DeviceError> {
        let fd = interface
            .open_restricted(path, OFlags::RDWR | OFlags::NONBLOCK | OFlags::CLOEXEC)
            .map_err(DeviceError::Open)?;
        Device::from_fd(fd, interface)
    }

    /// Builds a device from an already opened event-device fd.
    ///
    /// The fd must be in non-blocking mode. Ownership transfers to the
    /// device; it is closed through the interface even on error.
    pub fn from_fd(fd: OwnedFd, mut interface: Box<dyn DeviceInterface>) -> Result<Device, DeviceError> {
        let (config, is_touchpad) = match probe(fd.as_fd()) {
            Ok(probed) => probed,
            Err(err) => {
                interface.close_restricted(fd);
                return Err(err);
            }
        };

        let span = tracing::info_span!("intake_device", device = %config.name);
        {
            let _guard = span.enter();

            let dispatch = if is_touchpad {
                match TouchpadDispatch::new(&config) {
                    Ok(touchpad) => DeviceDispatch::Touchpad(touchpad),
                    Err(err) => {
                        tracing::warn!(%err, "touchpad setup failed, using the fallback dispatcher");
                        DeviceDispatch::Fallback(FallbackDispatch::new(&config))
                    }
                }
            } else {
                DeviceDispatch::Fallback(FallbackDispatch::new(&config))
            };

            tracing::info!(caps = ?config.caps, touchpad = is_touchpad, "new device");

            Ok(Device {
                fd: ManuallyDrop::new(fd),
                config,
                dispatch,
                interface,
                token: None,
                timer_token: None,
                span: span.clone(),
                read_buf: Vec::with_capacity(32),
            })
        }
    }

    /// Human-readable device name from the kernel.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// USB/bus vendor id.
    pub fn vendor_id(&self) -> u16 {
        self.config.vendor
    }

    /// USB/bus product id.
    pub fn product_id(&self) -> u16 {
        self.config.product
    }

    /// Capabilities detected at probe time.
    pub fn capabilities(&self) -> DeviceCapabilities {
        self.config.caps
    }

    /// Installs a 2×3 affine calibration matrix for absolute coordinates.
    pub fn set_calibration(&mut self, matrix: [f32; 6]) {
        self.config.calibration = Some(matrix);
    }

    /// Snapshot of the currently pressed keys and buttons.
    pub fn keys(&self) -> Result<KeyMask, DeviceError> {
        evdev::key_state(self.fd.as_fd())
            .map(KeyMask)
            .map_err(DeviceError::Probe)
    }

    /// Pushes the LED state to a keyboard-capable device.
    ///
    /// Write errors are logged and otherwise ignored; LEDs are best effort.
    pub fn led_update(&self, leds: Led) {
        if !self.config.caps.contains(DeviceCapabilities::KEYBOARD) {
            return;
        }

        let batch = [
            KernelInputEvent::new(codes::EV_LED, codes::LED_NUML, leds.contains(Led::NUM_LOCK) as i32),
            KernelInputEvent::new(codes::EV_LED, codes::LED_CAPSL, leds.contains(Led::CAPS_LOCK) as i32),
            KernelInputEvent::new(
                codes::EV_LED,
                codes::LED_SCROLLL,
                leds.contains(Led::SCROLL_LOCK) as i32,
            ),
            KernelInputEvent::new(codes::EV_SYN, codes::SYN_REPORT, 0),
        ];
        if let Err(err) = rustix::io::write(&*self.fd, KernelInputEvent::as_bytes(&batch)) {
            tracing::debug!(%err, "LED update failed");
        }
    }

    fn dispatch_pending(&mut self, callback: &mut dyn FnMut(InputEvent)) -> PostAction {
        // Process everything available; the host may only poll once per
        // repaint and leaving events behind would add input lag.
        loop {
            let Device {
                fd,
                config,
                dispatch,
                interface,
                read_buf,
                ..
            } = self;

            read_buf.clear();
            match evdev::read_batch(fd.as_fd(), read_buf) {
                Ok(0) => return PostAction::Continue,
                Ok(_) => {
                    for event in read_buf.iter() {
                        match dispatch {
                            DeviceDispatch::Touchpad(touchpad) => touchpad.process(event, callback),
                            DeviceDispatch::Fallback(fallback) => {
                                fallback.process(config, interface.as_mut(), event, callback)
                            }
                        }
                    }
                }
                Err(err) if err == Errno::AGAIN || err == Errno::INTR => {
                    return PostAction::Continue
                }
                Err(err) => {
                    // The device is gone or the fd is broken; detach the
                    // source and leave the device suspended.
                    tracing::error!(%err, "fatal read error, detaching device");
                    return PostAction::Remove;
                }
            }
        }
    }

    #[cfg(test)]
    fn from_parts(
        fd: OwnedFd,
        config: DeviceConfig,
        dispatch: DeviceDispatch,
        interface: Box<dyn DeviceInterface>,
    ) -> Device {
        Device {
            fd: ManuallyDrop::new(fd),
            span: tracing::info_span!("intake_device", device = %config.name),
            config,
            dispatch,
            interface,
            token: None,
            timer_token: None,
            read_buf: Vec::with_capacity(32),
        }
    }
}

impl EventSource for Device {
    type Event = InputEvent;
    type Metadata = ();
    type Ret = ();
    type Error = DeviceError;

    #[profiling::function]
    fn process_events<F>(
        &mut self,
        _: Readiness,
        token: Token,
        mut callback: F,
    ) -> Result<PostAction, DeviceError>
    where
        F: FnMut(InputEvent, &mut ()),
    {
        let span = self.span.clone();
        let _guard = span.enter();

        if self.timer_token == Some(token) {
            if let DeviceDispatch::Touchpad(touchpad) = &mut self.dispatch {
                let now = clock::now_ms();
                touchpad
                    .expire_timer(now, &mut |event| callback(event, &mut ()))
                    .map_err(DeviceError::Timer)?;
            }
            return Ok(PostAction::Continue);
        }

        if self.token != Some(token) {
            return Ok(PostAction::Continue);
        }

        Ok(self.dispatch_pending(&mut |event| callback(event, &mut ())))
    }

    fn register(&mut self, poll: &mut Poll, factory: &mut TokenFactory) -> calloop::Result<()> {
        self.token = Some(factory.token());
        unsafe {
            poll.register(
                self.fd.as_fd(),
                Interest::READ,
                Mode::Level,
                self.token.unwrap(),
            )?;
        }

        if let DeviceDispatch::Touchpad(touchpad) = &self.dispatch {
            self.timer_token = Some(factory.token());
            unsafe {
                poll.register(
                    touchpad.timer().as_fd(),
                    Interest::READ,
                    Mode::Level,
                    self.timer_token.unwrap(),
                )?;
            }
        }
        Ok(())
    }

    fn reregister(&mut self, poll: &mut Poll, factory: &mut TokenFactory) -> calloop::Result<()> {
        self.token = Some(factory.token());
        poll.reregister(
            self.fd.as_fd(),
            Interest::READ,
            Mode::Level,
            self.token.unwrap(),
        )?;

        if let DeviceDispatch::Touchpad(touchpad) = &self.dispatch {
            self.timer_token = Some(factory.token());
            poll.reregister(
                touchpad.timer().as_fd(),
                Interest::READ,
                Mode::Level,
                self.timer_token.unwrap(),
            )?;
        }
        Ok(())
    }

    fn unregister(&mut self, poll: &mut Poll) -> calloop::Result<()> {
        self.token = None;
        poll.unregister(self.fd.as_fd())?;

        if let DeviceDispatch::Touchpad(touchpad) = &self.dispatch {
            self.timer_token = None;
            poll.unregister(touchpad.timer().as_fd())?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: self.fd is not touched again after the take.
        let fd = unsafe { ManuallyDrop::take(&mut self.fd) };
        self.interface.close_restricted(fd);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("fd", &*self.fd)
            .field("config", &self.config)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}
