//! Raw evdev protocol: event records, code constants and device probing.
//!
//! This module speaks the kernel side of the contract. Everything here deals
//! in `EV_*`/`ABS_*`/`BTN_*` code space and `ioctl` probing; the translation
//! into semantic events lives in [`crate::device`].

use std::mem;
use std::os::unix::io::{AsRawFd, BorrowedFd};
use std::slice;

use rustix::io::Errno;

/// Kernel input event codes used by this crate.
///
/// Values follow `linux/input-event-codes.h`.
#[allow(missing_docs)]
pub mod codes {
    pub const EV_SYN: u16 = 0x00;
    pub const EV_KEY: u16 = 0x01;
    pub const EV_REL: u16 = 0x02;
    pub const EV_ABS: u16 = 0x03;
    pub const EV_LED: u16 = 0x11;
    pub const EV_MAX: u16 = 0x1f;

    pub const SYN_REPORT: u16 = 0x00;

    pub const REL_X: u16 = 0x00;
    pub const REL_Y: u16 = 0x01;
    pub const REL_HWHEEL: u16 = 0x06;
    pub const REL_WHEEL: u16 = 0x08;
    pub const REL_MAX: u16 = 0x0f;

    pub const ABS_X: u16 = 0x00;
    pub const ABS_Y: u16 = 0x01;
    pub const ABS_WHEEL: u16 = 0x08;
    pub const ABS_GAS: u16 = 0x09;
    pub const ABS_BRAKE: u16 = 0x0a;
    pub const ABS_HAT0X: u16 = 0x10;
    pub const ABS_PRESSURE: u16 = 0x18;
    pub const ABS_MT_SLOT: u16 = 0x2f;
    pub const ABS_MT_POSITION_X: u16 = 0x35;
    pub const ABS_MT_POSITION_Y: u16 = 0x36;
    pub const ABS_MT_TRACKING_ID: u16 = 0x39;
    pub const ABS_MAX: u16 = 0x3f;

    pub const KEY_ESC: u16 = 0x01;
    pub const KEY_OK: u16 = 0x160;
    pub const KEY_MAX: u16 = 0x2ff;

    pub const BTN_MISC: u16 = 0x100;
    pub const BTN_LEFT: u16 = 0x110;
    pub const BTN_RIGHT: u16 = 0x111;
    pub const BTN_MIDDLE: u16 = 0x112;
    pub const BTN_SIDE: u16 = 0x113;
    pub const BTN_EXTRA: u16 = 0x114;
    pub const BTN_FORWARD: u16 = 0x115;
    pub const BTN_BACK: u16 = 0x116;
    pub const BTN_TASK: u16 = 0x117;
    pub const BTN_JOYSTICK: u16 = 0x120;
    pub const BTN_TOOL_PEN: u16 = 0x140;
    pub const BTN_TOOL_RUBBER: u16 = 0x141;
    pub const BTN_TOOL_BRUSH: u16 = 0x142;
    pub const BTN_TOOL_PENCIL: u16 = 0x143;
    pub const BTN_TOOL_AIRBRUSH: u16 = 0x144;
    pub const BTN_TOOL_FINGER: u16 = 0x145;
    pub const BTN_TOOL_MOUSE: u16 = 0x146;
    pub const BTN_TOOL_LENS: u16 = 0x147;
    pub const BTN_TOUCH: u16 = 0x14a;
    pub const BTN_TOOL_DOUBLETAP: u16 = 0x14d;
    pub const BTN_TOOL_TRIPLETAP: u16 = 0x14e;

    pub const LED_NUML: u16 = 0x00;
    pub const LED_CAPSL: u16 = 0x01;
    pub const LED_SCROLLL: u16 = 0x02;

    pub const INPUT_PROP_BUTTONPAD: u16 = 0x02;
    pub const INPUT_PROP_MAX: u16 = 0x1f;
}

/// A single raw event as read from an event-device fd.
///
/// `time` is milliseconds on the monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// Timestamp in milliseconds
    pub time: u64,
    /// Event type (`EV_*`)
    pub kind: u16,
    /// Event code within the type
    pub code: u16,
    /// Event value
    pub value: i32,
}

/// `struct input_event` as the kernel writes it.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct KernelInputEvent {
    pub time: libc::timeval,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl KernelInputEvent {
    pub(crate) const fn zeroed() -> KernelInputEvent {
        KernelInputEvent {
            time: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            kind: 0,
            code: 0,
            value: 0,
        }
    }

    pub(crate) fn new(kind: u16, code: u16, value: i32) -> KernelInputEvent {
        KernelInputEvent {
            kind,
            code,
            value,
            ..KernelInputEvent::zeroed()
        }
    }

    pub(crate) fn as_bytes(batch: &[KernelInputEvent]) -> &[u8] {
        // Plain-old-data with no padding on all supported targets.
        unsafe { slice::from_raw_parts(batch.as_ptr().cast::<u8>(), mem::size_of_val(batch)) }
    }
}

impl From<KernelInputEvent> for RawEvent {
    fn from(ev: KernelInputEvent) -> RawEvent {
        RawEvent {
            time: ev.time.tv_sec as u64 * 1000 + ev.time.tv_usec as u64 / 1000,
            kind: ev.kind,
            code: ev.code,
            value: ev.value,
        }
    }
}

/// `struct input_id`. All fields are required for the ioctl layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
#[allow(dead_code)]
pub(crate) struct InputId {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

/// `struct input_absinfo` for one absolute axis. All fields are required
/// for the ioctl layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(dead_code)]
pub(crate) struct AbsInfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

/// Fixed-size bit set as filled in by `EVIOCGBIT` and friends.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BitMask<const N: usize>([u64; N]);

/// Words needed for the `EV_KEY` code space.
pub(crate) const KEY_WORDS: usize = (codes::KEY_MAX as usize + 64) / 64;

impl<const N: usize> BitMask<N> {
    pub(crate) const fn new() -> BitMask<N> {
        BitMask([0; N])
    }

    pub(crate) fn contains(&self, bit: u16) -> bool {
        let bit = bit as usize;
        bit / 64 < N && self.0[bit / 64] & (1 << (bit % 64)) != 0
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn insert(&mut self, bit: u16) {
        let bit = bit as usize;
        debug_assert!(bit / 64 < N);
        self.0[bit / 64] |= 1 << (bit % 64);
    }

    fn as_mut_ptr(&mut self) -> *mut libc::c_void {
        self.0.as_mut_ptr().cast()
    }

    const fn byte_len() -> usize {
        N * mem::size_of::<u64>()
    }
}

impl<const N: usize> Default for BitMask<N> {
    fn default() -> Self {
        BitMask::new()
    }
}

const IOC_READ: u64 = 2;

const fn ioc(dir: u64, ty: u8, nr: u64, size: usize) -> u64 {
    (dir << 30) | ((size as u64) << 16) | ((ty as u64) << 8) | nr
}

fn evdev_ioctl(fd: BorrowedFd<'_>, request: u64, arg: *mut libc::c_void) -> Result<(), Errno> {
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), request as libc::c_ulong, arg) };
    if ret < 0 {
        Err(Errno::from_raw_os_error(
            std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
        ))
    } else {
        Ok(())
    }
}

/// `EVIOCGBIT(kind, ...)`: which codes of an event type the device reports.
pub(crate) fn event_bits<const N: usize>(fd: BorrowedFd<'_>, kind: u16) -> Result<BitMask<N>, Errno> {
    let mut mask = BitMask::<N>::new();
    let request = ioc(IOC_READ, b'E', 0x20 + kind as u64, BitMask::<N>::byte_len());
    evdev_ioctl(fd, request, mask.as_mut_ptr())?;
    Ok(mask)
}

/// `EVIOCGPROP`: device property bits.
pub(crate) fn property_bits(fd: BorrowedFd<'_>) -> Result<BitMask<1>, Errno> {
    let mut mask = BitMask::<1>::new();
    let request = ioc(IOC_READ, b'E', 0x09, BitMask::<1>::byte_len());
    evdev_ioctl(fd, request, mask.as_mut_ptr())?;
    Ok(mask)
}

/// `EVIOCGKEY`: current key/button state.
pub(crate) fn key_state(fd: BorrowedFd<'_>) -> Result<BitMask<KEY_WORDS>, Errno> {
    let mut mask = BitMask::<KEY_WORDS>::new();
    let request = ioc(IOC_READ, b'E', 0x18, BitMask::<KEY_WORDS>::byte_len());
    evdev_ioctl(fd, request, mask.as_mut_ptr())?;
    Ok(mask)
}

/// `EVIOCGABS`: range and current value of one absolute axis.
pub(crate) fn abs_info(fd: BorrowedFd<'_>, axis: u16) -> Result<AbsInfo, Errno> {
    let mut info = AbsInfo::default();
    let request = ioc(IOC_READ, b'E', 0x40 + axis as u64, mem::size_of::<AbsInfo>());
    evdev_ioctl(fd, request, (&mut info as *mut AbsInfo).cast())?;
    Ok(info)
}

/// `EVIOCGID`: bus/vendor/product/version of the device.
pub(crate) fn device_id(fd: BorrowedFd<'_>) -> Result<InputId, Errno> {
    let mut id = InputId::default();
    let request = ioc(IOC_READ, b'E', 0x02, mem::size_of::<InputId>());
    evdev_ioctl(fd, request, (&mut id as *mut InputId).cast())?;
    Ok(id)
}

/// `EVIOCGNAME`: human-readable device name.
pub(crate) fn device_name(fd: BorrowedFd<'_>) -> Result<String, Errno> {
    let mut buf = [0u8; 256];
    let request = ioc(IOC_READ, b'E', 0x06, buf.len());
    evdev_ioctl(fd, request, buf.as_mut_ptr().cast())?;
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
}

/// Reads one batch of raw events from the device fd.
///
/// Returns the number of events appended to `events`; zero means the fd had
/// no complete record available. `WOULDBLOCK`/`INTR` surface as errors for
/// the caller's read loop to interpret.
pub(crate) fn read_batch(fd: BorrowedFd<'_>, events: &mut Vec<RawEvent>) -> Result<usize, Errno> {
    let mut buf = [KernelInputEvent::zeroed(); 32];
    let record = mem::size_of::<KernelInputEvent>();
    let bytes =
        unsafe { slice::from_raw_parts_mut(buf.as_mut_ptr().cast::<u8>(), record * buf.len()) };
    let len = rustix::io::read(fd, bytes)?;

    if len % record != 0 {
        // Partial record; the kernel never splits events, so drop the batch.
        tracing::warn!(len, "dropping short read from event device");
        return Ok(0);
    }

    let count = len / record;
    events.extend(buf[..count].iter().copied().map(RawEvent::from));
    Ok(count)
}
