#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # Intake: semantic input events from evdev
//!
//! This crate reads raw events from kernel event devices (one fd per
//! physical device) and translates them into a small, normalized stream of
//! semantic input events: pointer motion, buttons, scroll axes, keyboard
//! keys and touch points. It is the input layer of a compositor or any
//! other application that owns input devices directly.
//!
//! ## Structure
//!
//! A [`Device`] wraps one event-device fd. On creation the device is probed
//! and classified; touchpads get a stateful dispatcher with finger
//! tracking, coordinate conditioning, pointer acceleration, two-finger
//! scrolling and a tap state machine, while ordinary pointers, keyboards
//! and touchscreens go through a stateless fallback translation. Either way
//! the device is a [`calloop`] event source: register it with your loop and
//! receive [`InputEvent`]s in the source callback.
//!
//! Opening and closing device nodes is delegated to the embedder through
//! [`DeviceInterface`], so a privileged process (or a session broker) can
//! mediate access.
//!
//! ```no_run
//! use std::os::unix::io::OwnedFd;
//! use std::path::Path;
//!
//! use intake::reexports::calloop;
//! use intake::reexports::rustix::{self, fs::OFlags, io::Errno};
//! use intake::{Device, DeviceInterface};
//!
//! struct Embedder;
//!
//! impl DeviceInterface for Embedder {
//!     fn open_restricted(&mut self, path: &Path, flags: OFlags) -> Result<OwnedFd, Errno> {
//!         rustix::fs::open(path, flags, rustix::fs::Mode::empty())
//!     }
//!
//!     fn close_restricted(&mut self, fd: OwnedFd) {
//!         drop(fd);
//!     }
//!
//!     fn screen_dimensions(&mut self) -> (u32, u32) {
//!         (1920, 1080)
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device = Device::open(Path::new("/dev/input/event0"), Box::new(Embedder))?;
//!
//!     let mut event_loop = calloop::EventLoop::<()>::try_new()?;
//!     event_loop
//!         .handle()
//!         .insert_source(device, |event, _, _| println!("{event:?}"))
//!         .map_err(|err| err.error)?;
//!     event_loop.run(None, &mut (), |_| {})?;
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]; each device gets its own span. Wire
//! up a `tracing-subscriber` in the embedding application to see it.

use std::os::unix::io::OwnedFd;
use std::path::Path;

use rustix::fs::OFlags;
use rustix::io::Errno;

pub mod device;
pub mod evdev;
pub mod event;
pub mod reexports;
mod timer;
pub mod utils;

pub use device::{Device, DeviceCapabilities, DeviceError, KeyMask};
pub use event::{Axis, ButtonState, InputEvent, KeyState, Led, TouchKind};
pub use utils::Fixed;

/// Callbacks the embedding application provides to every [`Device`].
///
/// Device nodes usually require privileges to open; routing the open and
/// close through the embedder lets a session broker hand out fds without
/// the library ever holding credentials.
pub trait DeviceInterface {
    /// Opens a device node on behalf of the library.
    fn open_restricted(&mut self, path: &Path, flags: OFlags) -> Result<OwnedFd, Errno>;

    /// Closes an fd previously returned by
    /// [`open_restricted`](DeviceInterface::open_restricted).
    fn close_restricted(&mut self, fd: OwnedFd);

    /// Current output size in pixels, used to scale absolute coordinates.
    fn screen_dimensions(&mut self) -> (u32, u32);
}
