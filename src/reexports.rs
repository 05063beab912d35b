//! Reexports of crates, that are part of the public api, for convenience

pub use calloop;
pub use rustix;
