//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and Window, and drives one [`Context`](crate::Context)
//! on the `wgpu` backend per tick.

mod runtime;

pub use runtime::{Runtime, Settings};
