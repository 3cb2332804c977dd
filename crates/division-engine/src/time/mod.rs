//! Frame timing and pacing.
//!
//! One `FrameClock` per window: `is_due()` gates the next tick, `tick()` produces
//! the `FrameTime` handed to the host update callback.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
