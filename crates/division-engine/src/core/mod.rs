//! Host-facing contracts.
//!
//! `Context` is the root owner of every registry and of the backend; `App` is
//! what the runtime drives each tick.

mod app;
mod context;

pub use app::{App, AppControl};
pub use context::Context;
