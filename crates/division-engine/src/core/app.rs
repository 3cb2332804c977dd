use crate::backend::Backend;
use crate::time::FrameTime;

use super::context::Context;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Host application driven once per tick.
pub trait App<B: Backend> {
    /// Called once after the context is created, before the first tick.
    ///
    /// Allocate buffers, link programs and register render passes here.
    fn init(&mut self, ctx: &mut Context<B>) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called once per tick, before the frame is submitted.
    fn update(&mut self, ctx: &mut Context<B>, time: FrameTime) -> AppControl;
}
