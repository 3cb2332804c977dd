//! Validation error capture around device calls.
//!
//! Without an open error scope wgpu hands validation failures to the device's
//! uncaptured-error handler, which panics by default.

use core::fmt::Display;

use crate::error::{EngineError, Result};

/// Runs `f` inside a validation scope and returns its value, or the captured
/// validation error as [`EngineError::Backend`].
pub(crate) fn validated<T>(device: &wgpu::Device, what: &str, f: impl FnOnce() -> T) -> Result<T> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let error = pollster::block_on(scope.pop());
    into_result(what, error)?;
    Ok(value)
}

pub(crate) fn into_result(what: &str, error: Option<impl Display>) -> Result<()> {
    match error {
        None => Ok(()),
        Some(e) => Err(EngineError::backend(format!("wgpu rejected {what}: {e}"))),
    }
}
