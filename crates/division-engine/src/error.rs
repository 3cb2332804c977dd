//! Engine error taxonomy.
//!
//! Capacity overruns are not errors: writes are clamped and a warning is logged.

use thiserror::Error;

/// Convenience alias used across the engine.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Broad category of an [`EngineError`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Invalid enum value or resource description. Aborts the offending call.
    Configuration,
    /// Native allocation, compile, link or surface failure.
    Backend,
    /// Operation on a freed, unlinked or otherwise unusable resource.
    Use,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("backend error: {0}")]
    Backend(String),

    /// The backend could not produce a frame this tick; the next tick starts fresh.
    #[error("frame skipped: {0}")]
    FrameSkipped(String),

    #[error("stale or unknown {kind} handle {handle}")]
    StaleHandle { kind: &'static str, handle: String },

    #[error("shader program {0} is not linked")]
    NotLinked(String),

    #[error("shader program {0} is already linked")]
    AlreadyLinked(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    /// A pipeline slot had no uniform buffer bound at draw time.
    #[error("unbound uniform: {0}")]
    UnboundUniform(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Backend(_) | Self::FrameSkipped(_) => ErrorKind::Backend,
            Self::StaleHandle { .. }
            | Self::NotLinked(_)
            | Self::AlreadyLinked(_)
            | Self::OutOfRange(_)
            | Self::UnboundUniform(_) => ErrorKind::Use,
        }
    }

    /// Returns `true` when the error must end the frame loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub(crate) fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }
}

/// Host callback receiving every error a context reports.
pub type ErrorCallback = Box<dyn FnMut(&EngineError)>;

/// Logs errors and forwards them to the host callback, if any.
#[derive(Default)]
pub(crate) struct ErrorReporter {
    callback: Option<ErrorCallback>,
}

impl ErrorReporter {
    pub(crate) fn set_callback(&mut self, callback: Option<ErrorCallback>) {
        self.callback = callback;
    }

    pub(crate) fn report(&mut self, err: &EngineError) {
        match err.kind() {
            ErrorKind::Backend if !err.is_fatal() => log::warn!("{err}"),
            _ => log::error!("{err}"),
        }
        if let Some(cb) = self.callback.as_mut() {
            cb(err);
        }
    }

    /// Reports `err` and hands it back for returning.
    pub(crate) fn reported(&mut self, err: EngineError) -> EngineError {
        self.report(&err);
        err
    }

    pub(crate) fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| self.reported(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let err = EngineError::configuration("unknown attribute type 9");
        assert_eq!(err.to_string(), "configuration error: unknown attribute type 9");

        let err = EngineError::StaleHandle { kind: "vertex buffer", handle: "#3v1".into() };
        assert_eq!(err.to_string(), "stale or unknown vertex buffer handle #3v1");
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(EngineError::backend("oom").kind(), ErrorKind::Backend);
        assert_eq!(EngineError::NotLinked("#0v0".into()).kind(), ErrorKind::Use);
        assert_eq!(EngineError::out_of_range("x").kind(), ErrorKind::Use);
        assert!(EngineError::backend("oom").is_fatal());
        assert!(!EngineError::FrameSkipped("timeout".into()).is_fatal());
    }

    #[test]
    fn reporter_forwards_to_callback() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut reporter = ErrorReporter::default();
        reporter.report(&EngineError::backend("before callback"));
        reporter.set_callback(Some(Box::new(move |e: &EngineError| sink.borrow_mut().push(e.clone()))));

        let result: Result<()> = Err(EngineError::out_of_range("slot 9"));
        assert!(reporter.check(result).is_err());
        assert!(reporter.check(Ok(1)).is_ok());

        assert_eq!(*seen.borrow(), vec![EngineError::out_of_range("slot 9")]);
    }
}
