//! Event handlers.
//!
//! Every decoded [`DarcEvent`] is offered to each configured handler in
//! turn; a handler picks the events it cares about and skips the rest.

use darclib::DarcEvent;

mod dump;
mod parking;

pub use self::dump::*;
pub use self::parking::*;

#[derive(Debug)]
pub enum HandlerError {
    /// The handler was skipped because the event wasn't the right kind.
    ///
    /// This isn't an error per se, and can be ignored most of the time.
    Skipped,
    /// Some IO error (generally from writing the dump).
    Io(std::io::Error),
}

impl From<std::io::Error> for HandlerError {
    fn from(io: std::io::Error) -> Self {
        Self::Io(io)
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::Skipped => write!(f, "skipped"),
            HandlerError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

pub trait Handler {
    fn handle(&mut self, event: &DarcEvent) -> Result<(), HandlerError>;
}
