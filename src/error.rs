//! Error taxonomy shared by the calibration and runtime phases.
//!
//! `Calibration` and the two artifact variants are fatal to the phase that
//! raised them. `Detector` is recoverable per frame; the runtime loop treats
//! it as "zero detections" and keeps going. `StreamOpen` ends the run.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    /// Insufficient or degenerate correspondences, or a zero-length scale sample.
    Calibration(String),
    /// The calibration artifact file does not exist.
    ArtifactNotFound(PathBuf),
    /// The calibration artifact exists but cannot be decoded.
    ArtifactCorrupt { path: PathBuf, reason: String },
    /// The video source cannot be opened or has become unreadable.
    StreamOpen(String),
    /// The external detector failed on a single frame.
    Detector(String),
    /// Configuration could not be read or failed validation.
    Config(String),
    /// An operation was attempted in the wrong lifecycle state.
    State(String),
    Io(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn calibration(msg: impl Into<String>) -> Self {
        Error::Calibration(msg.into())
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::ArtifactCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that end the phase that raised them.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Detector(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Calibration(msg) => write!(f, "calibration failed: {}", msg),
            Error::ArtifactNotFound(path) => {
                write!(f, "calibration file not found: {}", path.display())
            }
            Error::ArtifactCorrupt { path, reason } => {
                write!(f, "calibration file {} is corrupt: {}", path.display(), reason)
            }
            Error::StreamOpen(msg) => write!(f, "video stream unavailable: {}", msg),
            Error::Detector(msg) => write!(f, "detector failed: {}", msg),
            Error::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Error::State(msg) => write!(f, "invalid state: {}", msg),
            Error::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
