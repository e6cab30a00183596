mod backend;
mod backends;
mod nms;
mod result;

pub use backend::PersonDetector;
pub use backends::{build_detector, ScriptStep, ScriptedDetector, StubDetector};
#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
pub use nms::non_max_suppression;
pub use result::Detection;
