mod scripted;
mod stub;

#[cfg(feature = "backend-tract")]
mod tract;

pub use scripted::{ScriptStep, ScriptedDetector};
pub use stub::StubDetector;

#[cfg(feature = "backend-tract")]
pub use tract::TractDetector;

use crate::config::DetectorSettings;
use crate::detect::backend::PersonDetector;
use crate::error::{Error, Result};

/// Instantiate the backend named in the settings.
pub fn build_detector(settings: &DetectorSettings) -> Result<Box<dyn PersonDetector>> {
    match settings.backend.as_str() {
        "stub" => Ok(Box::new(StubDetector::new())),
        #[cfg(feature = "backend-tract")]
        "tract" => Ok(Box::new(TractDetector::new(
            &settings.model_path,
            settings.input_width,
            settings.input_height,
            settings.person_class,
        )?)),
        #[cfg(not(feature = "backend-tract"))]
        "tract" => Err(Error::Config(
            "detector backend 'tract' requires the backend-tract feature".to_string(),
        )),
        other => Err(Error::Config(format!(
            "unknown detector backend '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_a_config_error() {
        let settings = DetectorSettings {
            backend: "yolo-on-a-toaster".to_string(),
            ..DetectorSettings::default()
        };
        assert!(matches!(build_detector(&settings), Err(Error::Config(_))));
    }

    #[test]
    fn stub_backend_builds() -> Result<()> {
        let detector = build_detector(&DetectorSettings::default())?;
        assert_eq!(detector.name(), "stub");
        Ok(())
    }
}
