//! Local file frame source.
//!
//! `FileSource` reads frames from a local path. It never fetches remote URLs;
//! the only scheme it accepts is `stub://`, which selects the synthetic
//! generator. Decoding is picked by feature:
//! - video files via FFmpeg (`ingest-file-ffmpeg`)
//! - still images via `image` (`ingest-image`), yielding a single frame

use std::path::Path;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
#[cfg(feature = "ingest-image")]
use super::still::StillImageSource;
use super::{FrameSource, SourceStats, SyntheticSource};
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Extensions decoded as a single still image.
const STILL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
    #[cfg(feature = "ingest-image")]
    Still(StillImageSource),
}

impl FileSource {
    pub fn new(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(Error::StreamOpen(format!(
                "'{}' is not a local file path",
                path
            )));
        }
        if path.starts_with("stub://") {
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticSource::from_uri(path)?),
            });
        }
        if !Path::new(path).exists() {
            return Err(Error::StreamOpen(format!("'{}' does not exist", path)));
        }
        if is_still_image(path) {
            #[cfg(feature = "ingest-image")]
            {
                return Ok(Self {
                    backend: FileBackend::Still(StillImageSource::new(path)),
                });
            }
            #[cfg(not(feature = "ingest-image"))]
            {
                return Err(Error::StreamOpen(
                    "still image input requires the ingest-image feature".to_string(),
                ));
            }
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(FfmpegFileSource::new(path)?),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(Error::StreamOpen(
                "video file input requires the ingest-file-ffmpeg feature".to_string(),
            ))
        }
    }

    fn inner(&self) -> &dyn FrameSource {
        match &self.backend {
            FileBackend::Synthetic(source) => source,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source,
            #[cfg(feature = "ingest-image")]
            FileBackend::Still(source) => source,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FrameSource {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source,
            #[cfg(feature = "ingest-image")]
            FileBackend::Still(source) => source,
        }
    }
}

impl FrameSource for FileSource {
    fn open(&mut self) -> Result<()> {
        self.inner_mut().open()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.inner_mut().next_frame()
    }

    fn fps(&self) -> u32 {
        self.inner().fps()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.inner().dimensions()
    }

    fn stats(&self) -> SourceStats {
        self.inner().stats()
    }

    fn close(&mut self) {
        self.inner_mut().close()
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

fn is_still_image(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| STILL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_urls_are_refused() {
        assert!(FileSource::new("http://example.com/video.mp4").is_err());
        assert!(FileSource::new("").is_err());
    }

    #[test]
    fn missing_file_is_a_stream_error() {
        let err = FileSource::new("/definitely/not/here.mp4").err();
        assert!(matches!(err, Some(Error::StreamOpen(_))));
    }

    #[test]
    fn still_extensions_are_case_insensitive() {
        assert!(is_still_image("snap.JPG"));
        assert!(is_still_image("a/b/c.png"));
        assert!(!is_still_image("clip.mp4"));
    }
}
