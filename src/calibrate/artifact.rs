//! Calibration artifact persistence.
//!
//! Binary layout (little endian):
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 4 | magic `SDCA` |
//! | 4 | 2 | format version (1) |
//! | 6 | 2 | reserved, zero |
//! | 8 | 72 | homography, 9 × f64, row-major |
//! | 80 | 8 | scale factor, f64 |
//! | 88 | 32 | SHA-256 of bytes 0..88 |
//!
//! Floats are stored as their raw bit patterns, so save → load is exact.

use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::calibrate::homography::HomographyMatrix;
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"SDCA";
const FORMAT_VERSION: u16 = 1;
const BODY_LEN: usize = 4 + 2 + 2 + 9 * 8 + 8;
const DIGEST_LEN: usize = 32;
/// Encoded artifact size in bytes.
pub const ARTIFACT_LEN: usize = BODY_LEN + DIGEST_LEN;

/// The (homography, scale factor) pair produced by calibration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationArtifact {
    homography: HomographyMatrix,
    scale_factor: f64,
}

impl CalibrationArtifact {
    pub fn new(homography: HomographyMatrix, scale_factor: f64) -> Result<Self> {
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(Error::calibration(format!(
                "scale factor must be positive, got {}",
                scale_factor
            )));
        }
        Ok(Self {
            homography,
            scale_factor,
        })
    }

    pub fn homography(&self) -> &HomographyMatrix {
        &self.homography
    }

    /// Real-world distance units per pixel.
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ARTIFACT_LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        for row in self.homography.rows() {
            for v in row {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out.extend_from_slice(&self.scale_factor.to_le_bytes());
        let digest: [u8; DIGEST_LEN] = Sha256::digest(&out).into();
        out.extend_from_slice(&digest);
        out
    }

    /// Decode an artifact. `origin` only labels errors.
    pub fn decode(bytes: &[u8], origin: &Path) -> Result<Self> {
        if bytes.len() != ARTIFACT_LEN {
            return Err(Error::corrupt(
                origin,
                format!("expected {} bytes, found {}", ARTIFACT_LEN, bytes.len()),
            ));
        }
        let (body, digest) = bytes.split_at(BODY_LEN);
        let expected: [u8; DIGEST_LEN] = Sha256::digest(body).into();
        if digest != expected {
            return Err(Error::corrupt(origin, "checksum mismatch"));
        }

        let mut cursor = 0usize;
        if read_slice(body, &mut cursor, 4) != MAGIC {
            return Err(Error::corrupt(origin, "bad magic"));
        }
        let version = read_u16(body, &mut cursor);
        if version != FORMAT_VERSION {
            return Err(Error::corrupt(
                origin,
                format!("unsupported format version {}", version),
            ));
        }
        let _reserved = read_u16(body, &mut cursor);

        let mut rows = [[0.0f64; 3]; 3];
        for row in rows.iter_mut() {
            for v in row.iter_mut() {
                *v = read_f64(body, &mut cursor);
            }
        }
        let scale_factor = read_f64(body, &mut cursor);

        let homography = HomographyMatrix::from_rows(rows)
            .map_err(|e| Error::corrupt(origin, e.to_string()))?;
        Self::new(homography, scale_factor).map_err(|e| Error::corrupt(origin, e.to_string()))
    }

    /// Hex SHA-256 of the encoded artifact, for logs.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.encode()))
    }
}

/// Write the artifact to `path`, replacing any existing file.
///
/// The bytes go to a sibling temp file first and are renamed into place, so
/// readers never observe a half-written artifact.
pub fn save(artifact: &CalibrationArtifact, path: &Path) -> Result<()> {
    let tmp = temp_path(path);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&artifact.encode())?;
        file.sync_all()?;
    }
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err.into());
    }
    log::info!(
        "calibration written to {} (sha256 {})",
        path.display(),
        artifact.fingerprint()
    );
    Ok(())
}

/// Read the whole artifact from `path`.
pub fn load(path: &Path) -> Result<CalibrationArtifact> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ArtifactNotFound(path.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };
    let artifact = CalibrationArtifact::decode(&bytes, path)?;
    log::info!(
        "calibration loaded from {}: scale factor {:.6} units/px",
        path.display(),
        artifact.scale_factor()
    );
    Ok(artifact)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// Callers check the total length up front, so these never run past the end.
fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> &'a [u8] {
    let slice = &bytes[*cursor..*cursor + len];
    *cursor += len;
    slice
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> u16 {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(read_slice(bytes, cursor, 2));
    u16::from_le_bytes(buf)
}

fn read_f64(bytes: &[u8], cursor: &mut usize) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(read_slice(bytes, cursor, 8));
    f64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_artifact() -> CalibrationArtifact {
        let h = HomographyMatrix::from_rows([
            [1.25, -0.031, 12.5],
            [0.002, 2.718281828, -40.0],
            [1.0e-4, 3.3e-5, 1.0],
        ])
        .expect("invertible");
        CalibrationArtifact::new(h, 0.1).expect("valid scale")
    }

    #[test]
    fn save_then_load_is_bit_exact() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("calibration.bin");
        let artifact = sample_artifact();
        save(&artifact, &path)?;
        let loaded = load(&path)?;
        for (a, b) in artifact
            .homography()
            .rows()
            .iter()
            .flatten()
            .zip(loaded.homography().rows().iter().flatten())
        {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(artifact.scale_factor().to_bits(), loaded.scale_factor().to_bits());
        assert!(!dir.path().join("calibration.bin.tmp").exists());
        Ok(())
    }

    #[test]
    fn save_overwrites_existing_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("calibration.bin");
        std::fs::write(&path, b"stale contents")?;
        save(&sample_artifact(), &path)?;
        assert_eq!(std::fs::metadata(&path)?.len() as usize, ARTIFACT_LEN);
        Ok(())
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load(Path::new("/nonexistent/dir/calibration.bin")).unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound(_)));
    }

    #[test]
    fn flipped_byte_is_corrupt() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("calibration.bin");
        let mut bytes = sample_artifact().encode();
        bytes[20] ^= 0x01;
        std::fs::write(&path, &bytes)?;
        assert!(matches!(load(&path), Err(Error::ArtifactCorrupt { .. })));
        Ok(())
    }

    #[test]
    fn truncated_file_is_corrupt() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("calibration.bin");
        std::fs::write(&path, &sample_artifact().encode()[..40])?;
        assert!(matches!(load(&path), Err(Error::ArtifactCorrupt { .. })));
        Ok(())
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        assert!(CalibrationArtifact::new(HomographyMatrix::identity(), 0.0).is_err());
        assert!(CalibrationArtifact::new(HomographyMatrix::identity(), -1.0).is_err());
    }
}
