//! Version fingerprints and the `versionhash` marker file.
//!
//! A [`VersionFingerprint`] is the SHA-512 digest of whatever identifies a
//! release: either a four-part numeric version or an arbitrary tag string.
//! The installed fingerprint is persisted as exactly [`FINGERPRINT_LEN`] raw
//! bytes in a marker file inside the target directory.  A missing or
//! malformed marker is reported as `None` ("unknown version"), which never
//! equals a computed fingerprint and therefore always reads as stale.

use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use sha2::{Digest, Sha512};

use crate::error::FingerprintError;

/// Size of a fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 64;

/// File name of the marker that stores the installed fingerprint.
pub const MARKER_FILE_NAME: &str = "versionhash";

/// Fixed-size content hash identifying an installed version.
///
/// Equality is byte-wise; there is deliberately no ordering.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VersionFingerprint([u8; FINGERPRINT_LEN]);

impl VersionFingerprint {
    /// Fingerprint a structured `major.minor.revision.build` version.
    ///
    /// Each component is hashed as its little-endian 32-bit representation,
    /// in order.
    #[must_use]
    pub fn from_version(major: i32, minor: i32, revision: i32, build: i32) -> Self {
        let mut hasher = Sha512::new();
        for part in [major, minor, revision, build] {
            hasher.update(part.to_le_bytes());
        }
        Self::from_digest(&hasher.finalize())
    }

    /// Fingerprint an arbitrary identifying string such as a release tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        Self::from_digest(&Sha512::digest(tag.as_bytes()))
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; FINGERPRINT_LEN];
        bytes.copy_from_slice(digest);
        Self(bytes)
    }

    /// Read exactly [`FINGERPRINT_LEN`] bytes from `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError::Truncated`] if the reader ends before a
    /// full fingerprint was read, or [`FingerprintError::Io`] on any other
    /// read failure.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, FingerprintError> {
        let mut bytes = [0u8; FINGERPRINT_LEN];
        let mut filled = 0;
        while filled < FINGERPRINT_LEN {
            let Some(rest) = bytes.get_mut(filled..) else {
                break;
            };
            match reader.read(rest) {
                Ok(0) => {
                    return Err(FingerprintError::Truncated {
                        expected: FINGERPRINT_LEN,
                        actual: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Self(bytes))
    }

    /// Write the raw fingerprint bytes to `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.0)
    }

    /// Borrow the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Abbreviated hex form used in log messages.
    #[must_use]
    pub fn short_hex(&self) -> String {
        self.to_string().chars().take(12).collect()
    }
}

impl fmt::Display for VersionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for VersionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionFingerprint({})", self.short_hex())
    }
}

/// Returns `true` when `latest` differs from the installed fingerprint.
///
/// An unknown installed version (`None`) is always stale.
#[must_use]
pub fn is_stale(installed: Option<&VersionFingerprint>, latest: &VersionFingerprint) -> bool {
    installed != Some(latest)
}

/// Path of the marker file inside `dir`.
#[must_use]
pub fn marker_path(dir: &Path) -> PathBuf {
    dir.join(MARKER_FILE_NAME)
}

/// Returns `true` if `name` is the marker file name (case-insensitive).
#[must_use]
pub fn is_marker_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(MARKER_FILE_NAME)
}

/// Load the installed fingerprint from the marker file in `dir`.
///
/// Returns `None` when the marker is absent, unreadable, or truncated; none
/// of these conditions block a future update.
#[must_use]
pub fn load_installed(dir: &Path) -> Option<VersionFingerprint> {
    let path = marker_path(dir);
    let mut file = std::fs::File::open(&path).ok()?;
    match VersionFingerprint::read_from(&mut file) {
        Ok(fp) => Some(fp),
        Err(e) => {
            tracing::debug!("ignoring marker {}: {e}", path.display());
            None
        }
    }
}

/// Persist `fingerprint` as the marker file in `dir`.
///
/// The bytes are written to a sibling `.new` file first and then renamed over
/// the marker, so readers observe either the old or the new fingerprint.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written or renamed.
pub fn persist(dir: &Path, fingerprint: &VersionFingerprint) -> Result<()> {
    let path = marker_path(dir);
    let tmp = dir.join(format!("{MARKER_FILE_NAME}.new"));
    {
        let mut file = std::fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        fingerprint
            .write_to(&mut file)
            .with_context(|| format!("writing {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("flushing {}", tmp.display()))?;
    }
    std::fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
