//! Package integrity and authenticity checks.
//!
//! Every package is checked against the SHA-256 digest from the manifest.
//! When a signing key is configured, the package must also carry an Ed25519
//! signature over the raw 32 digest bytes, base64-encoded in the manifest.

use crate::core::{UpdateError, UpdateResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// SHA-256 helpers for staged packages.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Streams a file through SHA-256 and returns the lowercase hex digest.
    ///
    /// ```rust,no_run
    /// use jubilee_update::download::ChecksumVerifier;
    /// use std::path::Path;
    ///
    /// # async fn example() -> jubilee_update::core::UpdateResult<()> {
    /// let digest = ChecksumVerifier::compute_sha256(Path::new("/path/to/package.zip")).await?;
    /// println!("SHA256: {digest}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn compute_sha256(file_path: &Path) -> UpdateResult<String> {
        debug!("Computing SHA256 checksum for: {}", file_path.display());

        let mut file = tokio::fs::File::open(file_path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Case-insensitive digest comparison; manifests may publish uppercase hex.
    #[must_use]
    pub fn digests_match(expected: &str, actual: &str) -> bool {
        expected.trim().eq_ignore_ascii_case(actual.trim())
    }

    /// Re-hashes a file and compares it with `expected`.
    ///
    /// # Errors
    ///
    /// [`UpdateError::IntegrityError`] on mismatch; I/O errors if the file is unreadable.
    pub async fn verify_file(file_path: &Path, expected: &str) -> UpdateResult<String> {
        let actual = Self::compute_sha256(file_path).await?;
        if !Self::digests_match(expected, &actual) {
            return Err(UpdateError::IntegrityError {
                package: file_name(file_path),
                expected: expected.to_ascii_lowercase(),
                actual,
            });
        }
        Ok(actual)
    }
}

/// Verifies Ed25519 package signatures with the configured public key.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    #[must_use]
    pub const fn new(key: VerifyingKey) -> Self {
        Self {
            key,
        }
    }

    /// Parses an SPKI PEM (`-----BEGIN PUBLIC KEY-----`) Ed25519 key.
    pub fn from_pem(pem: &str) -> UpdateResult<Self> {
        let key = VerifyingKey::from_public_key_pem(pem.trim()).map_err(|e| {
            UpdateError::config(format!("signaturePublicKeyPem is not an Ed25519 public key: {e}"))
        })?;
        Ok(Self::new(key))
    }

    /// Checks `signature_b64` against the raw bytes of `digest_hex`.
    ///
    /// # Errors
    ///
    /// [`UpdateError::SignatureError`] for a missing, undecodable or invalid signature.
    pub fn verify_digest(&self, digest_hex: &str, signature_b64: Option<&str>) -> UpdateResult<()> {
        let encoded = signature_b64
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| UpdateError::signature("the release carries no signature"))?;

        let raw = BASE64
            .decode(encoded)
            .map_err(|e| UpdateError::signature(format!("signature is not valid base64: {e}")))?;
        let signature = Signature::from_slice(&raw)
            .map_err(|e| UpdateError::signature(format!("signature has the wrong length: {e}")))?;
        let digest = hex::decode(digest_hex.trim())
            .map_err(|e| UpdateError::signature(format!("digest is not hex: {e}")))?;

        self.key
            .verify(&digest, &signature)
            .map_err(|_| UpdateError::signature("signature does not match the package digest"))?;

        info!("Package signature verified");
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}
