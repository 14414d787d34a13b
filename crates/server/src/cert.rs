//! Certificate storage
//!
//! # CertStore
//!
//! Persists the server's self-signed TLS certificate so clients can pin
//! its fingerprint across restarts.
//!
//! ## Storage Location
//!
//! `data_dir` from the config, otherwise the platform data directory:
//!
//! - **macOS**: `~/Library/Application Support/antibrute/`
//! - **Linux**: `~/.local/share/antibrute/`
//! - **Windows**: `%LOCALAPPDATA%\antibrute\`
//!
//! ## Files
//!
//! - `server.crt` - Certificate (DER format)
//! - `server.key` - PKCS#8 private key (DER format, permissions 0600 on Unix)

use antibrute_core::transport::SERVER_NAME;
use antibrute_core::{CoreError, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::fs;
use std::path::{Path, PathBuf};

/// Certificate and private key, ready for the QUIC endpoint
pub type CertPair = (CertificateDer<'static>, PrivateKeyDer<'static>);

/// Certificate storage
pub struct CertStore {
    data_dir: PathBuf,
}

impl CertStore {
    /// Store under the platform data directory
    pub fn new() -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .ok_or(CoreError::NoDataDir)?
            .join("antibrute");
        Self::with_dir(data_dir)
    }

    /// Store under `data_dir`, creating it if missing
    pub fn with_dir(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn cert_path(&self) -> PathBuf {
        self.data_dir.join("server.crt")
    }

    fn key_path(&self) -> PathBuf {
        self.data_dir.join("server.key")
    }

    /// Load existing certificate pair
    ///
    /// Returns `None` if either file doesn't exist.
    pub fn load(&self) -> Result<Option<CertPair>> {
        let cert_path = self.cert_path();
        let key_path = self.key_path();

        if !cert_path.exists() || !key_path.exists() {
            return Ok(None);
        }

        let cert = CertificateDer::from(fs::read(&cert_path)?);
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(fs::read(&key_path)?));

        Ok(Some((cert, key)))
    }

    /// Save certificate pair
    ///
    /// Sets key file permissions to 0600 on Unix.
    pub fn save(&self, cert: &CertificateDer<'_>, key: &[u8]) -> Result<()> {
        fs::write(self.cert_path(), cert.as_ref())?;
        fs::write(self.key_path(), key)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = fs::metadata(self.key_path())?.permissions();
            perm.set_mode(0o600); // rw-------
            fs::set_permissions(self.key_path(), perm)?;
        }

        Ok(())
    }

    /// Load the stored pair, generating and saving a new one on first run
    pub fn load_or_generate(&self) -> Result<CertPair> {
        if let Some(pair) = self.load()? {
            tracing::debug!("Loaded certificate from {}", self.data_dir.display());
            return Ok(pair);
        }

        let generated = rcgen::generate_simple_self_signed(vec![SERVER_NAME.to_string()])
            .map_err(|e| CoreError::CertParseError(e.to_string()))?;
        let cert = CertificateDer::from(generated.cert.der().to_vec());
        let key_der = generated.key_pair.serialize_der();

        self.save(&cert, &key_der)?;
        tracing::info!("Generated new certificate in {}", self.data_dir.display());

        Ok((cert, PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der))))
    }

    /// Remove stored certificates
    #[cfg(test)]
    pub fn clear(&self) -> Result<()> {
        let _ = fs::remove_file(self.cert_path());
        let _ = fs::remove_file(self.key_path());
        Ok(())
    }
}
