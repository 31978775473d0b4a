//! Self-signed certificate provisioning and TLS server configuration.
//!
//! Phones only grant camera access to pages served over HTTPS, so the relay
//! always speaks TLS.  On first run there is no certificate, so one is made:
//!
//! 1. If `server.crt` and `server.key` both exist in the certificate
//!    directory, they are loaded as-is (expiry is not checked).
//! 2. Otherwise a key pair and a ten-year self-signed certificate are
//!    generated in-process with `rcgen`.
//! 3. If that fails, `openssl req -x509 ...` is tried, but only when an
//!    `openssl` binary answers `openssl version`.
//!
//! If every method fails, [`CertError::CertUnavailable`] lists why.  The
//! caller must treat it as fatal; the relay never falls back to plain TCP.
//!
//! # Why not check expiry?
//!
//! The certificate is trusted by tapping through the browser warning once per
//! device.  Replacing it silently would force every phone through that step
//! again, so an existing pair is always reused.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SerialNumber};
use thiserror::Error;
use tokio_rustls::rustls::crypto::aws_lc_rs;
use tokio_rustls::rustls::ServerConfig;
use tracing::{info, warn};

/// Certificate file name inside the certificate directory.
pub const CERT_FILE_NAME: &str = "server.crt";
/// Private key file name inside the certificate directory.
pub const KEY_FILE_NAME: &str = "server.key";

/// Validity of a generated certificate, in days.
const VALIDITY_DAYS: i64 = 3650;
/// Serial number of a generated certificate.
const SERIAL_NUMBER: u64 = 1000;

/// Error type for certificate provisioning.
#[derive(Debug, Error)]
pub enum CertError {
    /// No usable certificate could be loaded or generated.  One entry per
    /// attempted method.
    #[error("TLS certificate unavailable: {}", .0.join("; "))]
    CertUnavailable(Vec<String>),

    /// A file-system operation on the certificate directory failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How the certificate in use came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertOrigin {
    /// Both files were already present.
    Existing,
    /// Generated in-process by this run.
    Generated,
    /// Generated by the `openssl` command by this run.
    OpenSsl,
}

/// Where the certificate lives and whether this process created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// `None` until [`CertProvisioner::ensure_certificate`] has run.
    pub origin: Option<CertOrigin>,
}

impl CertificateInfo {
    /// `true` if this process wrote the certificate files.
    pub fn generated(&self) -> bool {
        matches!(self.origin, Some(CertOrigin::Generated | CertOrigin::OpenSsl))
    }
}

/// Ensures a certificate exists and builds the rustls server configuration.
#[derive(Debug)]
pub struct CertProvisioner {
    cert_dir: PathBuf,
    generated: AtomicBool,
    used_openssl: AtomicBool,
    provisioned: AtomicBool,
}

impl CertProvisioner {
    pub fn new(cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            cert_dir: cert_dir.into(),
            generated: AtomicBool::new(false),
            used_openssl: AtomicBool::new(false),
            provisioned: AtomicBool::new(false),
        }
    }

    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join(CERT_FILE_NAME)
    }

    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join(KEY_FILE_NAME)
    }

    /// Loads the certificate pair, generating it first if either file is missing.
    ///
    /// Calling this again after success only re-reads the existing files.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::CertUnavailable`] when generation fails by every
    /// method or the files cannot be turned into a TLS configuration, and
    /// [`CertError::Io`] when the directory cannot be created.
    pub fn ensure_certificate(&self) -> Result<Arc<ServerConfig>, CertError> {
        let cert_path = self.cert_path();
        let key_path = self.key_path();

        if !(cert_path.is_file() && key_path.is_file()) {
            self.generate(&cert_path, &key_path)?;
        } else {
            info!(cert = %cert_path.display(), "using existing TLS certificate");
        }
        self.provisioned.store(true, Ordering::SeqCst);

        load_server_config(&cert_path, &key_path)
    }

    /// Paths and provenance of the certificate, for startup logs.
    pub fn certificate_info(&self) -> CertificateInfo {
        let origin = if !self.provisioned.load(Ordering::SeqCst) {
            None
        } else if self.used_openssl.load(Ordering::SeqCst) {
            Some(CertOrigin::OpenSsl)
        } else if self.generated.load(Ordering::SeqCst) {
            Some(CertOrigin::Generated)
        } else {
            Some(CertOrigin::Existing)
        };
        CertificateInfo {
            cert_path: self.cert_path(),
            key_path: self.key_path(),
            origin,
        }
    }

    fn generate(&self, cert_path: &Path, key_path: &Path) -> Result<(), CertError> {
        fs::create_dir_all(&self.cert_dir).map_err(|source| CertError::Io {
            path: self.cert_dir.clone(),
            source,
        })?;

        let mut failures = Vec::new();

        match generate_in_process() {
            Ok((cert_pem, key_pem)) => {
                write_pair(cert_path, &cert_pem, key_path, &key_pem)?;
                self.generated.store(true, Ordering::SeqCst);
                info!(cert = %cert_path.display(), "generated self-signed TLS certificate");
                return Ok(());
            }
            Err(reason) => {
                warn!("in-process certificate generation failed: {reason}");
                failures.push(format!("in-process generation: {reason}"));
            }
        }

        match generate_with_openssl(cert_path, key_path) {
            Ok(()) => {
                self.generated.store(true, Ordering::SeqCst);
                self.used_openssl.store(true, Ordering::SeqCst);
                info!(cert = %cert_path.display(), "generated self-signed TLS certificate with openssl");
                Ok(())
            }
            Err(reason) => {
                failures.push(format!("openssl: {reason}"));
                Err(CertError::CertUnavailable(failures))
            }
        }
    }
}

// ── Generation ────────────────────────────────────────────────────────────────

/// Generates `(certificate PEM, private key PEM)`.
///
/// Prefers an RSA-2048 key; falls back to ECDSA P-256 when the crypto backend
/// cannot generate RSA keys.
fn generate_in_process() -> Result<(String, String), String> {
    let key_pair = match KeyPair::generate_for(&rcgen::PKCS_RSA_SHA256) {
        Ok(key_pair) => key_pair,
        Err(rsa_error) => {
            warn!("RSA key generation unavailable ({rsa_error}); using ECDSA P-256");
            KeyPair::generate().map_err(|e| e.to_string())?
        }
    };

    let mut params = CertificateParams::new(vec![
        "*".to_string(),
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .map_err(|e| e.to_string())?;

    let mut name = DistinguishedName::new();
    name.push(DnType::CountryName, "CN");
    name.push(DnType::StateOrProvinceName, "Local");
    name.push(DnType::LocalityName, "Local");
    name.push(DnType::OrganizationName, "H5 Barcode Gun");
    name.push(DnType::OrganizationalUnitName, "Development");
    name.push(DnType::CommonName, "*");
    params.distinguished_name = name;
    params.serial_number = Some(SerialNumber::from(SERIAL_NUMBER));

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(VALIDITY_DAYS);

    let cert = params.self_signed(&key_pair).map_err(|e| e.to_string())?;
    Ok((cert.pem(), key_pair.serialize_pem()))
}

fn generate_with_openssl(cert_path: &Path, key_path: &Path) -> Result<(), String> {
    let version = Command::new("openssl")
        .arg("version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match version {
        Ok(status) if status.success() => {}
        Ok(status) => return Err(format!("`openssl version` exited with {status}")),
        Err(e) => return Err(format!("openssl not found: {e}")),
    }

    let days = VALIDITY_DAYS.to_string();
    let output = Command::new("openssl")
        .args(["req", "-x509", "-newkey", "rsa:2048", "-keyout"])
        .arg(key_path)
        .arg("-out")
        .arg(cert_path)
        .args(["-days", &days, "-nodes", "-subj", "/CN=*"])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("could not run openssl: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "openssl req exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    restrict_key_permissions(key_path).map_err(|e| e.to_string())?;
    Ok(())
}

fn write_pair(cert_path: &Path, cert_pem: &str, key_path: &Path, key_pem: &str) -> Result<(), CertError> {
    fs::write(cert_path, cert_pem).map_err(|source| CertError::Io {
        path: cert_path.to_path_buf(),
        source,
    })?;
    fs::write(key_path, key_pem).map_err(|source| CertError::Io {
        path: key_path.to_path_buf(),
        source,
    })?;
    restrict_key_permissions(key_path).map_err(|source| CertError::Io {
        path: key_path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn restrict_key_permissions(key_path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(key_path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_key_permissions(_key_path: &Path) -> std::io::Result<()> {
    Ok(())
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Builds a rustls server configuration from PEM files.
///
/// # Errors
///
/// Any unreadable file, missing certificate or key, or a key that does not
/// match the certificate is reported as [`CertError::CertUnavailable`].
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, CertError> {
    let unavailable = |reason: String| CertError::CertUnavailable(vec![reason]);

    let cert_file = fs::File::open(cert_path)
        .map_err(|e| unavailable(format!("cannot open {}: {e}", cert_path.display())))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| unavailable(format!("invalid PEM in {}: {e}", cert_path.display())))?;
    if certs.is_empty() {
        return Err(unavailable(format!("no certificate in {}", cert_path.display())));
    }

    let key_file = fs::File::open(key_path)
        .map_err(|e| unavailable(format!("cannot open {}: {e}", key_path.display())))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| unavailable(format!("invalid PEM in {}: {e}", key_path.display())))?
        .ok_or_else(|| unavailable(format!("no private key in {}", key_path.display())))?;

    let config = ServerConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| unavailable(format!("TLS setup failed: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| unavailable(format!("certificate rejected: {e}")))?;
    Ok(Arc::new(config))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
