//! TLS client identity and rustls configuration for TAK connections.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};

use crate::error::{Error, Result};

/// Client certificate chain, private key and trusted roots.
#[derive(Default)]
pub struct TlsIdentity {
    /// Client certificate chain, leaf first.
    pub cert_chain: Vec<CertificateDer<'static>>,
    /// Client private key.
    pub key: Option<PrivateKeyDer<'static>>,
    /// Trusted CA certificates.
    pub roots: Vec<CertificateDer<'static>>,
}

impl Clone for TlsIdentity {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.as_ref().map(PrivateKeyDer::clone_key),
            roots: self.roots.clone(),
        }
    }
}

impl PartialEq for TlsIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.cert_chain == other.cert_chain
            && self.roots == other.roots
            && self.key.as_ref().map(PrivateKeyDer::secret_der)
                == other.key.as_ref().map(PrivateKeyDer::secret_der)
    }
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("cert_chain", &self.cert_chain.len())
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("roots", &self.roots.len())
            .finish()
    }
}

fn pem_error(path: &Path, err: impl fmt::Display) -> Error {
    Error::tls(format!("{}: {err}", path.display()))
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| pem_error(path, e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| pem_error(path, e))?;
    if certs.is_empty() {
        return Err(pem_error(path, "no certificates found"));
    }
    Ok(certs)
}

fn p12_error(what: &str, err: impl fmt::Debug) -> Error {
    Error::tls(format!("cannot read {what}: {err:?}"))
}

impl TlsIdentity {
    /// Load PEM files. The key defaults to the certificate file, which may
    /// hold both.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is missing or holds no usable PEM data.
    pub fn from_pem_files(
        cert: Option<&Path>,
        key: Option<&Path>,
        ca: Option<&Path>,
    ) -> Result<Self> {
        let mut identity = Self::default();
        if let Some(cert) = cert {
            identity.cert_chain = read_certs(cert)?;
            let key_path = key.unwrap_or(cert);
            identity.key =
                Some(PrivateKeyDer::from_pem_file(key_path).map_err(|e| pem_error(key_path, e))?);
        } else if key.is_some() {
            return Err(Error::tls("a client key needs a client certificate"));
        }
        if let Some(ca) = ca {
            identity.roots = read_certs(ca)?;
        }
        Ok(identity)
    }

    /// Load a PKCS#12 client identity and an optional PKCS#12 trust store.
    ///
    /// # Errors
    ///
    /// Returns an error if either bundle cannot be decrypted or holds no
    /// certificate or key.
    pub fn from_pkcs12(
        client: &[u8],
        client_password: &str,
        truststore: Option<(&[u8], &str)>,
    ) -> Result<Self> {
        let pfx = p12::PFX::parse(client).map_err(|e| p12_error("client certificate", e))?;
        let cert_chain: Vec<CertificateDer<'static>> = pfx
            .cert_x509_bags(client_password)
            .map_err(|e| p12_error("client certificate", e))?
            .into_iter()
            .map(CertificateDer::from)
            .collect();
        let key = pfx
            .key_bags(client_password)
            .map_err(|e| p12_error("client key", e))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::tls("client certificate bundle holds no private key"))?;
        if cert_chain.is_empty() {
            return Err(Error::tls("client certificate bundle holds no certificate"));
        }

        let roots = match truststore {
            Some((der, password)) => p12::PFX::parse(der)
                .map_err(|e| p12_error("CA certificate", e))?
                .cert_x509_bags(password)
                .map_err(|e| p12_error("CA certificate", e))?
                .into_iter()
                .map(CertificateDer::from)
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            cert_chain,
            key: Some(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key))),
            roots,
        })
    }

    /// Build a rustls client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no CA is configured and verification is enabled,
    /// or if the certificates are rejected by rustls.
    pub fn client_config(&self, dont_verify: bool) -> Result<ClientConfig> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::tls(e.to_string()))?;

        let builder = if dont_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
        } else {
            if self.roots.is_empty() {
                return Err(Error::tls(
                    "no CA certificate configured; set PYTAK_TLS_CLIENT_CAFILE or PYTAK_TLS_DONT_VERIFY",
                ));
            }
            let mut roots = RootCertStore::empty();
            for cert in &self.roots {
                roots
                    .add(cert.clone())
                    .map_err(|e| Error::tls(format!("invalid CA certificate: {e}")))?;
            }
            builder.with_root_certificates(roots)
        };

        match &self.key {
            Some(key) if !self.cert_chain.is_empty() => builder
                .with_client_auth_cert(self.cert_chain.clone(), key.clone_key())
                .map_err(|e| Error::tls(format!("invalid client certificate: {e}"))),
            _ => Ok(builder.with_no_client_auth()),
        }
    }
}

/// Accepts any server certificate; selected by `PYTAK_TLS_DONT_VERIFY`.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
