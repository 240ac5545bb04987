//! TLS identity of the webhook listener.

use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use super::server::WebhookError;

/// Certificate chain and private key presented to the API server.
///
/// Validated when built; once constructed the pair cannot change.
#[derive(Debug)]
pub struct TlsIdentity {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    /// Parse a PEM certificate chain and PEM private key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, WebhookError> {
        let certs = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| WebhookError::TlsConfig(format!("invalid certificate PEM: {e}")))?;
        if certs.is_empty() {
            return Err(WebhookError::TlsConfig(
                "no certificate found in PEM".to_string(),
            ));
        }

        let key = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(|e| WebhookError::TlsConfig(format!("invalid private key PEM: {e}")))?
            .ok_or_else(|| WebhookError::TlsConfig("no private key found in PEM".to_string()))?;

        let identity = Self { certs, key };
        // Building a config checks the key is usable and belongs to the certificate.
        identity.server_config()?;
        Ok(identity)
    }

    /// Read the PEM pair from disk.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, WebhookError> {
        let cert_pem = std::fs::read(cert_path).map_err(|e| {
            WebhookError::TlsConfig(format!("reading {}: {e}", cert_path.display()))
        })?;
        let key_pem = std::fs::read(key_path).map_err(|e| {
            WebhookError::TlsConfig(format!("reading {}: {e}", key_path.display()))
        })?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Build the rustls server configuration for this identity.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, WebhookError> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| WebhookError::TlsConfig(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(self.certs.clone(), self.key.clone_key())
            .map_err(|e| WebhookError::TlsConfig(format!("invalid key pair: {e}")))?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}
