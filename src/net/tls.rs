//! TLS trust-store construction from a CA bundle. The client only
//! verifies the broker; certificate management stays with the caller.

use crate::error::{Error, Result};
use rustls::{Certificate, ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Build a rustls client config trusting exactly the CAs in the given
/// PEM bundle, with standard peer-name verification and no client
/// certificate.
pub fn client_config_from_ca_file(ca_file: &Path) -> Result<ClientConfig> {
    let file = File::open(ca_file).map_err(|e| {
        Error::ConnectionFailed(format!("open ca bundle {}: {e}", ca_file.display()))
    })?;
    let mut reader = BufReader::new(file);
    let ca_der = rustls_pemfile::certs(&mut reader).map_err(|e| {
        Error::ConnectionFailed(format!("parse ca bundle {}: {e}", ca_file.display()))
    })?;
    let ca_certs: Vec<Certificate> = ca_der.into_iter().map(Certificate).collect();

    let mut roots = RootCertStore::empty();
    let (added, _) = roots.add_parsable_certificates(&ca_certs);
    if added == 0 {
        return Err(Error::ConnectionFailed(format!(
            "no CA certificates loaded from {}",
            ca_file.display()
        )));
    }

    Ok(ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth())
}
