//! TLS certificate probe.
//!
//! Every probe builds a dedicated client whose certificate verifier records
//! the presented leaf certificate and any trust-policy violation before it
//! decides on the handshake. A rejected handshake therefore still leaves
//! the certificate behind, and expiry can be reported for untrusted,
//! expired or mismatched certificates.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_util::sync::CancellationToken;

use super::{CertificateProbe, ProbeError, TlsStatus};

/// Upper bound on a single TLS probe, handshake and HEAD request included.
pub const TLS_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const SECONDS_PER_DAY: i64 = 86_400;

/// A trust-policy violation observed during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsViolation {
    UntrustedIssuer,
    Expired,
    NotYetValid,
    NameMismatch,
    Revoked,
    Other(String),
}

impl From<&rustls::Error> for TlsViolation {
    fn from(err: &rustls::Error) -> Self {
        match err {
            rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer) => {
                TlsViolation::UntrustedIssuer
            }
            rustls::Error::InvalidCertificate(CertificateError::Expired) => TlsViolation::Expired,
            rustls::Error::InvalidCertificate(CertificateError::NotValidYet) => {
                TlsViolation::NotYetValid
            }
            rustls::Error::InvalidCertificate(CertificateError::NotValidForName) => {
                TlsViolation::NameMismatch
            }
            rustls::Error::InvalidCertificate(CertificateError::Revoked) => TlsViolation::Revoked,
            other => TlsViolation::Other(other.to_string()),
        }
    }
}

/// What the verifier saw during one handshake attempt.
#[derive(Debug, Clone, Default)]
pub struct TlsProbeResult {
    pub certificate: Option<CertificateDer<'static>>,
    pub violations: Vec<TlsViolation>,
}

/// Verifier that always records the leaf certificate, then defers the
/// trust decision to the webpki verifier.
#[derive(Debug)]
struct CapturingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    capture: Arc<Mutex<TlsProbeResult>>,
}

impl ServerCertVerifier for CapturingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verdict =
            self.inner
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now);

        let mut capture = self.capture.lock().unwrap_or_else(PoisonError::into_inner);
        capture.certificate = Some(end_entity.clone().into_owned());
        capture.violations.clear();
        if let Err(e) = &verdict {
            capture.violations.push(TlsViolation::from(e));
        }

        verdict
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// TLS certificate validator backed by the Mozilla root store.
#[derive(Clone)]
pub struct TlsValidator {
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
    timeout: Duration,
}

impl Default for TlsValidator {
    fn default() -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_roots(roots)
    }
}

impl TlsValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roots(roots: RootCertStore) -> Self {
        Self {
            roots: Arc::new(roots),
            provider: Arc::new(rustls::crypto::ring::default_provider()),
            timeout: TLS_PROBE_TIMEOUT,
        }
    }

    /// Replace the bound on handshake plus HEAD request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a single-use client wired to `capture`.
    fn build_client(
        &self,
        capture: Arc<Mutex<TlsProbeResult>>,
    ) -> Result<reqwest::Client, ProbeError> {
        let inner =
            WebPkiServerVerifier::builder_with_provider(self.roots.clone(), self.provider.clone())
                .build()
                .map_err(|e| ProbeError::Tls(e.to_string()))?;

        let config = rustls::ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| ProbeError::Tls(format!("tls protocol version error: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(CapturingVerifier { inner, capture }))
            .with_no_client_auth();

        let client = reqwest::Client::builder()
            .use_preconfigured_tls(config)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(0)
            .timeout(self.timeout)
            .build()?;

        Ok(client)
    }
}

#[async_trait]
impl CertificateProbe for TlsValidator {
    async fn validate(&self, host: &str, cancel: &CancellationToken) -> TlsStatus {
        let Some(url) = normalize_https_url(host) else {
            tracing::debug!(host, "TLS probe skipped: unparsable host");
            return TlsStatus::INVALID;
        };

        let capture = Arc::new(Mutex::new(TlsProbeResult::default()));
        let client = match self.build_client(capture.clone()) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(host, error = %e, "failed to build TLS probe client");
                return TlsStatus::INVALID;
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(host, "TLS probe cancelled");
                return TlsStatus::INVALID;
            }
            r = client.head(url).send() => r,
        };

        let captured = capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match result {
            Ok(response) => {
                let status = response.status();
                let succeeded = status.is_success() || status.is_redirection();
                assess(&captured, succeeded, Utc::now())
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(host, "TLS probe timed out");
                TlsStatus::INVALID
            }
            Err(e) => {
                let status = assess(&captured, false, Utc::now());
                if captured.certificate.is_some() {
                    tracing::warn!(
                        host,
                        days_remaining = status.days_remaining,
                        violations = ?captured.violations,
                        "TLS handshake rejected"
                    );
                } else {
                    tracing::warn!(host, error = %e, "TLS probe failed");
                }
                status
            }
        }
    }
}

/// Turn a bare or scheme-qualified host into an HTTPS URL.
///
/// Plain `http://` URLs are upgraded; other schemes and unparsable input
/// yield `None`.
pub fn normalize_https_url(host: &str) -> Option<reqwest::Url> {
    let host = host.trim();
    let candidate = if let Some(rest) = host.strip_prefix("http://") {
        format!("https://{}", rest)
    } else if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    };

    let url = reqwest::Url::parse(&candidate).ok()?;
    if url.scheme() != "https" || url.host_str().map_or(true, str::is_empty) {
        return None;
    }
    Some(url)
}

/// Derive validity and days-to-expiry from a captured handshake.
pub fn assess(result: &TlsProbeResult, request_succeeded: bool, now: DateTime<Utc>) -> TlsStatus {
    let Some((not_before, not_after)) = result.certificate.as_ref().and_then(validity_window)
    else {
        return TlsStatus::INVALID;
    };

    let now = now.timestamp();
    TlsStatus {
        valid: request_succeeded
            && result.violations.is_empty()
            && now < not_after
            && now >= not_before,
        days_remaining: (not_after - now).div_euclid(SECONDS_PER_DAY),
    }
}

/// Unix timestamps of notBefore and notAfter.
fn validity_window(cert: &CertificateDer<'_>) -> Option<(i64, i64)> {
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref()).ok()?;
    let validity = parsed.validity();
    Some((validity.not_before.timestamp(), validity.not_after.timestamp()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration as ChronoDuration, TimeZone};
    use rcgen::{CertificateParams, KeyPair};
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn cert_between(not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> (CertificateDer<'static>, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.not_before = rcgen::date_time_ymd(
            not_before.year(),
            not_before.month() as u8,
            not_before.day() as u8,
        );
        params.not_after = rcgen::date_time_ymd(
            not_after.year(),
            not_after.month() as u8,
            not_after.day() as u8,
        );
        let cert = params.self_signed(&key).unwrap();
        (cert.der().clone(), key)
    }

    fn captured(cert: CertificateDer<'static>, violations: Vec<TlsViolation>) -> TlsProbeResult {
        TlsProbeResult {
            certificate: Some(cert),
            violations,
        }
    }

    #[test]
    fn test_normalize_bare_host() {
        let url = normalize_https_url("example.com/").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_normalize_keeps_https_and_upgrades_http() {
        let url = normalize_https_url("https://example.com:8443/path").unwrap();
        assert_eq!(url.port(), Some(8443));
        assert_eq!(url.path(), "/path");

        let url = normalize_https_url("http://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_https_url("").is_none());
        assert!(normalize_https_url("   ").is_none());
        assert!(normalize_https_url("ftp://example.com").is_none());
        assert!(normalize_https_url("https://").is_none());
    }

    #[tokio::test]
    async fn test_unparsable_host_is_invalid_without_network() {
        let validator = TlsValidator::new().with_timeout(Duration::from_millis(1));
        let status = validator.validate("", &CancellationToken::new()).await;
        assert_eq!(status, TlsStatus::INVALID);
    }

    #[test]
    fn test_assess_trusted_certificate() {
        let now = Utc.with_ymd_and_hms(2029, 12, 1, 0, 0, 0).unwrap();
        let (cert, _) = cert_between(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        );

        let status = assess(&captured(cert, vec![]), true, now);
        assert!(status.valid);
        assert_eq!(status.days_remaining, 31);
    }

    #[test]
    fn test_assess_rejected_certificate_keeps_expiry() {
        let now = Utc.with_ymd_and_hms(2029, 12, 1, 0, 0, 0).unwrap();
        let (cert, _) = cert_between(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        );

        let status = assess(&captured(cert, vec![TlsViolation::UntrustedIssuer]), false, now);
        assert!(!status.valid);
        assert_eq!(status.days_remaining, 31);
    }

    #[test]
    fn test_assess_expired_certificate_has_negative_days() {
        let now = Utc.with_ymd_and_hms(2030, 1, 2, 12, 0, 0).unwrap();
        let (cert, _) = cert_between(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        );

        let status = assess(&captured(cert, vec![]), true, now);
        assert!(!status.valid);
        assert_eq!(status.days_remaining, -2);
    }

    #[test]
    fn test_assess_not_yet_valid() {
        let now = Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap();
        let (cert, _) = cert_between(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        );

        assert!(!assess(&captured(cert, vec![]), true, now).valid);
    }

    #[test]
    fn test_assess_without_certificate() {
        assert_eq!(
            assess(&TlsProbeResult::default(), true, Utc::now()),
            TlsStatus::INVALID
        );
    }

    #[test]
    fn test_violation_mapping() {
        let err = rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer);
        assert_eq!(TlsViolation::from(&err), TlsViolation::UntrustedIssuer);

        let err = rustls::Error::InvalidCertificate(CertificateError::NotValidForName);
        assert_eq!(TlsViolation::from(&err), TlsViolation::NameMismatch);

        let err = rustls::Error::General("boom".to_string());
        assert!(matches!(TlsViolation::from(&err), TlsViolation::Other(_)));
    }

    /// How the local TLS server treats a connection after the handshake.
    #[derive(Clone, Copy)]
    enum Reply {
        Ok,
        Silent,
    }

    /// Serve `cert` on a loopback port and return that port.
    async fn spawn_tls_server(cert: CertificateDer<'static>, key: KeyPair, reply: Reply) -> u16 {
        let server_config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            vec![cert],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der())),
        )
        .unwrap();
        let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let Ok(mut tls) = acceptor.accept(stream).await else {
                        return;
                    };
                    let mut buf = [0u8; 1024];
                    let _ = tls.read(&mut buf).await;
                    match reply {
                        Reply::Ok => {
                            let _ = tls
                                .write_all(
                                    b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                                )
                                .await;
                            let _ = tls.shutdown().await;
                        }
                        Reply::Silent => {
                            tokio::time::sleep(Duration::from_secs(30)).await;
                        }
                    }
                });
            }
        });
        port
    }

    fn trusting(cert: &CertificateDer<'static>) -> TlsValidator {
        let mut roots = RootCertStore::empty();
        roots.add(cert.clone()).unwrap();
        TlsValidator::with_roots(roots)
    }

    #[tokio::test]
    async fn test_untrusted_certificate_is_captured_after_rejection() {
        let now = Utc::now();
        let (cert, key) = cert_between(now - ChronoDuration::days(10), now + ChronoDuration::days(45));
        let port = spawn_tls_server(cert, key, Reply::Ok).await;

        let validator = TlsValidator::new().with_timeout(Duration::from_secs(5));
        let status = validator
            .validate(&format!("127.0.0.1:{}", port), &CancellationToken::new())
            .await;

        assert!(!status.valid);
        assert!(
            (43..=45).contains(&status.days_remaining),
            "days remaining {}",
            status.days_remaining
        );
    }

    #[tokio::test]
    async fn test_trusted_certificate_is_valid() {
        let now = Utc::now();
        let (cert, key) = cert_between(now - ChronoDuration::days(10), now + ChronoDuration::days(45));
        let validator = trusting(&cert).with_timeout(Duration::from_secs(5));
        let port = spawn_tls_server(cert, key, Reply::Ok).await;

        let status = validator
            .validate(&format!("localhost:{}", port), &CancellationToken::new())
            .await;

        assert!(status.valid);
        assert!(
            (43..=45).contains(&status.days_remaining),
            "days remaining {}",
            status.days_remaining
        );
    }

    #[tokio::test]
    async fn test_trusted_certificate_with_wrong_name_is_invalid() {
        let now = Utc::now();
        let (cert, key) = cert_between(now - ChronoDuration::days(10), now + ChronoDuration::days(45));
        let validator = trusting(&cert).with_timeout(Duration::from_secs(5));
        let port = spawn_tls_server(cert, key, Reply::Ok).await;

        let status = validator
            .validate(&format!("127.0.0.1:{}", port), &CancellationToken::new())
            .await;

        assert!(!status.valid);
        assert!((43..=45).contains(&status.days_remaining));
    }

    #[tokio::test]
    async fn test_timeout_after_handshake_is_invalid() {
        let now = Utc::now();
        let (cert, key) = cert_between(now - ChronoDuration::days(10), now + ChronoDuration::days(45));
        let validator = trusting(&cert).with_timeout(Duration::from_millis(500));
        let port = spawn_tls_server(cert, key, Reply::Silent).await;

        let status = validator
            .validate(&format!("localhost:{}", port), &CancellationToken::new())
            .await;

        assert_eq!(status, TlsStatus::INVALID);
    }

    #[tokio::test]
    async fn test_connection_refused_is_invalid() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let validator = TlsValidator::new().with_timeout(Duration::from_secs(2));
        let status = validator
            .validate(&format!("127.0.0.1:{}", port), &CancellationToken::new())
            .await;
        assert_eq!(status, TlsStatus::INVALID);
    }

    #[tokio::test]
    async fn test_cancelled_probe_is_invalid() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let status = TlsValidator::new().validate("example.com", &cancel).await;
        assert_eq!(status, TlsStatus::INVALID);
    }
}
