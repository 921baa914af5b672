//! Peer-certificate expiry retrieval.
//!
//! Opens a TLS session to the target host purely to read the peer
//! certificate's validity window. Verification is disabled on purpose:
//! an expired or mis-issued certificate is exactly what the report should
//! surface, not a reason to return nothing.

use crate::types::{Result, ScoutError, TlsExpiry};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tracing::{debug, warn};
use x509_parser::prelude::*;

const SECONDS_PER_DAY: i64 = 86_400;

/// Retrieve certificate expiry for a host, or `None` when unavailable.
/// All failures (connect, handshake, parse, timeout) degrade to `None`.
pub async fn check_certificate(host: &str, port: u16, budget: Duration) -> Option<TlsExpiry> {
    match tokio::time::timeout(budget, probe(host, port)).await {
        Ok(Ok(expiry)) => Some(expiry),
        Ok(Err(e)) => {
            warn!("TLS check failed for {}: {}", host, e);
            None
        }
        Err(_) => {
            warn!("TLS check timed out for {}", host);
            None
        }
    }
}

async fn probe(host: &str, port: u16) -> Result<TlsExpiry> {
    let tcp = TcpStream::connect((host, port)).await?;

    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| ScoutError::TlsError(format!("connector: {}", e)))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let stream = connector
        .connect(host, tcp)
        .await
        .map_err(|e| ScoutError::TlsError(format!("handshake: {}", e)))?;

    let cert = stream
        .get_ref()
        .peer_certificate()
        .map_err(|e| ScoutError::TlsError(format!("peer certificate: {}", e)))?
        .ok_or_else(|| ScoutError::TlsError("no peer certificate presented".to_string()))?;

    let der = cert
        .to_der()
        .map_err(|e| ScoutError::TlsError(format!("DER encoding: {}", e)))?;

    let (_, parsed) = X509Certificate::from_der(&der)
        .map_err(|e| ScoutError::TlsError(format!("X.509 parse: {:?}", e)))?;

    let validity = parsed.validity();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let expiry = TlsExpiry {
        valid_to: validity.not_after.to_string(),
        days_left: days_between(now, validity.not_after.timestamp()),
    };

    debug!(
        "Certificate for {} valid until {} ({} days)",
        host, expiry.valid_to, expiry.days_left
    );

    Ok(expiry)
}

/// Whole days from `now` until `expiry`, negative once expired.
fn days_between(now_secs: i64, expiry_secs: i64) -> i64 {
    (expiry_secs - now_secs) / SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_between_future() {
        let now = 1_000_000;
        let expiry = now + 30 * SECONDS_PER_DAY;
        assert_eq!(days_between(now, expiry), 30);
    }

    #[test]
    fn test_days_between_partial_day_rounds_down() {
        let now = 1_000_000;
        let expiry = now + SECONDS_PER_DAY + SECONDS_PER_DAY / 2;
        assert_eq!(days_between(now, expiry), 1);
    }

    #[test]
    fn test_days_between_expired_is_negative() {
        let now = 1_000_000;
        let expiry = now - 2 * SECONDS_PER_DAY;
        assert_eq!(days_between(now, expiry), -2);
    }
}
