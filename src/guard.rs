//! Gate for privileged endpoints: rate limit, fail closed on missing
//! configuration, then a constant-time key check.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::metrics::{AUTH_FAILURES, RATE_LIMITED_TOTAL};
use crate::rate_limit::RateLimiter;
use crate::security::secure_compare;
use crate::state::{AppState, client_ip};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";
pub const ADMIN_KEY_PARAM: &str = "key";
const ADMIN_RATE_LIMIT: u32 = 60;
const ADMIN_RATE_WINDOW: Duration = Duration::from_millis(60_000);

pub struct AdminGuard<'a> {
    limiter: &'a RateLimiter,
    secret: Option<&'a str>,
}

impl<'a> AdminGuard<'a> {
    pub fn new(limiter: &'a RateLimiter, secret: Option<&'a str>) -> Self {
        Self { limiter, secret }
    }

    pub fn authorize(&self, headers: &HeaderMap, uri: &Uri) -> Result<(), GatewayError> {
        let ip = client_ip(headers);

        let bucket = format!("admin:{ip}");
        let decision = self.limiter.check(&bucket, ADMIN_RATE_LIMIT, ADMIN_RATE_WINDOW);
        if !decision.success {
            RATE_LIMITED_TOTAL.inc();
            debug!(%ip, "admin request rate limited");
            return Err(GatewayError::rate_limited(decision, self.limiter.now_ms()));
        }

        let Some(secret) = self.secret.filter(|s| !s.is_empty()) else {
            warn!(%ip, "admin access key is not configured; denying request");
            return Err(GatewayError::Misconfigured);
        };

        let from_header = headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let from_query = Query::<HashMap<String, String>>::try_from_uri(uri)
            .ok()
            .and_then(|Query(params)| params.get(ADMIN_KEY_PARAM).cloned());

        let authorized = [from_header, from_query]
            .into_iter()
            .flatten()
            .any(|candidate| secure_compare(&candidate, secret));

        if authorized {
            Ok(())
        } else {
            AUTH_FAILURES.inc();
            warn!(%ip, "admin request rejected: invalid or missing key");
            Err(GatewayError::Unauthorized)
        }
    }
}

/// Extractor proving the request passed [`AdminGuard`].
pub struct AdminAccess;

impl FromRequestParts<Arc<AppState>> for AdminAccess {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        AdminGuard::new(&state.rate_limiter, state.admin_key.as_deref())
            .authorize(&parts.headers, &parts.uri)?;
        Ok(AdminAccess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{ManualClock, MemoryStore};
    use axum::http::{HeaderValue, StatusCode};

    fn limiter() -> RateLimiter {
        RateLimiter::with_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(0)),
            1_000,
        )
    }

    fn headers(ip: &str, key: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(ip).unwrap());
        if let Some(key) = key {
            headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_static(key));
        }
        headers
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn header_key_is_accepted() {
        let limiter = limiter();
        let guard = AdminGuard::new(&limiter, Some("test-secret"));
        assert!(guard
            .authorize(&headers("1.1.1.1", Some("test-secret")), &uri("/api/admin/rate-limits"))
            .is_ok());
    }

    #[test]
    fn query_key_is_accepted() {
        let limiter = limiter();
        let guard = AdminGuard::new(&limiter, Some("test-secret"));
        assert!(guard
            .authorize(&headers("1.1.1.1", None), &uri("/api/admin/rate-limits?key=test-secret"))
            .is_ok());
    }

    #[test]
    fn wrong_header_does_not_hide_a_correct_query_key() {
        let limiter = limiter();
        let guard = AdminGuard::new(&limiter, Some("test-secret"));
        assert!(guard
            .authorize(&headers("1.1.1.1", Some("nope")), &uri("/x?key=test-secret"))
            .is_ok());
    }

    #[test]
    fn bad_or_missing_key_is_unauthorized() {
        let limiter = limiter();
        let guard = AdminGuard::new(&limiter, Some("test-secret"));
        let err = guard
            .authorize(&headers("1.1.1.1", Some("test-secre")), &uri("/x?key="))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        let err = guard.authorize(&headers("1.1.1.1", None), &uri("/x")).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn missing_secret_fails_closed_even_for_the_old_key() {
        let limiter = limiter();
        let configured = AdminGuard::new(&limiter, Some("test-secret"));
        let request = headers("1.1.1.1", Some("test-secret"));
        assert!(configured.authorize(&request, &uri("/x")).is_ok());

        for secret in [None, Some("")] {
            let unset = AdminGuard::new(&limiter, secret);
            let err = unset.authorize(&request, &uri("/x?key=test-secret")).unwrap_err();
            assert!(matches!(err, GatewayError::Misconfigured));
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn sixty_first_request_in_a_minute_is_rate_limited() {
        let limiter = limiter();
        let guard = AdminGuard::new(&limiter, Some("test-secret"));
        let request = headers("9.9.9.9", Some("test-secret"));
        for _ in 0..60 {
            assert!(guard.authorize(&request, &uri("/x")).is_ok());
        }
        match guard.authorize(&request, &uri("/x")).unwrap_err() {
            GatewayError::RateLimited {
                decision,
                retry_after_secs,
            } => {
                assert_eq!(decision.limit, 60);
                assert_eq!(decision.remaining, 0);
                assert_eq!(retry_after_secs, 60);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }

        // Another caller is unaffected.
        assert!(guard.authorize(&headers("8.8.8.8", Some("test-secret")), &uri("/x")).is_ok());
    }

    #[test]
    fn rate_limit_applies_before_configuration_check() {
        let limiter = limiter();
        let guard = AdminGuard::new(&limiter, None);
        let request = headers("7.7.7.7", None);
        for _ in 0..60 {
            assert!(matches!(
                guard.authorize(&request, &uri("/x")),
                Err(GatewayError::Misconfigured)
            ));
        }
        assert!(matches!(
            guard.authorize(&request, &uri("/x")),
            Err(GatewayError::RateLimited { .. })
        ));
    }

    #[test]
    fn admin_quota_is_separate_from_the_public_one() {
        let limiter = limiter();
        for _ in 0..10 {
            limiter.check("6.6.6.6", 10, Duration::from_secs(60));
        }
        assert!(!limiter.check("6.6.6.6", 10, Duration::from_secs(60)).success);

        let guard = AdminGuard::new(&limiter, Some("test-secret"));
        assert!(guard
            .authorize(&headers("6.6.6.6", Some("test-secret")), &uri("/x"))
            .is_ok());
    }
}
