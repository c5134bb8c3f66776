//! Bearer-token authentication for the protocol namespace and short-lived
//! signed tickets for the asset-proxy routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AppState;

/// Issuer claim stamped into asset tickets.
const TICKET_ISSUER: &str = "terraform-registry";

/// Ticket lifetime. Terraform fetches the asset within one round-trip of
/// receiving the package record, so ten seconds is plenty.
const TICKET_TTL_SECS: u64 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct TicketClaims {
    exp: u64,
    iss: String,
}

/// Signs a ticket authorising asset-proxy fetches for the next ten seconds.
pub fn issue_asset_ticket(secret: &[u8]) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = TicketClaims {
        exp: jsonwebtoken::get_current_timestamp() + TICKET_TTL_SECS,
        iss: TICKET_ISSUER.to_string(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Verifies a ticket's signature and expiry. No clock leeway is granted: a
/// ticket expired by one second is rejected.
pub fn verify_asset_ticket(secret: &[u8], token: &str) -> Result<(), jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    decode::<TicketClaims>(token, &DecodingKey::from_secret(secret), &validation).map(|_| ())
}

/// Middleware for bearer-token authentication on the `/v1` namespace.
///
/// The `Authorization` header must split into exactly `Bearer <token>` and
/// the token must equal some value in the current token set. Descriptions
/// (the map keys) are operator bookkeeping only.
pub(crate) async fn token_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if state.auth_disabled {
        return next.run(req).await;
    }

    let Some(header) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        debug!("token auth: Authorization header missing or empty");
        return forbidden();
    };

    let mut parts = header.splitn(2, ' ');
    let (Some(token_type), Some(token)) = (parts.next(), parts.next()) else {
        debug!("token auth: Authorization header present, but invalid");
        return forbidden();
    };

    if token_type != "Bearer" {
        debug!(
            actual = token_type,
            expected = "Bearer",
            "token auth: unexpected authorization header value prefix"
        );
        return forbidden();
    }

    let authorized = {
        let tokens = state
            .auth_tokens
            .read()
            .expect("auth token lock poisoned");
        tokens.values().any(|t| t == token)
    };

    if authorized {
        next.run(req).await
    } else {
        forbidden()
    }
}

/// Middleware protecting the asset-proxy routes. Terraform does not send
/// registry auth headers when downloading assets, so the ticket arrives as a
/// `token` query parameter instead.
pub(crate) async fn asset_download_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if state.auth_disabled {
        return next.run(req).await;
    }

    let Some(ticket) = query_param(req.uri().query(), "token") else {
        debug!("asset download auth: token query parameter missing or empty");
        return forbidden();
    };

    match verify_asset_ticket(&state.asset_download_auth_secret, &ticket) {
        Ok(()) => next.run(req).await,
        Err(err) => {
            debug!(error = %err, "asset download auth: token not valid");
            forbidden()
        }
    }
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "Forbidden\n").into_response()
}

/// Extracts a single query parameter value. Ticket values are JWTs, which
/// contain no percent-encoded characters.
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix(name).and_then(|v| v.strip_prefix('=')) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn ticket_round_trip() {
        let ticket = issue_asset_ticket(SECRET).unwrap();
        assert!(verify_asset_ticket(SECRET, &ticket).is_ok());
    }

    #[test]
    fn ticket_rejected_with_wrong_secret() {
        let ticket = issue_asset_ticket(SECRET).unwrap();
        assert!(verify_asset_ticket(b"other-secret", &ticket).is_err());
    }

    #[test]
    fn expired_ticket_rejected() {
        let claims = TicketClaims {
            exp: jsonwebtoken::get_current_timestamp() - 1,
            iss: TICKET_ISSUER.to_string(),
        };
        let ticket = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert!(verify_asset_ticket(SECRET, &ticket).is_err());
    }

    #[test]
    fn garbage_ticket_rejected() {
        assert!(verify_asset_ticket(SECRET, "not-a-jwt").is_err());
        assert!(verify_asset_ticket(SECRET, "").is_err());
    }

    #[test]
    fn query_param_extraction() {
        assert_eq!(
            query_param(Some("token=abc.def.ghi"), "token"),
            Some("abc.def.ghi".to_string())
        );
        assert_eq!(
            query_param(Some("other=1&token=t"), "token"),
            Some("t".to_string())
        );
        assert_eq!(query_param(Some("token="), "token"), None);
        assert_eq!(query_param(Some("tokenish=t"), "token"), None);
        assert_eq!(query_param(None, "token"), None);
    }
}
