//! Bearer-token authentication for the two API audiences.
//!
//! Tokens are HS256 JWTs carrying the principal's role. Logging out stores
//! the token's `jti` in the revocation table so it is refused until it would
//! have expired anyway.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use fleetdesk_core::activity::CompanyScope;
use fleetdesk_core::company::{Company, CompanyUser};
use fleetdesk_core::config::AuthConfig;
use fleetdesk_core::db;
use fleetdesk_core::delivery_man::DeliveryMan;
use fleetdesk_core::types::Actor;
use fleetdesk_core::DeskError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    CompanyUser,
    DeliveryMan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn subject(&self) -> Result<i64, DeskError> {
        self.sub.parse().map_err(|_| DeskError::Unauthenticated)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// A freshly signed token as returned by login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

// ---------------------------------------------------------------------------
// TokenService
// ---------------------------------------------------------------------------

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl_seconds: i64,
}

impl TokenService {
    pub fn new(cfg: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            ttl_seconds: cfg.ttl_minutes * 60,
        }
    }

    pub fn issue(&self, role: Role, subject: i64, company_id: Option<i64>) -> Result<IssuedToken, DeskError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            company_id,
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.ttl_seconds,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| DeskError::Token(e.to_string()))?;
        Ok(IssuedToken {
            access_token,
            token_type: "Bearer",
            expires_in: self.ttl_seconds,
        })
    }

    /// Signature, issuer and expiry checks. Revocation is checked separately.
    pub fn verify(&self, token: &str) -> Result<Claims, DeskError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected bearer token");
                DeskError::Unauthenticated
            })
    }
}

// ---------------------------------------------------------------------------
// Request principals
// ---------------------------------------------------------------------------

/// Authenticated company user, inserted by [`require_company_user`].
#[derive(Debug, Clone)]
pub struct CompanyAuth {
    pub user: CompanyUser,
    pub company: Company,
    pub claims: Claims,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl CompanyAuth {
    pub fn company_id(&self) -> i64 {
        self.company.id
    }

    /// Tenant scope for writes, carrying the client details for the
    /// activity log.
    pub fn scope(&self) -> CompanyScope {
        CompanyScope::new(self.company.id, Some(self.user.id))
            .with_client(self.ip_address.clone(), self.user_agent.clone())
    }

    pub fn actor(&self) -> Actor {
        Actor::company_user(self.user.id)
    }
}

/// Authenticated delivery man, inserted by [`require_delivery_man`].
#[derive(Debug, Clone)]
pub struct RiderAuth {
    pub man: DeliveryMan,
    pub claims: Claims,
}

fn bearer(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(AppError::unauthenticated)
}

fn client_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let ip = text("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .or_else(|| text("x-real-ip"));
    (ip, text("user-agent"))
}

fn claims_for(app: &AppState, headers: &HeaderMap, role: Role) -> Result<Claims, AppError> {
    let claims = app.tokens.verify(bearer(headers)?)?;
    if claims.role != role {
        return Err(AppError::unauthenticated());
    }
    Ok(claims)
}

fn missing_is_unauthenticated<T>(res: Result<T, DeskError>) -> Result<T, DeskError> {
    res.map_err(|e| match e {
        DeskError::NotFound(_) => DeskError::Unauthenticated,
        other => other,
    })
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub async fn require_company_user(
    State(app): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = claims_for(&app, req.headers(), Role::CompanyUser)?;
    let id = claims.subject()?;
    let jti = claims.jti.clone();
    let store = app.store.clone();
    let (user, company) = tokio::task::spawn_blocking(move || {
        store.read(|conn| {
            if db::is_token_revoked(conn, &jti)? {
                return Err(DeskError::Unauthenticated);
            }
            let user = missing_is_unauthenticated(CompanyUser::get(conn, id))?;
            let company = missing_is_unauthenticated(Company::get(conn, user.company_id))?;
            Ok((user, company))
        })
    })
    .await
    .map_err(AppError::join)??;

    if !company.is_active {
        return Err(AppError::forbidden("Your company account is inactive."));
    }

    let (ip_address, user_agent) = client_info(req.headers());
    req.extensions_mut().insert(CompanyAuth {
        user,
        company,
        claims,
        ip_address,
        user_agent,
    });
    Ok(next.run(req).await)
}

pub async fn require_delivery_man(
    State(app): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = claims_for(&app, req.headers(), Role::DeliveryMan)?;
    let id = claims.subject()?;
    let jti = claims.jti.clone();
    let store = app.store.clone();
    let man = tokio::task::spawn_blocking(move || {
        store.read(|conn| {
            if db::is_token_revoked(conn, &jti)? {
                return Err(DeskError::Unauthenticated);
            }
            missing_is_unauthenticated(DeliveryMan::get(conn, id))
        })
    })
    .await
    .map_err(AppError::join)??;

    req.extensions_mut().insert(RiderAuth { man, claims });
    Ok(next.run(req).await)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
