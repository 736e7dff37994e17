//! Signed browser cookie carrying the session id.

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, Key, SameSite, SignedCookieJar};
use parley_session::SessionId;
use std::convert::Infallible;

pub const SESSION_COOKIE: &str = "parley_session";

/// The caller's session id, plus the jar to return with the response.
///
/// A missing cookie, or one whose signature does not verify, yields a fresh
/// id and a jar that sets the new cookie.
pub struct BrowserSession {
    pub id: SessionId,
    pub jar: SignedCookieJar,
}

impl BrowserSession {
    fn resolve(jar: SignedCookieJar, raw: &CookieJar) -> Self {
        if let Some(id) = jar
            .get(SESSION_COOKIE)
            .and_then(|c| c.value().parse::<SessionId>().ok())
        {
            return Self { id, jar };
        }

        if raw.get(SESSION_COOKIE).is_some() {
            tracing::warn!("Ignoring session cookie that failed verification");
        }
        let id = SessionId::new();
        tracing::debug!("Issuing new session {}", id.short());
        Self {
            id,
            jar: jar.add(session_cookie(id)),
        }
    }
}

fn session_cookie(id: SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

#[async_trait]
impl<S> FromRequestParts<S> for BrowserSession
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::from_headers(&parts.headers, Key::from_ref(state));
        let raw = CookieJar::from_headers(&parts.headers);
        Ok(Self::resolve(jar, &raw))
    }
}
