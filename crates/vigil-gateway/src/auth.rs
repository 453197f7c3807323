use axum::http::{HeaderMap, header};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use vigil_types::api::Claims;

use crate::rooms::{Room, SessionIdentity};

/// Cookie set by the web app's login flow.
pub const AUTH_COOKIE: &str = "token";

/// Pull a bearer credential from the request: the auth cookie first, then an
/// `Authorization: Bearer` header, then an explicit `token` query value
/// (browsers cannot set headers on a WebSocket upgrade).
pub fn extract_credential(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(AUTH_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    query_token.filter(|t| !t.is_empty()).map(str::to_string)
}

pub fn verify_token(token: &str, jwt_secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| debug!("Credential rejected: {}", e))
    .ok()
}

/// Derive the session identity for a connection handshake.
///
/// A missing or invalid credential yields `None` (an anonymous session);
/// the transport connection is never rejected here.
pub fn authenticate(
    headers: &HeaderMap,
    query_token: Option<&str>,
    jwt_secret: &str,
) -> Option<SessionIdentity> {
    let token = extract_credential(headers, query_token)?;
    let claims = verify_token(&token, jwt_secret)?;
    Some(SessionIdentity {
        user_id: claims.sub,
        role: claims.role,
        group_id: claims.group_id,
    })
}

/// Rooms a session joins on handshake.
pub fn initial_rooms(identity: Option<&SessionIdentity>) -> Vec<Room> {
    let Some(identity) = identity else {
        return Vec::new();
    };

    let mut rooms = vec![Room::User(identity.user_id)];
    if let Some(group_id) = identity.group_id {
        rooms.push(Room::Group(group_id));
    }
    if identity.role.is_admin() {
        rooms.push(Room::Admins);
    }
    rooms
}
