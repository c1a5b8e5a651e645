use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use thiserror::Error;

use procura_auth::{PrincipalId, Role};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const ROLES_HEADER: &str = "x-roles";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallerError {
    #[error("missing {0} header")]
    Missing(&'static str),
    #[error("malformed {0} header")]
    Malformed(&'static str),
}

/// Attach the caller resolved by the upstream identity layer.
///
/// Requests without a usable principal id and role list are rejected with 401.
pub async fn principal_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match principal_from_headers(req.headers()) {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(err) => json_error(StatusCode::UNAUTHORIZED, "unauthenticated", err.to_string()),
    }
}

pub fn principal_from_headers(headers: &HeaderMap) -> Result<PrincipalContext, CallerError> {
    let principal_id: PrincipalId = header_str(headers, PRINCIPAL_ID_HEADER)?
        .trim()
        .parse()
        .map_err(|_| CallerError::Malformed(PRINCIPAL_ID_HEADER))?;

    let roles: Vec<Role> = header_str(headers, ROLES_HEADER)?
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| Role::new(r.to_string()))
        .collect();
    if roles.is_empty() {
        return Err(CallerError::Malformed(ROLES_HEADER));
    }

    Ok(PrincipalContext::new(principal_id, roles))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, CallerError> {
    headers
        .get(name)
        .ok_or(CallerError::Missing(name))?
        .to_str()
        .map_err(|_| CallerError::Malformed(name))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn resolves_principal_and_roles() {
        let id = PrincipalId::new();
        let ctx = principal_from_headers(&headers(&[
            (PRINCIPAL_ID_HEADER, &id.to_string()),
            (ROLES_HEADER, "director, accounts"),
        ]))
        .unwrap();

        assert_eq!(ctx.principal_id(), id);
        assert_eq!(ctx.roles(), &[Role::DIRECTOR, Role::ACCOUNTS]);
    }

    #[test]
    fn missing_or_malformed_headers_are_rejected() {
        assert_eq!(
            principal_from_headers(&headers(&[(ROLES_HEADER, "director")])),
            Err(CallerError::Missing(PRINCIPAL_ID_HEADER))
        );
        assert_eq!(
            principal_from_headers(&headers(&[
                (PRINCIPAL_ID_HEADER, "not-a-uuid"),
                (ROLES_HEADER, "director"),
            ])),
            Err(CallerError::Malformed(PRINCIPAL_ID_HEADER))
        );
        assert_eq!(
            principal_from_headers(&headers(&[
                (PRINCIPAL_ID_HEADER, &PrincipalId::new().to_string()),
                (ROLES_HEADER, " , "),
            ])),
            Err(CallerError::Malformed(ROLES_HEADER))
        );
    }
}
