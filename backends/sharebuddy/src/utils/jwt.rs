use axum::http::HeaderValue;
use axum_extra::{headers::Authorization, TypedHeader};
use headers::authorization::Credentials;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

use super::auth::UserId;

/// Header extractor shared by every handler that reads the caller's identity.
pub type BearerToken = Option<TypedHeader<Authorization<JWTToken>>>;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub exp: i64,
    pub user_id: UserId,
}

#[derive(Debug)]
pub struct JWTToken(pub String);

impl Credentials for JWTToken {
    const SCHEME: &'static str = "Bearer";

    fn decode(value: &HeaderValue) -> Option<Self> {
        let mut it = value.to_str().ok()?.split_whitespace();
        let scheme = it.next()?;
        let token = it.next()?;

        if !scheme.eq_ignore_ascii_case(Self::SCHEME) || it.next().is_some() {
            None?
        }

        Some(Self(token.to_string()))
    }

    fn encode(&self) -> HeaderValue {
        HeaderValue::from_str(&format!("{} {}", Self::SCHEME, self.0))
            .unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

pub fn generate_jwt(user_id: UserId, expiry_days: i64, key: &EncodingKey) -> AppResult<String> {
    let exp = (chrono::Utc::now() + chrono::Duration::days(expiry_days)).timestamp();
    let claims = Claims { exp, user_id };
    let token = jsonwebtoken::encode(&Header::new(Algorithm::RS384), &claims, key)?;
    Ok(token)
}

pub fn verify_token(token: &str, key: &DecodingKey) -> AppResult<UserId> {
    let claim = verify_jwt(token, key)?;
    Ok(claim.user_id)
}

pub fn verify_jwt(token: &str, key: &DecodingKey) -> AppResult<Claims> {
    let claims = jsonwebtoken::decode::<Claims>(
        token,
        key,
        &jsonwebtoken::Validation::new(Algorithm::RS384),
    )?
    .claims;
    Ok(claims)
}

/// Resolves the caller or fails with 401.
pub fn require_user(token: BearerToken, key: &DecodingKey) -> AppResult<UserId> {
    let Some(TypedHeader(Authorization(token))) = token else {
        return Err(AppError::Unauthorized);
    };
    verify_token(&token.0, key)
}

/// Resolves the caller when a token is present; a bad token is still an error.
pub fn optional_user(token: BearerToken, key: &DecodingKey) -> AppResult<Option<UserId>> {
    token
        .map(|TypedHeader(Authorization(token))| verify_token(&token.0, key))
        .transpose()
}

pub fn load_keys(private_pem: &[u8], public_pem: &[u8]) -> AppResult<(EncodingKey, DecodingKey)> {
    Ok((
        EncodingKey::from_rsa_pem(private_pem)?,
        DecodingKey::from_rsa_pem(public_pem)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> (EncodingKey, DecodingKey) {
        load_keys(
            include_bytes!("../../tests/fixtures/private_key.pem"),
            include_bytes!("../../tests/fixtures/public_key.pem"),
        )
        .unwrap()
    }

    #[test]
    fn issued_token_resolves_to_user() {
        let (encoding, decoding) = keys();
        let token = generate_jwt(42, 30, &encoding).unwrap();
        assert_eq!(verify_token(&token, &decoding).unwrap(), 42);
    }

    #[test]
    fn expired_token_is_rejected() {
        let (encoding, decoding) = keys();
        let token = generate_jwt(42, -2, &encoding).unwrap();
        assert!(matches!(
            verify_token(&token, &decoding),
            Err(AppError::JwtError(_))
        ));
    }

    #[test]
    fn bearer_scheme_is_parsed() {
        let value = HeaderValue::from_static("Bearer abc.def.ghi");
        assert_eq!(JWTToken::decode(&value).unwrap().0, "abc.def.ghi");

        let value = HeaderValue::from_static("Token abc.def.ghi");
        assert!(JWTToken::decode(&value).is_none());

        let value = HeaderValue::from_static("Bearer abc extra");
        assert!(JWTToken::decode(&value).is_none());
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let (_, decoding) = keys();
        assert!(matches!(
            require_user(None, &decoding),
            Err(AppError::Unauthorized)
        ));
        assert_eq!(optional_user(None, &decoding).unwrap(), None);
    }
}
