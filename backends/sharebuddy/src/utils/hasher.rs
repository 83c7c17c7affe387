use argon2::Argon2;
use password_hash::{PasswordHash, PasswordVerifier, SaltString};

use crate::error::{AppError, AppResult};

pub fn hash_password(password: impl AsRef<[u8]>) -> AppResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());

    let hash = PasswordHash::generate(Argon2::default(), password.as_ref(), &salt)
        .map_err(|err| anyhow::anyhow!(err))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: impl AsRef<[u8]>, hash: &str) -> AppResult<()> {
    let hash = PasswordHash::new(hash).map_err(|err| anyhow::anyhow!(err))?;

    Argon2::default()
        .verify_password(password.as_ref(), &hash)
        .map_err(|err| {
            tracing::debug!("password verification failed: {err}");
            AppError::Forbidden("email or password is invalid")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse battery", &hash).is_ok());
    }

    #[test]
    fn wrong_password_is_forbidden() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(matches!(
            verify_password("wrong horse battery", &hash),
            Err(AppError::Forbidden(_))
        ));
    }
}
