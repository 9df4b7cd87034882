use crate::error::AppError;
use bcrypt::{hash, verify, DEFAULT_COST};

/// Stand-in hash checked when the email is unknown, so a miss costs the same
/// bcrypt work as a wrong password.
pub(crate) const UNKNOWN_USER_HASH: &str =
    "$2b$12$s64PUOzZ7reiJVB1AZRqGelWlVZygqPfsa6LFZNm4q.v29Y7gXxz2";

/// Hashes a password with a freshly generated salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(hash(password, DEFAULT_COST)?)
}

pub fn verify_password(password: &str, hashed_password: &str) -> Result<bool, AppError> {
    Ok(verify(password, hashed_password)?)
}

/// Checks a login attempt against an optional stored hash.
///
/// Returns `false` for an unknown account after spending the same hashing work.
pub fn verify_credentials(password: &str, stored_hash: Option<&str>) -> Result<bool, AppError> {
    match stored_hash {
        Some(hashed) => verify_password(password, hashed),
        None => {
            verify_password(password, UNKNOWN_USER_HASH)?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing_and_verification() {
        let password = "test_password123";
        let hashed = hash_password(password).unwrap();

        assert!(verify_password(password, &hashed).unwrap());
        assert!(!verify_password("wrong_password", &hashed).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("Passw0rd!").unwrap();
        let second = hash_password("Passw0rd!").unwrap();

        assert_ne!(first, second);
        assert!(verify_password("Passw0rd!", &first).unwrap());
        assert!(verify_password("Passw0rd!", &second).unwrap());
    }

    #[test]
    fn test_unknown_user_never_verifies() {
        assert!(!verify_credentials("x", None).unwrap());
        assert!(!verify_credentials("anything", None).unwrap());
    }

    #[test]
    fn test_bcrypt_failures_are_hashing_faults() {
        let error: AppError = hash("x", 1).unwrap_err().into();
        assert!(matches!(error, AppError::Hashing(_)));
        assert!(error.is_server_fault());
    }

    #[test]
    fn test_verify_with_invalid_hash() {
        match verify_password("test_password123", "invalidhashformat") {
            Err(AppError::Hashing(_)) => {}
            Ok(false) => {}
            Ok(true) => panic!("Password verification should fail for invalid hash format"),
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}
