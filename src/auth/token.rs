use crate::config::JwtSettings;
use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fs;
use std::str::FromStr;
use uuid::Uuid;

/// Represents the claims encoded within both access and refresh tokens.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject of the token, the user's id rendered as a string.
    pub sub: String,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Random token id; keeps two tokens minted in the same second distinct.
    pub jti: String,
}

/// A signed token together with its absolute expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

/// Independently signed and independently expiring access/refresh tokens.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Signs and verifies tokens with an asymmetric key pair.
///
/// Key material is parsed once at construction and never mutated, so a codec
/// can be cloned into every worker and used concurrently.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    /// Builds a codec from PEM-encoded keys.
    ///
    /// Returns `AppError::Signing` for symmetric algorithms or unparsable keys.
    pub fn new(algorithm: Algorithm, private_pem: &[u8], public_pem: &[u8]) -> Result<Self, AppError> {
        let keys = match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => EncodingKey::from_rsa_pem(private_pem)
                .and_then(|enc| DecodingKey::from_rsa_pem(public_pem).map(|dec| (enc, dec))),
            Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(private_pem)
                .and_then(|enc| DecodingKey::from_ec_pem(public_pem).map(|dec| (enc, dec))),
            Algorithm::EdDSA => EncodingKey::from_ed_pem(private_pem)
                .and_then(|enc| DecodingKey::from_ed_pem(public_pem).map(|dec| (enc, dec))),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Err(AppError::Signing(format!(
                    "{:?} is symmetric; an asymmetric algorithm is required",
                    algorithm
                )));
            }
        };

        let (encoding_key, decoding_key) = keys
            .map_err(|e| AppError::Signing(format!("Failed to load {:?} keys: {}", algorithm, e)))?;

        Ok(Self {
            algorithm,
            encoding_key,
            decoding_key,
        })
    }

    /// Reads the configured key files and algorithm name.
    pub fn from_settings(settings: &JwtSettings) -> Result<Self, AppError> {
        let algorithm = Algorithm::from_str(&settings.algorithm).map_err(|_| {
            AppError::Signing(format!("Unknown JWT algorithm {:?}", settings.algorithm))
        })?;
        let private_pem = fs::read(&settings.private_key_path).map_err(|e| {
            AppError::Signing(format!(
                "Failed to read private key {}: {}",
                settings.private_key_path.display(),
                e
            ))
        })?;
        let public_pem = fs::read(&settings.public_key_path).map_err(|e| {
            AppError::Signing(format!(
                "Failed to read public key {}: {}",
                settings.public_key_path.display(),
                e
            ))
        })?;

        Self::new(algorithm, &private_pem, &public_pem)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Issues a token for `subject` that expires `lifetime` from now.
    pub fn issue(&self, subject: &str, lifetime: Duration) -> Result<IssuedToken, AppError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + lifetime.num_seconds(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = self.sign(&claims)?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Issues a fresh access/refresh pair for `subject`.
    pub fn issue_pair(
        &self,
        subject: &str,
        access_lifetime: Duration,
        refresh_lifetime: Duration,
    ) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access: self.issue(subject, access_lifetime)?,
            refresh: self.issue(subject, refresh_lifetime)?,
        })
    }

    /// Verifies the signature and expiry of `token` and returns its claims.
    ///
    /// Returns `AppError::TokenExpired` once `exp` has passed and
    /// `AppError::TokenMalformed` for every other failure.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AppError::from)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AppError::Signing(format!("Failed to generate token: {}", e)))
    }
}
