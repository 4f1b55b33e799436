use super::model::AuthenticatedUser;
use crate::core::config::AuthConfig;
use crate::core::error::AppError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

#[derive(Debug, Clone, Deserialize)]
struct Claims {
    // Older tokens carry the subject as `id`
    #[serde(alias = "id")]
    sub: String,
    #[serde(rename = "exp")]
    _exp: u64,

    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

impl JwtValidator {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.jwt_leeway.as_secs();
        validation.validate_nbf = true;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Auth(e.to_string()))?;

        let claims = token_data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AppError::Auth("Token has an empty subject".to_string()));
        }

        // Merge the single-role and multi-role claim shapes
        let mut roles = claims.roles;
        if let Some(role) = claims.role {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        Ok(AuthenticatedUser {
            sub: claims.sub,
            roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::time::Duration;

    const SECRET: &str = "test-secret";

    fn config(issuer: Option<&str>) -> AuthConfig {
        AuthConfig {
            jwt_secret: SECRET.to_string(),
            issuer: issuer.map(String::from),
            jwt_leeway: Duration::from_secs(0),
        }
    }

    fn sign(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_one_hour() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_accepts_legacy_id_and_role_claims() {
        let validator = JwtValidator::new(&config(None));
        let token = sign(
            json!({ "id": "amb-42", "role": "driver", "exp": in_one_hour() }),
            SECRET,
        );

        let user = validator.validate_token(&token).unwrap();
        assert_eq!(user.sub, "amb-42");
        assert!(user.is_driver());
        assert!(!user.is_admin());
    }

    #[test]
    fn test_merges_roles_list() {
        let validator = JwtValidator::new(&config(None));
        let token = sign(
            json!({ "sub": "ops-1", "roles": ["admin"], "role": "driver", "exp": in_one_hour() }),
            SECRET,
        );

        let user = validator.validate_token(&token).unwrap();
        assert!(user.is_admin());
        assert!(user.is_driver());
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let validator = JwtValidator::new(&config(None));
        let token = sign(json!({ "sub": "x", "exp": in_one_hour() }), "other-secret");

        assert!(matches!(
            validator.validate_token(&token),
            Err(AppError::Auth(_))
        ));
    }

    #[test]
    fn test_rejects_expired_token() {
        let validator = JwtValidator::new(&config(None));
        let expired = chrono::Utc::now().timestamp() - 600;
        let token = sign(json!({ "sub": "x", "exp": expired }), SECRET);

        assert!(validator.validate_token(&token).is_err());
    }

    #[test]
    fn test_enforces_issuer_when_configured() {
        let validator = JwtValidator::new(&config(Some("https://id.example.org")));
        let foreign = sign(
            json!({ "sub": "x", "iss": "https://evil.example", "exp": in_one_hour() }),
            SECRET,
        );
        let ours = sign(
            json!({ "sub": "x", "iss": "https://id.example.org", "exp": in_one_hour() }),
            SECRET,
        );

        assert!(validator.validate_token(&foreign).is_err());
        assert!(validator.validate_token(&ours).is_ok());
    }
}
