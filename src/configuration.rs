use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;
const MIN_HASH_COST: u32 = 4;
const MAX_HASH_COST: u32 = 31;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub password: PasswordSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server-level connection, used to create throwaway test databases
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token signing settings
///
/// Access and refresh tokens are signed with separate secrets so a leak of
/// one cannot be used to forge the other.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_expiry: i64,           // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: Option<i64>,  // seconds; unset means the store alone decides
    pub issuer: String,
}

impl JwtSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, secret) in [
            ("jwt.access_token_secret", &self.access_token_secret),
            ("jwt.refresh_token_secret", &self.refresh_token_secret),
        ] {
            if secret.is_empty() {
                return Err(ConfigError::MissingRequired(name.to_string()));
            }
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be at least {} bytes",
                    name, MIN_SECRET_LENGTH
                )));
            }
        }

        if self.access_token_secret == self.refresh_token_secret {
            return Err(ConfigError::InvalidValue(
                "access and refresh token secrets must differ".to_string(),
            ));
        }

        if self.access_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_expiry must be positive".to_string(),
            ));
        }

        if matches!(self.refresh_token_expiry, Some(expiry) if expiry <= 0) {
            return Err(ConfigError::InvalidValue(
                "jwt.refresh_token_expiry must be positive when set".to_string(),
            ));
        }

        if self.issuer.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.issuer".to_string()));
        }

        Ok(())
    }
}

/// Password hashing settings
#[derive(serde::Deserialize, Clone)]
pub struct PasswordSettings {
    pub hash_cost: u32,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate()?;

        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.password.hash_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "password.hash_cost must be between {} and {}",
                MIN_HASH_COST, MAX_HASH_COST
            )));
        }

        Ok(())
    }
}

/// Load settings from `configuration.yaml` (optional) overlaid with
/// `APP__SECTION__KEY` environment variables.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            access_token_secret: "access-secret-at-least-32-bytes-long!!".to_string(),
            refresh_token_secret: "refresh-secret-at-least-32-bytes-long!".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: None,
            issuer: "session_auth".to_string(),
        }
    }

    #[test]
    fn test_valid_jwt_settings() {
        assert!(jwt_settings().validate().is_ok());
    }

    #[test]
    fn test_identical_secrets_rejected() {
        let mut settings = jwt_settings();
        settings.refresh_token_secret = settings.access_token_secret.clone();
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let mut settings = jwt_settings();
        settings.access_token_secret = String::new();
        assert!(matches!(settings.validate(), Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut settings = jwt_settings();
        settings.refresh_token_secret = "too-short".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_non_positive_expiry_rejected() {
        let mut settings = jwt_settings();
        settings.access_token_expiry = 0;
        assert!(settings.validate().is_err());

        let mut settings = jwt_settings();
        settings.refresh_token_expiry = Some(-1);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_hash_cost_bounds() {
        let mut settings = Settings {
            database: DatabaseSettings {
                username: "postgres".to_string(),
                password: "password".to_string(),
                port: 5432,
                host: "localhost".to_string(),
                database_name: "session_auth".to_string(),
            },
            application: ApplicationSettings {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            jwt: jwt_settings(),
            password: PasswordSettings::default(),
        };
        assert!(settings.validate().is_ok());

        settings.password.hash_cost = 3;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_connection_string() {
        let db = DatabaseSettings {
            username: "app".to_string(),
            password: "secret".to_string(),
            port: 5432,
            host: "db".to_string(),
            database_name: "users".to_string(),
        };
        assert_eq!(db.connection_string(), "postgres://app:secret@db:5432/users");
        assert_eq!(db.connection_string_without_db(), "postgres://app:secret@db:5432");
    }
}
