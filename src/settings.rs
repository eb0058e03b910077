use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::error::ConfigError;
use crate::otp::secret::MAX_SECRET_LENGTH;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InsuraSettings {
    pub application: ApplicationSettings,
    pub otp: OtpSettings,
    pub jwt: JwtSettings,
    pub google: GoogleSettings,
    pub twilio: TwilioSettings,
    pub email: EmailSettings,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpSettings {
    /// Number of digits in a passcode
    pub length: u32,
    pub ttl_seconds: u64,
    pub resend_cooldown_seconds: u64,
    /// Wrong guesses tolerated before the challenge is purged
    pub max_attempts: u32,
    pub store_timeout_ms: u64,
    pub delivery_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    /// HS256 signing key; must be at least 32 bytes
    pub secret: String,
    pub expires_in_days: i64,
    pub issuer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    pub client_id: Option<String>,
    pub jwks_uri: String,
    /// Clock skew tolerance in seconds (default: 300 = 5 minutes)
    pub clock_skew_seconds: u64,
    /// JWKS cache duration in seconds (default: 3600 = 1 hour)
    pub cache_duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioSettings {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from: Option<String>,
    pub messaging_service_sid: Option<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: Option<String>,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub request_otp_per_hour: u32,
    pub verify_otp_per_window: u32,
    pub verify_window_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: "http://localhost:3000,http://localhost:5173".to_string(),
        }
    }
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            length: 6,
            ttl_seconds: 300,
            resend_cooldown_seconds: 30,
            max_attempts: 5,
            store_timeout_ms: 2_000,
            delivery_timeout_ms: 10_000,
        }
    }
}

impl OtpSettings {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    #[must_use]
    pub fn resend_cooldown(&self) -> Duration {
        Duration::from_secs(self.resend_cooldown_seconds)
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Reject values that would make every request fail
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a passcode length outside
    /// `1..=18`, a zero TTL or a zero attempt cap
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        if self.length == 0 || self.length > MAX_SECRET_LENGTH {
            return Err(invalid(
                "OTP_LENGTH",
                format!("must be between 1 and {MAX_SECRET_LENGTH}, got {}", self.length),
            ));
        }
        if self.ttl_seconds == 0 {
            return Err(invalid("OTP_TTL_SECONDS", "must be positive".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(invalid("OTP_MAX_ATTEMPTS", "must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expires_in_days: 365,
            issuer: "insura-auth".to_string(),
        }
    }
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            jwks_uri: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
            clock_skew_seconds: 300,
            cache_duration_seconds: 3600,
        }
    }
}

impl GoogleSettings {
    /// Client id when Google sign-in is configured
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

impl Default for TwilioSettings {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from: None,
            messaging_service_sid: None,
            api_base_url: "https://api.twilio.com".to_string(),
        }
    }
}

impl TwilioSettings {
    /// Credentials plus either a sender number or a messaging service
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.account_sid)
            && set(&self.auth_token)
            && (set(&self.from) || set(&self.messaging_service_sid))
    }
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            from: None,
            subject: "Your verification code".to_string(),
        }
    }
}

impl EmailSettings {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.api_url) && set(&self.api_key) && set(&self.from)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            request_otp_per_hour: 6,
            verify_otp_per_window: 12,
            verify_window_minutes: 15,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl InsuraSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - Logger initialization fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);

        Self::initialize_logging(&settings.logging)?;
        Ok(settings)
    }

    /// Initialize `env_logger`; `RUST_LOG` wins over the configured level
    fn initialize_logging(logging: &LoggingSettings) -> Result<(), Box<dyn std::error::Error>> {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(logging.level.as_str()),
        )
        .try_init()?;
        Ok(())
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `INSURA_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(&default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("INSURA_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ INSURA_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse one settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn from_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let toml_content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&toml_content)?)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_otp_env_overrides(&mut settings.otp);
        Self::apply_jwt_env_overrides(&mut settings.jwt);
        Self::apply_google_env_overrides(&mut settings.google);
        Self::apply_twilio_env_overrides(&mut settings.twilio);
        Self::apply_email_env_overrides(&mut settings.email);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        Self::apply_numeric_env_override("PORT", &mut app_settings.port);
        if let Ok(cors_origins) = std::env::var("CORS_ORIGINS") {
            app_settings.cors_origins = cors_origins;
        }
    }

    pub fn apply_otp_env_overrides(otp_settings: &mut OtpSettings) {
        Self::apply_numeric_env_override("OTP_LENGTH", &mut otp_settings.length);
        Self::apply_numeric_env_override("OTP_TTL_SECONDS", &mut otp_settings.ttl_seconds);
        Self::apply_numeric_env_override(
            "OTP_RESEND_COOLDOWN_SECONDS",
            &mut otp_settings.resend_cooldown_seconds,
        );
        Self::apply_numeric_env_override("OTP_MAX_ATTEMPTS", &mut otp_settings.max_attempts);
    }

    pub fn apply_jwt_env_overrides(jwt_settings: &mut JwtSettings) {
        if let Some(secret) = Self::non_empty_env("JWT_SECRET") {
            jwt_settings.secret = secret;
        }
        Self::apply_numeric_env_override("JWT_EXPIRES_IN_DAYS", &mut jwt_settings.expires_in_days);
    }

    fn apply_google_env_overrides(google_settings: &mut GoogleSettings) {
        if let Some(client_id) = Self::non_empty_env("GOOGLE_CLIENT_ID") {
            google_settings.client_id = Some(client_id);
        }
    }

    pub fn apply_twilio_env_overrides(twilio_settings: &mut TwilioSettings) {
        Self::apply_optional_env_override("TWILIO_SID", &mut twilio_settings.account_sid);
        Self::apply_optional_env_override("TWILIO_TOKEN", &mut twilio_settings.auth_token);
        Self::apply_optional_env_override("TWILIO_FROM", &mut twilio_settings.from);
        Self::apply_optional_env_override(
            "TWILIO_MESSAGING_SERVICE_SID",
            &mut twilio_settings.messaging_service_sid,
        );
    }

    fn apply_email_env_overrides(email_settings: &mut EmailSettings) {
        Self::apply_optional_env_override("EMAIL_API_URL", &mut email_settings.api_url);
        Self::apply_optional_env_override("EMAIL_API_KEY", &mut email_settings.api_key);
        Self::apply_optional_env_override("EMAIL_FROM", &mut email_settings.from);
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Parse a numeric variable; unparsable values are ignored
    fn apply_numeric_env_override<T: std::str::FromStr>(env_var: &str, target: &mut T) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.trim().parse::<T>() {
                *target = value;
            }
        }
    }

    fn apply_optional_env_override(env_var: &str, target: &mut Option<String>) {
        if let Some(value) = Self::non_empty_env(env_var) {
            *target = Some(value);
        }
    }

    fn non_empty_env(env_var: &str) -> Option<String> {
        std::env::var(env_var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim().trim_matches('"'));
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        self.application
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clean_env_vars() {
        for var in [
            "OTP_LENGTH",
            "OTP_TTL_SECONDS",
            "OTP_RESEND_COOLDOWN_SECONDS",
            "OTP_MAX_ATTEMPTS",
            "JWT_SECRET",
            "JWT_EXPIRES_IN_DAYS",
            "TWILIO_SID",
            "TWILIO_TOKEN",
            "TWILIO_FROM",
            "TWILIO_MESSAGING_SERVICE_SID",
            "INSURA_SECRETS_DIR",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_otp_defaults() {
        let otp = OtpSettings::default();
        assert_eq!(otp.length, 6);
        assert_eq!(otp.ttl(), Duration::from_secs(300));
        assert_eq!(otp.resend_cooldown(), Duration::from_secs(30));
        assert_eq!(otp.max_attempts, 5);
    }

    #[test]
    fn test_otp_validation() {
        assert!(OtpSettings::default().validate().is_ok());

        for length in [0, 19] {
            let otp = OtpSettings {
                length,
                ..OtpSettings::default()
            };
            assert!(matches!(
                otp.validate(),
                Err(ConfigError::InvalidValue { ref key, .. }) if key == "OTP_LENGTH"
            ));
        }
        let otp = OtpSettings {
            length: 18,
            ..OtpSettings::default()
        };
        assert!(otp.validate().is_ok());

        let otp = OtpSettings {
            max_attempts: 0,
            ..OtpSettings::default()
        };
        assert!(otp.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_otp_env_overrides() {
        clean_env_vars();

        let mut otp = OtpSettings::default();
        std::env::set_var("OTP_TTL_SECONDS", "120");
        std::env::set_var("OTP_MAX_ATTEMPTS", "3");
        std::env::set_var("OTP_LENGTH", "not-a-number");

        InsuraSettings::apply_otp_env_overrides(&mut otp);

        assert_eq!(otp.ttl_seconds, 120);
        assert_eq!(otp.max_attempts, 3);
        // invalid values are ignored
        assert_eq!(otp.length, 6);

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_jwt_env_override() {
        clean_env_vars();

        let mut jwt = JwtSettings::default();
        std::env::set_var("JWT_SECRET", "env-secret-that-is-at-least-32-bytes");
        std::env::set_var("JWT_EXPIRES_IN_DAYS", "30");

        InsuraSettings::apply_jwt_env_overrides(&mut jwt);

        assert_eq!(jwt.secret, "env-secret-that-is-at-least-32-bytes");
        assert_eq!(jwt.expires_in_days, 30);

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_twilio_configuration_detection() {
        clean_env_vars();

        let mut twilio = TwilioSettings::default();
        assert!(!twilio.is_configured());

        std::env::set_var("TWILIO_SID", "AC123");
        std::env::set_var("TWILIO_TOKEN", "token");
        InsuraSettings::apply_twilio_env_overrides(&mut twilio);
        // still no sender
        assert!(!twilio.is_configured());

        std::env::set_var("TWILIO_MESSAGING_SERVICE_SID", "MG123");
        InsuraSettings::apply_twilio_env_overrides(&mut twilio);
        assert!(twilio.is_configured());

        clean_env_vars();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[otp]\nttl_seconds = 600\n\n[jwt]\nsecret = \"file-secret-file-secret-file-secret\"\n"
        )
        .unwrap();

        let settings = InsuraSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.otp.ttl_seconds, 600);
        assert_eq!(settings.otp.resend_cooldown_seconds, 30);
        assert_eq!(settings.jwt.expires_in_days, 365);
        assert_eq!(settings.application.port, 8080);
    }

    #[test]
    #[serial]
    fn test_secrets_dir_overrides_base_settings() {
        clean_env_vars();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Settings.toml"),
            "[application]\nport = 9090\n",
        )
        .unwrap();
        std::env::set_var("INSURA_SECRETS_DIR", dir.path());

        let settings = InsuraSettings::load_base_settings().unwrap();
        assert_eq!(settings.application.port, 9090);

        clean_env_vars();
    }

    #[test]
    fn test_cors_origins_parsing() {
        let mut settings = InsuraSettings::default();
        settings.application.cors_origins = " https://a.example , ,https://b.example".to_string();
        assert_eq!(
            settings.get_cors_origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
