/// Configuration management for Track Time
use crate::error::{AppError, AppResult};
use chrono::FixedOffset;
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub email: Option<EmailConfig>,
    pub notifier: Option<NotifierConfig>,
    pub weather: Option<WeatherConfig>,
    /// Fixed UTC offset all calendar-day logic is evaluated in
    pub timezone: FixedOffset,
}

/// Service-level configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public base URL used in email links
    pub public_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication windows and limits
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Session lifetime in hours
    pub session_hours: i64,
    /// OTP lifetime in minutes
    pub otp_ttl_minutes: i64,
    /// Maximum simultaneously approved + pending registrations
    pub registration_cap: i64,
}

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Push notification (ntfy) configuration
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub endpoint: String,
    pub token: String,
    /// URL opened when the notification is tapped
    pub click_url: String,
}

/// Weather provider configuration
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    pub latitude: String,
    pub longitude: String,
    /// Cache bucket width in minutes
    pub cache_minutes: i64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("TRACKTIME_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("TRACKTIME_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("TRACKTIME_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));
        let version = env::var("TRACKTIME_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("TRACKTIME_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("TRACKTIME_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("tracktime.sqlite"));

        let session_hours = env::var("TRACKTIME_SESSION_HOURS")
            .unwrap_or_else(|_| "24".to_string())
            .parse()
            .unwrap_or(24);
        let otp_ttl_minutes = env::var("TRACKTIME_OTP_TTL_MINUTES")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let registration_cap = env::var("TRACKTIME_REGISTRATION_CAP")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let email = if let Ok(smtp_url) = env::var("TRACKTIME_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("TRACKTIME_EMAIL_FROM")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let notifier = match (env::var("TRACKTIME_NTFY_ENDPOINT"), env::var("TRACKTIME_NTFY_TOKEN")) {
            (Ok(endpoint), Ok(token)) => Some(NotifierConfig {
                endpoint,
                token,
                click_url: env::var("TRACKTIME_NTFY_CLICK_URL")
                    .unwrap_or_else(|_| public_url.clone()),
            }),
            _ => None,
        };

        let weather = if let Ok(api_key) = env::var("TRACKTIME_WEATHER_API_KEY") {
            Some(WeatherConfig {
                api_key,
                latitude: env::var("TRACKTIME_LOCATION_LAT")
                    .map_err(|_| AppError::Validation("Weather latitude required".to_string()))?,
                longitude: env::var("TRACKTIME_LOCATION_LON")
                    .map_err(|_| AppError::Validation("Weather longitude required".to_string()))?,
                cache_minutes: env::var("TRACKTIME_WEATHER_CACHE_MINUTES")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .unwrap_or(15),
            })
        } else {
            None
        };

        let timezone = parse_utc_offset(
            &env::var("TRACKTIME_UTC_OFFSET").unwrap_or_else(|_| "+10:00".to_string()),
        )?;

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            auth: AuthConfig {
                session_hours,
                otp_ttl_minutes,
                registration_cap,
            },
            email,
            notifier,
            weather,
            timezone,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.auth.otp_ttl_minutes <= 0 {
            return Err(AppError::Validation(
                "OTP lifetime must be positive".to_string(),
            ));
        }

        if self.auth.registration_cap <= 0 {
            return Err(AppError::Validation(
                "Registration cap must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a "+10:00" / "-05:30" style UTC offset
fn parse_utc_offset(raw: &str) -> AppResult<FixedOffset> {
    let err = || AppError::Validation(format!("Invalid UTC offset: {}", raw));

    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1i32, &raw[1..]),
        Some(b'-') => (-1i32, &raw[1..]),
        _ => return Err(err()),
    };

    let (hours, minutes) = rest.split_once(':').ok_or_else(err)?;
    let hours: i32 = hours.parse().map_err(|_| err())?;
    let minutes: i32 = minutes.parse().map_err(|_| err())?;
    if hours > 23 || minutes > 59 {
        return Err(err());
    }

    let seconds = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(seconds).ok_or_else(err)
}
