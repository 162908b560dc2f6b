/// Application context and dependency injection
use crate::{
    account::AccountManager,
    checkin::CheckInManager,
    config::ServerConfig,
    db,
    error::AppResult,
    mailer::Mailer,
    notifier::Notifier,
    otp::{OtpAuthenticator, PendingRegistrations},
    weather::WeatherService,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountManager>,
    pub checkins: Arc<CheckInManager>,
    pub otp: Arc<OtpAuthenticator>,
    pub pending_registrations: Arc<PendingRegistrations>,
    pub mailer: Arc<Mailer>,
    pub notifier: Arc<Notifier>,
    pub weather: Arc<WeatherService>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create the data directory if it doesn't exist
        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory).await?;
        }

        // Initialize database
        let pool =
            db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let config = Arc::new(config);

        let accounts = Arc::new(AccountManager::new(pool.clone(), Arc::clone(&config)));
        let checkins = Arc::new(CheckInManager::new(pool.clone(), Arc::clone(&config)));
        let otp = Arc::new(OtpAuthenticator::new(
            pool.clone(),
            config.auth.otp_ttl_minutes,
        ));
        let pending_registrations =
            Arc::new(PendingRegistrations::new(config.auth.otp_ttl_minutes));

        let mailer = Arc::new(Mailer::new(config.email.clone())?);
        let notifier = Arc::new(Notifier::new(config.notifier.clone()));
        let weather = Arc::new(WeatherService::new(Arc::clone(&config)));

        if !mailer.is_configured() {
            tracing::warn!("SMTP not configured; emails will be skipped");
        }
        if !notifier.is_configured() {
            tracing::warn!("Push notifier not configured; notifications will be skipped");
        }

        Ok(Self {
            config,
            db: pool,
            accounts,
            checkins,
            otp,
            pending_registrations,
            mailer,
            notifier,
            weather,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        self.config.service.public_url.clone()
    }
}
