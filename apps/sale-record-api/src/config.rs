//! Service configuration module.
//!
//! Configuration is layered: built-in defaults, then an optional
//! `config/{APP_ENV}.toml`, then environment variables prefixed with
//! `SALE_RECORD__` (`__` separates nested keys, e.g.
//! `SALE_RECORD__SERVICES__PRODUCT_API`).

use std::env;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use salerecord_core::query::QuerySettings;
use salerecord_db::DbConfig;

use crate::reconcile::ReconcileSettings;

/// Base URLs of the lookup services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    /// Item-by-code lookup.
    pub product_api: String,
    pub membership_addr: String,
    pub coupon_addr: String,
    /// Store and sku lookups.
    pub place_management_addr: String,
    pub payamt_api: String,
}

/// Sale record service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub app_env: String,

    /// HTTP server port
    pub http_port: u16,

    /// SQLite database file
    pub database_path: String,
    pub db_max_connections: u32,

    /// Redis connection string. Without it events are neither consumed nor
    /// published to a real broker.
    pub redis_url: Option<String>,

    pub order_event_channel: String,
    pub sale_record_channel: String,
    pub sale_fail_channel: String,

    pub services: ServiceEndpoints,

    /// Per-request timeout for lookups, in seconds
    pub lookup_timeout_secs: u64,

    pub publish_queue_capacity: usize,
    pub consumer_max_in_flight: usize,

    /// Tenant used for dedup keys when a payload carries none
    pub default_tenant_code: String,

    /// Recompute cart offer shares instead of trusting the payload
    pub redistribute_cart_offers: bool,

    /// Maximum query window, in days
    pub query_term_days: i64,
    pub business_utc_offset_hours: i64,
}

impl ServiceConfig {
    /// Load configuration from defaults, the environment file and
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let settings = Self::defaults(Config::builder())?
            .set_override("app_env", app_env.clone())?
            .add_source(File::with_name(&format!("config/{app_env}")).required(false))
            .add_source(
                Environment::with_prefix("SALE_RECORD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServiceConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(builder
            .set_default("service_name", "sale-record-api")?
            .set_default("app_env", "development")?
            .set_default("http_port", 8000)?
            .set_default("database_path", "data/sale-record.db")?
            .set_default("db_max_connections", 5)?
            .set_default("order_event_channel", "order")?
            .set_default("sale_record_channel", "sale-record")?
            .set_default("sale_fail_channel", "sale-record-fail")?
            .set_default("services.product_api", "http://localhost:8001")?
            .set_default("services.membership_addr", "http://localhost:8002")?
            .set_default("services.coupon_addr", "http://localhost:8003")?
            .set_default("services.place_management_addr", "http://localhost:8004")?
            .set_default("services.payamt_api", "http://localhost:8005")?
            .set_default("lookup_timeout_secs", 10)?
            .set_default("publish_queue_capacity", 1024)?
            .set_default("consumer_max_in_flight", 16)?
            .set_default("default_tenant_code", salerecord_core::DEFAULT_TENANT_CODE)?
            .set_default("redistribute_cart_offers", false)?
            .set_default("query_term_days", 31)?
            .set_default("business_utc_offset_hours", 8)?)
    }

    /// Rejects values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_port == 0 {
            return Err(ConfigError::InvalidValue("http_port".to_string()));
        }
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::MissingRequired("database_path".to_string()));
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("db_max_connections".to_string()));
        }
        if self.publish_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("publish_queue_capacity".to_string()));
        }
        if self.consumer_max_in_flight == 0 {
            return Err(ConfigError::InvalidValue("consumer_max_in_flight".to_string()));
        }
        if self.lookup_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("lookup_timeout_secs".to_string()));
        }
        if self.query_term_days <= 0 {
            return Err(ConfigError::InvalidValue("query_term_days".to_string()));
        }
        if !(-12..=14).contains(&self.business_utc_offset_hours) {
            return Err(ConfigError::InvalidValue("business_utc_offset_hours".to_string()));
        }
        if self.default_tenant_code.is_empty() {
            return Err(ConfigError::MissingRequired("default_tenant_code".to_string()));
        }

        let channels = [
            ("order_event_channel", &self.order_event_channel),
            ("sale_record_channel", &self.sale_record_channel),
            ("sale_fail_channel", &self.sale_fail_channel),
        ];
        for (key, value) in channels {
            if value.is_empty() {
                return Err(ConfigError::MissingRequired(key.to_string()));
            }
        }

        let services = [
            ("services.product_api", &self.services.product_api),
            ("services.membership_addr", &self.services.membership_addr),
            ("services.coupon_addr", &self.services.coupon_addr),
            ("services.place_management_addr", &self.services.place_management_addr),
            ("services.payamt_api", &self.services.payamt_api),
        ];
        for (key, value) in services {
            if value.is_empty() {
                return Err(ConfigError::MissingRequired(key.to_string()));
            }
        }

        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.db_max_connections)
    }

    pub fn query_settings(&self) -> QuerySettings {
        QuerySettings {
            term_days: self.query_term_days,
            utc_offset_hours: self.business_utc_offset_hours,
        }
    }

    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            default_tenant_code: self.default_tenant_code.clone(),
            redistribute_cart_offers: self.redistribute_cart_offers,
        }
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.http_port)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
}
