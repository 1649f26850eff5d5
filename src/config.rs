use config::{Config, ConfigError, Environment, File};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "CAD";
const DEFAULT_FREE_SHIPPING_THRESHOLD: f64 = 75.0;
const DEFAULT_SHIPPING_FLAT_FEE: f64 = 9.99;

/// Shipping policy configuration.
///
/// The free-shipping threshold is a single deployment-level decision. Earlier
/// storefront builds disagreed on the cutoff (75 in checkout, 150 in a promo
/// banner); this knob is the one place the value lives now.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ShippingConfig {
    /// Subtotal at or above which shipping is free
    #[serde(default = "default_free_shipping_threshold")]
    #[validate(custom = "validate_money_amount")]
    pub free_shipping_threshold: f64,

    /// Flat fee charged below the threshold
    #[serde(default = "default_shipping_flat_fee")]
    #[validate(custom = "validate_money_amount")]
    pub flat_fee: f64,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            free_shipping_threshold: default_free_shipping_threshold(),
            flat_fee: default_shipping_flat_fee(),
        }
    }
}

/// Tax policy configuration.
///
/// Rates are keyed by region: `"CA-ON"` for country-and-subdivision, `"CA"`
/// for a whole country. Lookup falls back from the specific key to the
/// country key to `default_rate`. Tax is charged on the undiscounted
/// subtotal; changing that base is a product decision, not a config one.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TaxConfig {
    /// Rate applied when no region entry matches (decimal, e.g. 0.13 for 13%)
    #[serde(default)]
    #[validate(custom = "validate_tax_rate")]
    pub default_rate: f64,

    /// Per-region rate table
    #[serde(default)]
    #[validate(custom = "validate_rate_table")]
    pub rates: HashMap<String, f64>,
}

/// Payment gateway connection settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    /// Base URL of the payment confirmation service
    #[serde(default = "default_payment_base_url")]
    pub base_url: String,

    /// API key presented to the payment service
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout for confirmation calls (seconds)
    #[serde(default = "default_payment_timeout_secs")]
    pub confirm_timeout_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            base_url: default_payment_base_url(),
            api_key: None,
            confirm_timeout_secs: default_payment_timeout_secs(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default = "default_false_bool")]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Currency code for the deployment; all prices are in this currency
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub currency: String,

    /// Days before an untouched cart expires
    #[serde(default = "default_cart_expiry_days")]
    pub cart_expiry_days: i64,

    /// Default page size for paginated API responses
    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u32,

    /// Maximum page size allowed for paginated API responses
    #[serde(default = "default_api_max_page_size")]
    pub api_max_page_size: u32,

    /// Shipping policy
    #[serde(default)]
    #[validate]
    pub shipping: ShippingConfig,

    /// Tax policy
    #[serde(default)]
    #[validate]
    pub tax: TaxConfig,

    /// Payment gateway settings
    #[serde(default)]
    #[validate]
    pub payment: PaymentConfig,
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Creates a configuration with defaults for everything but the basics.
    /// Primarily used by tests and tools; servers load via [`load_config`].
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            currency: default_currency(),
            cart_expiry_days: default_cart_expiry_days(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
            shipping: ShippingConfig::default(),
            tax: TaxConfig::default(),
            payment: PaymentConfig::default(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Free-shipping threshold as an exact decimal
    pub fn free_shipping_threshold(&self) -> Decimal {
        Decimal::from_f64(self.shipping.free_shipping_threshold).unwrap_or(Decimal::ZERO)
    }

    /// Flat shipping fee as an exact decimal.
    ///
    /// `from_f64` rather than `from_f64_retain`: a configured 9.99 must
    /// come out as exactly 9.99, not the binary expansion underneath it.
    pub fn shipping_flat_fee(&self) -> Decimal {
        Decimal::from_f64(self.shipping.flat_fee).unwrap_or(Decimal::ZERO)
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if self.is_production()
            && self
                .payment
                .api_key
                .as_deref()
                .map(str::trim)
                .map_or(true, str::is_empty)
        {
            let mut err = ValidationError::new("payment_api_key_required");
            err.message = Some(
                "Production deployments must set APP__PAYMENT__API_KEY; orders cannot be charged without gateway credentials".into(),
            );
            errors.add("payment.api_key", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_false_bool() -> bool {
    false
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_cart_expiry_days() -> i64 {
    30
}

fn default_api_page_size() -> u32 {
    20
}

fn default_api_max_page_size() -> u32 {
    100
}

fn default_free_shipping_threshold() -> f64 {
    DEFAULT_FREE_SHIPPING_THRESHOLD
}

fn default_shipping_flat_fee() -> f64 {
    DEFAULT_SHIPPING_FLAT_FEE
}

fn default_payment_base_url() -> String {
    "http://localhost:9920".to_string()
}

fn default_payment_timeout_secs() -> u64 {
    30
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || rate < 0.0 || rate > 1.0 {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("tax rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_rate_table(rates: &HashMap<String, f64>) -> Result<(), ValidationError> {
    for (region, rate) in rates {
        if validate_tax_rate(*rate).is_err() {
            let mut err = ValidationError::new("tax_rates");
            err.message =
                Some(format!("tax rate for region '{}' must be between 0.0 and 1.0", region).into());
            return Err(err);
        }
    }
    Ok(())
}

fn validate_money_amount(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() || amount < 0.0 {
        let mut err = ValidationError::new("money_amount");
        err.message = Some("monetary amounts must be finite and non-negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_currency(code: &str) -> Result<(), ValidationError> {
    let trimmed = code.trim();
    if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_uppercase()) {
        let mut err = ValidationError::new("currency");
        err.message = Some("currency must be a three-letter uppercase ISO code".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Docker config (config/docker.toml) if DOCKER env var is set
/// 4. Environment variables (APP_*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    if env::var("DOCKER").is_ok() {
        info!("Docker environment detected");
        builder =
            builder.add_source(File::with_name(&format!("{}/docker", CONFIG_DIR)).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod constraint_tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite://storefront.db?mode=memory".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let mut cfg = base_config();
        cfg.payment.api_key = Some("sk_live_abc".into());
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_allows_override_flag() {
        let mut cfg = base_config();
        cfg.payment.api_key = Some("sk_live_abc".into());
        cfg.cors_allow_any_origin = true;
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.payment.api_key = Some("sk_live_abc".into());
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn production_requires_payment_api_key() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        cfg.payment.api_key = None;
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.payment.api_key = Some("   ".into());
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.payment.api_key = Some("sk_live_abc".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn tax_rates_must_be_fractions() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.tax.rates.insert("CA-ON".into(), 0.13);
        assert!(cfg.validate().is_ok());

        cfg.tax.rates.insert("CA-QC".into(), 14.975);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn currency_must_be_three_uppercase_letters() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.currency = "CAD".into();
        assert!(cfg.validate().is_ok());

        cfg.currency = "cad".into();
        assert!(cfg.validate().is_err());

        cfg.currency = "CADX".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn shipping_values_convert_to_exact_decimals() {
        let cfg = base_config();
        assert_eq!(cfg.free_shipping_threshold(), dec!(75));
        assert_eq!(cfg.shipping_flat_fee(), dec!(9.99));
    }

    #[test]
    fn negative_shipping_fee_rejected() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.shipping.flat_fee = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_tax_rate_must_be_a_fraction() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.tax.default_rate = 0.05;
        assert!(cfg.validate().is_ok());

        cfg.tax.default_rate = 5.0;
        assert!(cfg.validate().is_err());

        cfg.tax.default_rate = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn event_channel_capacity_must_be_positive() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.event_channel_capacity = 0;
        assert!(cfg.validate().is_err());

        cfg.event_channel_capacity = 1;
        assert!(cfg.validate().is_ok());
    }
}
