use crate::config::types::{Config, CrawlConfig, ScopeConfig, StorageConfig, MAX_SETTING_SECS};
use crate::ConfigError;
use regex::{Regex, RegexBuilder};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_scope_config(&config.scope)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Compiles scope patterns case-insensitively
///
/// Patterns are matched with search semantics, so `/login` rejects any URL
/// containing that segment.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
        })
        .collect()
}

/// Validates crawl behavior configuration
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in &config.seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1".to_string(),
        ));
    }

    if config.max_pages_per_domain < 1 {
        return Err(ConfigError::Validation(
            "max_pages_per_domain must be >= 1".to_string(),
        ));
    }

    if !config.request_timeout_sec.is_finite() || config.request_timeout_sec <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_sec must be a positive number, got {}",
            config.request_timeout_sec
        )));
    }

    validate_seconds("request_timeout_sec", config.request_timeout_sec)?;
    validate_seconds("delay_between_requests_sec", config.delay_between_requests_sec)?;
    validate_seconds("inter_request_delay_sec", config.inter_request_delay_sec)?;
    validate_seconds("backoff_factor_sec", config.backoff_factor_sec)?;

    if let Some(limit) = config.max_run_time_sec {
        if !limit.is_finite() || limit <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "max_run_time_sec must be a positive number, got {}",
                limit
            )));
        }
        validate_seconds("max_run_time_sec", limit)?;
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.user_agent.chars().any(|c| c.is_control()) {
        return Err(ConfigError::Validation(
            "user_agent cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Seconds-valued settings must lie in `0..=MAX_SETTING_SECS`
fn validate_seconds(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be >= 0, got {}",
            name, value
        )));
    }
    if value > MAX_SETTING_SECS {
        return Err(ConfigError::Validation(format!(
            "{} must be <= {}, got {}",
            name, MAX_SETTING_SECS, value
        )));
    }
    Ok(())
}

/// Validates scope configuration
fn validate_scope_config(config: &ScopeConfig) -> Result<(), ConfigError> {
    for domain in &config.external_sites_whitelist {
        validate_domain_string(domain.strip_prefix("*.").unwrap_or(domain))?;
    }

    compile_patterns(&config.url_patterns_exclude)?;
    compile_patterns(&config.url_patterns_include)?;

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "storage root cannot be empty".to_string(),
        ));
    }

    for ext in &config.image_extensions {
        if !ext.starts_with('.') || ext.len() < 2 {
            return Err(ConfigError::Validation(format!(
                "image extension '{}' must start with '.'",
                ext
            )));
        }
    }

    Ok(())
}

/// Validates a whitelisted domain string
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
