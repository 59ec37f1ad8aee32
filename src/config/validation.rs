use crate::config::types::{
    Config, CrawlerConfig, RegistryConfig, SeedEntry, ThrottleConfig, UserAgentConfig,
};
use crate::url::normalize_url;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_throttle_config(&config.throttle)?;
    validate_registry_config(&config.registry)?;
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates throttle configuration
fn validate_throttle_config(config: &ThrottleConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 1000 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 1000, got {}",
            config.max_concurrent
        )));
    }

    if config.interval_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "interval_ms must be >= 1ms, got {}ms",
            config.interval_ms
        )));
    }

    if config.partition_idle_timeout_secs == Some(0) {
        return Err(ConfigError::Validation(
            "partition_idle_timeout_secs must be >= 1 when set".to_string(),
        ));
    }

    if config.sweep_period_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "sweep_period_secs must be >= 1, got {}",
            config.sweep_period_secs
        )));
    }

    Ok(())
}

/// Validates registry configuration
fn validate_registry_config(config: &RegistryConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    // max_depth >= 0 is always true for u32, so no check needed

    if config.max_concurrent_runs < 1 || config.max_concurrent_runs > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_runs must be between 1 and 100, got {}",
            config.max_concurrent_runs
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates seed entries
///
/// Seeds must be HTTP(S) URLs that survive normalization.
fn validate_seeds(seeds: &[SeedEntry]) -> Result<(), ConfigError> {
    for seed in seeds {
        normalize_url(&seed.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed.url, e))
        })?;
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let (local, domain) = email.split_once('@').ok_or_else(|| {
        ConfigError::Validation(format!("Invalid email format: '{}'", email))
    })?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::PageKind;

    fn throttle() -> ThrottleConfig {
        ThrottleConfig {
            max_concurrent: 4,
            max_queued: 10,
            interval_ms: 1000,
            partition_idle_timeout_secs: None,
            sweep_period_secs: 10,
        }
    }

    fn seed(url: &str) -> SeedEntry {
        SeedEntry {
            url: url.to_string(),
            kind: PageKind::Site,
        }
    }

    #[test]
    fn test_validate_throttle_config() {
        assert!(validate_throttle_config(&throttle()).is_ok());

        let too_many = ThrottleConfig {
            max_concurrent: 1001,
            ..throttle()
        };
        assert!(validate_throttle_config(&too_many).is_err());

        let zero_interval = ThrottleConfig {
            interval_ms: 0,
            ..throttle()
        };
        assert!(validate_throttle_config(&zero_interval).is_err());

        let zero_timeout = ThrottleConfig {
            partition_idle_timeout_secs: Some(0),
            ..throttle()
        };
        assert!(validate_throttle_config(&zero_timeout).is_err());

        let zero_queue = ThrottleConfig {
            max_queued: 0,
            ..throttle()
        };
        assert!(validate_throttle_config(&zero_queue).is_ok());
    }

    #[test]
    fn test_validate_registry_config() {
        assert!(validate_registry_config(&RegistryConfig::default()).is_ok());
        assert!(validate_registry_config(&RegistryConfig { max_retries: 0 }).is_err());
    }

    #[test]
    fn test_validate_crawler_config() {
        let config = CrawlerConfig {
            max_depth: 0,
            max_concurrent_runs: 1,
            follow_external: false,
        };
        assert!(validate_crawler_config(&config).is_ok());

        let config = CrawlerConfig {
            max_concurrent_runs: 0,
            ..config
        };
        assert!(validate_crawler_config(&config).is_err());
    }

    #[test]
    fn test_validate_seeds() {
        assert!(validate_seeds(&[seed("https://example.com/"), seed("http://localhost:8080/")]).is_ok());

        assert!(matches!(
            validate_seeds(&[seed("ftp://example.com/")]),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(validate_seeds(&[seed("not a url")]).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
        assert!(validate_email("a@b@example.com").is_err());
    }
}
