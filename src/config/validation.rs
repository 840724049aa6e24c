use crate::config::types::{
    Config, CrawlerConfig, IndexConfig, OutputConfig, QualityConfig, SeedConfig, SourceConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_source_config(&config.source)?;
    validate_seed_config(&config.seeds)?;
    validate_quality_config(&config.quality)?;
    validate_index_config(&config.index)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
///
/// Also called by the crawler itself, so hand-built configurations are held
/// to the same limits as parsed ones.
pub fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.article_quota < 1 {
        return Err(ConfigError::Validation(
            "article_quota must be >= 1".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch_size must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_queue < 1 {
        return Err(ConfigError::Validation(
            "max_queue must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name: non-empty, alphanumeric + hyphens only
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

fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("rest_base_url", &config.rest_base_url),
        ("action_base_url", &config.action_base_url),
    ] {
        let url = Url::parse(value)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "{} must use http or https, got '{}'",
                name, value
            )));
        }
    }

    Ok(())
}

fn validate_seed_config(config: &SeedConfig) -> Result<(), ConfigError> {
    if config.titles.is_empty() && config.categories.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed title or category is required".to_string(),
        ));
    }

    for category in &config.categories {
        if !category.starts_with("Category:") {
            return Err(ConfigError::Validation(format!(
                "Seed category '{}' must start with 'Category:'",
                category
            )));
        }
    }

    if config.titles.iter().any(|t| t.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "seed titles cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_quality_config(config: &QualityConfig) -> Result<(), ConfigError> {
    if config.summary_max_chars < config.min_summary_chars {
        return Err(ConfigError::Validation(format!(
            "summary_max_chars ({}) must be >= min_summary_chars ({})",
            config.summary_max_chars, config.min_summary_chars
        )));
    }

    Ok(())
}

fn validate_index_config(config: &IndexConfig) -> Result<(), ConfigError> {
    if config.max_features < 1 {
        return Err(ConfigError::Validation(
            "max_features must be >= 1".to_string(),
        ));
    }

    if config.ngram_min < 1 || config.ngram_min > config.ngram_max {
        return Err(ConfigError::Validation(format!(
            "ngram range must satisfy 1 <= ngram_min <= ngram_max, got ({}, {})",
            config.ngram_min, config.ngram_max
        )));
    }

    if !(config.max_df > 0.0 && config.max_df <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "max_df must be in (0, 1], got {}",
            config.max_df
        )));
    }

    if config.min_search_score < 0.0 || config.min_related_score < 0.0 {
        return Err(ConfigError::Validation(
            "score floors cannot be negative".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
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

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
