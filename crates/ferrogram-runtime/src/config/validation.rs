//! Configuration validation utilities.

use ferrogram_core::{MAX_UPDATES_LIMIT, MAX_WEBHOOK_CONNECTIONS, validate_secret_token};
use ferrogram_framework::DispatcherConfig;
use ferrogram_transport::{HttpApiConfig, PollingConfig, WebhookConfig};

use super::error::{ConfigError, ConfigResult};
use super::schema::{FerrogramConfig, LogOutput, LoggingConfig, Mode, RuntimeConfig};

/// Validates the entire configuration.
///
/// The webhook section is only checked in webhook mode.
pub fn validate_config(config: &FerrogramConfig) -> ConfigResult<()> {
    validate_bot_config(&config.bot)?;
    validate_dispatcher_config(&config.dispatcher)?;
    validate_runtime_config(&config.runtime, &config.dispatcher)?;
    validate_polling_config(&config.polling)?;
    if config.mode == Mode::Webhook {
        validate_webhook_config(&config.webhook)?;
    }
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_bot_config(bot: &HttpApiConfig) -> ConfigResult<()> {
    if bot.token.is_empty() {
        return Err(ConfigError::missing_field("bot.token"));
    }
    validate_url(&bot.api_url, &["http://", "https://"])?;
    if bot.request_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "bot.request_timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_dispatcher_config(dispatcher: &DispatcherConfig) -> ConfigResult<()> {
    if dispatcher.queue_capacity == 0 {
        return Err(ConfigError::validation(
            "dispatcher.queue_capacity must be greater than 0",
        ));
    }
    if dispatcher.max_concurrent_handlers == 0 {
        return Err(ConfigError::validation(
            "dispatcher.max_concurrent_handlers must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_runtime_config(
    runtime: &RuntimeConfig,
    dispatcher: &DispatcherConfig,
) -> ConfigResult<()> {
    if runtime.shutdown_grace() < dispatcher.drain_timeout() {
        return Err(ConfigError::validation(format!(
            "runtime.shutdown_grace_ms ({}) must not be shorter than dispatcher.drain_timeout_secs ({}s)",
            runtime.shutdown_grace_ms, dispatcher.drain_timeout_secs
        )));
    }
    Ok(())
}

fn validate_polling_config(polling: &PollingConfig) -> ConfigResult<()> {
    if let Some(limit) = polling.limit
        && !(1..=MAX_UPDATES_LIMIT).contains(&limit)
    {
        return Err(ConfigError::validation(format!(
            "polling.limit must be between 1 and {MAX_UPDATES_LIMIT}, got {limit}"
        )));
    }
    Ok(())
}

/// Validates the webhook section, independently of the configured mode.
pub fn validate_webhook_config(webhook: &WebhookConfig) -> ConfigResult<()> {
    if webhook.url.is_empty() {
        return Err(ConfigError::missing_field("webhook.url"));
    }
    validate_url(&webhook.url, &["https://"])?;
    if webhook.port == 0 {
        return Err(ConfigError::InvalidPort(webhook.port));
    }
    if let Some(max) = webhook.max_connections
        && !(1..=MAX_WEBHOOK_CONNECTIONS).contains(&max)
    {
        return Err(ConfigError::validation(format!(
            "webhook.max_connections must be between 1 and {MAX_WEBHOOK_CONNECTIONS}, got {max}"
        )));
    }
    if let Some(token) = &webhook.secret_token {
        validate_secret_token(token).map_err(|e| ConfigError::validation(e.to_string()))?;
    }
    if webhook.max_body_size == 0 {
        return Err(ConfigError::validation(
            "webhook.max_body_size must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_url(url: &str, schemes: &[&str]) -> ConfigResult<()> {
    if !schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {schemes:?}"),
        ));
    }
    Ok(())
}
