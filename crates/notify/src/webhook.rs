//! Generic HTTP webhook notifier.
//!
//! Delivers notifications as JSON payloads to a configured webhook URL
//! with optional custom headers. Environment variable references
//! (`${VAR_NAME}`) in the URL and header values are resolved at
//! construction time.

use std::collections::HashMap;

use crate::traits::{Notification, Notifier, NotifyError};

/// Delivers notifications as JSON over HTTP POST to a configured endpoint.
#[derive(Debug)]
pub struct WebhookNotifier {
    /// Target URL (env vars already resolved).
    url: String,
    /// Custom headers to include on every request.
    headers: HashMap<String, String>,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a new webhook notifier. Missing env vars referenced by the
    /// URL or header values produce a [`NotifyError::Config`] error.
    pub fn new(url: String, headers: HashMap<String, String>) -> Result<Self, NotifyError> {
        let resolved_url = resolve_env_vars(&url)?;

        let mut resolved_headers = HashMap::with_capacity(headers.len());
        for (key, value) in &headers {
            resolved_headers.insert(key.clone(), resolve_env_vars(value)?);
        }

        Ok(Self {
            url: resolved_url,
            headers: resolved_headers,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(notification);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        response.error_for_status()?;
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Resolve `${VAR_NAME}` references against the process environment.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            NotifyError::Config(format!("unterminated env reference in '{}'", input))
        })?;
        let var = &after[..end];
        let value = std::env::var(var)
            .map_err(|_| NotifyError::Config(format!("env var '{}' is not set", var)))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_strings_pass_through() {
        assert_eq!(
            resolve_env_vars("https://hooks.example.org/x").unwrap(),
            "https://hooks.example.org/x"
        );
    }

    #[test]
    fn env_reference_resolved() {
        std::env::set_var("KASANE_TEST_TOKEN", "s3cret");
        assert_eq!(
            resolve_env_vars("Bearer ${KASANE_TEST_TOKEN}").unwrap(),
            "Bearer s3cret"
        );
    }

    #[test]
    fn missing_env_is_config_error() {
        let err = resolve_env_vars("${KASANE_DEFINITELY_UNSET_VAR}").unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
    }

    #[test]
    fn unterminated_reference_is_config_error() {
        let err = resolve_env_vars("${OOPS").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }
}
