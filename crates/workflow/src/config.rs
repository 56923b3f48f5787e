//! Workflow configuration loaded from environment variables.

use crate::allocator::RetryPolicy;

/// Configuration for the permit service.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// HMAC-SHA256 secret for QR credential signing and verification.
    /// Server-held; never embedded in tokens.
    pub credential_secret: String,
    /// Retry policy for transient sequence-allocation conflicts.
    pub retry: RetryPolicy,
}

impl WorkflowConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                  | Required | Default |
    /// |--------------------------|----------|---------|
    /// | `CREDENTIAL_SECRET`      | **yes**  | --      |
    /// | `ALLOC_MAX_ATTEMPTS`     | no       | `5`     |
    /// | `ALLOC_BASE_DELAY_MS`    | no       | `25`    |
    /// | `ALLOC_MAX_DELAY_MS`     | no       | `1000`  |
    ///
    /// # Panics
    ///
    /// Panics if `CREDENTIAL_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let credential_secret = std::env::var("CREDENTIAL_SECRET")
            .expect("CREDENTIAL_SECRET must be set in the environment");
        assert!(
            !credential_secret.is_empty(),
            "CREDENTIAL_SECRET must not be empty"
        );

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: env_or("ALLOC_MAX_ATTEMPTS", defaults.max_attempts),
            base_delay_ms: env_or("ALLOC_BASE_DELAY_MS", defaults.base_delay_ms),
            max_delay_ms: env_or("ALLOC_MAX_DELAY_MS", defaults.max_delay_ms),
        };

        Self {
            credential_secret,
            retry,
        }
    }

    /// Build a config with the given secret and default retry policy.
    pub fn with_secret(credential_secret: impl Into<String>) -> Self {
        Self {
            credential_secret: credential_secret.into(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Parse an env var, falling back to a default when unset.
///
/// # Panics
///
/// Panics if the variable is set but not parseable as the target type.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}
