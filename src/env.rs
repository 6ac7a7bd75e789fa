//! Which deployment the bridge is running in, read once from `SALAMANDER_ENV`.
//!
//! | Value | Mode | Effect |
//! |---|---|---|
//! | `test` | [`Environment::Test`] | config and local storage under the crate's `tmp/` |
//! | `development`, `dev` | [`Environment::Development`] | `debug` log filter |
//! | anything else, unset | [`Environment::Production`] | platform config dir, `info` logs |

// Rust guideline compliant 2026-01

/// Variable that selects the [`Environment`].
pub const ENV_VAR: &str = "SALAMANDER_ENV";

/// Deployment mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    /// Default.
    #[default]
    Production,
    /// Local development against a dev server.
    Development,
    /// Integration tests.
    Test,
}

impl Environment {
    /// Mode selected by the process environment.
    #[must_use]
    pub fn current() -> Self {
        std::env::var(ENV_VAR)
            .map(|value| Self::from_name(&value))
            .unwrap_or_default()
    }

    /// Mode for a raw `SALAMANDER_ENV` value. Unknown names are production.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "test" => Self::Test,
            "development" | "dev" => Self::Development,
            _ => Self::Production,
        }
    }

    /// Canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Test => "test",
        }
    }

    /// Whether config and storage live in the repository-local `tmp/`.
    #[must_use]
    pub fn uses_local_config_dir(self) -> bool {
        self == Self::Test
    }

    /// `env_logger` filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_filter(self) -> &'static str {
        if self == Self::Development {
            "debug"
        } else {
            "info"
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
