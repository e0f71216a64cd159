//! Settings resolution for the CLI.
//!
//! Settings come from `BRAID_*` environment variables with command-line
//! flags taking precedence.

use braid_core::config::Settings;

/// Resolves runtime settings from the environment plus CLI overrides.
pub fn resolve(store_url: Option<&str>) -> Settings {
    let mut settings = Settings::from_env();
    if let Some(url) = store_url {
        settings.store_url = url.to_string();
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_overrides_environment() {
        let settings = resolve(Some("http://qdrant.internal:6334"));
        assert_eq!(settings.store_url, "http://qdrant.internal:6334");
    }

    #[test]
    fn no_override_keeps_resolved_value() {
        let from_env = Settings::from_env();
        let settings = resolve(None);
        assert_eq!(settings.store_url, from_env.store_url);
    }
}
