use anyhow::{anyhow, Context, Result};
use teamcity_cli_api::{ClientConfig, StatusPolicy, TeamcityClient};
use teamcity_cli_auth::{token_key, CredentialStore};
use teamcity_cli_config::{Config, Profile, Timeouts};

pub const TOKEN_ENV: &str = "TEAMCITY_TOKEN";
pub const URL_ENV: &str = "TEAMCITY_URL";

/// Everything needed to talk to one server, after config, environment and
/// credential store have been consulted.
#[derive(Debug, Clone)]
pub struct ActiveProfile {
    pub name: String,
    pub base_url: String,
    pub token: String,
    pub insecure: bool,
    pub timeouts: Timeouts,
}

impl ActiveProfile {
    pub fn client(&self, status_policy: StatusPolicy) -> Result<TeamcityClient> {
        let config = ClientConfig::new(&self.base_url, &self.token)
            .with_timeouts(
                self.timeouts.request(),
                self.timeouts.connect(),
                self.timeouts.tls_handshake(),
            )
            .with_insecure(self.insecure)
            .with_status_policy(status_policy);

        Ok(TeamcityClient::new(config)?)
    }
}

fn profile_token_env(name: &str) -> String {
    format!(
        "TEAMCITY_CLI_TOKEN_{}",
        name.to_uppercase().replace('-', "_")
    )
}

/// Token lookup: profile-specific env var, generic env var, credential
/// store, then the token written in the profile itself. An unreadable
/// credential store is an error rather than a missing token.
pub fn resolve_token(
    name: &str,
    profile: &Profile,
    store: &CredentialStore,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Option<String>> {
    let from_env = |key: &str| env(key).filter(|t| !t.trim().is_empty());

    if let Some(token) = from_env(&profile_token_env(name)).or_else(|| from_env(TOKEN_ENV)) {
        return Ok(Some(token));
    }

    let stored = store
        .get_secret(&token_key(name))
        .with_context(|| format!("Failed to read stored token for profile '{name}'"))?;

    Ok(stored.or_else(|| profile.token.clone().filter(|t| !t.trim().is_empty())))
}

/// Pick the profile to use. Without any configured profile, `TEAMCITY_URL`
/// and `TEAMCITY_TOKEN` alone are enough.
pub fn resolve_active_profile(
    config: &Config,
    requested: Option<&str>,
    store: &CredentialStore,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ActiveProfile> {
    let env_profile;
    let (name, profile) = match config.resolve_profile(requested) {
        Some(found) => found,
        None if requested.is_none() && env(URL_ENV).is_some() => {
            env_profile = Profile {
                base_url: env(URL_ENV),
                ..Default::default()
            };
            ("env", &env_profile)
        }
        None => {
            return Err(match requested {
                Some(name) => anyhow!("Profile '{name}' not found in config."),
                None => anyhow!(
                    "No profile configured. Run `teamcity-cli auth login` or set {URL_ENV} and {TOKEN_ENV}."
                ),
            })
        }
    };

    let base_url = profile
        .base_url
        .clone()
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| anyhow!("Profile '{name}' is missing a base_url."))?;

    let token = resolve_token(name, profile, store, &env)?.ok_or_else(|| {
        anyhow!(
            "No token found for profile '{name}'. Set {} or run `teamcity-cli auth login --profile {name}`",
            profile_token_env(name)
        )
    })?;

    Ok(ActiveProfile {
        name: name.to_string(),
        base_url,
        token,
        insecure: profile.insecure,
        timeouts: profile.timeouts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn config_with(name: &str, token: Option<&str>) -> Config {
        let mut config = Config::default();
        config.upsert_profile(
            name,
            Profile {
                base_url: Some("https://ci.example.com".to_string()),
                token: token.map(str::to_string),
                ..Default::default()
            },
            true,
        );
        config
    }

    #[test]
    fn test_profile_env_beats_generic_env() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::with_path(dir.path().join("credentials"));
        let config = config_with("my-ci", Some("from-config"));
        let env = env_of(&[
            ("TEAMCITY_CLI_TOKEN_MY_CI", "from-profile-env"),
            ("TEAMCITY_TOKEN", "from-env"),
        ]);

        let active = resolve_active_profile(&config, None, &store, env).unwrap();
        assert_eq!(active.name, "my-ci");
        assert_eq!(active.token, "from-profile-env");
    }

    #[test]
    fn test_store_beats_config_token() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::with_path(dir.path().join("credentials"));
        store.set_secret(&token_key("ci"), "from-store").unwrap();
        let config = config_with("ci", Some("from-config"));

        let active = resolve_active_profile(&config, None, &store, env_of(&[])).unwrap();
        assert_eq!(active.token, "from-store");
    }

    #[test]
    fn test_config_token_is_last_resort() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::with_path(dir.path().join("credentials"));
        let config = config_with("ci", Some("from-config"));

        let active = resolve_active_profile(&config, None, &store, env_of(&[])).unwrap();
        assert_eq!(active.token, "from-config");
        assert_eq!(active.base_url, "https://ci.example.com");
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::with_path(dir.path().join("credentials"));
        let config = config_with("ci", None);

        let err = resolve_active_profile(&config, None, &store, env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("TEAMCITY_CLI_TOKEN_CI"));
    }

    #[test]
    fn test_env_only_setup() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::with_path(dir.path().join("credentials"));
        let env = env_of(&[
            ("TEAMCITY_URL", "https://env.example.com"),
            ("TEAMCITY_TOKEN", "Bearer t"),
        ]);

        let active = resolve_active_profile(&Config::default(), None, &store, env).unwrap();
        assert_eq!(active.name, "env");
        assert_eq!(active.base_url, "https://env.example.com");

        let client = active.client(StatusPolicy::Lenient).unwrap();
        assert_eq!(client.token(), "t");
    }

    #[test]
    fn test_malformed_store_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, "{not json").unwrap();
        let store = CredentialStore::with_path(path);
        let config = config_with("ci", Some("from-config"));

        let err = resolve_active_profile(&config, None, &store, env_of(&[])).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Failed to read stored token for profile 'ci'"));
        assert!(message.contains("Malformed credentials file"));

        // Environment tokens do not need the store at all.
        let env = env_of(&[("TEAMCITY_TOKEN", "from-env")]);
        let active = resolve_active_profile(&config, None, &store, env).unwrap();
        assert_eq!(active.token, "from-env");
    }

    #[test]
    fn test_unknown_requested_profile() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::with_path(dir.path().join("credentials"));
        let config = config_with("ci", Some("t"));

        let err =
            resolve_active_profile(&config, Some("nope"), &store, env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("'nope' not found"));
    }
}
