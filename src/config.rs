//! Configuration types.

use secrecy::SecretString;

/// Server configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Google Maps API key; directions features degrade gracefully when
    /// unset.
    pub maps_api_key: Option<SecretString>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            maps_api_key: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from `CARPOOL_*` environment variables, falling
    /// back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("CARPOOL_BIND_ADDR").unwrap_or(defaults.bind_addr),
            maps_api_key: std::env::var("CARPOOL_MAPS_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
        }
    }
}
