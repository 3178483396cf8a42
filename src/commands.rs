pub mod checkout;
pub mod commit;
pub mod stage;
pub mod status;

use anyhow::Result;
use obs_checkout::config::ObsConfig;

/// Configuration for talking to `api_url`.
///
/// Credentials and transfer settings come from the config file when there is
/// one; the API URL of an existing checkout always wins over the configured one.
pub(crate) fn config_for(api_url: Option<&str>) -> Result<ObsConfig> {
    let config = match (ObsConfig::load(), api_url) {
        (Ok(config), _) => config,
        (Err(e), Some(api_url)) => {
            tracing::debug!("Using default configuration: {:#}", e);
            ObsConfig::new(api_url)
        }
        (Err(e), None) => return Err(e),
    };

    Ok(match api_url {
        Some(api_url) => ObsConfig {
            api_url: api_url.to_string(),
            ..config
        },
        None => config,
    })
}

pub(crate) fn as_strs(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}
