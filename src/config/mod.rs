mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::config::settings::PartialSettings;

pub use settings::{BrokerSettings, LoggingSettings, ServerSettings, Settings};

/// Prefix for environment overrides, e.g. `RELAYSUB__BROKER__OVERFLOW=reject_new`.
pub const ENV_PREFIX: &str = "RELAYSUB";

/// Loads the configuration from `config/default` (any format the `config`
/// crate understands), then `.env`, then the environment, and merges the
/// result over the defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    // a missing .env is normal
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
