//! Environment source: FLOWGATE__SECTION__KEY

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

pub const ENV_PREFIX: &str = "FLOWGATE";
pub const ENV_SEPARATOR: &str = "__";

/// Add the environment source to the builder.
/// `FLOWGATE__OFFLOAD__ENABLED=true` sets `offload.enabled`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    ))
}
