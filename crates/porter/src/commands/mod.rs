pub mod provision;
pub mod template;

use anyhow::Context;
use porter_config::PorterConfig;

/// Locate and load the project's config file
pub fn load_config() -> anyhow::Result<PorterConfig> {
    let path = porter_config::find_config_file()
        .context("no Porter config found (looked for .porter/config.yaml and porter.yaml)")?;
    PorterConfig::load(&path).with_context(|| format!("failed to load {}", path.display()))
}
