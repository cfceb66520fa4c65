use anyhow::Result;

use contrib_workflow::ContribConfig;

/// Print the configuration after every source has been applied.
pub fn execute(config: &ContribConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
