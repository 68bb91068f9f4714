pub use zendo_core::config::*;

use crate::cli::Cli;

pub fn from_cli(cli: &Cli) -> anyhow::Result<AppConfig> {
    Ok(AppConfig::discover(cli.data_dir.clone())?
        .with_user(cli.user_id.clone())
        .with_offline(cli.offline))
}
