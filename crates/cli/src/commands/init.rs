//! Write a starter configuration file

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;

use botcheck_harness::HarnessConfig;

use crate::output::print_success;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the configuration
    #[arg(default_value = "botcheck.toml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

pub async fn execute(args: InitArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.path.display());
    }

    HarnessConfig::default().save(&args.path)?;
    print_success(&format!("Wrote {}", args.path.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("botcheck.toml");

        execute(InitArgs { path: path.clone(), force: false }).await.unwrap();
        let written = HarnessConfig::load(&path).unwrap();
        assert_eq!(written.session.contact_name, "Twilio");

        assert!(execute(InitArgs { path: path.clone(), force: false }).await.is_err());
        execute(InitArgs { path, force: true }).await.unwrap();
    }
}
