//! Offline ARN check: prints the transit key an ARN maps to

use crate::cli::ResolveKeyArgs;
use anyhow::{Context, Result};
use s3vault_core::TransitKeyName;

pub fn run(args: ResolveKeyArgs) -> Result<()> {
    let key = resolve(&args.arn)?;
    println!("{key}");
    Ok(())
}

fn resolve(arn: &str) -> Result<TransitKeyName> {
    TransitKeyName::from_arn(arn.trim()).with_context(|| format!("cannot resolve '{arn}'"))
}
