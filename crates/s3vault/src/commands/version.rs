//! Version command

use crate::cli::VersionArgs;
use anyhow::Result;
use s3vault::version::VersionInfo;

pub fn run(args: VersionArgs) -> Result<()> {
    let info = VersionInfo::from_build(&args.build.into_build_info());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", info.display());
        println!("Build date: {}", info.date);
        println!("Built by:   {}", info.built_by);
    }

    Ok(())
}
