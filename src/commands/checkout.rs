use std::{io::Write, path::Path};

use anyhow::Result;
use obs_checkout::{
    config::{CheckoutOptions, ObsConfig},
    model::PackageIdentity,
    working_copy,
};

pub struct Request {
    pub project: String,
    pub package: String,
    pub revision: Option<String>,
    pub expand_links: bool,
}

/// Handle the checkout command
/// The package lands in a directory named after it, below `dir`
pub async fn handle<W: Write>(dir: &Path, request: Request, output: &mut W) -> Result<()> {
    let config = super::config_for(None)?;
    let remote = config.remote()?;
    let identity = PackageIdentity::new(&config.api_url, &request.project, &request.package);

    let options = working_copy_options(&config, &request);
    let target = dir.join(&request.package);
    let wc = working_copy::checkout_package(&*remote, &identity, &target, &options).await?;

    writeln!(
        output,
        "Checked out {} revision {} into {}",
        identity,
        wc.head().rev.as_deref().unwrap_or("?"),
        target.display()
    )?;
    for file in wc.files_in_workdir() {
        writeln!(output, "A {}", file.name())?;
    }
    Ok(())
}

fn working_copy_options(config: &ObsConfig, request: &Request) -> CheckoutOptions {
    CheckoutOptions {
        expand_links: request.expand_links && config.expand_links,
        revision: request.revision.clone(),
        ..config.checkout_options()
    }
}
