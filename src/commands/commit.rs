use std::{io::Write, path::Path};

use anyhow::Result;
use obs_checkout::{model::FileState, working_copy};

/// Handle the commit command
/// Commits to the server the checkout was made from, whatever the configured API URL
pub async fn handle<W: Write>(dir: &Path, message: Option<String>, output: &mut W) -> Result<()> {
    let wc = working_copy::read_working_copy(dir).await?;

    let pending = wc
        .files_in_workdir()
        .iter()
        .filter(|f| {
            matches!(
                f.state,
                FileState::Modified | FileState::ToBeAdded | FileState::ToBeDeleted
            )
        })
        .count();
    if pending == 0 {
        writeln!(output, "Nothing to commit in {}", wc.identity())?;
        return Ok(());
    }

    let config = super::config_for(Some(&wc.identity().api_url))?;
    let remote = config.remote()?;
    let new_wc = working_copy::commit(&*remote, &wc, &config.commit_options(message)).await?;

    writeln!(
        output,
        "Committed {} file change(s) to {} as revision {}",
        pending,
        new_wc.identity(),
        new_wc.head().rev.as_deref().unwrap_or("?")
    )?;
    Ok(())
}
