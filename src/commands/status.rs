use std::{io::Write, path::Path};

use anyhow::Result;
use obs_checkout::{model::FileState, working_copy};
use serde::Serialize;

#[derive(Serialize)]
struct StatusLine<'a> {
    name: &'a str,
    state: FileState,
    md5: &'a str,
}

/// Handle the status command
/// One line per file, `<state code> <name>`; unmodified files are skipped
/// unless JSON output is requested
pub async fn handle<W: Write>(dir: &Path, json: bool, output: &mut W) -> Result<()> {
    let wc = working_copy::read_working_copy(dir).await?;

    if json {
        let lines: Vec<StatusLine> = wc
            .files_in_workdir()
            .iter()
            .map(|f| StatusLine {
                name: f.name(),
                state: f.state,
                md5: f.file.md5_hash(),
            })
            .collect();
        serde_json::to_writer_pretty(&mut *output, &lines)?;
        writeln!(output)?;
        return Ok(());
    }

    for file in wc.files_in_workdir() {
        if file.state == FileState::Unmodified {
            continue;
        }
        writeln!(output, "{} {}", file.state.code(), file.name())?;
    }
    Ok(())
}
