use std::{io::Write, path::Path};

use anyhow::Result;
use obs_checkout::working_copy;

use super::as_strs;

/// Handle the add command
pub async fn add<W: Write>(dir: &Path, files: &[String], output: &mut W) -> Result<()> {
    let wc = working_copy::read_working_copy(dir).await?;
    working_copy::add_and_delete_files(&wc, &as_strs(files), &[]).await?;
    for name in files {
        writeln!(output, "A {}", name)?;
    }
    Ok(())
}

/// Handle the rm command
pub async fn remove<W: Write>(dir: &Path, files: &[String], output: &mut W) -> Result<()> {
    let wc = working_copy::read_working_copy(dir).await?;
    working_copy::add_and_delete_files(&wc, &[], &as_strs(files)).await?;
    for name in files {
        writeln!(output, "D {}", name)?;
    }
    Ok(())
}

/// Handle the untrack command
pub async fn untrack<W: Write>(dir: &Path, files: &[String], output: &mut W) -> Result<()> {
    let wc = working_copy::read_working_copy(dir).await?;
    working_copy::untrack_files(&wc, &as_strs(files)).await?;
    for name in files {
        writeln!(output, "? {}", name)?;
    }
    Ok(())
}

/// Handle the undelete command
pub async fn undelete<W: Write>(dir: &Path, files: &[String], output: &mut W) -> Result<()> {
    let wc = working_copy::read_working_copy(dir).await?;
    working_copy::undo_file_deletion(&wc, &as_strs(files)).await?;
    for name in files {
        writeln!(output, "Restored {}", name)?;
    }
    Ok(())
}
