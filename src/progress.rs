use indicatif::{ProgressBar, ProgressStyle};

/// Batches at most this large run without a progress bar
const QUIET_BATCH_SIZE: usize = 10;

/// Progress bar for a batch of file transfers, `None` for small batches
pub(crate) fn transfer_bar(len: usize, message: &'static str) -> Option<ProgressBar> {
    if len <= QUIET_BATCH_SIZE {
        return None;
    }

    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("  {msg} [{bar:40.cyan/blue}] {pos}/{len} files ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");
    bar.set_style(style);
    bar.set_message(message);
    Some(bar)
}
