/// Progress bars shared by the preprocessing and export phases
use indicatif::{ProgressBar, ProgressStyle};

/// Create a point counting progress bar, or a hidden one when progress output is disabled.
pub fn point_bar(len: u64, message: &'static str, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{bar:40.cyan/blue}] {pos}/{len} points ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("▉▊▋▌▍▎▏ "));
    }
    pb.set_message(message);
    pb
}

/// Create a node counting progress bar.
pub fn node_bar(len: u64, message: &'static str, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{bar:40.green/blue}] {pos}/{len} nodes ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("▉▊▋▌▍▎▏ "));
    }
    pb.set_message(message);
    pb
}
