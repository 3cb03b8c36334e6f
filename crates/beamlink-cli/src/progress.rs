//! Progress bar rendering for transfers.

use indicatif::{ProgressBar, ProgressStyle};

use beamlink_files::TransferProgress;

/// Progress bar for one transfer batch.
pub struct TransferBar {
    bar: ProgressBar,
}

impl TransferBar {
    /// Bar sized to the batch total.
    #[must_use]
    pub fn new(total_bytes: u64, total_files: u32) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        bar.set_message(format!("{total_files} file(s)"));
        Self { bar }
    }

    /// Fold in a progress observation.
    pub fn update(&self, progress: &TransferProgress) {
        self.bar.set_position(progress.received_size);
        self.bar.set_message(format!(
            "{} ({}/{})",
            progress.current_file_name,
            progress.received_file_count,
            progress.total_file_count
        ));
    }

    /// Mark the batch finished.
    pub fn finish(&self) {
        self.bar.finish_with_message("done");
    }

    /// Mark the batch failed.
    pub fn fail(&self, code: u32) {
        self.bar
            .abandon_with_message(format!("failed (code {code})"));
    }
}

/// Human-readable byte count.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }
}
