use crate::suite::SuiteProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct ProgressManager {
    multi_progress: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            enabled,
        }
    }

    pub fn create_case_progress(&self, total_cases: u64) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new(total_cases));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}/{len:3} devices {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_message("Scanning device directories...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn create_module_progress(&self, total_modules: u64) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new(total_modules));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>5}/{len:5} modules {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_message("Processing modules...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn suspend<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if self.enabled {
            self.multi_progress.suspend(f)
        } else {
            f()
        }
    }

    pub fn clear(&self) {
        if self.enabled {
            self.multi_progress.clear().ok();
        }
    }
}

pub fn update_suite_progress(pb: &ProgressBar, progress: &SuiteProgress) {
    pb.set_position(progress.cases_done as u64);

    let failed = if progress.modules_failed > 0 {
        format!(" [{} failed]", progress.modules_failed)
    } else {
        String::new()
    };

    match progress.current_module {
        Some(ref module) => pb.set_message(format!("{}: {}{}", progress.current_case, module, failed)),
        None => pb.set_message(format!("{} modules done{}", progress.modules_done, failed)),
    }
}

pub fn finish_progress_with_summary(pb: &ProgressBar, message: &str, duration: Duration) {
    let final_message = format!("{} (completed in {})", message, format_duration(duration));
    pb.finish_with_message(final_message);
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_progress_bars() {
        let manager = ProgressManager::new(false);

        assert!(manager.create_case_progress(12).is_hidden());
        assert!(manager.create_module_progress(100).is_hidden());
        assert_eq!(manager.suspend(|| 7), 7);
    }

    #[test]
    fn test_suite_progress_messages() {
        let pb = ProgressBar::hidden();
        let mut progress = SuiteProgress {
            cases_done: 3,
            cases_total: 12,
            current_case: "wm220-mavic".to_string(),
            current_module: Some("wm220_0801_v1_0801.bin".to_string()),
            modules_done: 4,
            modules_failed: 0,
        };

        update_suite_progress(&pb, &progress);
        assert_eq!(pb.position(), 3);
        assert_eq!(pb.message(), "wm220-mavic: wm220_0801_v1_0801.bin");

        progress.current_module = None;
        progress.modules_failed = 1;
        update_suite_progress(&pb, &progress);
        assert_eq!(pb.message(), "4 modules done [1 failed]");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "61m 1s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
    }
}
