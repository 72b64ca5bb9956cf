use crate::error::{FwArchiveError, UserFriendlyError};
use crate::extractor::pipeline::ModuleStatus;
use crate::extractor::report::{CaseReport, CaseStatus, RunReport, SuiteReport};
use crate::suite::CasePlan;
use crate::ui::progress::format_duration;
use console::{style, Emoji, Term};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

impl OutputMode {
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputMode::Json,
            "plain" => OutputMode::Plain,
            _ => OutputMode::Human,
        }
    }
}

// Emojis with text fallbacks
static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ROCKET: Emoji = Emoji("🚀 ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");
static SKIP: Emoji = Emoji("⏭️  ", "- ");

pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let term = Term::stdout();
        let use_colors = match mode {
            OutputMode::Human => term.features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    // Core messaging methods
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn debug(&self, message: &str) {
        if self.should_show_message(2) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("  {}", style(message).dim());
                    } else {
                        println!("  DEBUG: {}", message);
                    }
                }
                OutputMode::Json => self.print_json_message("debug", message),
                OutputMode::Plain => println!("DEBUG: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", ROCKET, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &FwArchiveError) {
        let user_message = error.user_message();
        self.error(&user_message);

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    println!();
                    if self.use_colors {
                        println!("{}{}", INFO, style(&format!("Suggestion: {}", suggestion)).cyan());
                    } else {
                        println!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => {
                    println!("SUGGESTION: {}", suggestion);
                }
            }
        }
    }

    /// One line per case, plus the failing modules beneath it.
    pub fn print_suite_report(&self, suite: &SuiteReport) {
        if self.quiet || self.mode == OutputMode::Json {
            return;
        }

        self.print_header(&format!("{} suite", suite.name()));
        for case in &suite.cases {
            self.print_case_result(case);
        }
    }

    pub fn print_run_report(&self, report: &RunReport) {
        match self.mode {
            OutputMode::Human => self.print_human_summary(report),
            OutputMode::Json => {
                let json_output = serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
                println!("{}", json_output);
            }
            OutputMode::Plain => self.print_plain_summary(report),
        }
    }

    pub fn print_dry_run(&self, plans: &[CasePlan]) {
        match self.mode {
            OutputMode::Json => {
                let json_output = serde_json::to_string_pretty(plans).unwrap_or_else(|_| "[]".to_string());
                println!("{}", json_output);
            }
            OutputMode::Human | OutputMode::Plain => {
                self.print_header("Dry Run");
                for plan in plans {
                    if plan.is_empty() && plan.scan.skipped.is_empty() && self.verbose_level == 0 {
                        continue;
                    }

                    println!("[{}] {}", plan.generation, plan.directory.display());
                    for module in &plan.scan.modules {
                        println!("  + {} ({})", module.display_path(), format_bytes(module.size));
                    }
                    for skipped in &plan.scan.skipped {
                        println!("  - {} ({})", skipped.path.display(), skipped.detail);
                    }
                }

                let modules: usize = plans.iter().map(|p| p.scan.modules.len()).sum();
                let skipped: usize = plans.iter().map(|p| p.scan.skipped.len()).sum();
                let empty = plans.iter().filter(|p| p.is_empty()).count();
                println!();
                println!(
                    "{} modules would be processed, {} excluded, {} of {} device directories have nothing to test",
                    modules,
                    skipped,
                    empty,
                    plans.len()
                );
            }
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{} {}", SPARKLES, style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
                println!();
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => {
                println!("=== {} ===", title);
            }
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => {
                println!("{}", "-".repeat(60));
            }
            OutputMode::Json => {}
        }
    }

    fn print_case_result(&self, case: &CaseReport) {
        match (&case.status, self.mode) {
            (CaseStatus::Passed, OutputMode::Human) => {
                let detail = format!("{} ({} modules)", case.name, case.modules.len());
                if self.use_colors {
                    println!("{}{}", CHECKMARK, style(detail).green());
                } else {
                    println!("✓ {}", detail);
                }
            }
            (CaseStatus::Skipped { reason }, OutputMode::Human) => {
                if self.should_show_message(1) {
                    let detail = format!("{}: {}", case.name, reason);
                    if self.use_colors {
                        println!("{}{}", SKIP, style(detail).dim());
                    } else {
                        println!("- {}", detail);
                    }
                }
            }
            (CaseStatus::Failed { failures }, OutputMode::Human) => {
                let detail = format!("{} ({} of {} modules failed)", case.name, failures, case.modules.len());
                if self.use_colors {
                    println!("{}{}", CROSS, style(detail).red().bold());
                } else {
                    println!("✗ {}", detail);
                }
            }
            (status, _) => {
                let label = match status {
                    CaseStatus::Passed => "PASSED",
                    CaseStatus::Skipped { .. } => "SKIPPED",
                    CaseStatus::Failed { .. } => "FAILED",
                };
                println!("{}: {}", label, case.name);
            }
        }

        for module in &case.modules {
            if let ModuleStatus::Failed { ref error } = module.status {
                println!("    {}", error);
            } else if let ModuleStatus::IgnoredUnknownFormat { ref reason } = module.status {
                if self.should_show_message(1) {
                    println!("    {} ignored: {}", module.path.display(), reason);
                }
            }
        }
    }

    // Private helper methods
    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        #[allow(clippy::type_complexity)]
        let (emoji, color_fn): (Emoji, Box<dyn Fn(&str) -> console::StyledObject<&str>>) = match msg_type {
            MessageType::Success => (CHECKMARK, Box::new(|msg| style(msg).green().bold())),
            MessageType::Error => (CROSS, Box::new(|msg| style(msg).red().bold())),
            MessageType::Warning => (WARNING, Box::new(|msg| style(msg).yellow().bold())),
            MessageType::Info => (INFO, Box::new(|msg| style(msg).cyan())),
        };

        if self.use_colors {
            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, color_fn(message)),
                _ => println!("{}{}", emoji, color_fn(message)),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };

            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!("{}", serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string()));
    }

    fn print_human_summary(&self, report: &RunReport) {
        if self.quiet {
            return;
        }

        let s = &report.summary;
        let elapsed = (report.finished_at - report.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        println!();
        self.print_separator();

        if s.has_failures() {
            if self.use_colors {
                println!("{} {}", style("Module extraction finished with failures").red().bold(), CROSS);
            } else {
                println!("✗ Module extraction finished with failures");
            }
        } else if self.use_colors {
            println!("{} {}", style("Module extraction completed!").green().bold(), CHECKMARK);
        } else {
            println!("✓ Module extraction completed!");
        }

        println!();
        println!(
            "  Cases:     {}",
            self.highlight(format!(
                "{} passed, {} skipped, {} failed",
                s.cases_passed, s.cases_skipped, s.cases_failed
            ))
        );
        println!(
            "  Modules:   {}",
            self.highlight(format!(
                "{} extracted, {} ignored, {} failed",
                s.modules_extracted, s.modules_ignored, s.modules_failed
            ))
        );
        println!("  Decrypted: {}", self.highlight(s.modules_decrypted.to_string()));
        println!("  Excluded:  {}", self.highlight(s.modules_excluded.to_string()));
        println!("  Time taken: {}", self.highlight(format_duration(elapsed)));

        self.print_separator();
    }

    fn print_plain_summary(&self, report: &RunReport) {
        let s = &report.summary;
        println!("COMPLETED: Module extraction");
        println!(
            "Cases: {} passed, {} skipped, {} failed",
            s.cases_passed, s.cases_skipped, s.cases_failed
        );
        println!(
            "Modules: {} extracted, {} ignored, {} failed",
            s.modules_extracted, s.modules_ignored, s.modules_failed
        );
        println!("Decrypted: {}", s.modules_decrypted);
        for module in report.failed_modules() {
            println!("FAILED: {}", module.path.display());
        }
    }

    fn highlight(&self, text: String) -> String {
        if self.use_colors {
            style(text).cyan().bold().to_string()
        } else {
            text
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mode_parsing() {
        assert_eq!(OutputMode::from_string("human"), OutputMode::Human);
        assert_eq!(OutputMode::from_string("JSON"), OutputMode::Json);
        assert_eq!(OutputMode::from_string("plain"), OutputMode::Plain);
        assert_eq!(OutputMode::from_string("invalid"), OutputMode::Human);
    }

    #[test]
    fn test_formatter_creation() {
        let formatter = OutputFormatter::new(OutputMode::Human, 1, false);
        assert_eq!(formatter.mode(), OutputMode::Human);
        assert_eq!(formatter.verbose_level, 1);
        assert!(!formatter.quiet);

        let json = OutputFormatter::new(OutputMode::Json, 0, false);
        assert!(!json.use_colors);
    }

    #[test]
    fn test_quiet_mode() {
        let formatter = OutputFormatter::new(OutputMode::Human, 2, true);
        assert_eq!(formatter.verbose_level, 0);
        assert!(!formatter.should_show_message(0));
    }

    #[test]
    fn test_should_show_message() {
        let formatter = OutputFormatter::new(OutputMode::Plain, 2, false);
        assert!(formatter.should_show_message(0));
        assert!(formatter.should_show_message(2));
        assert!(!formatter.should_show_message(3));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
        assert_eq!(format_bytes(1073741824), "1.0 GB");
    }
}
