pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod scanner;
pub mod suite;
pub mod ui;

// Public API re-exports
pub use catalog::{Disposition, ExceptionRule, Generation, SuiteCatalog};
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, DecryptConfig, ExtractConfig, OutputConfig, PathsConfig, SuitesConfig};
pub use error::{FwArchiveError, Result, UserFriendlyError};

// Core functionality re-exports
pub use extractor::{
    is_envelope_encrypted, ArchiveKind, ArchiveSummary, CaseReport, CaseStatus, ConfigSnapshot, DecryptBackend,
    Decryptor, Extractor, LibraryExtractor, ModuleExtractor, ModuleReport, ModuleStatus, ReportWriter, RunReport,
    RunSummary, SuiteReport,
};
pub use scanner::{is_module_unsigned_encrypted, DeviceScan, ModuleFile, ModuleScanner, SkipReason, SkippedModule};
pub use suite::{CasePlan, SuiteProgress, SuiteRunner};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Main library interface for fwarchive functionality
pub struct FwArchive {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl FwArchive {
    /// Create a new FwArchive instance with the provided configuration
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        })
    }

    /// Create a new FwArchive instance for testing (no signal handler conflicts)
    #[cfg(test)]
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(false);
        let shutdown = GracefulShutdown::new_for_test();

        Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        }
    }

    /// Create FwArchive instance from CLI arguments
    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            crate::cli::OutputFormat::Human => OutputMode::Human,
            crate::cli::OutputFormat::Json => OutputMode::Json,
            crate::cli::OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)
    }

    /// Run the device suites of every configured generation
    pub fn run_suites(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        self.shutdown.check_shutdown()?;

        let pipeline = self.create_pipeline()?;
        let runner = SuiteRunner::new(self.config.paths.input_root.clone(), &pipeline, &self.shutdown)
            .with_device_filter(self.config.device_regex()?);

        let mut suites = Vec::with_capacity(self.config.suites.generations.len());
        for generation in &self.config.suites.generations {
            self.output_formatter
                .start_operation(&format!("Running {} suite", generation));

            let start = Instant::now();
            let case_progress = self
                .progress_manager
                .create_case_progress(runner.devices(*generation).len() as u64);
            let progress_callback = {
                let pb = case_progress.clone();
                move |progress: &SuiteProgress| {
                    ui::progress::update_suite_progress(&pb, progress);
                }
            };

            let suite = match runner.run(*generation, Some(&progress_callback)) {
                Ok(suite) => suite,
                Err(e) => {
                    case_progress.abandon_with_message(format!("{} suite stopped", generation));
                    return Err(e);
                }
            };

            ui::progress::finish_progress_with_summary(
                &case_progress,
                &format!("{} suite: {} devices", generation, suite.cases.len()),
                start.elapsed(),
            );
            self.progress_manager
                .suspend(|| self.output_formatter.print_suite_report(&suite));
            suites.push(suite);
        }

        self.finish_run(started_at, suites)
    }

    /// Decrypt and extract explicitly named module files
    pub fn extract_modules(&self, paths: &[PathBuf]) -> Result<RunReport> {
        let started_at = Utc::now();
        self.shutdown.check_shutdown()?;

        let pipeline = self.create_pipeline()?;
        let runner = SuiteRunner::new(self.config.paths.input_root.clone(), &pipeline, &self.shutdown);

        self.output_formatter
            .start_operation(&format!("Processing {} module files", paths.len()));

        let start = Instant::now();
        let module_progress = self.progress_manager.create_module_progress(paths.len() as u64);
        let progress_callback = {
            let pb = module_progress.clone();
            move |progress: &SuiteProgress| {
                pb.set_position(progress.modules_done as u64);
                if let Some(ref module) = progress.current_module {
                    pb.set_message(module.clone());
                }
            }
        };

        let suite = match runner.run_modules(paths, Some(&progress_callback)) {
            Ok(suite) => suite,
            Err(e) => {
                module_progress.abandon_with_message("stopped");
                return Err(e);
            }
        };

        ui::progress::finish_progress_with_summary(
            &module_progress,
            &format!("Processed {} modules", paths.len()),
            start.elapsed(),
        );
        self.progress_manager
            .suspend(|| self.output_formatter.print_suite_report(&suite));

        self.finish_run(started_at, vec![suite])
    }

    /// Discovery and exclusion decisions, without touching any module
    pub fn plan(&self) -> Result<Vec<CasePlan>> {
        let pipeline = self.create_pipeline()?;
        let runner = SuiteRunner::new(self.config.paths.input_root.clone(), &pipeline, &self.shutdown)
            .with_device_filter(self.config.device_regex()?);

        let mut plans = Vec::new();
        for generation in &self.config.suites.generations {
            plans.extend(runner.plan(*generation)?);
        }
        Ok(plans)
    }

    fn create_pipeline(&self) -> Result<ModuleExtractor> {
        let pipeline = ModuleExtractor::from_config(&self.config)?;
        self.output_formatter
            .debug(&format!("Decryption backend: {}", pipeline.decryptor_name()));
        Ok(pipeline)
    }

    fn finish_run(&self, started_at: chrono::DateTime<Utc>, suites: Vec<SuiteReport>) -> Result<RunReport> {
        let report = RunReport::new(started_at, suites, self.create_config_snapshot());

        if self.config.output.generate_report {
            let writer = ReportWriter::new(&self.config.paths.output_root, &self.config.output.report_directory);
            writer.save(&report)?;
            self.output_formatter.info(&format!(
                "Wrote extraction report to {}",
                writer.report_directory().display()
            ));
        }

        Ok(report)
    }

    /// Create configuration snapshot for reporting
    fn create_config_snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            input_root: self.config.paths.input_root.clone(),
            output_root: self.config.paths.output_root.clone(),
            decrypt_backend: match self.config.decrypt.backend {
                DecryptBackend::Openssl => "openssl".to_string(),
                DecryptBackend::Command => format!("command ({})", self.config.decrypt.openssl_binary),
            },
            generations: self.config.suites.generations.clone(),
            device_filter: self.config.suites.device_filter.clone(),
        }
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get output formatter reference
    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &FwArchiveError) {
        self.progress_manager.clear();
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Get version information
pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get build information
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        target: std::env::consts::ARCH.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_date: &'static str,
    pub target: String,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fwarchive {} ({}) built on {} for {}",
            self.version, self.git_hash, self.build_date, self.target
        )
    }
}
