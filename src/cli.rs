use crate::catalog::Generation;
use crate::config::{CliOverrides, Config};
use crate::error::Result;
use crate::extractor::envelope::DecryptBackend;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fwarchive")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Decrypt and extract archives embedded in unpacked firmware modules")]
#[command(
    long_about = "fwarchive walks the device directories left by a firmware unpacking step, \
                  decrypts modules wrapped in an OpenSSL password envelope and extracts the \
                  tar or zip archive each module carries into a sibling <module>-extr1 directory."
)]
#[command(before_help = "📦 fwarchive - Firmware Module Archive Extraction")]
#[command(after_help = "EXAMPLES:\n  \
    fwarchive\n  \
    fwarchive --generation imah-v2 --device '^wm2'\n  \
    fwarchive -g xv4,imah-v1 --input-root out --output-root extracted -v\n  \
    fwarchive out/wm220-mavic/pkg/wm220_0801_v01.05.0000_0801.bin\n  \
    fwarchive --dry-run --output-format json")]
pub struct Cli {
    /// Module files to process directly, bypassing the device suites
    pub modules: Vec<PathBuf>,

    /// Firmware generations to run
    #[arg(short, long, value_enum, value_delimiter = ',')]
    pub generation: Vec<Generation>,

    /// Only run device directories matching this regex
    #[arg(short, long, value_name = "REGEX")]
    pub device: Option<String>,

    /// Directory holding <device>/<package>/<module>.bin
    #[arg(long, help = "Root of the unpacked module tree (default: out)")]
    pub input_root: Option<PathBuf>,

    /// Where extracted archives are written
    #[arg(long, help = "Root for decrypted and extracted output (default: out)")]
    pub output_root: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Decryption backend
    #[arg(long, value_enum)]
    pub backend: Option<DecryptBackend>,

    /// Envelope passphrase
    #[arg(long, env = "FWARCHIVE_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Do not write the extraction report
    #[arg(long)]
    pub no_report: bool,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Dry run (show what would be done without executing)
    #[arg(long, help = "List the modules that would be processed without touching them")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        let generations = if self.generation.is_empty() {
            None
        } else {
            Some(self.generation.clone())
        };

        CliOverrides::new()
            .with_input_root(self.input_root.clone())
            .with_output_root(self.output_root.clone())
            .with_backend(self.backend)
            .with_passphrase(self.passphrase.clone())
            .with_generations(generations)
            .with_device_filter(self.device.clone())
            .with_no_report(self.no_report)
    }

    pub fn has_explicit_modules(&self) -> bool {
        !self.modules.is_empty()
    }

    pub fn should_use_colors(&self) -> bool {
        !self.quiet && console::Term::stdout().features().colors_supported()
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose > 0 && !self.quiet
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }

        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}
