use crate::catalog::Generation;
use crate::error::{FwArchiveError, Result};
use crate::extractor::envelope::{DecryptBackend, DEFAULT_PASSPHRASE};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub decrypt: DecryptConfig,
    pub extract: ExtractConfig,
    pub suites: SuitesConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root holding `<device>/<package>/<module>.bin`
    pub input_root: PathBuf,
    pub output_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecryptConfig {
    pub backend: DecryptBackend,
    pub passphrase: String,
    pub openssl_binary: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub retry_on_conflict: bool,
    pub extra_unknown_format_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SuitesConfig {
    pub generations: Vec<Generation>,
    pub device_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub generate_report: bool,
    pub report_directory: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("out"),
            output_root: PathBuf::from("out"),
        }
    }
}

impl Default for DecryptConfig {
    fn default() -> Self {
        Self {
            backend: DecryptBackend::Openssl,
            passphrase: DEFAULT_PASSPHRASE.to_string(),
            openssl_binary: "openssl".to_string(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            retry_on_conflict: true,
            extra_unknown_format_patterns: Vec::new(),
        }
    }
}

impl Default for SuitesConfig {
    fn default() -> Self {
        Self {
            generations: Generation::ALL.to_vec(),
            device_filter: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            generate_report: true,
            report_directory: ".fwarchive".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FwArchiveError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FwArchiveError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| FwArchiveError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["fwarchive.toml", ".fwarchive.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref input_root) = cli_args.input_root {
            self.paths.input_root = input_root.clone();
        }

        if let Some(ref output_root) = cli_args.output_root {
            self.paths.output_root = output_root.clone();
        }

        if let Some(backend) = cli_args.backend {
            self.decrypt.backend = backend;
        }

        if let Some(ref passphrase) = cli_args.passphrase {
            self.decrypt.passphrase = passphrase.clone();
        }

        if let Some(ref generations) = cli_args.generations {
            if !generations.is_empty() {
                let mut unique = Vec::new();
                for generation in generations {
                    if !unique.contains(generation) {
                        unique.push(*generation);
                    }
                }
                self.suites.generations = unique;
            }
        }

        if let Some(ref device_filter) = cli_args.device_filter {
            self.suites.device_filter = Some(device_filter.clone());
        }

        if cli_args.no_report {
            self.output.generate_report = false;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.decrypt.passphrase.is_empty() {
            return Err(FwArchiveError::Config {
                message: "Decryption passphrase must not be empty".to_string(),
            });
        }

        if self.decrypt.openssl_binary.trim().is_empty() {
            return Err(FwArchiveError::Config {
                message: "OpenSSL binary name must not be empty".to_string(),
            });
        }

        if self.suites.generations.is_empty() {
            return Err(FwArchiveError::Config {
                message: "At least one generation must be selected".to_string(),
            });
        }

        if self.output.report_directory.trim().is_empty() {
            return Err(FwArchiveError::Config {
                message: "Report directory name must not be empty".to_string(),
            });
        }

        self.device_regex()?;

        for pattern in &self.extract.extra_unknown_format_patterns {
            Regex::new(pattern).map_err(|e| FwArchiveError::Config {
                message: format!("Invalid unknown-format pattern '{}': {}", pattern, e),
            })?;
        }

        Ok(())
    }

    /// Empty filters count as unset.
    pub fn device_regex(&self) -> Result<Option<Regex>> {
        match self.suites.device_filter.as_deref() {
            None | Some("") => Ok(None),
            Some(pattern) => Regex::new(pattern)
                .map(Some)
                .map_err(|e| FwArchiveError::Config {
                    message: format!("Invalid device filter '{}': {}", pattern, e),
                }),
        }
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub input_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub backend: Option<DecryptBackend>,
    pub passphrase: Option<String>,
    pub generations: Option<Vec<Generation>>,
    pub device_filter: Option<String>,
    pub no_report: bool,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_root(mut self, input_root: Option<PathBuf>) -> Self {
        self.input_root = input_root;
        self
    }

    pub fn with_output_root(mut self, output_root: Option<PathBuf>) -> Self {
        self.output_root = output_root;
        self
    }

    pub fn with_backend(mut self, backend: Option<DecryptBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_passphrase(mut self, passphrase: Option<String>) -> Self {
        self.passphrase = passphrase;
        self
    }

    pub fn with_generations(mut self, generations: Option<Vec<Generation>>) -> Self {
        self.generations = generations;
        self
    }

    pub fn with_device_filter(mut self, device_filter: Option<String>) -> Self {
        self.device_filter = device_filter;
        self
    }

    pub fn with_no_report(mut self, no_report: bool) -> Self {
        self.no_report = no_report;
        self
    }
}
