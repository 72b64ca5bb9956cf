use crate::catalog::Generation;
use crate::error::{FwArchiveError, Result};
use crate::extractor::pipeline::{ModuleReport, ModuleStatus};
use crate::scanner::SkippedModule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CaseStatus {
    Passed,
    Skipped { reason: String },
    Failed { failures: usize },
}

/// One device directory of a suite, or the explicit module list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub directory: Option<PathBuf>,
    pub status: CaseStatus,
    pub modules: Vec<ModuleReport>,
    pub excluded: Vec<SkippedModule>,
}

impl CaseReport {
    pub fn skipped<S: Into<String>>(name: S, directory: Option<PathBuf>, excluded: Vec<SkippedModule>, reason: &str) -> Self {
        Self {
            name: name.into(),
            directory,
            status: CaseStatus::Skipped {
                reason: reason.to_string(),
            },
            modules: Vec::new(),
            excluded,
        }
    }

    pub fn from_modules<S: Into<String>>(
        name: S,
        directory: Option<PathBuf>,
        modules: Vec<ModuleReport>,
        excluded: Vec<SkippedModule>,
    ) -> Self {
        let failures = modules.iter().filter(|m| m.is_failure()).count();
        let status = if failures > 0 {
            CaseStatus::Failed { failures }
        } else {
            CaseStatus::Passed
        };

        Self {
            name: name.into(),
            directory,
            status,
            modules,
            excluded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// `None` for modules given explicitly on the command line
    pub generation: Option<Generation>,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn name(&self) -> String {
        self.generation
            .map(|g| g.to_string())
            .unwrap_or_else(|| "modules".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub cases_passed: usize,
    pub cases_skipped: usize,
    pub cases_failed: usize,
    pub modules_extracted: usize,
    pub modules_ignored: usize,
    pub modules_failed: usize,
    pub modules_decrypted: usize,
    pub modules_excluded: usize,
    pub archive_entries: usize,
}

impl RunSummary {
    pub fn from_suites(suites: &[SuiteReport]) -> Self {
        let mut summary = Self::default();

        for case in suites.iter().flat_map(|s| s.cases.iter()) {
            match case.status {
                CaseStatus::Passed => summary.cases_passed += 1,
                CaseStatus::Skipped { .. } => summary.cases_skipped += 1,
                CaseStatus::Failed { .. } => summary.cases_failed += 1,
            }
            summary.modules_excluded += case.excluded.len();

            for module in &case.modules {
                if module.decrypted.is_some() {
                    summary.modules_decrypted += 1;
                }
                match &module.status {
                    ModuleStatus::Extracted { summary: archive } => {
                        summary.modules_extracted += 1;
                        summary.archive_entries += archive.entries;
                    }
                    ModuleStatus::IgnoredUnknownFormat { .. } => summary.modules_ignored += 1,
                    ModuleStatus::Failed { .. } => summary.modules_failed += 1,
                }
            }
        }

        summary
    }

    pub fn has_failures(&self) -> bool {
        self.cases_failed > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub decrypt_backend: String,
    pub generations: Vec<Generation>,
    pub device_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub suites: Vec<SuiteReport>,
    pub summary: RunSummary,
    pub config_used: ConfigSnapshot,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, suites: Vec<SuiteReport>, config_used: ConfigSnapshot) -> Self {
        let summary = RunSummary::from_suites(&suites);
        Self {
            started_at,
            finished_at: Utc::now(),
            suites,
            summary,
            config_used,
        }
    }

    pub fn failed_modules(&self) -> impl Iterator<Item = &ModuleReport> {
        self.suites
            .iter()
            .flat_map(|s| s.cases.iter())
            .flat_map(|c| c.modules.iter())
            .filter(|m| m.is_failure())
    }
}

/// Persists run reports under `<output_root>/<report_directory>`.
pub struct ReportWriter {
    report_directory: PathBuf,
}

impl ReportWriter {
    pub fn new(output_root: &Path, report_directory: &str) -> Self {
        Self {
            report_directory: output_root.join(report_directory),
        }
    }

    pub fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.report_directory).map_err(|e| FwArchiveError::InvalidPath {
            path: format!(
                "Cannot create report directory {}: {}",
                self.report_directory.display(),
                e
            ),
        })?;
        Ok(())
    }

    pub fn report_directory(&self) -> &Path {
        &self.report_directory
    }

    pub fn save(&self, report: &RunReport) -> Result<()> {
        self.initialize()?;
        self.save_report_json(report)?;
        self.save_report_text(report)?;
        Ok(())
    }

    fn save_report_json(&self, report: &RunReport) -> Result<()> {
        let report_path = self.report_directory.join("extraction_report.json");
        let json_content = serde_json::to_string_pretty(report).map_err(|e| FwArchiveError::Config {
            message: format!("Failed to serialize report to JSON: {}", e),
        })?;

        fs::write(&report_path, json_content)?;
        Ok(())
    }

    fn save_report_text(&self, report: &RunReport) -> Result<()> {
        let report_path = self.report_directory.join("extraction_report.txt");
        let mut file = fs::File::create(&report_path)?;

        writeln!(file, "Firmware Module Extraction Report")?;
        writeln!(file, "=================================")?;
        writeln!(file)?;
        writeln!(
            file,
            "Started:  {}",
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(
            file,
            "Finished: {}",
            report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(file, "Input root: {}", report.config_used.input_root.display())?;
        writeln!(file, "Output root: {}", report.config_used.output_root.display())?;
        writeln!(file, "Decryption: {}", report.config_used.decrypt_backend)?;
        writeln!(file)?;

        let s = &report.summary;
        writeln!(file, "Summary:")?;
        writeln!(
            file,
            "  Cases: {} passed, {} skipped, {} failed",
            s.cases_passed, s.cases_skipped, s.cases_failed
        )?;
        writeln!(
            file,
            "  Modules: {} extracted, {} ignored, {} failed, {} excluded",
            s.modules_extracted, s.modules_ignored, s.modules_failed, s.modules_excluded
        )?;
        writeln!(file, "  Decrypted envelopes: {}", s.modules_decrypted)?;
        writeln!(file, "  Archive entries written: {}", s.archive_entries)?;
        writeln!(file)?;

        for suite in &report.suites {
            writeln!(file, "[{}]", suite.name())?;
            for case in &suite.cases {
                let status = match &case.status {
                    CaseStatus::Passed => "PASSED".to_string(),
                    CaseStatus::Skipped { reason } => format!("SKIPPED ({})", reason),
                    CaseStatus::Failed { failures } => format!("FAILED ({} modules)", failures),
                };
                writeln!(file, "  {}: {}", case.name, status)?;

                for module in &case.modules {
                    let outcome = match &module.status {
                        ModuleStatus::Extracted { summary } => {
                            format!("{} entries from {}", summary.entries, summary.kind)
                        }
                        ModuleStatus::IgnoredUnknownFormat { reason } => {
                            format!("unrecognized, ignored: {}", reason)
                        }
                        ModuleStatus::Failed { error } => format!("error: {}", error),
                    };
                    writeln!(file, "    - {} ({})", module.path.display(), outcome)?;
                }
            }
            writeln!(file)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::archive::{ArchiveKind, ArchiveSummary};
    use crate::scanner::SkipReason;
    use std::time::Duration;
    use tempfile::TempDir;

    fn module(path: &str, status: ModuleStatus, decrypted: bool) -> ModuleReport {
        ModuleReport {
            path: PathBuf::from(path),
            decrypted: decrypted.then(|| PathBuf::from(format!("{}.decrypted", path))),
            output_directory: PathBuf::from("out"),
            status,
            duration: Duration::from_millis(5),
        }
    }

    fn create_test_suites() -> Vec<SuiteReport> {
        let extracted = ModuleStatus::Extracted {
            summary: ArchiveSummary {
                kind: ArchiveKind::Zip,
                entries: 3,
                retried: 0,
            },
        };

        vec![SuiteReport {
            generation: Some(Generation::ImahV1),
            cases: vec![
                CaseReport::from_modules(
                    "wm220-mavic",
                    None,
                    vec![
                        module("a_0801.bin", extracted.clone(), true),
                        module(
                            "wm100_0801.bin",
                            ModuleStatus::IgnoredUnknownFormat {
                                reason: "PUEK-2017-09 not published".to_string(),
                            },
                            false,
                        ),
                    ],
                    Vec::new(),
                ),
                CaseReport::from_modules(
                    "wm330-phantom_4_std",
                    None,
                    vec![module(
                        "b_0801.bin",
                        ModuleStatus::Failed {
                            error: "Unrecognized archive format".to_string(),
                        },
                        false,
                    )],
                    vec![SkippedModule {
                        path: PathBuf::from("wm330_0802_v01.00_0802.bin"),
                        reason: SkipReason::NonArchive,
                        detail: "direct `MA2x` Myriad firmware".to_string(),
                    }],
                ),
                CaseReport::skipped("ag406-agras_mg-1a", None, Vec::new(), "no package files"),
            ],
        }]
    }

    fn create_test_config() -> ConfigSnapshot {
        ConfigSnapshot {
            input_root: PathBuf::from("out"),
            output_root: PathBuf::from("out"),
            decrypt_backend: "openssl".to_string(),
            generations: vec![Generation::ImahV1],
            device_filter: None,
        }
    }

    #[test]
    fn test_case_status_from_modules() {
        let suites = create_test_suites();
        let cases = &suites[0].cases;
        assert_eq!(cases[0].status, CaseStatus::Passed);
        assert_eq!(cases[1].status, CaseStatus::Failed { failures: 1 });
        assert!(matches!(cases[2].status, CaseStatus::Skipped { .. }));
    }

    #[test]
    fn test_run_summary() {
        let summary = RunSummary::from_suites(&create_test_suites());

        assert_eq!(
            summary,
            RunSummary {
                cases_passed: 1,
                cases_skipped: 1,
                cases_failed: 1,
                modules_extracted: 1,
                modules_ignored: 1,
                modules_failed: 1,
                modules_decrypted: 1,
                modules_excluded: 1,
                archive_entries: 3,
            }
        );
        assert!(summary.has_failures());
    }

    #[test]
    fn test_report_files_written() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(temp_dir.path(), ".fwarchive");
        let report = RunReport::new(Utc::now(), create_test_suites(), create_test_config());

        writer.save(&report).unwrap();

        let json_path = writer.report_directory().join("extraction_report.json");
        let text_path = writer.report_directory().join("extraction_report.txt");
        assert!(json_path.exists());

        let parsed: RunReport = serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(parsed.summary, report.summary);

        let text = fs::read_to_string(text_path).unwrap();
        assert!(text.contains("[imah-v1]"));
        assert!(text.contains("wm330-phantom_4_std: FAILED (1 modules)"));
        assert!(text.contains("SKIPPED (no package files)"));
    }

    #[test]
    fn test_failed_modules_iterator() {
        let report = RunReport::new(Utc::now(), create_test_suites(), create_test_config());
        let failed: Vec<_> = report.failed_modules().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].path, PathBuf::from("b_0801.bin"));
    }
}
