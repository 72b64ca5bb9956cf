//! Runs every device directory of a generation through the module pipeline.
//!
//! Each device directory is one case: it is skipped when nothing is left to
//! process after exclusions, and fails when any of its modules fails. Module
//! failures never stop the remaining modules of the case.

use crate::catalog::Generation;
use crate::error::{FwArchiveError, Result};
use crate::extractor::pipeline::{ModuleExtractor, ModuleReport};
use crate::extractor::report::{CaseReport, SuiteReport};
use crate::scanner::{DeviceScan, ModuleScanner};
use crate::ui::GracefulShutdown;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const NO_PACKAGE_FILES: &str = "no package files to test in this directory";

/// Progress of a running suite, handed to the progress callback.
#[derive(Debug, Clone, Default)]
pub struct SuiteProgress {
    pub cases_done: usize,
    pub cases_total: usize,
    pub current_case: String,
    pub current_module: Option<String>,
    pub modules_done: usize,
    pub modules_failed: usize,
}

/// What a run would do for one device directory.
#[derive(Debug, Clone, Serialize)]
pub struct CasePlan {
    pub generation: Generation,
    pub device: String,
    pub directory: PathBuf,
    pub scan: DeviceScan,
}

impl CasePlan {
    pub fn is_empty(&self) -> bool {
        self.scan.modules.is_empty()
    }
}

pub struct SuiteRunner<'a> {
    input_root: PathBuf,
    device_filter: Option<Regex>,
    pipeline: &'a ModuleExtractor,
    shutdown: &'a GracefulShutdown,
}

impl<'a> SuiteRunner<'a> {
    pub fn new(input_root: PathBuf, pipeline: &'a ModuleExtractor, shutdown: &'a GracefulShutdown) -> Self {
        Self {
            input_root,
            device_filter: None,
            pipeline,
            shutdown,
        }
    }

    pub fn with_device_filter(mut self, device_filter: Option<Regex>) -> Self {
        self.device_filter = device_filter;
        self
    }

    /// Device directory names of `generation` passing the device filter.
    pub fn devices(&self, generation: Generation) -> Vec<&'static str> {
        generation
            .catalog()
            .devices
            .iter()
            .copied()
            .filter(|device| {
                self.device_filter
                    .as_ref()
                    .map_or(true, |filter| filter.is_match(device))
            })
            .collect()
    }

    pub fn plan(&self, generation: Generation) -> Result<Vec<CasePlan>> {
        let scanner = ModuleScanner::new(generation.catalog())?;

        self.devices(generation)
            .into_iter()
            .map(|device| {
                let directory = self.input_root.join(device);
                let scan = scanner.scan_device(&directory)?;
                Ok(CasePlan {
                    generation,
                    device: device.to_string(),
                    directory,
                    scan,
                })
            })
            .collect()
    }

    pub fn run<F>(&self, generation: Generation, progress_callback: Option<&F>) -> Result<SuiteReport>
    where
        F: Fn(&SuiteProgress),
    {
        log::info!("Running {} suite from {}", generation, self.input_root.display());

        let plans = self.plan(generation)?;
        let mut progress = SuiteProgress {
            cases_total: plans.len(),
            ..SuiteProgress::default()
        };
        let mut cases = Vec::with_capacity(plans.len());

        for plan in plans {
            self.shutdown.check_shutdown()?;
            progress.current_case = plan.device.clone();

            let case = if plan.is_empty() {
                log::info!("{}: {}", plan.directory.display(), NO_PACKAGE_FILES);
                CaseReport::skipped(plan.device, Some(plan.directory), plan.scan.skipped, NO_PACKAGE_FILES)
            } else {
                let paths: Vec<PathBuf> = plan.scan.modules.iter().map(|m| m.path.clone()).collect();
                let modules = self.process_modules(&paths, &mut progress, progress_callback)?;
                CaseReport::from_modules(plan.device, Some(plan.directory), modules, plan.scan.skipped)
            };

            progress.cases_done += 1;
            progress.current_module = None;
            if let Some(callback) = progress_callback {
                callback(&progress);
            }
            cases.push(case);
        }

        Ok(SuiteReport {
            generation: Some(generation),
            cases,
        })
    }

    /// Modules named explicitly, without catalog filtering.
    pub fn run_modules<F>(&self, paths: &[PathBuf], progress_callback: Option<&F>) -> Result<SuiteReport>
    where
        F: Fn(&SuiteProgress),
    {
        let mut progress = SuiteProgress {
            cases_total: 1,
            current_case: "modules".to_string(),
            ..SuiteProgress::default()
        };

        for path in paths {
            if !path.is_file() {
                return Err(FwArchiveError::InvalidPath {
                    path: format!("{} is not a module file", path.display()),
                });
            }
        }

        let modules = self.process_modules(paths, &mut progress, progress_callback)?;

        progress.cases_done = 1;
        progress.current_module = None;
        if let Some(callback) = progress_callback {
            callback(&progress);
        }

        Ok(SuiteReport {
            generation: None,
            cases: vec![CaseReport::from_modules("modules", None, modules, Vec::new())],
        })
    }

    fn process_modules<F>(
        &self,
        paths: &[PathBuf],
        progress: &mut SuiteProgress,
        progress_callback: Option<&F>,
    ) -> Result<Vec<ModuleReport>>
    where
        F: Fn(&SuiteProgress),
    {
        let mut reports = Vec::with_capacity(paths.len());

        for path in paths {
            self.shutdown.check_shutdown()?;

            progress.current_module = Some(display_name(path));
            if let Some(callback) = progress_callback {
                callback(progress);
            }

            let report = self.process_one(path);
            if report.is_failure() {
                progress.modules_failed += 1;
            }
            progress.modules_done += 1;
            reports.push(report);
        }

        Ok(reports)
    }

    fn process_one(&self, path: &Path) -> ModuleReport {
        let start = Instant::now();
        match self.pipeline.process(path) {
            Ok(report) => report,
            Err(err) => {
                log::error!("{}: {}", path.display(), err);
                ModuleReport::failed(path, &err, start.elapsed())
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
