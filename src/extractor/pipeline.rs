use crate::catalog::{Disposition, UNKNOWN_FORMAT_RULES};
use crate::config::Config;
use crate::error::{FwArchiveError, Result};
use crate::extractor::archive::{ArchiveSummary, Extractor, LibraryExtractor};
use crate::extractor::envelope::{create_decryptor, is_envelope_encrypted, Decryptor};
use crate::scanner::ModuleFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ModuleStatus {
    Extracted { summary: ArchiveSummary },
    IgnoredUnknownFormat { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleReport {
    pub path: PathBuf,
    pub decrypted: Option<PathBuf>,
    pub output_directory: PathBuf,
    pub status: ModuleStatus,
    pub duration: Duration,
}

impl ModuleReport {
    pub fn failed(path: &Path, error: &FwArchiveError, duration: Duration) -> Self {
        Self {
            path: path.to_path_buf(),
            decrypted: None,
            output_directory: PathBuf::new(),
            status: ModuleStatus::Failed {
                error: error.to_string(),
            },
            duration,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, ModuleStatus::Failed { .. })
    }
}

/// Mirror `input_dir` under `output_root`, dropping its first named
/// component: `out/wm220-mavic/pkg` becomes `<output_root>/wm220-mavic/pkg`.
/// Root and `.` components are skipped before that.
pub fn mirror_output_dir(input_dir: &Path, output_root: &Path) -> PathBuf {
    input_dir
        .components()
        .filter(|c| matches!(c, Component::Normal(_) | Component::ParentDir))
        .skip(1)
        .fold(output_root.to_path_buf(), |acc, c| acc.join(c.as_os_str()))
}

/// `dir` relative to `root`, comparing canonical paths when the literal
/// prefix does not match.
fn relative_to(dir: &Path, root: &Path) -> Option<PathBuf> {
    if let Ok(relative) = dir.strip_prefix(root) {
        return Some(relative.to_path_buf());
    }
    let dir = dir.canonicalize().ok()?;
    let root = root.canonicalize().ok()?;
    dir.strip_prefix(root).ok().map(Path::to_path_buf)
}

/// Decrypt-then-extract for a single module file.
pub struct ModuleExtractor {
    input_root: PathBuf,
    output_root: PathBuf,
    passphrase: String,
    decryptor: Box<dyn Decryptor>,
    extractor: Box<dyn Extractor>,
    unknown_format: ModuleFilter,
}

impl ModuleExtractor {
    pub fn new(
        input_root: PathBuf,
        output_root: PathBuf,
        passphrase: String,
        decryptor: Box<dyn Decryptor>,
        extractor: Box<dyn Extractor>,
    ) -> Result<Self> {
        Ok(Self {
            input_root,
            output_root,
            passphrase,
            decryptor,
            extractor,
            unknown_format: ModuleFilter::new(UNKNOWN_FORMAT_RULES)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let decryptor = create_decryptor(config.decrypt.backend, &config.decrypt.openssl_binary);
        let extractor = LibraryExtractor::new().with_retry_on_conflict(config.extract.retry_on_conflict);

        let mut module_extractor = Self::new(
            config.paths.input_root.clone(),
            config.paths.output_root.clone(),
            config.decrypt.passphrase.clone(),
            decryptor,
            Box::new(extractor),
        )?;

        for pattern in &config.extract.extra_unknown_format_patterns {
            module_extractor.allow_unknown_format(pattern, "configured")?;
        }

        Ok(module_extractor)
    }

    pub fn allow_unknown_format(&mut self, pattern: &str, reason: &str) -> Result<()> {
        self.unknown_format
            .add_pattern(pattern, Disposition::IgnoreUnknownFormat, reason)
    }

    /// Modules under the input root keep their path relative to it. Anything
    /// else falls back to [`mirror_output_dir`].
    pub fn output_directory_for(&self, module_path: &Path) -> PathBuf {
        let parent = module_path.parent().unwrap_or_else(|| Path::new(""));
        match relative_to(parent, &self.input_root) {
            Some(relative) => self.output_root.join(relative),
            None => mirror_output_dir(parent, &self.output_root),
        }
    }

    /// Returns `Err(UnrecognizedArchive)` for a non-archive module unless its
    /// name is on the unknown-format allow-list.
    pub fn process(&self, module_path: &Path) -> Result<ModuleReport> {
        let start = Instant::now();
        log::info!("Testcase file: {}", module_path.display());

        let stem = module_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| FwArchiveError::InvalidPath {
                path: module_path.display().to_string(),
            })?;
        let extension = module_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        let out_path = self.output_directory_for(module_path);

        let decrypted = if is_envelope_encrypted(module_path)? {
            fs::create_dir_all(&out_path)?;
            let target = out_path.join(format!("{}.decrypted{}", stem, extension));
            Some(self.decryptor.decrypt(module_path, &target, &self.passphrase)?)
        } else {
            None
        };
        let real_input = decrypted.as_deref().unwrap_or(module_path);

        let modules_path = out_path.join(format!("{}-extr1", stem));

        let status = match self.extractor.extract(real_input, &modules_path)? {
            Some(summary) => ModuleStatus::Extracted { summary },
            None => match self.unknown_format.classify(stem) {
                Some((_, reason)) => {
                    log::warn!(
                        "Unrecognized archive format of the module file: {}",
                        module_path.display()
                    );
                    ModuleStatus::IgnoredUnknownFormat {
                        reason: reason.to_string(),
                    }
                }
                None => {
                    return Err(FwArchiveError::UnrecognizedArchive {
                        path: module_path.display().to_string(),
                    })
                }
            },
        };

        Ok(ModuleReport {
            path: module_path.to_path_buf(),
            decrypted,
            output_directory: modules_path,
            status,
            duration: start.elapsed(),
        })
    }

    pub fn decryptor_name(&self) -> &'static str {
        self.decryptor.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::archive::tests::write_tar;
    use crate::extractor::archive::{list_files, ArchiveKind};
    use crate::extractor::envelope::tests::seal;
    use crate::extractor::envelope::{OpensslDecryptor, DEFAULT_PASSPHRASE};
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct RecordingExtractor {
        calls: RefCell<Vec<(PathBuf, PathBuf)>>,
        recognize: bool,
    }

    impl Extractor for RecordingExtractor {
        fn extract(&self, archive: &Path, dest: &Path) -> Result<Option<ArchiveSummary>> {
            self.calls
                .borrow_mut()
                .push((archive.to_path_buf(), dest.to_path_buf()));
            Ok(self.recognize.then_some(ArchiveSummary {
                kind: ArchiveKind::Zip,
                entries: 0,
                retried: 0,
            }))
        }
    }

    fn library_pipeline(root: &Path) -> ModuleExtractor {
        ModuleExtractor::new(
            root.to_path_buf(),
            root.to_path_buf(),
            DEFAULT_PASSPHRASE.to_string(),
            Box::new(OpensslDecryptor::new()),
            Box::new(LibraryExtractor::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_mirror_output_dir() {
        assert_eq!(
            mirror_output_dir(Path::new("out/wm220-mavic/pkg"), Path::new("out")),
            PathBuf::from("out/wm220-mavic/pkg")
        );
        assert_eq!(
            mirror_output_dir(Path::new("in/wm220-mavic/pkg"), Path::new("/tmp/res")),
            PathBuf::from("/tmp/res/wm220-mavic/pkg")
        );
        assert_eq!(
            mirror_output_dir(Path::new("pkg"), Path::new("out")),
            PathBuf::from("out")
        );
        assert_eq!(mirror_output_dir(Path::new(""), Path::new("out")), PathBuf::from("out"));
        assert_eq!(
            mirror_output_dir(Path::new("/srv/out/wm220-mavic/pkg"), Path::new("res")),
            PathBuf::from("res/out/wm220-mavic/pkg")
        );
    }

    #[test]
    fn test_output_directory_relative_to_input_root() {
        let temp_dir = TempDir::new().unwrap();
        let input_root = temp_dir.path().join("data").join("out");
        let output_root = temp_dir.path().join("res");
        let pipeline = ModuleExtractor::new(
            input_root.clone(),
            output_root.clone(),
            DEFAULT_PASSPHRASE.to_string(),
            Box::new(OpensslDecryptor::new()),
            Box::new(LibraryExtractor::new()),
        )
        .unwrap();

        let module = input_root.join("wm220-mavic").join("pkg").join("wm220_0801_v1_0801.bin");
        assert_eq!(
            pipeline.output_directory_for(&module),
            output_root.join("wm220-mavic").join("pkg")
        );

        let same_root = library_pipeline(&input_root);
        assert_eq!(
            same_root.output_directory_for(&module),
            input_root.join("wm220-mavic").join("pkg")
        );

        // Outside the input root the first named segment is dropped
        assert_eq!(
            pipeline.output_directory_for(Path::new("elsewhere/dev/pkg/m_0801.bin")),
            output_root.join("dev").join("pkg")
        );
    }

    #[test]
    fn test_plain_module_goes_straight_to_extractor() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("in").join("pkg");
        fs::create_dir_all(&package).unwrap();
        let module = package.join("wm220_0801_v1_0801.bin");
        fs::write(&module, b"plain").unwrap();

        let extractor = RecordingExtractor {
            calls: RefCell::new(Vec::new()),
            recognize: true,
        };
        let output_root = temp_dir.path().join("res");
        let pipeline = ModuleExtractor::new(
            temp_dir.path().join("in"),
            output_root.clone(),
            DEFAULT_PASSPHRASE.to_string(),
            Box::new(OpensslDecryptor::new()),
            Box::new(extractor),
        )
        .unwrap();

        let report = pipeline.process(&module).unwrap();
        assert!(report.decrypted.is_none());
        assert!(matches!(report.status, ModuleStatus::Extracted { .. }));

        let expected_dest = pipeline
            .output_directory_for(&module)
            .join("wm220_0801_v1_0801-extr1");
        assert_eq!(report.output_directory, expected_dest);
        assert!(expected_dest.starts_with(&output_root));
    }

    #[test]
    fn test_sealed_module_is_decrypted_then_extracted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("out");
        let package = root.join("wm335-phantom_4_pro_v2").join("pkg");
        fs::create_dir_all(&package).unwrap();

        let tar_bytes = write_tar(Vec::new(), &[("system/build.prop", b"ro.product=wm335")]);
        let module = package.join("wm335_0100_v1_0100.bin");
        fs::write(&module, seal(&tar_bytes, DEFAULT_PASSPHRASE, *b"12345678")).unwrap();

        let report = library_pipeline(&root).process(&module).unwrap();

        let decrypted = report.decrypted.clone().unwrap();
        assert_eq!(
            decrypted.file_name().unwrap().to_str().unwrap(),
            "wm335_0100_v1_0100.decrypted.bin"
        );
        assert_eq!(fs::read(&decrypted).unwrap(), tar_bytes);
        assert_eq!(
            fs::read(report.output_directory.join("system/build.prop")).unwrap(),
            b"ro.product=wm335"
        );
    }

    #[test]
    fn test_unrecognized_module_fails() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("out");
        let package = root.join("wm220-mavic").join("pkg");
        fs::create_dir_all(&package).unwrap();
        let module = package.join("wm220_0801_v1_0801.bin");
        fs::write(&module, b"IM*H garbage that is no archive").unwrap();

        let result = library_pipeline(&root).process(&module);
        assert!(matches!(result, Err(FwArchiveError::UnrecognizedArchive { .. })));
    }

    #[test]
    fn test_allow_listed_unrecognized_module_passes() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("out");
        let package = root.join("wm100-spark").join("pkg");
        fs::create_dir_all(&package).unwrap();
        let module = package.join("wm100_0801_v01.04.1000_0801.bin");
        fs::write(&module, b"still scrambled").unwrap();

        let report = library_pipeline(&root).process(&module).unwrap();
        assert!(matches!(report.status, ModuleStatus::IgnoredUnknownFormat { .. }));
        assert!(!report.output_directory.exists());
    }

    #[test]
    fn test_configured_allow_list_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("out");
        let package = root.join("zv900-goggles_2").join("pkg");
        fs::create_dir_all(&package).unwrap();
        let module = package.join("zv900_0801_v1_0801.bin");
        fs::write(&module, b"damaged").unwrap();

        let mut pipeline = library_pipeline(&root);
        assert!(pipeline.process(&module).is_err());

        pipeline.allow_unknown_format(r"^zv900_0801", "damaged dump").unwrap();
        let report = pipeline.process(&module).unwrap();
        match report.status {
            ModuleStatus::IgnoredUnknownFormat { reason } => assert_eq!(reason, "damaged dump"),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_rerun_reproduces_same_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("out");
        let package = root.join("wm240-mavic_2").join("pkg");
        fs::create_dir_all(&package).unwrap();
        let module = package.join("wm240_0801_v1_0801.bin");
        write_tar(
            fs::File::create(&module).unwrap(),
            &[("a.txt", b"A"), ("d/b.txt", b"B")],
        );

        let pipeline = library_pipeline(&root);
        let first = pipeline.process(&module).unwrap();
        let first_files = list_files(&first.output_directory).unwrap();
        let second = pipeline.process(&module).unwrap();

        assert_eq!(first.output_directory, second.output_directory);
        assert_eq!(list_files(&second.output_directory).unwrap(), first_files);
        assert_eq!(fs::read(second.output_directory.join("d/b.txt")).unwrap(), b"B");
    }
}
