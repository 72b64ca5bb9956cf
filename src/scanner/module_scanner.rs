use crate::catalog::{Disposition, SuiteCatalog};
use crate::error::Result;
use crate::scanner::module_filter::{is_module_unsigned_encrypted, ModuleFilter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleFile {
    pub path: PathBuf,
    /// `wm220_0801_v01.05.0000_0801` for `.../wm220_0801_v01.05.0000_0801.bin`
    pub stem: String,
    pub size: u64,
}

impl ModuleFile {
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            path,
            stem,
            size: metadata.len(),
        })
    }

    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NonArchive,
    Unsupported,
    /// Extracted without the scramble key, see `is_module_unsigned_encrypted`
    Encrypted,
}

impl SkipReason {
    /// `None` for dispositions which still let the module run.
    pub fn from_disposition(disposition: Disposition) -> Option<Self> {
        match disposition {
            Disposition::SkipNonArchive => Some(SkipReason::NonArchive),
            Disposition::SkipUnsupported => Some(SkipReason::Unsupported),
            Disposition::IgnoreUnknownFormat => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedModule {
    pub path: PathBuf,
    pub reason: SkipReason,
    pub detail: String,
}

/// Candidate modules of one device directory, after exclusions.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DeviceScan {
    pub modules: Vec<ModuleFile>,
    pub skipped: Vec<SkippedModule>,
}

/// Expands `<device dir>/*/*<suffix>` for each suffix of a suite.
pub struct ModuleScanner {
    module_suffixes: Vec<String>,
    exclusions: ModuleFilter,
    skip_encrypted: bool,
}

impl ModuleScanner {
    pub fn new(catalog: &SuiteCatalog) -> Result<Self> {
        Ok(Self {
            module_suffixes: catalog
                .module_suffixes
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclusions: ModuleFilter::new(catalog.exclusions)?,
            skip_encrypted: catalog.skip_encrypted,
        })
    }

    pub fn scan_device(&self, device_dir: &Path) -> Result<DeviceScan> {
        let mut scan = DeviceScan::default();

        for path in self.find_candidates(device_dir) {
            let path_str = path.to_string_lossy().to_string();

            if let Some((disposition, reason)) = self.exclusions.classify(&path_str) {
                if let Some(skip) = SkipReason::from_disposition(disposition) {
                    log::debug!("Excluding {}: {}", path_str, reason);
                    scan.skipped.push(SkippedModule {
                        path,
                        reason: skip,
                        detail: reason.to_string(),
                    });
                    continue;
                }
            }

            if self.skip_encrypted && is_module_unsigned_encrypted(&path) {
                log::info!("Skipping module left encrypted: {}", path_str);
                scan.skipped.push(SkippedModule {
                    path,
                    reason: SkipReason::Encrypted,
                    detail: "extracted in encrypted form, needs non-public key".to_string(),
                });
                continue;
            }

            scan.modules.push(ModuleFile::from_path(path)?);
        }

        Ok(scan)
    }

    /// Regular files exactly two levels below `device_dir`, grouped by suffix
    /// in suffix order and sorted by path within each group. Hidden entries are
    /// never matched, same as a shell glob.
    pub fn find_candidates(&self, device_dir: &Path) -> Vec<PathBuf> {
        let mut buckets: Vec<Vec<PathBuf>> = vec![Vec::new(); self.module_suffixes.len()];

        if !device_dir.is_dir() {
            return Vec::new();
        }

        let walker = WalkDir::new(device_dir)
            .min_depth(2)
            .max_depth(2)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::debug!("Scan error under {}: {}", device_dir.display(), err);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                continue;
            };

            if let Some(index) = self
                .module_suffixes
                .iter()
                .position(|suffix| name.ends_with(suffix.as_str()))
            {
                buckets[index].push(entry.into_path());
            }
        }

        buckets.into_iter().flatten().collect()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IMAH_V1_SUITE, XV4_SUITE};
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"data").unwrap();
    }

    #[test]
    fn test_find_candidates_depth_and_order() {
        let temp_dir = TempDir::new().unwrap();
        let device = temp_dir.path().join("wm220-mavic");

        touch(&device.join("pkg_b").join("wm220_1300_v1_1300.bin"));
        touch(&device.join("pkg_a").join("wm220_0801_v1_0801.bin"));
        touch(&device.join("pkg_b").join("wm220_0801_v2_0801.bin"));
        // Too shallow and too deep
        touch(&device.join("wm220_0801_top_0801.bin"));
        touch(&device.join("pkg_a").join("nested").join("wm220_0801_deep_0801.bin"));
        // Hidden, wrong suffix, directory with a matching name
        touch(&device.join("pkg_a").join(".wm220_0801.bin"));
        touch(&device.join("pkg_a").join("wm220_0801_head.ini"));
        fs::create_dir_all(device.join("pkg_a").join("dir_0802.bin")).unwrap();

        let scanner = ModuleScanner::new(&IMAH_V1_SUITE).unwrap();
        let found = scanner.find_candidates(&device);

        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(&device).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "pkg_a/wm220_0801_v1_0801.bin",
                "pkg_b/wm220_0801_v2_0801.bin",
                "pkg_b/wm220_1300_v1_1300.bin",
            ]
        );
    }

    #[test]
    fn test_missing_device_directory() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = ModuleScanner::new(&XV4_SUITE).unwrap();

        let scan = scanner.scan_device(&temp_dir.path().join("nope")).unwrap();
        assert!(scan.modules.is_empty());
        assert!(scan.skipped.is_empty());
    }

    #[test]
    fn test_scan_device_applies_exclusions() {
        let temp_dir = TempDir::new().unwrap();
        let device = temp_dir.path().join("gl300e-radio_control");
        touch(&device.join("p").join("GL300E_RC_User_v1.0_m1300.bin"));
        touch(&device.join("p").join("GL300E_RC_User_v1.0_m0800.bin"));

        let scanner = ModuleScanner::new(&XV4_SUITE).unwrap();
        let scan = scanner.scan_device(&device).unwrap();

        assert_eq!(scan.modules.len(), 1);
        assert_eq!(scan.modules[0].stem, "GL300E_RC_User_v1.0_m0800");
        assert_eq!(scan.skipped.len(), 1);
        assert_eq!(scan.skipped[0].reason, SkipReason::Unsupported);
    }

    #[test]
    fn test_scan_device_skips_encrypted_modules() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("wm100-spark").join("p");
        touch(&package.join("wm100_0801_v1_0801.bin"));
        fs::write(
            package.join("wm100_0801_v1_head.ini"),
            "scramble_key_encrypted=PUEK-2017-09",
        )
        .unwrap();
        touch(&package.join("wm100_0802_v1_0802.bin"));

        let scanner = ModuleScanner::new(&IMAH_V1_SUITE).unwrap();
        let scan = scanner.scan_device(&temp_dir.path().join("wm100-spark")).unwrap();

        assert_eq!(scan.modules.len(), 1);
        assert_eq!(scan.modules[0].stem, "wm100_0802_v1_0802");
        assert_eq!(scan.skipped[0].reason, SkipReason::Encrypted);
    }

    #[test]
    fn test_xv4_does_not_check_ini() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("p3x-phantom_3_pro_quadcopter").join("p");
        touch(&package.join("P3X_FW_V01_m0800.bin"));
        fs::write(package.join("P3X_FW_V01_head.ini"), "scramble_key_encrypted").unwrap();

        let scanner = ModuleScanner::new(&XV4_SUITE).unwrap();
        let scan = scanner
            .scan_device(&temp_dir.path().join("p3x-phantom_3_pro_quadcopter"))
            .unwrap();

        assert_eq!(scan.modules.len(), 1);
    }
}
