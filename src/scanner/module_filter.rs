use crate::catalog::{Disposition, ExceptionRule};
use crate::error::Result;
use memchr::memmem;
use regex::{Regex, RegexBuilder};
use std::fs;
use std::path::Path;

const SCRAMBLE_KEY_MARKER: &[u8] = b"scramble_key_encrypted";

struct CompiledRule {
    regex: Regex,
    disposition: Disposition,
    reason: String,
}

/// A compiled exception table. Patterns are case-insensitive and anchored the
/// way they are written; a leading `^` with no trailing `$` matches a prefix.
pub struct ModuleFilter {
    rules: Vec<CompiledRule>,
}

impl ModuleFilter {
    pub fn new(rules: &[ExceptionRule]) -> Result<Self> {
        let mut filter = Self { rules: Vec::new() };
        for rule in rules {
            filter.add_pattern(rule.pattern, rule.disposition, rule.reason)?;
        }
        Ok(filter)
    }

    pub fn add_pattern(
        &mut self,
        pattern: &str,
        disposition: Disposition,
        reason: &str,
    ) -> Result<()> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.rules.push(CompiledRule {
            regex,
            disposition,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// First rule matching `text`, as `(disposition, reason)`.
    pub fn classify(&self, text: &str) -> Option<(Disposition, &str)> {
        self.rules
            .iter()
            .find(|rule| rule.regex.is_match(text))
            .map(|rule| (rule.disposition, rule.reason.as_str()))
    }
}

/// Whether the module was unpacked without its scramble key applied, so the
/// payload is still encrypted and running further checks on it is pointless.
///
/// Looks for `<prefix>_head.ini` next to a `<prefix>_<id>.bin` module. A path
/// not following that naming, or an INI which cannot be read, counts as not
/// encrypted.
pub fn is_module_unsigned_encrypted(module_path: &Path) -> bool {
    let module_name_re = match RegexBuilder::new(r"^(.*)_m?([0-9]{4})[.]bin$")
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re,
        Err(_) => return false,
    };

    let path_str = module_path.to_string_lossy();
    let Some(captures) = module_name_re.captures(&path_str) else {
        return false;
    };

    let ini_path = format!("{}_head.ini", &captures[1]);
    match fs::read(&ini_path) {
        Ok(content) => memmem::find(&content, SCRAMBLE_KEY_MARKER).is_some(),
        Err(e) => {
            log::info!("Could not check INI for: {} ({})", path_str, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{UNKNOWN_FORMAT_RULES, IMAH_V1_SUITE, IMAH_V2_SUITE, XV4_SUITE};
    use tempfile::TempDir;

    #[test]
    fn test_unknown_format_allow_list() {
        let filter = ModuleFilter::new(UNKNOWN_FORMAT_RULES).unwrap();

        assert!(filter.classify("wm100_0801_v01.04.1000_20170830_0801").is_some());
        assert!(filter.classify("WM100A_0905_v03.02.43.20").is_some());
        assert!(filter.classify("wm620_0802_v01.01.0000").is_some());
        assert!(filter.classify("wm335_1301_v00.01").is_some());
        assert!(filter.classify("wm2605_0802_v10.00.02.03").is_some());
        assert!(filter.classify("ag600_2403_v06.00.01.10_20211112").is_some());

        assert!(!filter.classify("wm100_0802_v01").is_some());
        assert!(!filter.classify("wm220_0801_v01").is_some());
        assert!(!filter.classify("ag600_2403_v06.00.01.11_20211112").is_some());
        // Anchored at the start of the stem
        assert!(!filter.classify("xwm100_0801").is_some());
    }

    #[test]
    fn test_generation_exclusions() {
        let xv4 = ModuleFilter::new(XV4_SUITE.exclusions).unwrap();
        let excluded = xv4.classify("out/gl300e-radio_control/GL300E_RC_User_v1.0/GL300E_RC_User_v1.0_m1300.bin");
        assert_eq!(excluded.map(|(d, _)| d), Some(Disposition::SkipUnsupported));
        assert!(!xv4.classify("out/gl300e-radio_control/x/GL300E_RC_User_v1.0_m0800.bin").is_some());

        let v1 = ModuleFilter::new(IMAH_V1_SUITE.exclusions).unwrap();
        assert!(v1.classify("out/wm330-phantom_4_std/a/wm330_0802_v01.05.0000_0802.bin").is_some());
        assert!(!v1.classify("out/wm330-phantom_4_std/a/wm330_0802_v02.05.0000_0802.bin").is_some());
        assert!(v1.classify("out/ag406-agras_mg-1a/p/AG406_1401_v03.01.bin").is_some());

        let v2 = ModuleFilter::new(IMAH_V2_SUITE.exclusions).unwrap();
        assert!(v2.classify("out/wm161-mini_2/p/wm161_0905_v00.10_0905.bin").is_some());
        assert!(v2.classify("out/ag501-agras_t30/p/ag501_0104_v01.00_0104.bin").is_some());
        assert!(!v2.classify("out/wm162-mini_3/p/wm162_0905_v00.10_0905.bin").is_some());
    }

    #[test]
    fn test_custom_pattern_rejected_when_invalid() {
        let mut filter = ModuleFilter::new(&[]).unwrap();
        assert!(!filter.classify("zv900_0801_v1").is_some());
        assert!(filter
            .add_pattern("(broken", Disposition::IgnoreUnknownFormat, "user")
            .is_err());
        filter
            .add_pattern(r"^zv900_0801", Disposition::IgnoreUnknownFormat, "user")
            .unwrap();
        assert_eq!(
            filter.classify("ZV900_0801_v1").map(|(_, r)| r),
            Some("user")
        );
    }

    #[test]
    fn test_encrypted_module_with_marker() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("wm220_0801_v01.bin_0801.bin");
        std::fs::write(&module, b"\x00\x01").unwrap();
        std::fs::write(
            temp_dir.path().join("wm220_0801_v01.bin_head.ini"),
            "[header]\nscramble_key_encrypted=PUEK-2017-09\n",
        )
        .unwrap();

        assert!(is_module_unsigned_encrypted(&module));
    }

    #[test]
    fn test_encrypted_module_marker_absent() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("wm220_m0801.bin");
        std::fs::write(
            temp_dir.path().join("wm220_head.ini"),
            "[header]\nscramble_key_plain=PUEK-2017-09\n",
        )
        .unwrap();

        assert!(!is_module_unsigned_encrypted(&module));
    }

    #[test]
    fn test_encrypted_module_missing_ini() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("wm220_0801.bin");

        assert!(!is_module_unsigned_encrypted(&module));
    }

    #[test]
    fn test_encrypted_module_name_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("wm220_head.ini"),
            "scramble_key_encrypted",
        )
        .unwrap();

        assert!(!is_module_unsigned_encrypted(&temp_dir.path().join("wm220_080.bin")));
        assert!(!is_module_unsigned_encrypted(&temp_dir.path().join("wm220_0801.img")));
    }
}
