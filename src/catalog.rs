//! Known firmware generations, the device directories produced for each of
//! them, and the hand-maintained exception tables.
//!
//! The tables mirror what the unpacking step leaves behind under `out/`; when
//! a new device or a new problematic module family shows up, it is added here.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Firmware signature generation a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Generation {
    /// Legacy `xV4` container
    Xv4,
    /// IMaH signature, first revision
    ImahV1,
    /// IMaH signature, second revision
    ImahV2,
}

impl Generation {
    pub const ALL: [Generation; 3] = [Generation::Xv4, Generation::ImahV1, Generation::ImahV2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Generation::Xv4 => "xv4",
            Generation::ImahV1 => "imah-v1",
            Generation::ImahV2 => "imah-v2",
        }
    }

    pub fn catalog(&self) -> &'static SuiteCatalog {
        match self {
            Generation::Xv4 => &XV4_SUITE,
            Generation::ImahV1 => &IMAH_V1_SUITE,
            Generation::ImahV2 => &IMAH_V2_SUITE,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a module whose name matches an exception rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Run it, but an unrecognized container is only a warning
    IgnoreUnknownFormat,
    /// Not an archive at all; never run
    SkipNonArchive,
    /// A format this tool does not handle; never run
    SkipUnsupported,
}

#[derive(Debug, Clone, Copy)]
pub struct ExceptionRule {
    pub pattern: &'static str,
    pub disposition: Disposition,
    pub reason: &'static str,
}

impl ExceptionRule {
    const fn new(pattern: &'static str, disposition: Disposition, reason: &'static str) -> Self {
        Self {
            pattern,
            disposition,
            reason,
        }
    }
}

#[derive(Debug)]
pub struct SuiteCatalog {
    pub generation: Generation,
    pub devices: &'static [&'static str],
    /// File name endings searched one directory below each device directory.
    pub module_suffixes: &'static [&'static str],
    /// Matched against the full module path.
    pub exclusions: &'static [ExceptionRule],
    /// Drop modules whose `_head.ini` says the scramble key was unavailable.
    pub skip_encrypted: bool,
}

/// Matched against the module file stem; these families may decrypt to
/// garbage or are damaged, so an unrecognized container is expected.
pub static UNKNOWN_FORMAT_RULES: &[ExceptionRule] = &[
    ExceptionRule::new(
        r"^(wm100)[a]?_(0801|0905).*$",
        Disposition::IgnoreUnknownFormat,
        "PUEK-2017-09 not published",
    ),
    ExceptionRule::new(
        r"^(wm620)_(0801|0802|0905).*$",
        Disposition::IgnoreUnknownFormat,
        "PUEK-2017-09 not published",
    ),
    ExceptionRule::new(
        r"^(wm335)_(0801|0802|0805|1301).*$",
        Disposition::IgnoreUnknownFormat,
        "PUEK-2017-11 not published",
    ),
    ExceptionRule::new(
        r"^(wm260|wm2605)_(0802).*$",
        Disposition::IgnoreUnknownFormat,
        "unsupported signature size - data not decrypted correctly",
    ),
    ExceptionRule::new(
        r"^(ag600)_(2403)_v06[.]00[.]01[.]10_.*",
        Disposition::IgnoreUnknownFormat,
        "truncated file",
    ),
];

pub static XV4_SUITE: SuiteCatalog = SuiteCatalog {
    generation: Generation::Xv4,
    devices: &[
        "gl300abc-radio_control",
        "gl300e-radio_control",
        "m600-matrice_600_hexacopter",
        "osmo_fc550-osmo_x5_gimbal",
        "osmo_fc550r-osmo_x5raw_gimbal",
        "osmo-osmo_x3_gimbal",
        "p3s-phantom_3_adv_quadcopter",
        "p3x-phantom_3_pro_quadcopter",
        "wm610-t600_inspire_1_x3_quadcopter",
        "wm610_fc550-t600_inspire_1_pro_x5_quadcopter",
        "zs600a-crystalsky_5_5inch",
        "zs600b-crystalsky_7_85in",
    ],
    // Android OTA/TGZ/TAR modules with ELFs inside
    module_suffixes: &["_m0800.bin", "_m1300.bin"],
    exclusions: &[ExceptionRule::new(
        r"^.*GL300E_RC_User_v.*_m1300[.]bin$",
        Disposition::SkipUnsupported,
        "'RKFW' RockChip firmware image",
    )],
    skip_encrypted: false,
};

pub static IMAH_V1_SUITE: SuiteCatalog = SuiteCatalog {
    generation: Generation::ImahV1,
    devices: &[
        "ag406-agras_mg-1a",
        "ag407-agras_mg-1p-rtk",
        "ag408-agras_mg-unk",
        "ag410-agras_t16",
        "ag411-agras_t20",
        "ag603-agras_unk_rtk",
        "gl811-goggles_racing_ed",
        "pm410-matrice200",
        "pm420-matrice200_v2",
        "rc001-inspire_2_rc",
        "rc002-spark_rc",
        "rc160-mavic_mini_rc",
        "rc220-mavic_rc",
        "rc230-mavic_air_rc",
        "rc240-mavic_2_rc",
        "tp703-aeroscope",
        "wm100-spark",
        "wm220-goggles_std",
        "wm220-mavic",
        "wm222-mavic_sp",
        "wm330-phantom_4_std",
        "wm331-phantom_4_pro",
        "wm332-phantom_4_adv",
        "wm334-phantom_4_rtk",
        "wm335-phantom_4_pro_v2",
        "wm336-phantom_4_mulspectral",
        "wm620-inspire_2",
        "xw607-robomaster_s1",
        "zv811-occusync_air_sys",
    ],
    // Android OTA/TGZ/TAR modules, some with boot images under another IMaH stage
    module_suffixes: &[
        "_0801.bin",
        "_0802.bin",
        "_0805.bin",
        "_0905.bin",
        "_0907.bin",
        "_1300.bin",
        "_1301.bin",
        "_1401.bin",
        "_1407.bin",
        "_2801.bin",
    ],
    exclusions: &[
        // v02 has the `MA2x` inside a .tgz, v01 is the bare image
        ExceptionRule::new(
            r"^.*wm330_0802_v01[.][0-9a-z_.-]*_0802[.]bin$",
            Disposition::SkipNonArchive,
            "direct `MA2x` Myriad firmware",
        ),
        ExceptionRule::new(
            r"^.*ag406_1401_v[0-9a-z_.-]*[.]bin$",
            Disposition::SkipNonArchive,
            "simple linear uC binary",
        ),
        ExceptionRule::new(
            r"^.*rc001_1401_v[0-9a-z_.-]*[.]bin$",
            Disposition::SkipNonArchive,
            "simple linear uC binary",
        ),
    ],
    skip_encrypted: true,
};

pub static IMAH_V2_SUITE: SuiteCatalog = SuiteCatalog {
    generation: Generation::ImahV2,
    devices: &[
        "ac103-osmo_action_2",
        "ag500-agras_t10",
        "ag501-agras_t30",
        "ag600-agras_t40_gimbal",
        "ag601-agras_t40",
        "ag700-agras_t25",
        "ag701-agras_t50",
        "asvl001-vid_transmission",
        "ch320-battery_station",
        "ec174-hassel_x1d_ii_50c_cam",
        "gl150-goggles_fpv_v1",
        "gl170-goggles_fpv_v2",
        "hg330-ronin_4d",
        "lt150-caddx_vis_air_unit_lt",
        "pm320-matrice30",
        "pm430-matrice300",
        "rc-n1-wm161b-mini_2n3_rc",
        "rc-n1-wm260-mavic_pro_3",
        "rc430-matrice300_rc",
        "rcjs170-racer_rc",
        "rcs231-mavic_air_2_rc",
        "rcss170-racer_rc_motion",
        "rm330-mini_rc_wth_monitor",
        "wm150-fpv_system",
        "wm160-mavic_mini",
        "wm1605-mini_se",
        "wm161-mini_2",
        "wm162-mini_3",
        "wm169-avata",
        "wm1695-o3_air_unit",
        "wm170-fpv_racer",
        "wm230-mavic_air",
        "wm231-mavic_air_2",
        "wm232-mavic_air_2s",
        "wm240-mavic_2",
        "wm245-mavic_2_enterpr",
        "wm246-mavic_2_enterpr_dual",
        "wm247-mavic_2_enterpr_rtk",
        "wm260-mavic_pro_3",
        "wm2605-mavic_3_classic",
        "wm265e-mavic_pro_3_enterpr",
        "wm265m-mavic_pro_3_mulspectr",
        "wm265t-mavic_pro_3_thermal",
        "zv900-goggles_2",
    ],
    module_suffixes: &[
        "_0104.bin",
        "_0701.bin",
        "_0702.bin",
        "_0801.bin",
        "_0802.bin",
        "_0805.bin",
        "_0901.bin",
        "_0905.bin",
        "_0907.bin",
        "_1300.bin",
        "_1301.bin",
        "_1407.bin",
        "_1502.bin",
        "_2403.bin",
        "_2801.bin",
    ],
    exclusions: &[
        ExceptionRule::new(
            r"^.*ec174_0801_v[0-9a-z_.-]*_0801[.]bin$",
            Disposition::SkipNonArchive,
            "firmware in `VHABCIM` format",
        ),
        ExceptionRule::new(
            r"^.*(ag500|ag501)_0104_v[0-9a-z_.-]*_0104[.]bin$",
            Disposition::SkipNonArchive,
            "linear uC memory dump",
        ),
        ExceptionRule::new(
            r"^.*(pm430|wm160|wm1605|wm161)_0905_v[0-9a-z_.-]*_0905[.]bin$",
            Disposition::SkipNonArchive,
            "NFZ data with index array",
        ),
    ],
    skip_encrypted: true,
};
