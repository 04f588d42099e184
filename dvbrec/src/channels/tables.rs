//! Symbolic token tables used by the channel list.
//!
//! Values are the ones of the Linux DVB v3 frontend API, so a parsed token can
//! be passed to `FE_SET_FRONTEND` unchanged.

pub const INVERSION_OFF: u32 = 0;
pub const INVERSION_ON: u32 = 1;
pub const INVERSION_AUTO: u32 = 2;

pub const FEC_NONE: u32 = 0;
pub const FEC_AUTO: u32 = 9;

pub const QPSK: u32 = 0;

pub static INVERSION: &[(&str, u32)] = &[
    ("INVERSION_OFF", INVERSION_OFF),
    ("INVERSION_ON", INVERSION_ON),
    ("INVERSION_AUTO", INVERSION_AUTO),
];

pub static FEC: &[(&str, u32)] = &[
    ("FEC_NONE", FEC_NONE),
    ("FEC_1_2", 1),
    ("FEC_2_3", 2),
    ("FEC_3_4", 3),
    ("FEC_4_5", 4),
    ("FEC_5_6", 5),
    ("FEC_6_7", 6),
    ("FEC_7_8", 7),
    ("FEC_8_9", 8),
    ("FEC_AUTO", FEC_AUTO),
    ("FEC_3_5", 10),
    ("FEC_9_10", 11),
];

pub static MODULATION: &[(&str, u32)] = &[
    ("QPSK", QPSK),
    ("QAM_16", 1),
    ("QAM_32", 2),
    ("QAM_64", 3),
    ("QAM_128", 4),
    ("QAM_256", 5),
    ("QAM_AUTO", 6),
    ("VSB_8", 7),
    ("VSB_16", 8),
];

pub static BANDWIDTH: &[(&str, u32)] = &[
    ("BANDWIDTH_8_MHZ", 0),
    ("BANDWIDTH_7_MHZ", 1),
    ("BANDWIDTH_6_MHZ", 2),
    ("BANDWIDTH_AUTO", 3),
];

pub static GUARD_INTERVAL: &[(&str, u32)] = &[
    ("GUARD_INTERVAL_1_32", 0),
    ("GUARD_INTERVAL_1_16", 1),
    ("GUARD_INTERVAL_1_8", 2),
    ("GUARD_INTERVAL_1_4", 3),
    ("GUARD_INTERVAL_AUTO", 4),
];

pub static HIERARCHY: &[(&str, u32)] = &[
    ("HIERARCHY_NONE", 0),
    ("HIERARCHY_1", 1),
    ("HIERARCHY_2", 2),
    ("HIERARCHY_4", 3),
    ("HIERARCHY_AUTO", 4),
];

pub static TRANSMISSION_MODE: &[(&str, u32)] = &[
    ("TRANSMISSION_MODE_2K", 0),
    ("TRANSMISSION_MODE_8K", 1),
    ("TRANSMISSION_MODE_AUTO", 2),
];

/// Resolve `token` in `table`. Matching is exact; tokens are upper case.
pub fn lookup(table: &[(&str, u32)], token: &str) -> Option<u32> {
    table
        .iter()
        .find(|(name, _)| *name == token)
        .map(|&(_, value)| value)
}
