//! Tuning parameters, one variant per frontend type.

use crate::error::ConfigError;

/// Delivery system of a frontend, as reported by `FE_GET_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontendType {
    /// DVB-S
    Qpsk,
    /// DVB-C
    Qam,
    /// DVB-T
    Ofdm,
}

impl FrontendType {
    /// Map the kernel's `fe_type_t` value. ATSC (3) is not supported.
    pub fn from_raw(value: u32) -> Result<Self, ConfigError> {
        match value {
            0 => Ok(FrontendType::Qpsk),
            1 => Ok(FrontendType::Qam),
            2 => Ok(FrontendType::Ofdm),
            other => Err(ConfigError::UnsupportedFrontend(other)),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            FrontendType::Qpsk => 0,
            FrontendType::Qam => 1,
            FrontendType::Ofdm => 2,
        }
    }
}

/// LNB polarization tag of a satellite transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarization {
    Horizontal,
    Vertical,
}

impl Polarization {
    /// LNB supply voltage selecting this polarization.
    pub fn voltage(self) -> Voltage {
        match self {
            Polarization::Horizontal => Voltage::V13,
            Polarization::Vertical => Voltage::V18,
        }
    }
}

/// 22 kHz tone, selects the LNB's high band when on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    On,
    Off,
}

impl Tone {
    /// `fe_sec_tone_mode_t`
    pub fn as_raw(self) -> i32 {
        match self {
            Tone::On => 0,
            Tone::Off => 1,
        }
    }
}

/// `fe_sec_voltage_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Voltage {
    V13,
    V18,
    Off,
}

impl Voltage {
    pub fn as_raw(self) -> i32 {
        match self {
            Voltage::V13 => 0,
            Voltage::V18 => 1,
            Voltage::Off => 2,
        }
    }
}

/// DiSEqC mini command (tone burst), `fe_sec_mini_cmd_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Burst {
    A,
    B,
}

impl Burst {
    pub fn as_raw(self) -> i32 {
        match self {
            Burst::A => 0,
            Burst::B => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SatelliteParams {
    /// Intermediate frequency in kHz.
    pub frequency: u32,
    pub inversion: u32,
    /// Symbols per second.
    pub symbol_rate: u32,
    pub fec: u32,
    pub sat_no: u32,
    pub tone: Tone,
    pub polarization: Polarization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CableParams {
    pub frequency: u32,
    pub inversion: u32,
    pub symbol_rate: u32,
    pub fec: u32,
    pub modulation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrestrialParams {
    pub frequency: u32,
    pub inversion: u32,
    pub bandwidth: u32,
    pub code_rate_hp: u32,
    pub code_rate_lp: u32,
    pub constellation: u32,
    pub transmission_mode: u32,
    pub guard_interval: u32,
    pub hierarchy: u32,
}

/// Everything needed to put a frontend on one transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningParams {
    Satellite(SatelliteParams),
    Cable(CableParams),
    Terrestrial(TerrestrialParams),
}

impl TuningParams {
    pub fn frontend_type(&self) -> FrontendType {
        match self {
            TuningParams::Satellite(_) => FrontendType::Qpsk,
            TuningParams::Cable(_) => FrontendType::Qam,
            TuningParams::Terrestrial(_) => FrontendType::Ofdm,
        }
    }

    pub fn frequency(&self) -> u32 {
        match self {
            TuningParams::Satellite(p) => p.frequency,
            TuningParams::Cable(p) => p.frequency,
            TuningParams::Terrestrial(p) => p.frequency,
        }
    }

    pub fn inversion(&self) -> u32 {
        match self {
            TuningParams::Satellite(p) => p.inversion,
            TuningParams::Cable(p) => p.inversion,
            TuningParams::Terrestrial(p) => p.inversion,
        }
    }

    /// Whether both parameter sets select the same transponder.
    ///
    /// A bouquet is keyed on (frequency, inversion, sat_no, tone, polarization);
    /// cable and terrestrial transponders only carry the first two.
    pub fn same_transponder(&self, other: &TuningParams) -> bool {
        match (self, other) {
            (TuningParams::Satellite(a), TuningParams::Satellite(b)) => {
                a.frequency == b.frequency
                    && a.inversion == b.inversion
                    && a.sat_no == b.sat_no
                    && a.tone == b.tone
                    && a.polarization == b.polarization
            }
            (TuningParams::Cable(a), TuningParams::Cable(b)) => {
                a.frequency == b.frequency && a.inversion == b.inversion
            }
            (TuningParams::Terrestrial(a), TuningParams::Terrestrial(b)) => {
                a.frequency == b.frequency && a.inversion == b.inversion
            }
            _ => false,
        }
    }
}
