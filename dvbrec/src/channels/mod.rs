//! Channel catalog loaded from a colon separated channel list.
//!
//! Each line describes one channel; the tuning fields in front of the
//! trailing `video_pid:audio_pid` pair depend on the frontend type:
//!
//! ```text
//! QPSK: name:freq:pol:sat_no:sym_rate:vpid:apid
//! QAM:  name:freq:inversion:sym_rate:fec:modulation:vpid:apid
//! OFDM: name:freq:inversion:bandwidth:fec_hp:fec_lp:modulation:transmission_mode:guard_interval:hierarchy:vpid:apid
//! ```
//!
//! Channels whose tuning parameters select the same transponder are grouped
//! into one [`Bouquet`].

pub mod params;
pub mod tables;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info, warn};
use thiserror::Error;

use crate::error::ConfigError;
pub use params::{
    Burst, CableParams, FrontendType, Polarization, SatelliteParams, TerrestrialParams, Tone,
    TuningParams, Voltage,
};
use tables::lookup;

/// LNB local oscillator switch-over, MHz.
const HIGH_BAND_THRESHOLD: u32 = 11700;
const LOF_HIGH: u32 = 10600;
const LOF_LOW: u32 = 9750;

/// One TV service of a bouquet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub video_pid: u16,
    pub audio_pid: u16,
    /// Index of the owning bouquet in the catalog.
    pub bouquet: usize,
}

/// Channels sharing one transponder; tuning to it tunes all of them.
#[derive(Debug, Clone)]
pub struct Bouquet {
    pub params: TuningParams,
    pub channels: Vec<Channel>,
}

/// Why a channel list line was rejected.
#[derive(Error, Debug, PartialEq, Eq)]
enum LineError {
    #[error("expected {expected} fields, got {actual}")]
    TooFewFields { expected: usize, actual: usize },

    #[error("invalid number {0:?}")]
    BadNumber(String),

    #[error("unknown token {0:?}")]
    UnknownToken(String),

    #[error("invalid polarization {0:?}")]
    BadPolarization(String),

    #[error("frequency {0} MHz is out of the LNB range")]
    BadFrequency(u32),
}

struct ParsedLine {
    name: String,
    params: TuningParams,
    video_pid: u16,
    audio_pid: u16,
}

/// The immutable set of bouquets known to a device.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    bouquets: Vec<Bouquet>,
    /// channel name -> (bouquet index, channel index)
    index: HashMap<String, (usize, usize)>,
}

impl Catalog {
    /// Read the channel list at `path`.
    pub fn load(path: impl AsRef<Path>, frontend: FrontendType) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::ChannelFile {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::parse(BufReader::new(file), frontend);
        info!(
            "[Channels] Loaded {} channels in {} bouquets from {:?}",
            catalog.len(),
            catalog.bouquets.len(),
            path
        );
        Ok(catalog)
    }

    /// Parse a channel list. Lines that cannot be used are logged and skipped.
    ///
    /// Names need not be UTF-8; lists written by the zap tools are often
    /// Latin-1. Invalid sequences are replaced.
    pub fn parse<R: BufRead>(mut reader: R, frontend: FrontendType) -> Self {
        let mut catalog = Catalog::default();
        let mut raw = Vec::new();
        let mut lineno = 0;

        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) => break,
                Ok(_) => lineno += 1,
                Err(e) => {
                    warn!("[Channels] Read error after line {}: {}", lineno, e);
                    break;
                }
            }
            let line = String::from_utf8_lossy(&raw);
            if let Cow::Owned(_) = line {
                debug!("[Channels] Line {} is not valid UTF-8", lineno);
            }
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_line(line, frontend) {
                Ok(parsed) if parsed.video_pid == 0 => {
                    debug!("[Channels] Skipping non-TV service {:?}", parsed.name);
                }
                Ok(parsed) => catalog.insert(parsed),
                Err(e) => {
                    warn!("[Channels] Skipping line {}: {}", lineno, e);
                }
            }
        }

        catalog
    }

    fn insert(&mut self, parsed: ParsedLine) {
        if self.index.contains_key(&parsed.name) {
            warn!("[Channels] Duplicate channel {:?} ignored", parsed.name);
            return;
        }

        let bouquet = match self
            .bouquets
            .iter()
            .position(|b| b.params.same_transponder(&parsed.params))
        {
            Some(pos) => pos,
            None => {
                self.bouquets.push(Bouquet {
                    params: parsed.params,
                    channels: Vec::new(),
                });
                self.bouquets.len() - 1
            }
        };

        let channels = &mut self.bouquets[bouquet].channels;
        self.index
            .insert(parsed.name.clone(), (bouquet, channels.len()));
        channels.push(Channel {
            name: parsed.name,
            video_pid: parsed.video_pid,
            audio_pid: parsed.audio_pid,
            bouquet,
        });
    }

    pub fn bouquets(&self) -> &[Bouquet] {
        &self.bouquets
    }

    /// Look up a channel together with its bouquet.
    pub fn find(&self, name: &str) -> Option<(&Bouquet, &Channel)> {
        let &(b, c) = self.index.get(name)?;
        let bouquet = &self.bouquets[b];
        Some((bouquet, &bouquet.channels[c]))
    }

    /// Channel names grouped by bouquet, in file order.
    pub fn bouquet_list(&self) -> Vec<Vec<String>> {
        self.bouquets
            .iter()
            .map(|b| b.channels.iter().map(|c| c.name.clone()).collect())
            .collect()
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn parse_line(line: &str, frontend: FrontendType) -> Result<ParsedLine, LineError> {
    let fields: Vec<&str> = line.split(':').map(str::trim).collect();
    let tuning_fields = match frontend {
        FrontendType::Qpsk => 4,
        FrontendType::Qam => 5,
        FrontendType::Ofdm => 9,
    };
    let expected = 1 + tuning_fields + 2;
    if fields.len() < expected {
        return Err(LineError::TooFewFields {
            expected,
            actual: fields.len(),
        });
    }

    let t = &fields[1..=tuning_fields];
    let params = match frontend {
        FrontendType::Qpsk => parse_qpsk(t)?,
        FrontendType::Qam => TuningParams::Cable(CableParams {
            frequency: number(t[0])?,
            inversion: token(tables::INVERSION, t[1])?,
            symbol_rate: number(t[2])?,
            fec: token(tables::FEC, t[3])?,
            modulation: token(tables::MODULATION, t[4])?,
        }),
        FrontendType::Ofdm => TuningParams::Terrestrial(TerrestrialParams {
            frequency: number(t[0])?,
            inversion: token(tables::INVERSION, t[1])?,
            bandwidth: token(tables::BANDWIDTH, t[2])?,
            code_rate_hp: token(tables::FEC, t[3])?,
            code_rate_lp: token(tables::FEC, t[4])?,
            constellation: token(tables::MODULATION, t[5])?,
            transmission_mode: token(tables::TRANSMISSION_MODE, t[6])?,
            guard_interval: token(tables::GUARD_INTERVAL, t[7])?,
            hierarchy: token(tables::HIERARCHY, t[8])?,
        }),
    };

    Ok(ParsedLine {
        name: fields[0].to_string(),
        params,
        video_pid: pid(fields[tuning_fields + 1])?,
        audio_pid: pid(fields[tuning_fields + 2])?,
    })
}

fn parse_qpsk(t: &[&str]) -> Result<TuningParams, LineError> {
    let raw = number(t[0])?;
    let (lof, tone) = if raw > HIGH_BAND_THRESHOLD {
        (LOF_HIGH, Tone::On)
    } else {
        (LOF_LOW, Tone::Off)
    };
    let frequency = raw
        .checked_sub(lof)
        .and_then(|f| f.checked_mul(1000))
        .ok_or(LineError::BadFrequency(raw))?;

    // Legacy lists tag `v` entries as horizontal; the tag only selects the
    // LNB voltage and the DiSEqC polarization bit.
    let polarization = match t[1] {
        "v" | "V" => Polarization::Horizontal,
        "h" | "H" => Polarization::Vertical,
        other => return Err(LineError::BadPolarization(other.to_string())),
    };

    Ok(TuningParams::Satellite(SatelliteParams {
        frequency,
        inversion: tables::INVERSION_AUTO,
        symbol_rate: number(t[3])?
            .checked_mul(1000)
            .ok_or_else(|| LineError::BadNumber(t[3].to_string()))?,
        fec: tables::FEC_AUTO,
        sat_no: number(t[2])?,
        tone,
        polarization,
    }))
}

fn number(field: &str) -> Result<u32, LineError> {
    field
        .parse()
        .map_err(|_| LineError::BadNumber(field.to_string()))
}

fn token(table: &[(&str, u32)], field: &str) -> Result<u32, LineError> {
    lookup(table, field).ok_or_else(|| LineError::UnknownToken(field.to_string()))
}

/// PID fields may carry extras (`101+102`, `102,103`, `102=eng`); only the
/// leading number counts.
fn pid(field: &str) -> Result<u16, LineError> {
    let digits = field
        .find(|c: char| !c.is_ascii_digit())
        .map_or(field, |end| &field[..end]);
    match digits.parse::<u16>() {
        Ok(v) if v <= 0x1FFF => Ok(v),
        _ => Err(LineError::BadNumber(field.to_string())),
    }
}
