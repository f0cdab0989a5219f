//! Raw GNSS observation records

use hifitime::Epoch;

use crate::prelude::SV;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of frequency slots carried per observation record
pub const NFREQ: usize = 3;

/// Observation code, as far as the code bias correction
/// needs to distinguish them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ObsCode {
    /// No observation on this slot
    #[default]
    None,
    /// C/A derived code (C1)
    C1,
    /// Precise code (P1)
    P1,
    /// C2 civil code
    C2,
    /// Precise code (P2)
    P2,
    /// L5/E5a code
    C5,
}

impl ObsCode {
    pub(crate) fn is_c1(&self) -> bool {
        matches!(self, Self::C1)
    }
    pub(crate) fn is_c2(&self) -> bool {
        matches!(self, Self::C2)
    }
}

/// One epoch of raw measurements from a single satellite.
/// Absent observables are encoded as 0.0, following the
/// receiver convention.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationData {
    /// Sampling [Epoch]
    pub time: Epoch,
    /// [SV] identity
    pub sat: SV,
    /// Pseudo range per frequency slot [m]
    pub pseudo_range_m: [f64; NFREQ],
    /// Carrier phase per frequency slot [cycles]
    pub phase_cycles: [f64; NFREQ],
    /// Doppler per frequency slot [Hz]
    pub doppler_hz: [f64; NFREQ],
    /// SNR per frequency slot [0.25 dB-Hz]
    pub snr_qdbhz: [u16; NFREQ],
    /// Observation code per frequency slot
    pub code: [ObsCode; NFREQ],
}

impl ObservationData {
    /// Bare record: time tag and identity only, observables to be filled.
    pub fn new(time: Epoch, sat: SV) -> Self {
        Self {
            time,
            sat,
            pseudo_range_m: [0.0; NFREQ],
            phase_cycles: [0.0; NFREQ],
            doppler_hz: [0.0; NFREQ],
            snr_qdbhz: [0; NFREQ],
            code: [ObsCode::None; NFREQ],
        }
    }
    /// SNR on given frequency slot [dB-Hz]
    pub fn snr_dbhz(&self, f: usize) -> f64 {
        self.snr_qdbhz[f] as f64 * 0.25
    }
}

/// Elevation dependent SNR mask. Thresholds are given per
/// frequency slot, one value per 10 degree elevation bin
/// centered on 5, 15, .., 85 degrees.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SnrMask {
    /// Mask enable (rover, base)
    pub enabled: [bool; 2],
    /// Thresholds [dB-Hz] per frequency slot and elevation bin
    pub mask: [[f64; 9]; NFREQ],
}

impl SnrMask {
    /// True when the signal falls below the interpolated threshold.
    pub fn masked(&self, station: usize, f: usize, el_rad: f64, snr_dbhz: f64) -> bool {
        if station > 1 || !self.enabled[station] || f >= NFREQ {
            return false;
        }
        let a = (el_rad.to_degrees() + 5.0) / 10.0;
        let i = a.floor() as i32;
        let frac = a - i as f64;
        let min_snr = if i < 1 {
            self.mask[f][0]
        } else if i > 8 {
            self.mask[f][8]
        } else {
            (1.0 - frac) * self.mask[f][(i - 1) as usize] + frac * self.mask[f][i as usize]
        };
        snr_dbhz < min_snr
    }
}
