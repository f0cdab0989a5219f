//! Processing options

use std::collections::HashMap;

use nalgebra::Vector3;

use gnss::prelude::SV;

use crate::{obs::SnrMask, solution::SolutionStatus};

#[cfg(feature = "serde")]
use serde::Deserialize;

/// Positioning mode
#[derive(Default, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub enum Mode {
    /// GNSS only single point positioning
    #[default]
    Single,
    /// Raw pseudoranges folded into the inertial filter
    InsTightlyCoupled,
}

/// Tightly coupled measurement sub mode
#[derive(Default, Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub enum Coupling {
    /// Undifferenced pseudoranges
    #[default]
    Single,
    /// Single differenced pseudoranges
    SingleDiff,
}

/// Ionospheric delay handling
#[derive(Default, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub enum IonoModel {
    /// No correction, large a priori variance
    Off,
    /// Klobuchar model with broadcast GPS coefficients
    #[default]
    Broadcast,
    /// SBAS grid correction (external collaborator)
    Sbas,
    /// IONEX TEC grid (external collaborator)
    Tec,
    /// Klobuchar model with QZSS coefficients
    Qzss,
    /// QZSS LEX corrections (external collaborator)
    Lex,
    /// Handled by the dual frequency combination
    IonoFree,
}

/// Tropospheric delay handling
#[derive(Default, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub enum TropoModel {
    /// No correction, large a priori variance
    Off,
    /// Saastamoinen model
    #[default]
    Saastamoinen,
    /// SBAS model (external collaborator)
    Sbas,
    /// Saastamoinen a priori, ZTD estimated downstream
    Estimate,
    /// Saastamoinen a priori, ZTD + gradients estimated downstream
    EstimateGrad,
}

/// Ephemeris selection
#[derive(Default, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub enum EphemerisChoice {
    /// Broadcast ephemeris
    #[default]
    Broadcast,
    /// SBAS corrected broadcast ephemeris
    Sbas,
    /// Precise products
    Precise,
}

/// Per satellite exclusion override
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub enum SatExclusion {
    /// Never use this satellite
    Exclude,
    /// Use even when flagged unhealthy
    UseAnyway,
}

fn default_elmin() -> f64 {
    10.0_f64.to_radians()
}

fn default_maxgdop() -> f64 {
    30.0
}

const fn default_err() -> [f64; 3] {
    [100.0, 0.003, 0.003]
}

/// Inertial estimator options: which error states are carried
/// and how the covariance is (re)initialised.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct InsOptions {
    /// Estimate accelerometer biases
    pub est_ba: bool,
    /// Estimate gyro biases
    pub est_bg: bool,
    /// Estimate the IMU to antenna lever arm
    pub est_lever: bool,
    /// Express attitude corrections through the Euler angle
    /// perturbation Jacobian
    pub att_euler: bool,
    /// Lever arm, IMU to GNSS antenna phase center, body frame [m]
    pub lever_m: Vector3<f64>,
    /// Initial attitude uncertainty [rad]
    pub std_att: f64,
    /// Initial velocity uncertainty [m/s]
    pub std_vel: f64,
    /// Initial position uncertainty [m]
    pub std_pos: f64,
    /// Initial accelerometer bias uncertainty [m/s^2]
    pub std_ba: f64,
    /// Initial gyro bias uncertainty [rad/s]
    pub std_bg: f64,
    /// Initial lever arm uncertainty [m]
    pub std_lever: f64,
    /// Initial receiver clock uncertainty [m]
    pub std_clock: f64,
}

impl Default for InsOptions {
    fn default() -> Self {
        Self {
            est_ba: true,
            est_bg: true,
            est_lever: false,
            att_euler: false,
            lever_m: Vector3::zeros(),
            std_att: 5.0_f64.to_radians(),
            std_vel: 1.0,
            std_pos: 30.0,
            std_ba: 10.0E-3 * 9.80665,
            std_bg: 10.0_f64.to_radians() / 3600.0,
            std_lever: 0.1,
            std_clock: 100.0,
        }
    }
}

/// Solver parametrization
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct Config {
    /// Positioning [Mode]
    pub mode: Mode,
    /// Tightly coupled sub mode
    pub coupling: Coupling,
    /// Elevation mask [rad]
    #[cfg_attr(feature = "serde", serde(default = "default_elmin"))]
    pub elmin_rad: f64,
    /// GDOP ceiling for an accepted solution
    #[cfg_attr(feature = "serde", serde(default = "default_maxgdop"))]
    pub max_gdop: f64,
    /// Ionospheric model selection
    pub iono: IonoModel,
    /// Tropospheric model selection
    pub tropo: TropoModel,
    /// Ephemeris selection
    pub sateph: EphemerisChoice,
    /// SNR mask
    pub snr_mask: SnrMask,
    /// Pseudorange error model coefficients:
    /// factor, constant term [m], elevation term [m]
    #[cfg_attr(feature = "serde", serde(default = "default_err"))]
    pub err: [f64; 3],
    /// RAIM failure detection and exclusion
    pub raim: bool,
    /// Observation adjustment flag, forwarded to the kinematic
    /// solver used by the observation based initialiser
    pub adjobs: bool,
    /// Worst solution grade the INS initialiser accepts
    pub iisu: SolutionStatus,
    /// Per satellite overrides
    pub exsats: HashMap<SV, SatExclusion>,
    /// Inertial estimator options
    pub ins: InsOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            coupling: Coupling::default(),
            elmin_rad: default_elmin(),
            max_gdop: default_maxgdop(),
            iono: IonoModel::default(),
            tropo: TropoModel::default(),
            sateph: EphemerisChoice::default(),
            snr_mask: SnrMask::default(),
            err: default_err(),
            raim: false,
            adjobs: false,
            iisu: SolutionStatus::Single,
            exsats: HashMap::new(),
            ins: InsOptions::default(),
        }
    }
}

impl Config {
    /// Preset for tightly coupled processing with the given lever arm.
    pub fn tightly_coupled(lever_m: Vector3<f64>) -> Self {
        let mut cfg = Self::default();
        cfg.mode = Mode::InsTightlyCoupled;
        cfg.ins.lever_m = lever_m;
        cfg
    }
    /// Satellite exclusion: overrides first, then the health flag,
    /// then the a priori orbital variance.
    pub(crate) fn excluded(&self, sat: SV, var_m2: f64, health: i32) -> bool {
        use crate::constants::Constants;
        match self.exsats.get(&sat) {
            Some(SatExclusion::Exclude) => true,
            Some(SatExclusion::UseAnyway) => false,
            None => health != 0 || var_m2 > Constants::MAX_EPH_VAR_M2,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Config, SatExclusion};
    use gnss::prelude::{Constellation, SV};

    #[test]
    fn exclusion_overrides() {
        let mut cfg = Config::default();
        let sat = SV::new(Constellation::GPS, 7);
        assert!(!cfg.excluded(sat, 1.0, 0));
        assert!(cfg.excluded(sat, 1.0, 1));
        cfg.exsats.insert(sat, SatExclusion::UseAnyway);
        assert!(!cfg.excluded(sat, 1.0, 1));
        cfg.exsats.insert(sat, SatExclusion::Exclude);
        assert!(cfg.excluded(sat, 1.0, 0));
    }
}
