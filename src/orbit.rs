//! Satellite state provider interface

use hifitime::Epoch;
use nalgebra::Vector3;

use crate::{
    cfg::EphemerisChoice,
    navdata::NavigationData,
    obs::ObservationData,
};

/// Satellite position, velocity and clock at signal transmission,
/// produced by the external ephemeris subsystem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatelliteState {
    /// ECEF position [m]
    pub position_m: Vector3<f64>,
    /// ECEF velocity [m/s]
    pub velocity_m_s: Vector3<f64>,
    /// Clock bias [s]
    pub clock_bias_s: f64,
    /// Clock drift [s/s]
    pub clock_drift_s_s: f64,
    /// A priori state variance [m^2]
    pub variance_m2: f64,
    /// Health flag, 0 when healthy
    pub health: i32,
}

impl Default for SatelliteState {
    fn default() -> Self {
        Self {
            position_m: Vector3::zeros(),
            velocity_m_s: Vector3::zeros(),
            clock_bias_s: 0.0,
            clock_drift_s_s: 0.0,
            variance_m2: 0.0,
            health: 0,
        }
    }
}

/// Orbital state provider: the ephemeris decoding and satellite
/// position machinery lives outside this crate and is consumed
/// through this interface, one state per proposed observation.
pub trait OrbitSource {
    /// Resolve satellite states for one epoch of observations.
    /// The returned vector is index aligned with `obs`.
    fn states(
        &mut self,
        t: Epoch,
        obs: &[ObservationData],
        nav: &NavigationData,
        choice: EphemerisChoice,
    ) -> Vec<SatelliteState>;
}
