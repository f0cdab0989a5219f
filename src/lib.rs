#![doc = include_str!("../README.md")]

extern crate gnss_rs as gnss;

// private modules
mod atmosphere;
mod carrier;
mod cfg;
mod earth;
mod error;
mod ins;
mod navdata;
mod navigation;
mod obs;
mod orbit;
mod pseudorange;
mod solution;
mod solver;

pub(crate) mod constants;

// prelude
pub mod prelude {
    pub use crate::atmosphere::{iono_correction, klobuchar, saastamoinen, tropo_correction};
    pub use crate::carrier::Carrier;
    pub use crate::cfg::{
        Config, Coupling, EphemerisChoice, InsOptions, IonoModel, Mode, SatExclusion, TropoModel,
    };
    pub use crate::error::Error;
    pub use crate::ins::init::{
        InitState, Initialiser, KinematicSolver, NoKinematic, PoseMeasurement,
    };
    pub use crate::ins::{ImuSample, InsState, InsStatus, Odometry, StateLayout};
    pub use crate::navdata::NavigationData;
    pub use crate::navigation::dop::{dops, DilutionOfPrecision};
    pub use crate::obs::{ObsCode, ObservationData, SnrMask, NFREQ};
    pub use crate::orbit::{OrbitSource, SatelliteState};
    pub use crate::solution::{Solution, SolutionStatus};
    pub use crate::solver::{Report, SatelliteReport, Solver};
    // re-export
    pub use gnss::prelude::{Constellation, SV};
    pub use hifitime::{Duration, Epoch, TimeScale};
    pub use nalgebra::{Matrix3, Vector3};
}
