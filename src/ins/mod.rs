//! Inertial navigation state shared with the IMU mechaniser

pub(crate) mod tightly;

pub mod init;

use hifitime::Epoch;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::{
    cfg::InsOptions,
    earth::{dcm2rpy, ecef2geodetic, ned2xyz, skew, so3_exp},
    solution::SolutionStatus,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Inertial estimator progress. Advances and never rewinds,
/// except through an explicit reinit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InsStatus {
    /// No inertial state yet
    #[default]
    None,
    /// Initial state committed, filter not yet converged
    Init,
    /// In motion alignment in progress (driven by the mechaniser)
    Aligning,
    /// Tightly coupled updates flowing
    Solved,
}

/// One IMU sample, body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Sampling [Epoch]
    pub time: Epoch,
    /// Specific force [m/s^2]
    pub accel: Vector3<f64>,
    /// Angular rate [rad/s]
    pub gyro: Vector3<f64>,
}

/// Error state vector layout. Attitude, velocity and position
/// errors always lead; bias, lever arm and receiver clock blocks
/// follow when estimated. Index/length pairs come in the
/// (iX, nX) convention, `n* == 0` meaning the block is absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateLayout {
    pub ia: usize,
    pub na: usize,
    pub iv: usize,
    pub nv: usize,
    pub ip: usize,
    pub np: usize,
    pub iba: usize,
    pub nba: usize,
    pub ibg: usize,
    pub nbg: usize,
    pub ila: usize,
    pub nla: usize,
    pub irc: usize,
    pub nrc: usize,
    /// Total state count
    pub nx: usize,
}

impl StateLayout {
    pub fn new(opt: &InsOptions) -> Self {
        let (ia, na) = (0, 3);
        let (iv, nv) = (3, 3);
        let (ip, np) = (6, 3);
        let mut next = 9;
        let (iba, nba) = (next, if opt.est_ba { 3 } else { 0 });
        next += nba;
        let (ibg, nbg) = (next, if opt.est_bg { 3 } else { 0 });
        next += nbg;
        let (ila, nla) = (next, if opt.est_lever { 3 } else { 0 });
        next += nla;
        // one receiver clock state per constellation group
        let (irc, nrc) = (next, 4);
        next += nrc;
        Self {
            ia,
            na,
            iv,
            nv,
            ip,
            np,
            iba,
            nba,
            ibg,
            nbg,
            ila,
            nla,
            irc,
            nrc,
            nx: next,
        }
    }
}

/// Trip odometer, reset on every (re)initialisation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Odometry {
    /// Accumulated distance [m]
    pub distance_m: f64,
    /// Last update
    pub time: Epoch,
}

/// Inertial navigation state. Owned by the server loop; the IMU
/// mechaniser advances `re`/`ve`/`cbe`/`time` between GNSS epochs
/// and the tightly coupled update corrects them (never `dtr`,
/// which belongs to the GNSS side).
#[derive(Debug, Clone, PartialEq)]
pub struct InsState {
    /// State [Epoch]
    pub time: Epoch,
    /// IMU position, ECEF [m]
    pub re: Vector3<f64>,
    /// IMU velocity, ECEF [m/s]
    pub ve: Vector3<f64>,
    /// Body to ECEF rotation
    pub cbe: Matrix3<f64>,
    /// Accelerometer biases [m/s^2]
    pub ba: Vector3<f64>,
    /// Gyro biases [rad/s]
    pub bg: Vector3<f64>,
    /// Lever arm, IMU to GNSS antenna, body frame [m]
    pub lever: Vector3<f64>,
    /// Dual antenna baseline to body alignment
    pub cvb: Matrix3<f64>,
    /// Receiver clock offsets [s]: GPS, GLO, GAL, BDS
    pub dtr: [f64; 4],
    /// Receiver clock drift [m/s]
    pub dtrr: f64,
    /// Error state covariance (nx by nx)
    pub p: DMatrix<f64>,
    /// Estimator progress
    pub stat: InsStatus,
    /// Grade of the last accepted GNSS coupling
    pub gstat: SolutionStatus,
    /// Satellites used by the last accepted coupling
    pub ns: u8,
    /// Age of the last accepted coupling [s]
    pub age: f64,
    /// Geodetic position mirror (lat [rad], lon [rad], h [m])
    pub pos_n: Vector3<f64>,
    /// NED velocity mirror [m/s]
    pub vel_n: Vector3<f64>,
    /// Attitude mirror, roll/pitch/yaw [rad]
    pub rpy: Vector3<f64>,
    /// Odometer
    pub odo: Odometry,
}

impl InsState {
    /// Fresh state with the covariance seeded from the options.
    pub fn new(opt: &InsOptions) -> Self {
        let layout = StateLayout::new(opt);
        let mut s = Self {
            time: Epoch::default(),
            re: Vector3::zeros(),
            ve: Vector3::zeros(),
            cbe: Matrix3::identity(),
            ba: Vector3::zeros(),
            bg: Vector3::zeros(),
            lever: opt.lever_m,
            cvb: Matrix3::identity(),
            dtr: [0.0; 4],
            dtrr: 0.0,
            p: DMatrix::zeros(layout.nx, layout.nx),
            stat: InsStatus::None,
            gstat: SolutionStatus::None,
            ns: 0,
            age: 0.0,
            pos_n: Vector3::zeros(),
            vel_n: Vector3::zeros(),
            rpy: Vector3::zeros(),
            odo: Odometry::default(),
        };
        s.seed_covariance(opt, &layout);
        s
    }

    fn seed_covariance(&mut self, opt: &InsOptions, layout: &StateLayout) {
        let mut diag = DVector::zeros(layout.nx);
        for k in 0..3 {
            diag[layout.ia + k] = opt.std_att.powi(2);
            diag[layout.iv + k] = opt.std_vel.powi(2);
            diag[layout.ip + k] = opt.std_pos.powi(2);
        }
        for k in 0..layout.nba {
            diag[layout.iba + k] = opt.std_ba.powi(2);
        }
        for k in 0..layout.nbg {
            diag[layout.ibg + k] = opt.std_bg.powi(2);
        }
        for k in 0..layout.nla {
            diag[layout.ila + k] = opt.std_lever.powi(2);
        }
        for k in 0..layout.nrc {
            diag[layout.irc + k] = opt.std_clock.powi(2);
        }
        self.p = DMatrix::from_diagonal(&diag);
    }

    /// Zero fill and re-seed: the explicit reset path every
    /// initialisation entry runs before committing a new state.
    pub fn reinit(&mut self, opt: &InsOptions) {
        let lever = if opt.lever_m.norm() > 0.0 {
            opt.lever_m
        } else {
            self.lever
        };
        let cvb = self.cvb;
        *self = Self::new(opt);
        self.lever = lever;
        self.cvb = cvb;
        self.odo = Odometry::default();
    }

    /// GNSS antenna phase center position: `re + Cbe l`.
    pub fn antenna_position(&self) -> Vector3<f64> {
        self.re + self.cbe * self.lever
    }

    /// Closed loop correction after an accepted filter update:
    /// position/velocity errors are subtracted, the attitude is
    /// rotated by the estimated misalignment and biases absorb
    /// their error estimates.
    pub fn apply_correction(&mut self, layout: &StateLayout, x: &DVector<f64>) {
        for k in 0..3 {
            self.re[k] -= x[layout.ip + k];
            self.ve[k] -= x[layout.iv + k];
        }
        let phi = Vector3::new(x[layout.ia], x[layout.ia + 1], x[layout.ia + 2]);
        self.cbe = so3_exp(&phi) * self.cbe;
        for k in 0..layout.nba {
            self.ba[k] += x[layout.iba + k];
        }
        for k in 0..layout.nbg {
            self.bg[k] += x[layout.ibg + k];
        }
        for k in 0..layout.nla {
            self.lever[k] += x[layout.ila + k];
        }
    }

    /// Derive IMU position/velocity from antenna position/velocity
    /// by the lever arm inverse transform.
    pub fn from_antenna(&mut self, rr: &Vector3<f64>, vr: &Vector3<f64>, gyro: &Vector3<f64>) {
        self.re = rr - self.cbe * self.lever;
        self.ve = vr - self.cbe * (skew(gyro) * self.lever);
    }

    /// Refresh the n-frame mirror (geodetic position, NED
    /// velocity, roll/pitch/yaw) from the e-frame state.
    pub fn update_n_frame(&mut self) {
        self.pos_n = ecef2geodetic(&self.re);
        let cne = ned2xyz(&self.pos_n);
        self.vel_n = cne.transpose() * self.ve;
        let cbn = cne.transpose() * self.cbe;
        self.rpy = dcm2rpy(&cbn);
    }
}
