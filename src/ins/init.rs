//! Real time bootstrap of the inertial state from accepted GNSS
//! solutions, raw observations, or a dual antenna pose fix

use hifitime::Epoch;
use itertools::Itertools;
use nalgebra::Vector3;

use log::{debug, warn};

use crate::{
    cfg::{Config, IonoModel, TropoModel},
    earth::{ecef2geodetic, ned2xyz, rot_y, rot_z, rpy2dcm},
    error::Error,
    ins::{ImuSample, InsState, InsStatus},
    navdata::NavigationData,
    obs::ObservationData,
    solution::Solution,
};

/// Solutions buffered before the quality gates may pass
const MAXSOL: usize = 5;
/// Min velocity for an initial attitude from heading [m/s]
const MIN_VEL_M_S: f64 = 5.0;
/// Max angular rate tolerated at initialisation time [rad/s]
const MAX_GYRO_RAD_S: f64 = 30.0 * std::f64::consts::PI / 180.0;
/// Max time gap between adjacent buffered solutions [s]
const MAX_GAP_S: f64 = 10.0;
/// Below this gap two solutions count as duplicates [s]
const DUP_GAP_S: f64 = 1.0E-5;

/// Initialiser progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitState {
    /// Nothing buffered yet
    #[default]
    Uninit,
    /// Absorbing solutions, quality gates not passed yet
    Buffering,
    /// Initial inertial state committed
    Ready,
}

/// Dual antenna pose fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseMeasurement {
    /// Measurement [Epoch]
    pub time: Epoch,
    /// Roll/pitch/yaw [rad]
    pub rpy: Vector3<f64>,
    /// Per axis variance [rad^2]
    pub var: Vector3<f64>,
}

/// Kinematic GNSS solver consumed by the observation based entry
/// path. The real machinery (ambiguity handling, cycle slips)
/// lives outside this crate.
pub trait KinematicSolver {
    /// Prepare internal state with the given options
    fn init(&mut self, opt: &Config);
    /// Run one epoch, returning the current solution
    fn solve(&mut self, obs: &[ObservationData], nav: &NavigationData) -> Solution;
    /// Tear down internal state so the next init starts fresh
    fn free(&mut self);
}

/// Placeholder for deployments that never feed raw observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKinematic;

impl KinematicSolver for NoKinematic {
    fn init(&mut self, _: &Config) {}
    fn solve(&mut self, _: &[ObservationData], _: &NavigationData) -> Solution {
        Solution::default()
    }
    fn free(&mut self) {}
}

/// Inertial state bootstrap. Owns the solution FIFO and the
/// kinematic solver instance that the original kept as process
/// wide statics; the reset paths are explicit methods.
pub struct Initialiser<K: KinematicSolver = NoKinematic> {
    opt: Config,
    state: InitState,
    fifo: Vec<Solution>,
    kin: K,
    kin_ready: bool,
}

impl Initialiser<NoKinematic> {
    /// Initialiser for the PVT and dual antenna entry paths.
    pub fn new(opt: &Config) -> Self {
        Self::with_kinematic(opt, NoKinematic)
    }
}

impl<K: KinematicSolver> Initialiser<K> {
    /// Initialiser with a kinematic solver for the observation
    /// based entry path.
    pub fn with_kinematic(opt: &Config, kin: K) -> Self {
        Self {
            opt: opt.clone(),
            state: InitState::Uninit,
            fifo: Vec::with_capacity(MAXSOL),
            kin,
            kin_ready: false,
        }
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    /// Drop all buffered solutions and return to the initial state.
    pub fn reset(&mut self) {
        self.fifo.clear();
        self.state = InitState::Uninit;
        if self.kin_ready {
            self.kin.free();
            self.kin_ready = false;
        }
    }

    /// Shift-on-insert FIFO of the last [MAXSOL] solutions.
    fn push(&mut self, sol: Solution) {
        if self.fifo.len() == MAXSOL {
            self.fifo.remove(0);
        }
        self.fifo.push(sol);
        self.state = InitState::Buffering;
    }

    /// Status and continuity gates over the full FIFO, then the
    /// velocity of the latest slot (differenced positions when its
    /// velocity field is empty).
    fn gated_velocity(&self) -> Result<Vector3<f64>, Error> {
        if self.fifo.len() < MAXSOL {
            return Err(Error::SolutionUnavailable("buffering"));
        }
        for sol in self.fifo.iter() {
            if !sol.stat.passes(self.opt.iisu) {
                return Err(Error::SolutionUnavailable("solution status"));
            }
        }
        for (a, b) in self.fifo.iter().tuple_windows() {
            let dt = (b.time - a.time).to_seconds();
            if dt > MAX_GAP_S {
                warn!("large time difference of solution");
                return Err(Error::SolutionUnavailable("solution time gap"));
            }
            if dt.abs() < DUP_GAP_S {
                warn!("duplicate gnss measurement");
                return Err(Error::SolutionUnavailable("duplicate measurement"));
            }
        }
        let last = &self.fifo[MAXSOL - 1];
        let mut vr = last.velocity_m_s;
        if vr.norm() == 0.0 {
            let prev = &self.fifo[MAXSOL - 2];
            let dt = (last.time - prev.time).to_seconds();
            vr = (last.position_m - prev.position_m) / dt;
        }
        Ok(vr)
    }

    /// Bootstrap from an externally produced PVT solution.
    pub fn from_pvt(
        &mut self,
        ins: &mut InsState,
        sol: &Solution,
        imu: &ImuSample,
    ) -> Result<(), Error> {
        if !sol.usable() {
            warn!("invalid solution data");
            return Err(Error::SolutionUnavailable("invalid solution data"));
        }
        ins.stat = InsStatus::Init;
        self.push(sol.clone());

        let vr = self.gated_velocity()?;
        if vr.norm() < MIN_VEL_M_S || imu.gyro.norm() > MAX_GYRO_RAD_S {
            return Err(Error::SolutionUnavailable("velocity or rotation gate"));
        }
        self.commit(ins, &vr, None, imu)
    }

    /// Bootstrap from raw observations, running the kinematic
    /// solver internally. The solver is created on first entry and
    /// torn down once the initial state commits, so a restart
    /// starts fresh.
    pub fn from_observations(
        &mut self,
        ins: &mut InsState,
        obs: &[ObservationData],
        nav: &NavigationData,
        imu: &ImuSample,
    ) -> Result<(), Error> {
        if obs.is_empty() {
            warn!("no observation data to initialise from");
            return Err(Error::NoObservations);
        }
        ins.stat = InsStatus::Init;
        if !self.kin_ready {
            self.kin.init(&kinematic_preset(&self.opt));
            self.kin_ready = true;
        }
        let sol = self.kin.solve(obs, nav);
        self.push(sol);

        let vr = self.gated_velocity()?;
        if vr.norm() < MIN_VEL_M_S || imu.gyro.norm() > MAX_GYRO_RAD_S {
            return Err(Error::SolutionUnavailable("velocity or rotation gate"));
        }
        self.commit(ins, &vr, None, imu)?;

        self.kin.free();
        self.kin_ready = false;
        Ok(())
    }

    /// Bootstrap attitude from a dual antenna pose fix; the
    /// velocity/rotation gate does not apply.
    pub fn from_dual_antenna(
        &mut self,
        ins: &mut InsState,
        pose: &PoseMeasurement,
        sol: &Solution,
        imu: &ImuSample,
    ) -> Result<(), Error> {
        if !sol.usable() {
            warn!("invalid solution data");
            return Err(Error::SolutionUnavailable("invalid solution data"));
        }
        ins.stat = InsStatus::Init;
        self.push(sol.clone());

        let vr = self.gated_velocity()?;
        if pose.var.norm() > (5.0_f64.to_radians()).powi(2) {
            warn!("large pose variance");
            return Err(Error::SolutionUnavailable("large pose variance"));
        }
        self.commit(ins, &vr, Some(pose), imu)
    }

    /// Shared tail of the three entry paths: reinitialise the
    /// inertial sub state, align the attitude, commit the time tag
    /// and mirror the n-frame state.
    fn commit(
        &mut self,
        ins: &mut InsState,
        vr: &Vector3<f64>,
        pose: Option<&PoseMeasurement>,
        imu: &ImuSample,
    ) -> Result<(), Error> {
        let last = self.fifo[MAXSOL - 1].clone();
        ins.reinit(&self.opt.ins);
        ins.stat = InsStatus::Init;

        match pose {
            None => {
                ant2inins(&last.position_m, vr, ins)?;
                ins.time = last.time;
            },
            Some(pose) => {
                let pos = ecef2geodetic(&last.position_m);
                let cne = ned2xyz(&pos);
                let cvn = rot_z(-pose.rpy[2]) * rot_y(-pose.rpy[1]);
                ins.cbe = cne * cvn * ins.cvb.transpose();
                ins.from_antenna(&last.position_m, vr, &imu.gyro);
                ins.time = imu.time;
            },
        }
        ins.update_n_frame();
        self.state = InitState::Ready;
        debug!("initial ins state ok");
        Ok(())
    }
}

/// Attitude from the velocity vector: heading and pitch follow
/// the direction of travel, roll is unobservable and set to zero.
pub(crate) fn ant2inins(
    rr: &Vector3<f64>,
    vr: &Vector3<f64>,
    ins: &mut InsState,
) -> Result<(), Error> {
    let pos = ecef2geodetic(rr);
    let cne = ned2xyz(&pos);
    let vn = cne.transpose() * vr;
    if vn.norm() < 1.0E-6 {
        return Err(Error::SolutionUnavailable("velocity too small to align"));
    }
    let heading = vn[1].atan2(vn[0]);
    let pitch = (-vn[2]).atan2((vn[0] * vn[0] + vn[1] * vn[1]).sqrt());
    ins.cbe = cne * rpy2dcm(&Vector3::new(0.0, pitch, heading));
    ins.from_antenna(rr, vr, &Vector3::zeros());
    Ok(())
}

/// Options handed to the internal kinematic solver: broadcast
/// iono, Saastamoinen tropo, adjusted observations.
fn kinematic_preset(opt: &Config) -> Config {
    let mut preset = opt.clone();
    preset.iono = IonoModel::Broadcast;
    preset.tropo = TropoModel::Saastamoinen;
    preset.adjobs = true;
    preset
}

#[cfg(test)]
mod test {
    use super::{InitState, Initialiser, KinematicSolver, PoseMeasurement};
    use crate::{
        cfg::Config,
        earth::{ecef2geodetic, ned2xyz},
        ins::{ImuSample, InsState, InsStatus},
        navdata::NavigationData,
        obs::ObservationData,
        solution::{Solution, SolutionStatus},
    };
    use hifitime::Epoch;
    use nalgebra::{Matrix3, Vector3};

    const RX_ECEF: [f64; 3] = [-2700.0E3, 4300.0E3, 3850.0E3];

    fn sol_at(t_s: f64, vel: Vector3<f64>) -> Solution {
        let mut sol = Solution::default();
        sol.time = Epoch::from_gpst_seconds(1.0E5 + t_s);
        sol.position_m = Vector3::from(RX_ECEF) + vel * t_s;
        sol.velocity_m_s = vel;
        sol.qr = [4.0, 4.0, 4.0, 0.0, 0.0, 0.0];
        sol.stat = SolutionStatus::Single;
        sol
    }

    fn still_imu(t_s: f64) -> ImuSample {
        ImuSample {
            time: Epoch::from_gpst_seconds(1.0E5 + t_s),
            accel: Vector3::zeros(),
            gyro: Vector3::zeros(),
        }
    }

    /// NED velocity of given heading expressed in ECEF at the test site
    fn ecef_vel(heading_deg: f64, speed: f64) -> Vector3<f64> {
        let pos = ecef2geodetic(&Vector3::from(RX_ECEF));
        let cne = ned2xyz(&pos);
        let h = heading_deg.to_radians();
        cne * Vector3::new(h.cos() * speed, h.sin() * speed, 0.0)
    }

    #[test]
    fn slow_sequence_does_not_initialise() {
        let cfg = Config::default();
        let mut init = Initialiser::new(&cfg);
        let mut ins = InsState::new(&cfg.ins);

        let vel = ecef_vel(10.0, 2.0);
        for k in 0..5 {
            let r = init.from_pvt(&mut ins, &sol_at(k as f64, vel), &still_imu(k as f64));
            assert!(r.is_err());
        }
        assert_eq!(init.state(), InitState::Buffering);

        // raising the final velocity above the gate triggers it
        let r = init.from_pvt(&mut ins, &sol_at(5.0, ecef_vel(10.0, 6.0)), &still_imu(5.0));
        assert!(r.is_ok(), "{:?}", r);
        assert_eq!(init.state(), InitState::Ready);
        assert_eq!(ins.stat, InsStatus::Init);
    }

    #[test]
    fn spinning_imu_blocks_initialisation() {
        let cfg = Config::default();
        let mut init = Initialiser::new(&cfg);
        let mut ins = InsState::new(&cfg.ins);

        let vel = ecef_vel(0.0, 8.0);
        for k in 0..4 {
            let _ = init.from_pvt(&mut ins, &sol_at(k as f64, vel), &still_imu(k as f64));
        }
        let mut imu = still_imu(4.0);
        imu.gyro = Vector3::new(0.0, 0.0, 31.0_f64.to_radians());
        assert!(init.from_pvt(&mut ins, &sol_at(4.0, vel), &imu).is_err());
        assert_eq!(init.state(), InitState::Buffering);
    }

    #[test]
    fn time_continuity_gates() {
        let cfg = Config::default();
        let vel = ecef_vel(0.0, 8.0);

        // a gap beyond 10 s rejects
        let mut init = Initialiser::new(&cfg);
        let mut ins = InsState::new(&cfg.ins);
        for (k, t) in [0.0, 1.0, 2.0, 3.0, 14.5].iter().enumerate() {
            let r = init.from_pvt(&mut ins, &sol_at(*t, vel), &still_imu(*t));
            assert!(r.is_err(), "slot {}", k);
        }

        // a duplicate tag rejects
        let mut init = Initialiser::new(&cfg);
        for t in [0.0, 1.0, 2.0, 3.0, 3.0 + 0.9E-5] {
            let r = init.from_pvt(&mut ins, &sol_at(t, vel), &still_imu(t));
            assert!(r.is_err());
        }
    }

    #[test]
    fn degraded_status_is_rejected() {
        let mut cfg = Config::default();
        cfg.iisu = SolutionStatus::Dgps;
        let mut init = Initialiser::new(&cfg);
        let mut ins = InsState::new(&cfg.ins);

        let vel = ecef_vel(0.0, 8.0);
        for k in 0..5 {
            // Single grades below the Dgps floor
            let r = init.from_pvt(&mut ins, &sol_at(k as f64, vel), &still_imu(k as f64));
            assert!(r.is_err());
        }
    }

    #[test]
    fn heading_follows_velocity() {
        let cfg = Config::default();
        let mut init = Initialiser::new(&cfg);
        let mut ins = InsState::new(&cfg.ins);

        let vel = ecef_vel(37.0, 8.0);
        for k in 0..5 {
            let _ = init.from_pvt(&mut ins, &sol_at(k as f64, vel), &still_imu(k as f64));
        }
        assert_eq!(init.state(), InitState::Ready);
        assert!(
            (ins.rpy[2] - 37.0_f64.to_radians()).abs() < 0.1_f64.to_radians(),
            "heading {}",
            ins.rpy[2].to_degrees()
        );
        // velocity committed as is
        assert!((ins.ve - vel).norm() < 1.0E-9);
        assert_eq!(ins.time, Epoch::from_gpst_seconds(1.0E5 + 4.0));
    }

    #[test]
    fn derived_velocity_from_positions() {
        let cfg = Config::default();
        let mut ins = InsState::new(&cfg.ins);
        let mut init = Initialiser::new(&cfg);

        // empty velocity fields: positions must carry the motion
        let vel = ecef_vel(90.0, 7.0);
        for k in 0..5 {
            let mut sol = sol_at(k as f64, vel);
            sol.velocity_m_s = Vector3::zeros();
            let _ = init.from_pvt(&mut ins, &sol, &still_imu(k as f64));
        }
        assert_eq!(init.state(), InitState::Ready);
        assert!(
            (ins.rpy[2] - 90.0_f64.to_radians()).abs() < 0.1_f64.to_radians(),
            "heading {}",
            ins.rpy[2].to_degrees()
        );
    }

    #[test]
    fn dual_antenna_pose() {
        let cfg = Config::default();
        let mut init = Initialiser::new(&cfg);
        let mut ins = InsState::new(&cfg.ins);

        let vel = ecef_vel(30.0, 2.0); // below the velocity gate: pose path skips it
        for k in 0..4 {
            let _ = init.from_pvt(&mut ins, &sol_at(k as f64, vel), &still_imu(k as f64));
        }
        let pose = PoseMeasurement {
            time: Epoch::from_gpst_seconds(1.0E5 + 4.0),
            rpy: Vector3::new(0.0, 2.0_f64.to_radians(), 30.0_f64.to_radians()),
            var: Vector3::from_element((0.1_f64.to_radians()).powi(2)),
        };
        let r = init.from_dual_antenna(&mut ins, &pose, &sol_at(4.0, vel), &still_imu(4.0));
        assert!(r.is_ok(), "{:?}", r);

        let c = ins.cbe;
        assert!((c.transpose() * c - Matrix3::identity()).norm() < 1.0E-12);
        assert!(
            (ins.rpy[2] - 30.0_f64.to_radians()).abs() < 0.01_f64.to_radians(),
            "yaw {}",
            ins.rpy[2].to_degrees()
        );
        assert!((ins.rpy[1] - 2.0_f64.to_radians()).abs() < 0.01_f64.to_radians());

        // an uncertain pose is refused
        let mut init = Initialiser::new(&cfg);
        for k in 0..4 {
            let _ = init.from_pvt(&mut ins, &sol_at(k as f64, vel), &still_imu(k as f64));
        }
        let mut bad = pose;
        bad.var = Vector3::from_element((6.0_f64.to_radians()).powi(2));
        assert!(init
            .from_dual_antenna(&mut ins, &bad, &sol_at(4.0, vel), &still_imu(4.0))
            .is_err());
    }

    /// Canned kinematic solver walking the receiver north
    struct CannedKinematic {
        epoch: usize,
        inited: bool,
        freed: usize,
    }

    impl KinematicSolver for CannedKinematic {
        fn init(&mut self, _: &Config) {
            self.inited = true;
        }
        fn solve(&mut self, _: &[ObservationData], _: &NavigationData) -> Solution {
            let sol = sol_at(self.epoch as f64, ecef_vel(0.0, 9.0));
            self.epoch += 1;
            sol
        }
        fn free(&mut self) {
            self.freed += 1;
        }
    }

    #[test]
    fn observation_path_tears_down_the_solver() {
        let cfg = Config::default();
        let kin = CannedKinematic {
            epoch: 0,
            inited: false,
            freed: 0,
        };
        let mut init = Initialiser::with_kinematic(&cfg, kin);
        let mut ins = InsState::new(&cfg.ins);

        let sat = gnss::prelude::SV::new(gnss::prelude::Constellation::GPS, 1);
        let obs = vec![ObservationData::new(Epoch::from_gpst_seconds(1.0E5), sat)];
        let nav = NavigationData::default();

        for k in 0..5 {
            let r = init.from_observations(&mut ins, &obs, &nav, &still_imu(k as f64));
            if k < 4 {
                assert!(r.is_err());
            } else {
                assert!(r.is_ok(), "{:?}", r);
            }
        }
        assert_eq!(init.state(), InitState::Ready);
        assert_eq!(init.kin.freed, 1);
        assert!(!init.kin_ready);
    }
}
