//! Single point and tightly coupled position resolution

use nalgebra::{DVector, Vector3};

use hifitime::Unit;

use log::{debug, warn};

use crate::{
    cfg::{Config, EphemerisChoice, IonoModel, Mode, TropoModel},
    constants::Constants,
    earth::{ecef2geodetic, enu_matrix},
    error::Error,
    ins::{tightly::estinspr, InsState},
    navdata::NavigationData,
    navigation::{filter::lsq, rescode, validator::valsol},
    obs::ObservationData,
    orbit::{OrbitSource, SatelliteState},
    prelude::SV,
    solution::{Solution, SolutionStatus},
};

/// Per satellite diagnosis of one resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatelliteReport {
    /// [SV] identity
    pub sv: SV,
    /// Azimuth [rad]
    pub azimuth_rad: f64,
    /// Elevation [rad]
    pub elevation_rad: f64,
    /// Contributed to the solution
    pub used: bool,
    /// Pseudorange residual [m]
    pub residual_m: f64,
    /// SNR [0.25 dB-Hz]
    pub snr_qdbhz: u16,
}

/// Epoch diagnosis handed back with every accepted solution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// Satellite excluded by RAIM, when the fix needed one
    pub excluded: Option<SV>,
    /// Per satellite diagnosis
    pub sats: Vec<SatelliteReport>,
}

/// Survey bookkeeping shared by the estimators.
#[derive(Debug, Clone)]
pub(crate) struct EstimateOutput {
    pub azel: Vec<(f64, f64)>,
    pub vsat: Vec<bool>,
    pub resp: Vec<f64>,
    pub ns: usize,
}

/// Single point / tightly coupled solver. Owns the orbital state
/// provider; the inertial state stays with the caller and is
/// borrowed per epoch.
pub struct Solver<O: OrbitSource> {
    /// Solver parametrization
    pub cfg: Config,
    /// Orbital states provider
    orbit: O,
}

impl<O: OrbitSource> Solver<O> {
    pub fn new(cfg: &Config, orbit: O) -> Self {
        Self {
            cfg: cfg.clone(),
            orbit,
        }
    }

    /// Resolve one epoch: receiver position, velocity and clock
    /// from pseudorange and Doppler observables, or one tightly
    /// coupled inertial update when so configured and an
    /// initialised inertial state is proposed.
    ///
    /// `sol` is read for its a priori position and rewritten on
    /// success; the solution grade is reset on entry and degrades
    /// to the worst passing one.
    pub fn resolve(
        &mut self,
        obs: &[ObservationData],
        nav: &NavigationData,
        sol: &mut Solution,
        mut ins: Option<&mut InsState>,
    ) -> Result<Report, Error> {
        sol.stat = SolutionStatus::None;
        if obs.is_empty() {
            return Err(Error::NoObservations);
        }
        sol.time = obs[0].time;

        let mut opt = self.cfg.clone();
        if opt.mode != Mode::Single {
            // precise modes keep the single point stage on the
            // broadcast models
            opt.iono = IonoModel::Broadcast;
            opt.tropo = TropoModel::Saastamoinen;
        }

        // satellite positions, velocities and clocks
        let sats = self.orbit.states(sol.time, obs, nav, opt.sateph);
        let n = obs.len().min(sats.len());
        let obs = &obs[..n];
        let sats = &sats[..n];

        let tc = opt.mode == Mode::InsTightlyCoupled && ins.is_some();

        // estimate receiver position with pseudorange
        let primary = if tc {
            estinspr(obs, sats, nav, &opt, sol, ins.as_deref_mut().unwrap())
        } else {
            estpos(obs, sats, nav, &opt, sol)
        };

        let (out, excluded) = match primary {
            Ok(out) => (out, None),
            Err(err) => {
                // raim fde
                if opt.raim && n >= 6 {
                    match raim_fde(obs, sats, nav, &opt, sol) {
                        Ok((out, excluded)) => (out, Some(excluded)),
                        Err(_) => return Err(err),
                    }
                } else {
                    return Err(err);
                }
            },
        };

        // estimate receiver velocity with doppler
        estvel(obs, sats, nav, sol, &out.azel, &out.vsat);

        let mut report = Report {
            excluded,
            sats: Vec::with_capacity(n),
        };
        for i in 0..n {
            report.sats.push(SatelliteReport {
                sv: obs[i].sat,
                azimuth_rad: out.azel[i].0,
                elevation_rad: out.azel[i].1,
                used: out.vsat[i],
                residual_m: out.resp[i],
                snr_qdbhz: obs[i].snr_qdbhz[0],
            });
        }
        Ok(report)
    }
}

/// Iterated weighted least squares on the 4+3 state GNSS system.
pub(crate) fn estpos(
    obs: &[ObservationData],
    sats: &[SatelliteState],
    nav: &NavigationData,
    opt: &Config,
    sol: &mut Solution,
) -> Result<EstimateOutput, Error> {
    let nx = 7;
    let mut x = DVector::<f64>::zeros(nx);
    for k in 0..3 {
        x[k] = sol.position_m[k];
    }
    for iter in 0..Constants::MAX_ITER {
        let mut res = rescode(iter, obs, sats, nav, &mut x, opt, None);
        let nv = res.nv();
        if nv < nx {
            return Err(Error::LackOfValidSats(nv));
        }
        // weight by variance
        for j in 0..nv {
            let sig = res.var[j].sqrt();
            res.v[j] /= sig;
            for k in 0..nx {
                res.h[(j, k)] /= sig;
            }
        }
        // least square estimation
        let (dx, q) = lsq(&res.h, &res.v)?;
        x += &dx;

        if dx.norm() < Constants::WLS_CONVERGENCE_M {
            sol.time = obs[0].time - (x[3] / Constants::SPEED_OF_LIGHT_M_S) * Unit::Second;
            for k in 0..4 {
                sol.dtr[k] = x[3 + k] / Constants::SPEED_OF_LIGHT_M_S;
            }
            sol.position_m = Vector3::new(x[0], x[1], x[2]);
            sol.velocity_m_s = Vector3::zeros();
            sol.qr = [
                q[(0, 0)],
                q[(1, 1)],
                q[(2, 2)],
                q[(0, 1)],
                q[(1, 2)],
                q[(2, 0)],
            ];
            sol.ns = res.ns as u8;

            debug!(
                "receiver position {:10.3} {:10.3} {:10.3} iter={}",
                x[0], x[1], x[2], iter
            );

            // validate solution
            valsol(&res.azel, &res.vsat, opt, &res.v, res.nx)?;
            let pos_std = (q[(0, 0)] + q[(1, 1)] + q[(2, 2)]).sqrt();
            if !(pos_std < Constants::MAX_POS_STD_M) {
                return Err(Error::PositionVarianceExceeded);
            }
            sol.stat = if opt.sateph == EphemerisChoice::Sbas {
                SolutionStatus::Sbas
            } else {
                SolutionStatus::Single
            };
            return Ok(EstimateOutput {
                azel: res.azel,
                vsat: res.vsat,
                resp: res.resp,
                ns: res.ns,
            });
        }
    }
    Err(Error::IterationDivergent(Constants::MAX_ITER))
}

/// RAIM failure detection and exclusion: retry the WLS once per
/// candidate satellite removed, keep the exclusion with the
/// lowest post-fit residual RMS.
fn raim_fde(
    obs: &[ObservationData],
    sats: &[SatelliteState],
    nav: &NavigationData,
    opt: &Config,
    sol: &mut Solution,
) -> Result<(EstimateOutput, SV), Error> {
    let n = obs.len();
    let mut best: Option<(Solution, EstimateOutput, usize)> = None;
    let mut rms = 100.0;

    for i in 0..n {
        // satellite exclusion
        let obs_e: Vec<_> = (0..n).filter(|j| *j != i).map(|j| obs[j].clone()).collect();
        let sats_e: Vec<_> = (0..n).filter(|j| *j != i).map(|j| sats[j]).collect();

        // estimate receiver position without the candidate
        let mut sol_e = Solution::default();
        let Ok(out_e) = estpos(&obs_e, &sats_e, nav, opt, &mut sol_e) else {
            continue;
        };
        let nvsat = out_e.vsat.iter().filter(|v| **v).count();
        if nvsat < 5 {
            debug!(
                "raim exclusion of {} leaves too few satellites nvsat={}",
                obs[i].sat, nvsat
            );
            continue;
        }
        let rms_e = (out_e
            .resp
            .iter()
            .zip(out_e.vsat.iter())
            .filter(|(_, used)| **used)
            .map(|(r, _)| r * r)
            .sum::<f64>()
            / nvsat as f64)
            .sqrt();

        debug!("raim exsat={} rms={:8.3}", obs[i].sat, rms_e);

        if rms_e > rms {
            continue;
        }
        best = Some((sol_e, out_e, i));
        rms = rms_e;
    }

    let (sol_e, out_e, i) = best.ok_or(Error::GdopReject { nv: 0, gdop: 0.0 })?;

    // map the surviving satellites back onto the full epoch
    let mut out = EstimateOutput {
        azel: vec![(0.0, 0.0); n],
        vsat: vec![false; n],
        resp: vec![0.0; n],
        ns: out_e.ns,
    };
    let mut k = 0;
    for j in 0..n {
        if j == i {
            continue;
        }
        out.azel[j] = out_e.azel[k];
        out.vsat[j] = out_e.vsat[k];
        out.resp[j] = out_e.resp[k];
        k += 1;
    }
    *sol = sol_e;

    warn!("{} {} excluded by raim", sol.time, obs[i].sat);
    Ok((out, obs[i].sat))
}

/// Doppler range rate residuals: innovations and the 4 state
/// design matrix (velocity, clock drift).
fn resdop(
    obs: &[ObservationData],
    sats: &[SatelliteState],
    nav: &NavigationData,
    rr: &Vector3<f64>,
    x: &DVector<f64>,
    azel: &[(f64, f64)],
    vsat: &[bool],
) -> (DVector<f64>, nalgebra::DMatrix<f64>) {
    let n = obs.len().min(Constants::MAX_OBS);
    let pos = ecef2geodetic(rr);
    let e_mat = enu_matrix(&pos);

    let mut v = Vec::with_capacity(n);
    let mut rows = Vec::with_capacity(n);

    for i in 0..n {
        let lam = nav.wavelengths(obs[i].sat)[0];
        if obs[i].doppler_hz[0] == 0.0
            || lam == 0.0
            || !vsat[i]
            || sats[i].velocity_m_s.norm() <= 0.0
        {
            continue;
        }
        // line of sight vector in ecef
        let (az, el) = azel[i];
        let cosel = el.cos();
        let a = Vector3::new(az.sin() * cosel, az.cos() * cosel, el.sin());
        let e = e_mat.transpose() * a;

        // satellite velocity relative to receiver
        let vs = sats[i].velocity_m_s - Vector3::new(x[0], x[1], x[2]);

        // range rate with earth rotation correction
        let rs = &sats[i].position_m;
        let vel = &sats[i].velocity_m_s;
        let rate = vs.dot(&e)
            + Constants::EARTH_ROTATION_RATE_RAD_S / Constants::SPEED_OF_LIGHT_M_S
                * (vel[1] * rr[0] + rs[1] * x[0] - vel[0] * rr[1] - rs[0] * x[1]);

        // doppler residual
        v.push(
            -lam * obs[i].doppler_hz[0]
                - (rate + x[3] - Constants::SPEED_OF_LIGHT_M_S * sats[i].clock_drift_s_s),
        );
        rows.push([-e[0], -e[1], -e[2], 1.0]);
    }

    let h = nalgebra::DMatrix::from_fn(rows.len(), 4, |r, c| rows[r][c]);
    (DVector::from_vec(v), h)
}

/// Receiver velocity and clock drift from Doppler. Failures leave
/// the solution velocity at its last converged value.
fn estvel(
    obs: &[ObservationData],
    sats: &[SatelliteState],
    nav: &NavigationData,
    sol: &mut Solution,
    azel: &[(f64, f64)],
    vsat: &[bool],
) {
    let mut x = DVector::<f64>::zeros(4);

    for _ in 0..Constants::MAX_ITER {
        let (v, h) = resdop(obs, sats, nav, &sol.position_m, &x, azel, vsat);
        if v.len() < 4 {
            break;
        }
        let Ok((dx, _)) = lsq(&h, &v) else {
            break;
        };
        x += &dx;
        if dx.norm() < Constants::VEL_CONVERGENCE_M_S {
            sol.velocity_m_s = Vector3::new(x[0], x[1], x[2]);
            sol.dtrr = x[3];
            break;
        }
    }
}
