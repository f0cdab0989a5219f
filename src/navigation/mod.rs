//! Measurement residual assembly

pub(crate) mod dop;
pub(crate) mod filter;
pub(crate) mod validator;

use nalgebra::{DMatrix, DVector, Vector3};

use log::{debug, warn};

use crate::{
    atmosphere::{iono_correction, tropo_correction},
    carrier::Carrier,
    cfg::{Config, Coupling, IonoModel, Mode, TropoModel},
    constants::Constants,
    earth::{dcm2rpy, ecef2geodetic, geodist, satazel, skew},
    ins::{InsState, StateLayout},
    navdata::{clock_group, NavigationData},
    obs::ObservationData,
    orbit::SatelliteState,
    pseudorange::{prange, varerr},
};

/// Innovation vector, design matrix and bookkeeping produced by
/// one residual assembly pass. `h` is nv rows by nx columns,
/// contiguous column major storage.
#[derive(Debug, Clone)]
pub(crate) struct Residuals {
    /// Innovations [m]
    pub v: DVector<f64>,
    /// Design matrix (nv x nx)
    pub h: DMatrix<f64>,
    /// Per measurement variance [m^2]
    pub var: DVector<f64>,
    /// Azimuth/elevation [rad] per proposed satellite
    pub azel: Vec<(f64, f64)>,
    /// Satellite contributed a residual
    pub vsat: Vec<bool>,
    /// Pseudorange residual per proposed satellite [m]
    pub resp: Vec<f64>,
    /// Contributing satellite count
    pub ns: usize,
    /// Estimated state count
    pub nx: usize,
}

impl Residuals {
    pub fn nv(&self) -> usize {
        self.v.len()
    }
}

/// Jacobian of the pseudorange wrt the attitude error states:
/// `e . skew(-Cbe l)`, optionally re-expressed through the Euler
/// angle perturbation.
fn jacob_dp_da(e: &Vector3<f64>, ins: &InsState, euler: bool) -> Vector3<f64> {
    let t = skew(&(-(ins.cbe * ins.lever)));
    let dpda = t.transpose() * e;
    if euler {
        let rpy = dcm2rpy(&ins.cbe);
        let (sy, cy) = rpy[2].sin_cos();
        let (sp, cp) = rpy[1].sin_cos();
        let s = nalgebra::Matrix3::new(
            cp * cy,
            sy,
            0.0,
            -cp * sy,
            cy,
            0.0,
            sp,
            0.0,
            1.0,
        );
        s.transpose() * dpda
    } else {
        dpda
    }
}

/// Pseudorange residuals, design matrix and variances for one
/// epoch. `x` carries the running estimate: absolute position and
/// clock states in GNSS mode, the inertial error state plus clock
/// states in tightly coupled mode (the clock entries are refreshed
/// from the inertial state here).
pub(crate) fn rescode(
    iter: usize,
    obs: &[ObservationData],
    sats: &[SatelliteState],
    nav: &NavigationData,
    x: &mut DVector<f64>,
    opt: &Config,
    ins: Option<&InsState>,
) -> Residuals {
    let n = obs.len().min(sats.len()).min(Constants::MAX_OBS);

    let tc = opt.mode == Mode::InsTightlyCoupled
        && opt.coupling == Coupling::Single
        && ins.is_some();

    let layout = StateLayout::new(&opt.ins);
    let (nx, irc) = if tc { (layout.nx, layout.irc) } else { (7, 3) };

    let rr = if let Some(ins) = ins.filter(|_| tc) {
        for k in 0..4 {
            x[irc + k] = ins.dtr[k] * Constants::SPEED_OF_LIGHT_M_S;
        }
        ins.antenna_position()
    } else {
        Vector3::new(x[0], x[1], x[2])
    };
    let pos = ecef2geodetic(&rr);

    let mut v = Vec::<f64>::with_capacity(n + 4);
    let mut var = Vec::<f64>::with_capacity(n + 4);
    let mut rows = Vec::<DVector<f64>>::with_capacity(n + 4);
    let mut azel = vec![(0.0, 0.0); n];
    let mut vsat = vec![false; n];
    let mut resp = vec![0.0; n];
    let mut mask = [false; 4];
    let mut ns = 0;

    for i in 0..n {
        // duplicated observation data: keep the first record
        if i > 0 && obs[i].sat == obs[i - 1].sat {
            warn!("{} ({}) duplicated observation data", obs[i].time, obs[i].sat);
            continue;
        }
        // geometric distance / azimuth / elevation
        let Some((r, e)) = geodist(&sats[i].position_m, &rr) else {
            continue;
        };
        let (az, el) = satazel(&pos, &e);
        azel[i] = (az, el);
        if el < opt.elmin_rad {
            continue;
        }

        // pseudorange with code bias correction
        let (pc, vmeas) = match prange(&obs[i], nav, (az, el), iter, opt) {
            Ok(p) => p,
            Err(e) => {
                debug!("{} ({}) {}", obs[i].time, obs[i].sat, e);
                continue;
            },
        };

        // excluded satellite?
        if opt.excluded(obs[i].sat, sats[i].variance_m2, sats[i].health) {
            continue;
        }

        // ionospheric correction, on the observed satellite L1
        let iono_model = if iter > 0 { opt.iono } else { IonoModel::Broadcast };
        let (mut dion, vion) =
            iono_correction(obs[i].time, nav, obs[i].sat, &pos, (az, el), iono_model);
        let lam_l1 = nav.wavelengths(obs[i].sat)[0];
        if lam_l1 > 0.0 {
            dion *= (lam_l1 / Carrier::L1.wavelength()).powi(2);
        }

        // tropospheric correction
        let tropo_model = if iter > 0 {
            opt.tropo
        } else {
            TropoModel::Saastamoinen
        };
        let (dtrp, vtrp) = tropo_correction(&pos, (az, el), tropo_model);

        // pseudorange residual
        let mut vi =
            pc - (r + x[irc] - Constants::SPEED_OF_LIGHT_M_S * sats[i].clock_bias_s + dion + dtrp);

        // design matrix
        let mut row = DVector::<f64>::zeros(nx);
        if tc {
            let ins = ins.unwrap();
            let dpda = jacob_dp_da(&e, ins, opt.ins.att_euler);
            let dpdl = ins.cbe.transpose() * e;
            row[irc] = 1.0;
            for k in 0..layout.nla {
                row[layout.ila + k] = dpdl[k];
            }
            for k in 0..layout.np {
                row[layout.ip + k] = e[k];
            }
            for k in 0..layout.na {
                row[layout.ia + k] = dpda[k];
            }
        } else {
            for k in 0..3 {
                row[k] = -e[k];
            }
            row[3] = 1.0;
        }

        // time system and receiver bias offsets
        let group = clock_group(obs[i].sat.constellation);
        if group > 0 {
            vi -= x[irc + group];
            row[irc + group] = 1.0;
        }
        mask[group] = true;

        vsat[i] = true;
        resp[i] = vi;
        ns += 1;

        // error variance
        let vi_var = varerr(opt, el, obs[i].sat.constellation)
            + sats[i].variance_m2
            + vmeas
            + vion
            + vtrp;

        debug!(
            "{} ({}) azel={:5.1} {:4.1} res={:7.3} sig={:5.3}",
            obs[i].time,
            obs[i].sat,
            az.to_degrees(),
            el.to_degrees(),
            vi,
            vi_var.sqrt()
        );

        v.push(vi);
        var.push(vi_var);
        rows.push(row);
    }

    // zero innovation anchors keep unobserved clock states
    // from making the system rank deficient
    for (group, seen) in mask.iter().enumerate() {
        if *seen {
            continue;
        }
        let mut row = DVector::<f64>::zeros(nx);
        row[irc + group] = 1.0;
        v.push(0.0);
        var.push(Constants::RANK_ANCHOR_VAR_M2);
        rows.push(row);
    }

    let nv = v.len();
    let h = DMatrix::from_fn(nv, nx, |r, c| rows[r][c]);

    Residuals {
        v: DVector::from_vec(v),
        var: DVector::from_vec(var),
        h,
        azel,
        vsat,
        resp,
        ns,
        nx,
    }
}
