//! Tightly coupled pseudorange update of the inertial state

use nalgebra::{DMatrix, DVector, Vector3};

use log::{debug, warn};

use crate::{
    cfg::{Config, EphemerisChoice},
    constants::Constants,
    error::Error,
    ins::{InsState, InsStatus, StateLayout},
    navdata::NavigationData,
    navigation::{filter::ekf_update, rescode, validator::valins},
    obs::ObservationData,
    orbit::SatelliteState,
    solution::{Solution, SolutionStatus},
    solver::EstimateOutput,
};

/// One EKF measurement update folding raw pseudorange residuals
/// into the inertial error state. The inertial state is committed
/// atomically: on any rejection it is left untouched.
pub(crate) fn estinspr(
    obs: &[ObservationData],
    sats: &[SatelliteState],
    nav: &NavigationData,
    opt: &Config,
    sol: &mut Solution,
    ins: &mut InsState,
) -> Result<EstimateOutput, Error> {
    let layout = StateLayout::new(&opt.ins);
    let mut x = DVector::<f64>::zeros(layout.nx);

    // prefit residuals at the inertial linearisation point
    let res = rescode(1, obs, sats, nav, &mut x, opt, Some(ins));
    if res.ns == 0 {
        warn!("{} no observation data feeds the coupling", sol.time);
        return Err(Error::LackOfValidSats(0));
    }

    let mut p = ins.p.clone();
    let r = DMatrix::from_diagonal(&res.var);
    ekf_update(&mut x, &mut p, &res.h, &res.v, &r)?;

    // provisional antenna position and clock states
    let mut inss = ins.clone();
    inss.re = ins.re - Vector3::new(x[layout.ip], x[layout.ip + 1], x[layout.ip + 2]);
    inss.lever = Vector3::zeros();
    for k in 0..4 {
        inss.dtr[k] = x[layout.irc + k] / Constants::SPEED_OF_LIGHT_M_S;
    }

    // postfit residuals at the updated linearisation
    let post = rescode(1, obs, sats, nav, &mut x, opt, Some(&inss));
    if post.ns == 0 {
        warn!("{} coupling lost all satellites post-fit", sol.time);
        return Err(Error::LackOfValidSats(0));
    }
    valins(&post.azel, &post.vsat, opt, &layout, &post.v, &x, &r, 4.0)?;

    // commit
    ins.p = p;
    ins.apply_correction(&layout, &x);
    for k in 0..4 {
        ins.dtr[k] = x[layout.irc + k] / Constants::SPEED_OF_LIGHT_M_S;
    }
    ins.ns = post.ns as u8;
    ins.age = 0.0;
    ins.gstat = if opt.sateph == EphemerisChoice::Sbas {
        SolutionStatus::Sbas
    } else {
        SolutionStatus::Single
    };
    ins.stat = ins.stat.max(InsStatus::Solved);

    sol.stat = ins.gstat;
    sol.ns = ins.ns;
    sol.position_m = ins.antenna_position();
    sol.dtr = ins.dtr;

    debug!(
        "{} coupled update ok ns={} |dx_pos|={:.3}",
        sol.time,
        post.ns,
        x.rows(layout.ip, layout.np).norm()
    );

    Ok(EstimateOutput {
        azel: post.azel,
        vsat: post.vsat,
        resp: post.resp,
        ns: post.ns,
    })
}

#[cfg(test)]
mod test {
    use super::estinspr;
    use crate::{
        cfg::Config,
        error::Error,
        ins::{InsState, InsStatus, StateLayout},
        navdata::NavigationData,
        navigation::test::{synth_sat, RX_ECEF},
        solution::{Solution, SolutionStatus},
    };
    use nalgebra::Vector3;

    fn coupled_setup() -> (
        Config,
        NavigationData,
        Vec<crate::obs::ObservationData>,
        Vec<crate::orbit::SatelliteState>,
        InsState,
    ) {
        let mut cfg = Config::tightly_coupled(Vector3::zeros());
        cfg.iono = crate::cfg::IonoModel::Off;
        cfg.tropo = crate::cfg::TropoModel::Off;

        let antenna = Vector3::from(RX_ECEF);
        let mut obs = vec![];
        let mut sats = vec![];
        for (k, (az, el)) in [
            (10.0, 70.0),
            (60.0, 45.0),
            (120.0, 30.0),
            (185.0, 55.0),
            (250.0, 35.0),
            (300.0, 25.0),
            (340.0, 50.0),
        ]
        .iter()
        .enumerate()
        {
            let (o, s) = synth_sat(&antenna, k as u8 + 1, *az, *el, 0.0);
            obs.push(o);
            sats.push(s);
        }

        let mut ins = InsState::new(&cfg.ins);
        ins.re = antenna;
        ins.stat = InsStatus::Init;
        (cfg, NavigationData::default(), obs, sats, ins)
    }

    #[test]
    fn position_error_is_absorbed() {
        let (cfg, nav, obs, sats, mut ins) = coupled_setup();
        let truth = ins.re;

        // inject 2 m of position error
        ins.re += Vector3::new(1.2, -1.0, 1.2);
        let err0 = (ins.re - truth).norm();

        let layout = StateLayout::new(&cfg.ins);
        let p_pos0: f64 = (0..3).map(|k| ins.p[(layout.ip + k, layout.ip + k)]).sum();

        let mut sol = Solution::default();
        estinspr(&obs, &sats, &nav, &cfg, &mut sol, &mut ins).unwrap();

        let err1 = (ins.re - truth).norm();
        assert!(err1 < 0.1 * err0, "error {} -> {}", err0, err1);

        let p_pos1: f64 = (0..3).map(|k| ins.p[(layout.ip + k, layout.ip + k)]).sum();
        assert!(p_pos1 < p_pos0);

        assert_eq!(ins.gstat, SolutionStatus::Single);
        assert_eq!(ins.stat, InsStatus::Solved);
        assert_eq!(sol.stat, SolutionStatus::Single);
        assert_eq!(ins.age, 0.0);
        assert!(ins.ns >= 7);
    }

    #[test]
    fn rejected_update_leaves_state_untouched() {
        let (mut cfg, nav, obs, sats, mut ins) = coupled_setup();
        // an impossible gdop ceiling forces the validation to reject
        cfg.max_gdop = 1.0E-3;

        let p0 = ins.p.clone();
        let cbe0 = ins.cbe;
        let re0 = ins.re;
        let dtr0 = ins.dtr;

        let mut sol = Solution::default();
        let err = estinspr(&obs, &sats, &nav, &cfg, &mut sol, &mut ins).unwrap_err();
        assert!(matches!(err, Error::GdopReject { .. }));

        assert_eq!(ins.p, p0);
        assert_eq!(ins.cbe, cbe0);
        assert_eq!(ins.re, re0);
        assert_eq!(ins.dtr, dtr0);
        assert_eq!(ins.stat, InsStatus::Init);
    }
}
