//! Solution quality gates

use nalgebra::{DMatrix, DVector};

use log::warn;

use crate::{
    cfg::Config,
    constants::{Constants, CHISQR_999},
    error::Error,
    ins::StateLayout,
    navigation::dop::dops,
};

fn masked_azels(azel: &[(f64, f64)], vsat: &[bool]) -> Vec<(f64, f64)> {
    azel.iter()
        .zip(vsat.iter())
        .filter_map(|(a, used)| if *used { Some(*a) } else { None })
        .collect()
}

/// GNSS only validation: chi-square test on the post-fit
/// residuals, then the geometry check.
pub(crate) fn valsol(
    azel: &[(f64, f64)],
    vsat: &[bool],
    opt: &Config,
    v: &DVector<f64>,
    nx: usize,
) -> Result<(), Error> {
    let nv = v.len();

    // chi-square validation of residuals
    let vv = v.norm_squared();
    if nv > nx && vv > CHISQR_999[(nv - nx - 1).min(CHISQR_999.len() - 1)] {
        return Err(Error::ChiSquareReject {
            nv,
            vv,
            threshold: CHISQR_999[(nv - nx - 1).min(CHISQR_999.len() - 1)],
        });
    }
    // large gdop check
    let dop = dops(&masked_azels(azel, vsat), opt.elmin_rad);
    if dop.gdop <= 0.0 || dop.gdop > opt.max_gdop {
        return Err(Error::GdopReject { nv, gdop: dop.gdop });
    }
    Ok(())
}

/// Tightly coupled validation: bounds on the estimated error
/// state, a soft warning per oversized post-fit residual, then
/// the geometry check.
pub(crate) fn valins(
    azel: &[(f64, f64)],
    vsat: &[bool],
    opt: &Config,
    layout: &StateLayout,
    v: &DVector<f64>,
    x: &DVector<f64>,
    r: &DMatrix<f64>,
    thres: f64,
) -> Result<(), Error> {
    let nv = v.len();
    let fact = thres * thres;

    // check estimated states
    let att = x.rows(layout.ia, layout.na).norm();
    let ba = if layout.nba > 0 {
        x.rows(layout.iba, layout.nba).norm()
    } else {
        0.0
    };
    let bg = if layout.nbg > 0 {
        x.rows(layout.ibg, layout.nbg).norm()
    } else {
        0.0
    };
    if att > 5.0_f64.to_radians()
        || ba > 1.0E4 * Constants::MILLI_G_M_S2
        || bg > 5.0_f64.to_radians()
    {
        warn!("too large estimated state error");
        return Err(Error::StateMagnitudeReject);
    }
    // post-fit residual test (R carries the prefit dimension)
    for i in 0..nv.min(r.nrows()) {
        if v[i] * v[i] < fact * r[(i, i)] {
            continue;
        }
        warn!("large residual (v={:6.3} sig={:.3})", v[i], r[(i, i)].sqrt());
    }
    // large gdop check
    let dop = dops(&masked_azels(azel, vsat), opt.elmin_rad);
    if dop.gdop <= 0.0 || dop.gdop > opt.max_gdop {
        return Err(Error::GdopReject { nv, gdop: dop.gdop });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{valins, valsol};
    use crate::{
        cfg::Config,
        constants::CHISQR_999,
        error::Error,
        ins::StateLayout,
    };
    use nalgebra::{DMatrix, DVector};

    fn spread_azels(n: usize) -> (Vec<(f64, f64)>, Vec<bool>) {
        let mut azels = vec![(0.0, 1.4)];
        for k in 1..n {
            azels.push((k as f64 * 0.9, 0.6));
        }
        (azels, vec![true; n])
    }

    #[test]
    fn chi_square_gate_at_the_table_edge() {
        let cfg = Config::default();
        let (azels, vsat) = spread_azels(7);
        let (nv, nx) = (10, 7);
        // nv - nx - 1 = 2 dof
        let threshold = CHISQR_999[nv - nx - 1];
        let eps = 1.0E-6;

        let build = |vv: f64| {
            let mut v = DVector::zeros(nv);
            v[0] = vv.sqrt();
            v
        };

        assert!(valsol(&azels, &vsat, &cfg, &build(threshold - eps), nx).is_ok());
        let err = valsol(&azels, &vsat, &cfg, &build(threshold + eps), nx).unwrap_err();
        assert!(matches!(err, Error::ChiSquareReject { .. }));
    }

    #[test]
    fn gdop_gate() {
        let mut cfg = Config::default();
        cfg.max_gdop = 2.0;
        // stacked satellites: degenerate geometry reads as gdop 0
        let azels = vec![(0.3, 0.8); 8];
        let vsat = vec![true; 8];
        let v = DVector::zeros(8);
        let err = valsol(&azels, &vsat, &cfg, &v, 7).unwrap_err();
        assert!(matches!(err, Error::GdopReject { .. }));
    }

    #[test]
    fn ins_state_magnitude_gate() {
        let cfg = Config::default();
        let layout = StateLayout::new(&cfg.ins);
        let (azels, vsat) = spread_azels(7);
        let v = DVector::zeros(7);
        let r = DMatrix::identity(7, 7);

        let mut x = DVector::zeros(layout.nx);
        assert!(valins(&azels, &vsat, &cfg, &layout, &v, &x, &r, 4.0).is_ok());

        x[layout.ia] = 6.0_f64.to_radians();
        assert_eq!(
            valins(&azels, &vsat, &cfg, &layout, &v, &x, &r, 4.0),
            Err(Error::StateMagnitudeReject)
        );

        let mut x = DVector::zeros(layout.nx);
        x[layout.ibg] = 6.0_f64.to_radians();
        assert_eq!(
            valins(&azels, &vsat, &cfg, &layout, &v, &x, &r, 4.0),
            Err(Error::StateMagnitudeReject)
        );
    }
}
