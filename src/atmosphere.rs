//! Ionospheric and tropospheric delay models
//!
//! The broadcast (Klobuchar) ionosphere model follows
//! IS-GPS-200, Section 20.3.3.5.2.5. The troposphere uses the
//! Saastamoinen model with a standard atmosphere profile.

use hifitime::Epoch;
use nalgebra::Vector3;

use gnss::prelude::SV;

use crate::{
    cfg::{IonoModel, TropoModel},
    constants::Constants,
    navdata::NavigationData,
};

use log::debug;

use std::f64::consts::PI;

/// Klobuchar coefficients in effect when the broadcast set is all zero
const ION_DEFAULT: [f64; 8] = [
    0.1118E-7, -0.7451E-8, -0.5961E-7, 0.1192E-6, //
    0.1167E+6, -0.2294E+6, -0.1311E+6, 0.1049E+7, //
];

fn norm8(x: &[f64; 8]) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Klobuchar broadcast model: L1 delay [m] at the given receiver
/// geodetic position and satellite azimuth/elevation.
pub fn klobuchar(t: Epoch, ion: &[f64; 8], pos: &Vector3<f64>, azel: (f64, f64)) -> f64 {
    let (az, el) = azel;
    if pos[2] < -1.0E3 || el <= 0.0 {
        return 0.0;
    }
    let ion = if norm8(ion) > 0.0 { ion } else { &ION_DEFAULT };

    // earth centered angle (semi-circle)
    let psi = 0.0137 / (el / PI + 0.11) - 0.022;

    // subionospheric latitude/longitude (semi-circle)
    let phi = (pos[0] / PI + psi * az.cos()).clamp(-0.416, 0.416);
    let lam = pos[1] / PI + psi * az.sin() / (phi * PI).cos();

    // geomagnetic latitude (semi-circle)
    let phi = phi + 0.064 * ((lam - 1.617) * PI).cos();

    // local time (s)
    let tow = t.to_gpst_seconds().rem_euclid(604800.0);
    let tt = (4.32E4 * lam + tow).rem_euclid(86400.0);

    // slant factor
    let f = 1.0 + 16.0 * (0.53 - el / PI).powi(3);

    // ionospheric delay
    let amp = (ion[0] + phi * (ion[1] + phi * (ion[2] + phi * ion[3]))).max(0.0);
    let per = (ion[4] + phi * (ion[5] + phi * (ion[6] + phi * ion[7]))).max(72000.0);
    let x = 2.0 * PI * (tt - 50400.0) / per;

    Constants::SPEED_OF_LIGHT_M_S
        * f
        * if x.abs() < 1.57 {
            5.0E-9 + amp * (1.0 + x * x * (-0.5 + x * x / 24.0))
        } else {
            5.0E-9
        }
}

/// Saastamoinen model: total (dry + wet) zenith-mapped delay [m]
/// at the given geodetic position and elevation.
pub fn saastamoinen(pos: &Vector3<f64>, azel: (f64, f64), humidity: f64) -> f64 {
    let el = azel.1;
    if pos[2] < -100.0 || pos[2] > 1.0E4 || el <= 0.0 {
        return 0.0;
    }
    // standard atmosphere
    let hgt = pos[2].max(0.0);
    let pres = 1013.25 * (1.0 - 2.2557E-5 * hgt).powf(5.2568);
    let temp = 15.0 - 6.5E-3 * hgt + 273.16;
    let e = 6.108 * humidity * ((17.15 * temp - 4684.0) / (temp - 38.45)).exp();

    let z = PI / 2.0 - el;
    let trph =
        0.0022768 * pres / (1.0 - 0.00266 * (2.0 * pos[0]).cos() - 0.00028 * hgt / 1.0E3) / z.cos();
    let trpw = 0.002277 * (1255.0 / temp + 0.05) * e / z.cos();
    trph + trpw
}

/// Ionospheric correction for one satellite: (L1 delay [m], variance [m^2]).
///
/// The SBAS/TEC/LEX grids belong to external collaborators; their
/// selections fall through to a zero delay with zero variance here,
/// as does the dual frequency combination which cancels the delay
/// upstream.
pub fn iono_correction(
    t: Epoch,
    nav: &NavigationData,
    sat: SV,
    pos: &Vector3<f64>,
    azel: (f64, f64),
    model: IonoModel,
) -> (f64, f64) {
    match model {
        IonoModel::Broadcast => {
            let ion = klobuchar(t, &nav.ion_gps, pos, azel);
            (ion, (ion * Constants::ERR_BRDCI).powi(2))
        },
        IonoModel::Qzss if norm8(&nav.ion_qzs) > 0.0 => {
            let ion = klobuchar(t, &nav.ion_qzs, pos, azel);
            (ion, (ion * Constants::ERR_BRDCI).powi(2))
        },
        IonoModel::Off => (0.0, Constants::ERR_ION_M.powi(2)),
        other => {
            debug!("{} iono model {:?} unavailable here", sat, other);
            (0.0, 0.0)
        },
    }
}

/// Tropospheric correction: (delay [m], variance [m^2]).
pub fn tropo_correction(
    pos: &Vector3<f64>,
    azel: (f64, f64),
    model: TropoModel,
) -> (f64, f64) {
    match model {
        TropoModel::Saastamoinen | TropoModel::Estimate | TropoModel::EstimateGrad => {
            let trp = saastamoinen(pos, azel, Constants::REL_HUMIDITY);
            let var = (Constants::ERR_SAAS_M / (azel.1.sin() + 0.1)).powi(2);
            (trp, var)
        },
        TropoModel::Off => (0.0, Constants::ERR_TROP_M.powi(2)),
        TropoModel::Sbas => (0.0, 0.0),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cfg::{IonoModel, TropoModel};
    use crate::navdata::NavigationData;
    use gnss::prelude::{Constellation, SV};
    use hifitime::Epoch;
    use nalgebra::Vector3;
    use rstest::rstest;

    const D2R: f64 = std::f64::consts::PI / 180.0;

    fn gpst(week: u64, tow: f64) -> Epoch {
        Epoch::from_gpst_seconds(week as f64 * 604800.0 + tow)
    }

    #[test]
    fn klobuchar_reference_values() {
        // truth values computed with the IS-GPS-200 reference model
        let t = gpst(1875, 479820.0);
        let ion = [
            0.1583E-7, -0.7451E-8, -0.5960E-7, 0.1192E-6, //
            0.1290E6, -0.2130E6, 0.6554E5, 0.3277E6,
        ];
        let pos = Vector3::new(-35.3 * D2R, 149.1 * D2R, 0.0);
        let d = klobuchar(t, &ion, &pos, (0.0, 15.0 * D2R));
        assert!((d - 7.202).abs() < 1.0E-3, "saw {}", d);

        let t = gpst(1042, 593100.0);
        let ion = [
            0.3820E-7, 0.1490E-7, -0.1790E-6, 0.0, //
            0.1430E6, 0.0, -0.3280E6, 0.1130E6,
        ];
        let pos = Vector3::new(40.0 * D2R, 260.0 * D2R, 0.0);
        let d = klobuchar(t, &ion, &pos, (210.0 * D2R, 20.0 * D2R));
        assert!((d - 23.784).abs() < 1.0E-3, "saw {}", d);
    }

    #[test]
    fn klobuchar_below_horizon() {
        let pos = Vector3::new(0.7, 0.1, 100.0);
        assert_eq!(klobuchar(gpst(1875, 0.0), &ION_DEFAULT, &pos, (0.0, -0.01)), 0.0);
    }

    #[test]
    fn saastamoinen_sanity() {
        let pos = Vector3::new(40.0 * D2R, 0.0, 100.0);
        let d_zenith = saastamoinen(&pos, (0.0, 90.0 * D2R), 0.7);
        assert!(d_zenith > 2.0 && d_zenith < 3.0, "saw {}", d_zenith);
        let d_low = saastamoinen(&pos, (0.0, 10.0 * D2R), 0.7);
        assert!(d_low > d_zenith);
        // out of the validity domain
        assert_eq!(saastamoinen(&Vector3::new(0.7, 0.0, 2.0E4), (0.0, 0.5), 0.7), 0.0);
    }

    #[rstest]
    #[case(IonoModel::Off, 25.0)]
    #[case(IonoModel::Sbas, 0.0)]
    #[case(IonoModel::IonoFree, 0.0)]
    fn iono_fallback_variances(#[case] model: IonoModel, #[case] var: f64) {
        let nav = NavigationData::default();
        let sat = SV::new(Constellation::GPS, 1);
        let pos = Vector3::new(0.7, 0.1, 100.0);
        let (d, v) = iono_correction(gpst(1875, 0.0), &nav, sat, &pos, (0.0, 0.5), model);
        assert_eq!(d, 0.0);
        assert_eq!(v, var);
    }

    #[test]
    fn tropo_off_keeps_variance() {
        let pos = Vector3::new(0.7, 0.1, 100.0);
        let (d, v) = tropo_correction(&pos, (0.0, 0.5), TropoModel::Off);
        assert_eq!(d, 0.0);
        assert_eq!(v, 9.0);
    }

    #[test]
    fn qzss_coefficients_take_effect() {
        let mut nav = NavigationData::default();
        let sat = SV::new(Constellation::QZSS, 1);
        let pos = Vector3::new(0.6, 2.4, 50.0);
        let t = gpst(1875, 120000.0);
        // all zero set falls through to no correction
        let (d0, v0) = iono_correction(t, &nav, sat, &pos, (0.0, 0.8), IonoModel::Qzss);
        assert_eq!((d0, v0), (0.0, 0.0));
        nav.ion_qzs = [
            0.1583E-7, -0.7451E-8, -0.5960E-7, 0.1192E-6, //
            0.1290E6, -0.2130E6, 0.6554E5, 0.3277E6,
        ];
        let (d1, v1) = iono_correction(t, &nav, sat, &pos, (0.0, 0.8), IonoModel::Qzss);
        assert!(d1 > 0.0);
        assert!((v1 - (0.5 * d1).powi(2)).abs() < 1.0E-12);
    }
}
