//! Code bias corrected pseudorange construction

use gnss::prelude::Constellation;

use crate::{
    cfg::{Config, EphemerisChoice, IonoModel},
    constants::Constants,
    error::Error,
    navdata::NavigationData,
    obs::ObservationData,
};

use log::debug;

/// Pseudorange measurement error variance from the elevation
/// dependent model, before satellite/iono/tropo contributions.
pub(crate) fn varerr(opt: &Config, el: f64, c: Constellation) -> f64 {
    let fact = if c == Constellation::Glonass {
        Constants::EFACT_GLO
    } else if c.is_sbas() {
        Constants::EFACT_SBS
    } else {
        Constants::EFACT_GPS
    };
    let mut varr = opt.err[0].powi(2) * (opt.err[1].powi(2) + opt.err[2].powi(2) / el.sin());
    if opt.iono == IonoModel::IonoFree {
        varr *= 3.0_f64.powi(2);
    }
    fact.powi(2) * varr
}

/// Corrected pseudorange [m] and its measurement variance [m^2].
///
/// Frequency slot 0 carries L1/E1/B1; the secondary slot is L2,
/// except for Galileo and SBAS where L5/E5a takes its place.
/// DCBs refer every code to the P1/P2 pair; a missing P1-P2 bias
/// is substituted by the broadcast TGD for GPS/GAL/QZSS.
pub(crate) fn prange(
    obs: &ObservationData,
    nav: &NavigationData,
    azel: (f64, f64),
    iter: usize,
    opt: &Config,
) -> Result<(f64, f64), Error> {
    let lam = nav.wavelengths(obs.sat);
    let c = obs.sat.constellation;

    let i = 0_usize;
    // L1-L2 for GPS/GLO/QZS/BDS, L1-L5 for GAL/SBS
    let j = if c == Constellation::Galileo || c.is_sbas() {
        2
    } else {
        1
    };
    if lam[i] == 0.0 || lam[j] == 0.0 {
        return Err(Error::NoDualWavelength(obs.sat));
    }

    // snr mask applies once the solution is roughly known
    if iter > 0 {
        if opt.snr_mask.masked(0, i, azel.1, obs.snr_dbhz(i)) {
            debug!(
                "{} ({}) snr mask: el={:.1} snr={:.1}",
                obs.time,
                obs.sat,
                azel.1.to_degrees(),
                obs.snr_dbhz(i)
            );
            return Err(Error::SnrMasked(obs.sat));
        }
        if opt.iono == IonoModel::IonoFree && opt.snr_mask.masked(0, j, azel.1, obs.snr_dbhz(j)) {
            return Err(Error::SnrMasked(obs.sat));
        }
    }

    // f1^2/f2^2
    let gamma = lam[j].powi(2) / lam[i].powi(2);

    let mut p1 = obs.pseudo_range_m[i];
    let mut p2 = obs.pseudo_range_m[j];
    let [mut p1_p2, p1_c1, p2_c2] = nav.code_biases(obs.sat);

    // if no P1-P2 DCB, use TGD instead
    if p1_p2 == 0.0
        && matches!(
            c,
            Constellation::GPS | Constellation::Galileo | Constellation::QZSS
        )
    {
        p1_p2 = (1.0 - gamma) * nav.tgd_m(obs.sat);
    }

    let mut pc = if opt.iono == IonoModel::IonoFree {
        // dual-frequency
        if p1 == 0.0 || p2 == 0.0 {
            return Err(Error::MissingPseudoRange(obs.sat));
        }
        if obs.code[i].is_c1() {
            p1 += p1_c1; // C1->P1
        }
        if obs.code[j].is_c2() {
            p2 += p2_c2; // C2->P2
        }
        // iono-free combination
        (gamma * p1 - p2) / (gamma - 1.0)
    } else {
        // single-frequency
        if p1 == 0.0 {
            return Err(Error::MissingPseudoRange(obs.sat));
        }
        if obs.code[i].is_c1() {
            p1 += p1_c1; // C1->P1
        }
        p1 - p1_p2 / (1.0 - gamma)
    };

    if opt.sateph == EphemerisChoice::Sbas {
        pc -= p1_c1; // sbas clock is referred to C1
    }

    Ok((pc, Constants::ERR_CBIAS_M.powi(2)))
}
