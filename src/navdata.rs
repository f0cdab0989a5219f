//! Navigation table: biases, wavelengths, ionosphere coefficients

use std::collections::HashMap;

use gnss::prelude::{Constellation, SV};

use crate::{carrier::Carrier, constants::Constants, obs::NFREQ};

/// Shared navigation products consumed during a solve. Receives
/// copy-on-update snapshots from the decoding threads; solvers
/// observe one consistent snapshot per epoch.
#[derive(Debug, Clone, Default)]
pub struct NavigationData {
    /// Differential code biases per satellite [m]:
    /// P1-P2, P1-C1, P2-C2
    pub cbias: HashMap<SV, [f64; 3]>,
    /// Broadcast total group delay per satellite [s]
    pub tgd_s: HashMap<SV, f64>,
    /// Glonass frequency channel numbers
    pub glo_fcn: HashMap<SV, i8>,
    /// Klobuchar coefficients broadcast by GPS
    pub ion_gps: [f64; 8],
    /// Klobuchar coefficients broadcast by QZSS
    pub ion_qzs: [f64; 8],
}

impl NavigationData {
    /// Total group delay in meters, 0.0 when unknown (gettgd).
    pub fn tgd_m(&self, sat: SV) -> f64 {
        self.tgd_s
            .get(&sat)
            .map(|tgd| Constants::SPEED_OF_LIGHT_M_S * tgd)
            .unwrap_or(0.0)
    }
    /// DCB triple (P1-P2, P1-C1, P2-C2) in meters, zeros when untabulated.
    pub fn code_biases(&self, sat: SV) -> [f64; 3] {
        self.cbias.get(&sat).copied().unwrap_or([0.0; 3])
    }
    /// Carrier wavelength table for one satellite, one entry per
    /// frequency slot. Slot 0 is L1 (B1 for BDS); slot 1 is L2
    /// (B2 for BDS, G2 for Glonass); slot 2 is L5/E5a where the
    /// constellation transmits it. 0.0 marks an absent carrier.
    pub fn wavelengths(&self, sat: SV) -> [f64; NFREQ] {
        let fcn = self.glo_fcn.get(&sat).copied().unwrap_or(0);
        let carriers: [Option<Carrier>; NFREQ] = match sat.constellation {
            Constellation::GPS | Constellation::QZSS => {
                [Some(Carrier::L1), Some(Carrier::L2), Some(Carrier::L5)]
            },
            Constellation::Glonass => [Some(Carrier::G1(fcn)), Some(Carrier::G2(fcn)), None],
            Constellation::Galileo => [Some(Carrier::E1), None, Some(Carrier::E5A)],
            Constellation::BeiDou => [Some(Carrier::B1I), Some(Carrier::B2I), None],
            other if other.is_sbas() => [Some(Carrier::L1), None, Some(Carrier::L5)],
            _ => [None, None, None],
        };
        let mut lam = [0.0; NFREQ];
        for (slot, carrier) in carriers.iter().enumerate() {
            if let Some(carrier) = carrier {
                lam[slot] = carrier.wavelength();
            }
        }
        lam
    }
}

/// Receiver clock group of a constellation: 0 GPS (and anything
/// modelled against the GPS clock), 1 GLO, 2 GAL, 3 BDS.
pub(crate) fn clock_group(c: Constellation) -> usize {
    match c {
        Constellation::Glonass => 1,
        Constellation::Galileo => 2,
        Constellation::BeiDou => 3,
        _ => 0,
    }
}

#[cfg(test)]
mod test {
    use super::NavigationData;
    use gnss::prelude::{Constellation, SV};

    #[test]
    fn galileo_skips_l2() {
        let nav = NavigationData::default();
        let lam = nav.wavelengths(SV::new(Constellation::Galileo, 3));
        assert!(lam[0] > 0.0);
        assert_eq!(lam[1], 0.0);
        assert!(lam[2] > 0.0);
    }

    #[test]
    fn glonass_fdma_channel() {
        let mut nav = NavigationData::default();
        let sat = SV::new(Constellation::Glonass, 1);
        let lam0 = nav.wavelengths(sat)[0];
        nav.glo_fcn.insert(sat, 6);
        let lam6 = nav.wavelengths(sat)[0];
        assert!(lam6 < lam0);
    }
}
