//! Position/velocity/time solution records

use hifitime::Epoch;
use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Solution grade. Per epoch the grade degrades monotonically
/// to the worst passing one; see [SolutionStatus::rank] for the
/// quality ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolutionStatus {
    /// No solution
    #[default]
    None,
    /// Single point (pseudorange only)
    Single,
    /// SBAS augmented
    Sbas,
    /// Code differential
    Dgps,
    /// Carrier float
    Float,
    /// Carrier fixed
    Fix,
    /// Precise point positioning
    Ppp,
    /// Inertial dead reckoning
    DeadReckoning,
}

impl SolutionStatus {
    /// Quality rank, worst first: None < DeadReckoning < Single
    /// < Sbas < Dgps < Float < Ppp < Fix.
    pub fn rank(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::DeadReckoning => 1,
            Self::Single => 2,
            Self::Sbas => 3,
            Self::Dgps => 4,
            Self::Float => 5,
            Self::Ppp => 6,
            Self::Fix => 7,
        }
    }
    /// True when self grades at least as well as `floor` (and is a solution at all).
    pub fn passes(&self, floor: SolutionStatus) -> bool {
        *self != Self::None && self.rank() >= floor.rank()
    }
}

impl std::fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Single => write!(f, "SINGLE"),
            Self::Sbas => write!(f, "SBAS"),
            Self::Dgps => write!(f, "DGPS"),
            Self::Float => write!(f, "FLOAT"),
            Self::Fix => write!(f, "FIX"),
            Self::Ppp => write!(f, "PPP"),
            Self::DeadReckoning => write!(f, "DR"),
        }
    }
}

/// One committed PVT solution.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Solution [Epoch], receiver clock bias removed
    pub time: Epoch,
    /// ECEF position [m]
    pub position_m: Vector3<f64>,
    /// ECEF velocity [m/s]
    pub velocity_m_s: Vector3<f64>,
    /// Position covariance: xx, yy, zz, xy, yz, zx [m^2]
    pub qr: [f64; 6],
    /// Receiver clock offsets [s]: GPS, GLO-GPS, GAL-GPS, BDS-GPS
    pub dtr: [f64; 4],
    /// Receiver clock drift [m/s]
    pub dtrr: f64,
    /// Number of satellites used
    pub ns: u8,
    /// Solution grade
    pub stat: SolutionStatus,
}

impl Default for Solution {
    fn default() -> Self {
        Self {
            time: Epoch::default(),
            position_m: Vector3::zeros(),
            velocity_m_s: Vector3::zeros(),
            qr: [0.0; 6],
            dtr: [0.0; 4],
            dtrr: 0.0,
            ns: 0,
            stat: SolutionStatus::None,
        }
    }
}

impl Solution {
    /// Validity check before a solution may enter the
    /// initialisation FIFO: graded, time tagged, with non zero
    /// state and covariance.
    pub(crate) fn usable(&self) -> bool {
        self.stat != SolutionStatus::None
            && self.time != Epoch::default()
            && (self.position_m.norm() != 0.0 || self.velocity_m_s.norm() != 0.0)
            && (self.qr[0] + self.qr[1] + self.qr[2]) != 0.0
    }
}

#[cfg(test)]
mod test {
    use super::SolutionStatus;

    #[test]
    fn status_ordering() {
        assert!(SolutionStatus::Fix.rank() > SolutionStatus::Float.rank());
        assert!(SolutionStatus::Float.rank() > SolutionStatus::Dgps.rank());
        assert!(SolutionStatus::Dgps.rank() > SolutionStatus::Sbas.rank());
        assert!(SolutionStatus::Sbas.rank() > SolutionStatus::Single.rank());
        assert!(SolutionStatus::Single.rank() > SolutionStatus::None.rank());
    }

    #[test]
    fn iisu_gate() {
        assert!(SolutionStatus::Fix.passes(SolutionStatus::Single));
        assert!(SolutionStatus::Single.passes(SolutionStatus::Single));
        assert!(!SolutionStatus::DeadReckoning.passes(SolutionStatus::Single));
        assert!(!SolutionStatus::None.passes(SolutionStatus::Single));
    }
}
