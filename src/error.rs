use thiserror::Error;

use crate::prelude::SV;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Caller proposed an empty epoch: no resolution attempt.
    #[error("no observation data")]
    NoObservations,
    /// Residual assembly left fewer measurements than estimated states.
    /// The embedded count is the number of assembled residuals, which
    /// the tightly coupled caller may still consume.
    #[error("lack of valid sats ns={0}")]
    LackOfValidSats(usize),
    /// Singular normal equations: bad geometry or bad signal data.
    #[error("lsq error: singular normal equations")]
    LsqError,
    /// The WLS loop hit its iteration cap without converging.
    #[error("iteration divergent i={0}")]
    IterationDivergent(usize),
    /// Post-fit residual sum rejected by the chi-square table.
    #[error("chi-square error nv={nv} vv={vv:.1} cs={threshold:.1}")]
    ChiSquareReject { nv: usize, vv: f64, threshold: f64 },
    /// Satellite geometry too weak (or degenerate) for a trusted fix.
    #[error("gdop error nv={nv} gdop={gdop:.1}")]
    GdopReject { nv: usize, gdop: f64 },
    /// Converged, but the formal position variance is unrealistic.
    #[error("large position variance")]
    PositionVarianceExceeded,
    /// Innovation covariance is not positive definite: no EKF update.
    #[error("ekf filter error: innovation covariance not positive definite")]
    EkfFilterError,
    /// Estimated attitude/bias corrections exceed physical bounds.
    #[error("too large estimated state error")]
    StateMagnitudeReject,
    /// Dual frequency processing requires both wavelengths.
    #[error("{0} missing dual frequency wavelength")]
    NoDualWavelength(SV),
    /// Pseudorange observation absent on the required frequency.
    #[error("{0} missing pseudo range observation")]
    MissingPseudoRange(SV),
    /// Signal below the elevation dependent SNR mask.
    #[error("{0} rejected by snr mask")]
    SnrMasked(SV),
    /// The initialiser quality gates failed for this epoch;
    /// keep feeding solutions, the FIFO keeps absorbing them.
    #[error("ins initialisation pending: {0}")]
    SolutionUnavailable(&'static str),
}
