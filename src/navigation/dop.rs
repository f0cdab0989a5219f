//! Dilution of precision from satellite geometry

use nalgebra::{DMatrix, Matrix4};

/// Dilution of precision figures. All zero when the geometry
/// matrix could not be inverted, which callers treat as a
/// degenerate (rejected) geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DilutionOfPrecision {
    /// Geometric DOP
    pub gdop: f64,
    /// Position DOP
    pub pdop: f64,
    /// Horizontal DOP
    pub hdop: f64,
    /// Vertical DOP
    pub vdop: f64,
}

/// DOPs from azimuth/elevation pairs [rad], ignoring satellites
/// below the elevation mask.
pub fn dops(azels: &[(f64, f64)], elmin_rad: f64) -> DilutionOfPrecision {
    let used: Vec<_> = azels.iter().filter(|(_, el)| *el >= elmin_rad).collect();
    if used.len() < 4 {
        return DilutionOfPrecision::default();
    }
    let h = DMatrix::from_fn(used.len(), 4, |r, c| {
        let (az, el) = *used[r];
        let cosel = el.cos();
        match c {
            0 => cosel * az.sin(),
            1 => cosel * az.cos(),
            2 => el.sin(),
            _ => 1.0,
        }
    });
    let q: Matrix4<f64> = match (h.transpose() * &h).try_inverse() {
        Some(q) => q.fixed_view::<4, 4>(0, 0).into_owned(),
        None => return DilutionOfPrecision::default(),
    };
    DilutionOfPrecision {
        gdop: q.trace().sqrt(),
        pdop: (q[(0, 0)] + q[(1, 1)] + q[(2, 2)]).sqrt(),
        hdop: (q[(0, 0)] + q[(1, 1)]).sqrt(),
        vdop: q[(2, 2)].sqrt(),
    }
}
