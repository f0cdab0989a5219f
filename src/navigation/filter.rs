//! Estimation backends: normal equation least squares and the
//! Joseph form EKF measurement update

use nalgebra::{DMatrix, DVector};

use crate::error::Error;

/// Least squares by normal equations: `dx = (H' H)^-1 H' v`,
/// together with the cofactor matrix `(H' H)^-1`. `h` carries one
/// row per measurement.
pub(crate) fn lsq(h: &DMatrix<f64>, v: &DVector<f64>) -> Result<(DVector<f64>, DMatrix<f64>), Error> {
    if h.nrows() < h.ncols() {
        return Err(Error::LackOfValidSats(h.nrows()));
    }
    let ht = h.transpose();
    let q = (&ht * h).try_inverse().ok_or(Error::LsqError)?;
    let dx = &q * (ht * v);
    if !dx.iter().all(|x| x.is_finite()) {
        return Err(Error::LsqError);
    }
    Ok((dx, q))
}

/// EKF measurement update in Joseph form:
/// `K = P H' (H P H' + R)^-1`, `x += K v`,
/// `P = (I - K H) P (I - K H)' + K R K'`.
///
/// Fails when the innovation covariance is not positive definite;
/// in that case `x` and `p` are left untouched.
pub(crate) fn ekf_update(
    x: &mut DVector<f64>,
    p: &mut DMatrix<f64>,
    h: &DMatrix<f64>,
    v: &DVector<f64>,
    r: &DMatrix<f64>,
) -> Result<(), Error> {
    let nx = x.len();

    let ph_t = &*p * h.transpose();
    let s = h * &ph_t + r;
    let s_inv = s.cholesky().ok_or(Error::EkfFilterError)?.inverse();
    let k = ph_t * s_inv;

    let dx = &k * v;
    if !dx.iter().all(|x| x.is_finite()) {
        return Err(Error::EkfFilterError);
    }

    let i_kh = DMatrix::<f64>::identity(nx, nx) - &k * h;
    let mut p_new = &i_kh * &*p * i_kh.transpose() + &k * r * k.transpose();

    // restore symmetry lost to rounding
    let p_t = p_new.transpose();
    p_new = (p_new + p_t) * 0.5;
    if !p_new.iter().all(|x| x.is_finite()) {
        return Err(Error::EkfFilterError);
    }

    *x += dx;
    *p = p_new;
    Ok(())
}
