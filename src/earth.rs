//! WGS84 geodesy and small rotation toolbox

use nalgebra::{Matrix3, Vector3};

use crate::constants::Constants;

fn e2() -> f64 {
    Constants::EARTH_FLATTENING * (2.0 - Constants::EARTH_FLATTENING)
}

/// ECEF [m] to geodetic (lat [rad], lon [rad], ellipsoidal height [m]).
pub fn ecef2geodetic(r: &Vector3<f64>) -> Vector3<f64> {
    let e2 = e2();
    let r2 = r[0] * r[0] + r[1] * r[1];
    let mut z = r[2];
    let mut zk = 0.0;
    let mut v = Constants::EARTH_SEMI_MAJOR_AXIS_M;
    while (z - zk).abs() >= 1.0E-4 {
        zk = z;
        let sinp = z / (r2 + z * z).sqrt();
        v = Constants::EARTH_SEMI_MAJOR_AXIS_M / (1.0 - e2 * sinp * sinp).sqrt();
        z = r[2] + v * e2 * sinp;
    }
    let lat = if r2 > 1.0E-12 {
        (z / r2.sqrt()).atan()
    } else if r[2] > 0.0 {
        std::f64::consts::FRAC_PI_2
    } else {
        -std::f64::consts::FRAC_PI_2
    };
    let lon = if r2 > 1.0E-12 { r[1].atan2(r[0]) } else { 0.0 };
    Vector3::new(lat, lon, (r2 + z * z).sqrt() - v)
}

/// Geodetic (lat [rad], lon [rad], height [m]) to ECEF [m].
pub fn geodetic2ecef(pos: &Vector3<f64>) -> Vector3<f64> {
    let e2 = e2();
    let (sinp, cosp) = pos[0].sin_cos();
    let (sinl, cosl) = pos[1].sin_cos();
    let v = Constants::EARTH_SEMI_MAJOR_AXIS_M / (1.0 - e2 * sinp * sinp).sqrt();
    Vector3::new(
        (v + pos[2]) * cosp * cosl,
        (v + pos[2]) * cosp * sinl,
        (v * (1.0 - e2) + pos[2]) * sinp,
    )
}

/// ECEF to local ENU rotation at the given geodetic position:
/// `enu = E * ecef`.
pub fn enu_matrix(pos: &Vector3<f64>) -> Matrix3<f64> {
    let (sinp, cosp) = pos[0].sin_cos();
    let (sinl, cosl) = pos[1].sin_cos();
    Matrix3::new(
        -sinl,
        cosl,
        0.0,
        -sinp * cosl,
        -sinp * sinl,
        cosp,
        cosp * cosl,
        cosp * sinl,
        sinp,
    )
}

/// NED to ECEF rotation at the given geodetic position:
/// `ecef = Cne * ned`.
pub fn ned2xyz(pos: &Vector3<f64>) -> Matrix3<f64> {
    let (sinp, cosp) = pos[0].sin_cos();
    let (sinl, cosl) = pos[1].sin_cos();
    Matrix3::new(
        -sinp * cosl,
        -sinl,
        -cosp * cosl,
        -sinp * sinl,
        cosl,
        -cosp * sinl,
        cosp,
        0.0,
        -sinp,
    )
}

/// Geometric range [m] between satellite and receiver ECEF
/// positions, Sagnac corrected, together with the receiver to
/// satellite unit line of sight. None below the Earth surface.
pub fn geodist(rs: &Vector3<f64>, rr: &Vector3<f64>) -> Option<(f64, Vector3<f64>)> {
    if rs.norm() < Constants::EARTH_SEMI_MAJOR_AXIS_M {
        return None;
    }
    let d = rs - rr;
    let r = d.norm();
    let e = d / r;
    let sagnac = Constants::EARTH_ROTATION_RATE_RAD_S * (rs[0] * rr[1] - rs[1] * rr[0])
        / Constants::SPEED_OF_LIGHT_M_S;
    Some((r + sagnac, e))
}

/// Azimuth [0, 2pi) and elevation of the line of sight `e`,
/// seen from geodetic position `pos`. A receiver at (or below)
/// the geocenter sees everything at zenith.
pub fn satazel(pos: &Vector3<f64>, e: &Vector3<f64>) -> (f64, f64) {
    if pos[2] <= -Constants::EARTH_SEMI_MAJOR_AXIS_M {
        return (0.0, std::f64::consts::FRAC_PI_2);
    }
    let enu = enu_matrix(pos) * e;
    let az = if enu.norm_squared() < 1.0E-12 {
        0.0
    } else {
        let az = enu[0].atan2(enu[1]);
        if az < 0.0 {
            az + 2.0 * std::f64::consts::PI
        } else {
            az
        }
    };
    (az, enu[2].asin())
}

/// Skew symmetric matrix of `v`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v[2], v[1], v[2], 0.0, -v[0], -v[1], v[0], 0.0)
}

/// Frame rotation about the x axis by `t` [rad].
pub fn rot_x(t: f64) -> Matrix3<f64> {
    let (s, c) = t.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c)
}

/// Frame rotation about the y axis by `t` [rad].
pub fn rot_y(t: f64) -> Matrix3<f64> {
    let (s, c) = t.sin_cos();
    Matrix3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c)
}

/// Frame rotation about the z axis by `t` [rad].
pub fn rot_z(t: f64) -> Matrix3<f64> {
    let (s, c) = t.sin_cos();
    Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Roll/pitch/yaw [rad] to the body to NED direction cosine matrix.
pub fn rpy2dcm(rpy: &Vector3<f64>) -> Matrix3<f64> {
    rot_z(-rpy[2]) * rot_y(-rpy[1]) * rot_x(-rpy[0])
}

/// Direction cosine matrix (body to NED) to roll/pitch/yaw [rad].
pub fn dcm2rpy(c: &Matrix3<f64>) -> Vector3<f64> {
    Vector3::new(
        c[(2, 1)].atan2(c[(2, 2)]),
        -c[(2, 0)].clamp(-1.0, 1.0).asin(),
        c[(1, 0)].atan2(c[(0, 0)]),
    )
}

/// SO(3) exponential of the rotation vector `phi` (Rodrigues).
pub fn so3_exp(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();
    let sk = skew(phi);
    if theta < 1.0E-12 {
        Matrix3::identity() + sk
    } else {
        Matrix3::identity() + sk * (theta.sin() / theta)
            + sk * sk * ((1.0 - theta.cos()) / (theta * theta))
    }
}
