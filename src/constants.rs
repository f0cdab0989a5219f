//! Physical constants and solver tables

pub(crate) struct Constants;

impl Constants {
    pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

    /// Earth rotation rate (WGS84) [rad/s]
    pub const EARTH_ROTATION_RATE_RAD_S: f64 = 7.2921151467E-5;

    /// WGS84 semi major axis [m]
    pub const EARTH_SEMI_MAJOR_AXIS_M: f64 = 6_378_137.0_f64;

    /// WGS84 flattening
    pub const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;

    /// Earth gravity [m/s^2]
    pub const EARTH_GRAVITY_M_S2: f64 = 9.80665;

    /// One milli-g expressed in [m/s^2]
    pub const MILLI_G_M_S2: f64 = 1.0E-3 * Self::EARTH_GRAVITY_M_S2;

    /// Observations consumed per epoch (capacity)
    pub const MAX_OBS: usize = 64;

    /// Iteration cap shared by the WLS and Doppler loops
    pub const MAX_ITER: usize = 10;

    /// WLS loop exit criterion on ||dx|| [m]
    pub const WLS_CONVERGENCE_M: f64 = 1.0E-4;

    /// Doppler loop exit criterion on ||dx|| [m/s]
    pub const VEL_CONVERGENCE_M_S: f64 = 1.0E-6;

    /// Position std cap for an accepted single point solution [m]
    pub const MAX_POS_STD_M: f64 = 30.0;

    /// A priori orbital variance above which a satellite is excluded [m^2]
    pub const MAX_EPH_VAR_M2: f64 = 300.0 * 300.0;

    /// Measurement error factor: GPS/GAL/BDS/QZSS
    pub const EFACT_GPS: f64 = 1.0;
    /// Measurement error factor: Glonass
    pub const EFACT_GLO: f64 = 1.5;
    /// Measurement error factor: SBAS
    pub const EFACT_SBS: f64 = 3.0;

    /// Ionospheric delay std when no model applies [m]
    pub const ERR_ION_M: f64 = 5.0;
    /// Tropospheric delay std when no model applies [m]
    pub const ERR_TROP_M: f64 = 3.0;
    /// Saastamoinen model error std [m]
    pub const ERR_SAAS_M: f64 = 0.3;
    /// Broadcast iono model error factor
    pub const ERR_BRDCI: f64 = 0.5;
    /// Code bias error std [m]
    pub const ERR_CBIAS_M: f64 = 0.3;
    /// Relative humidity for the Saastamoinen model
    pub const REL_HUMIDITY: f64 = 0.7;

    /// Variance of the zero innovation rows that anchor
    /// unobserved receiver clock states [m^2]
    pub const RANK_ANCHOR_VAR_M2: f64 = 0.01;
}

/// chi-square(n) right tail values, alpha=0.001, n=1..100
pub(crate) const CHISQR_999: [f64; 100] = [
    10.8, 13.8, 16.3, 18.5, 20.5, 22.5, 24.3, 26.1, 27.9, 29.6, //
    31.3, 32.9, 34.5, 36.1, 37.7, 39.3, 40.8, 42.3, 43.8, 45.3, //
    46.8, 48.3, 49.7, 51.2, 52.6, 54.1, 55.5, 56.9, 58.3, 59.7, //
    61.1, 62.5, 63.9, 65.2, 66.6, 68.0, 69.3, 70.7, 72.1, 73.4, //
    74.7, 76.0, 77.3, 78.6, 80.0, 81.3, 82.6, 84.0, 85.4, 86.7, //
    88.0, 89.3, 90.6, 91.9, 93.2, 94.5, 95.8, 97.0, 98.3, 99.6, //
    100.8, 102.1, 103.3, 104.6, 105.8, 107.1, 108.3, 109.5, 110.8, 112.0, //
    113.2, 114.4, 115.7, 116.9, 118.1, 119.3, 120.5, 121.7, 122.9, 124.1, //
    125.3, 126.5, 127.6, 128.8, 130.0, 131.2, 132.4, 133.5, 134.7, 135.9, //
    137.0, 138.2, 139.3, 140.5, 141.6, 142.8, 143.9, 145.1, 146.2, 147.3, //
];
