//! propagation.rs — two-ray wall-reflection channel model and BER.
//!
//! Grounded on `pysim/channel.py`: radiation patterns, Fresnel reflection,
//! the two-ray path-loss field superposition, and the Rayleigh/AWGN bit
//! error rate formulas. The reflecting surface is the vertical plane
//! `x = 0` (a wall the reader/tag fly past), not the ground plane — the
//! geometry this simulator models is a drone passing a reflective wall,
//! confirmed against every call site in the original source.
//!
//! `two_ray_pathloss` mirrors the original's default (non-"crutch") return
//! path only: the crutch branch squared the field a second time and was
//! kept only for historical debugging, never the behavior the rest of the
//! model relied on.

use std::f64::consts::PI;

use num_complex::Complex;

pub type Vec3 = [f64; 3];

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

const WALL_NORMAL: Vec3 = [1.0, 0.0, 0.0];

// ---------------------------------------------------------------------
// dB / linear helpers
// ---------------------------------------------------------------------

pub fn to_sin(cosine: f64) -> f64 {
    (1.0 - cosine * cosine).max(0.0).sqrt()
}

pub fn to_log(value: f64, dbm: bool) -> f64 {
    10.0 * value.log10() + if dbm { 30.0 } else { 0.0 }
}

pub fn from_log(db: f64, dbm: bool) -> f64 {
    let offset = if dbm { 30.0 } else { 0.0 };
    10f64.powf((db - offset) / 10.0)
}

pub fn to_power(value: Complex<f64>, dbm: bool) -> f64 {
    to_log(value.norm_sqr(), dbm)
}

// ---------------------------------------------------------------------
// Radiation patterns
// ---------------------------------------------------------------------

pub fn rp_isotropic() -> f64 {
    1.0
}

/// Half-wave dipole gain. `cosine` is the cosine of the angle from the
/// dipole axis, the same quantity every call site in the model computes
/// via a dot product before calling this.
pub fn rp_dipole(cosine: f64) -> f64 {
    const TOL: f64 = 1e-9;
    if cosine.abs() > TOL {
        ((PI / 2.0 * cosine.sin()).cos() / cosine).abs()
    } else {
        0.0
    }
}

fn patch_factor(a_cos: f64, t_cos: f64, wavelen: f64, width: f64, length: f64) -> f64 {
    const TOL: f64 = 1e-9;
    let a_sin = to_sin(a_cos);
    let t_sin = to_sin(t_cos);
    let k = 2.0 * PI / wavelen;
    if a_cos.abs() < TOL {
        0.0
    } else if a_sin.abs() < TOL {
        1.0
    } else if t_sin.abs() < TOL {
        (k * length * a_sin).cos()
    } else {
        let x = k * width / 2.0 * t_sin;
        let sinc = if x.abs() < TOL { 1.0 } else { x.sin() / x };
        sinc * (k * length / 2.0 * a_sin).cos()
    }
}

pub fn rp_patch(a_cos: f64, t_cos: f64, wavelen: f64, width: f64, length: f64) -> f64 {
    patch_factor(a_cos, t_cos, wavelen, width, length).abs()
        * (t_cos * t_cos + a_cos * a_cos * t_cos.sin().powi(2)).sqrt()
}

#[derive(Debug, Clone, Copy)]
pub enum RadiationPattern {
    Isotropic,
    Dipole,
    Patch { width: f64, length: f64 },
}

impl RadiationPattern {
    pub fn gain(&self, a_cos: f64, t_cos: f64, wavelen: f64) -> f64 {
        match self {
            RadiationPattern::Isotropic => rp_isotropic(),
            RadiationPattern::Dipole => rp_dipole(a_cos),
            RadiationPattern::Patch { width, length } => rp_patch(a_cos, t_cos, wavelen, *width, *length),
        }
    }
}

// ---------------------------------------------------------------------
// Reflection
// ---------------------------------------------------------------------

pub fn reflection_constant() -> Complex<f64> {
    Complex::new(-1.0, 0.0)
}

fn eta(permittivity: f64, conductivity: f64, wavelen: f64) -> Complex<f64> {
    Complex::new(permittivity, -60.0 * wavelen * conductivity)
}

fn c_parallel(cosine: f64, permittivity: f64, conductivity: f64, wavelen: f64) -> Complex<f64> {
    (eta(permittivity, conductivity, wavelen) - Complex::new(cosine * cosine, 0.0)).sqrt()
}

fn c_perpendicular(cosine: f64, permittivity: f64, conductivity: f64, wavelen: f64) -> Complex<f64> {
    c_parallel(cosine, permittivity, conductivity, wavelen) / eta(permittivity, conductivity, wavelen)
}

/// Fresnel reflection coefficient, mixed between parallel and
/// perpendicular polarization by `polarization` (1.0 = fully parallel).
pub fn reflection(cosine: f64, polarization: f64, permittivity: f64, conductivity: f64, wavelen: f64) -> Complex<f64> {
    let sine = Complex::new(to_sin(cosine), 0.0);
    let cp = c_parallel(cosine, permittivity, conductivity, wavelen);
    let cperp = c_perpendicular(cosine, permittivity, conductivity, wavelen);
    let r_parallel = (sine - cp) / (sine + cp);
    let r_perpendicular = (sine - cperp) / (sine + cperp);
    r_parallel * polarization + r_perpendicular * (1.0 - polarization)
}

// ---------------------------------------------------------------------
// Two-ray path loss
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RayEndpoint {
    pub pos: Vec3,
    pub direction_theta: Vec3,
    pub direction_phi: Vec3,
    pub velocity: Vec3,
    pub pattern: RadiationPattern,
}

#[derive(Debug, Clone, Copy)]
pub struct SurfaceParams {
    pub permittivity: f64,
    pub conductivity: f64,
    pub polarization: f64,
}

/// Complex baseband field at `time`, combining the line-of-sight ray with
/// the single ray reflected off the wall at `x = 0`.
pub fn two_ray_pathloss(
    time: f64,
    surface: SurfaceParams,
    wavelen: f64,
    tx: &RayEndpoint,
    rx: &RayEndpoint,
) -> Complex<f64> {
    let rx_pos_image = [-rx.pos[0], rx.pos[1], rx.pos[2]];

    let d0_vector = sub(rx.pos, tx.pos);
    let d1_vector = sub(rx_pos_image, tx.pos);
    let d0 = norm(d0_vector);
    let d1 = norm(d1_vector);
    let d0_unit = scale(d0_vector, 1.0 / d0);
    let d1_unit = scale(d1_vector, 1.0 / d1);

    let tx_a_cos_0 = dot(d0_unit, tx.direction_theta);
    let tx_t_cos_0 = dot(d0_unit, tx.direction_phi);
    let rx_a_cos_0 = dot(scale(d0_unit, -1.0), rx.direction_theta);
    let rx_t_cos_0 = dot(scale(d0_unit, -1.0), rx.direction_phi);

    let tx_a_cos_1 = dot(d1_unit, tx.direction_theta);
    let tx_t_cos_1 = dot(d1_unit, tx.direction_phi);
    let rx_a_cos_1 = dot(scale(d1_unit, -1.0), rx.direction_theta);
    let rx_t_cos_1 = dot(scale(d1_unit, -1.0), rx.direction_phi);

    let grazing_angle = -dot(d1_unit, WALL_NORMAL);

    let relative_velocity = sub(rx.velocity, tx.velocity);
    let velocity_pr_0 = dot(relative_velocity, d0_unit);
    let velocity_pr_1 = dot(relative_velocity, d1_unit);

    let g0 = tx.pattern.gain(tx_a_cos_0, tx_t_cos_0, wavelen) * rx.pattern.gain(rx_a_cos_0, rx_t_cos_0, wavelen);
    let g1 = tx.pattern.gain(tx_a_cos_1, tx_t_cos_1, wavelen) * rx.pattern.gain(rx_a_cos_1, rx_t_cos_1, wavelen);

    let r1 = reflection(grazing_angle, surface.polarization, surface.permittivity, surface.conductivity, wavelen);

    let k = 2.0 * PI / wavelen;

    let term0 = Complex::new(g0 / d0, 0.0) * Complex::from_polar(1.0, -k * (d0 - time * velocity_pr_0));
    let term1 = r1 * Complex::new(g1 / d1, 0.0) * Complex::from_polar(1.0, -k * (d1 - time * velocity_pr_1));

    (term0 + term1) / Complex::new(2.0 * k, 0.0)
}

pub fn two_ray_pathloss_db(time: f64, surface: SurfaceParams, wavelen: f64, tx: &RayEndpoint, rx: &RayEndpoint) -> f64 {
    to_power(two_ray_pathloss(time, surface, wavelen, tx, rx), false)
}

// ---------------------------------------------------------------------
// SNR and bit error rate
// ---------------------------------------------------------------------

pub fn snr(signal_power_db: f64, noise_power_db: f64) -> f64 {
    from_log(signal_power_db - noise_power_db, false)
}

/// Effective SNR after accounting for preamble-based synchronization
/// error. Below `tol` the receiver cannot synchronize at all and the
/// effective SNR is pinned at the no-information floor.
pub fn snr_full(raw_snr: f64, miller: f64, symbol: f64, preamble: f64, bandwidth: f64, tol: f64) -> f64 {
    if raw_snr < tol {
        return 0.5;
    }
    let sync_angle = (raw_snr * preamble * bandwidth).powf(-0.5);
    miller * raw_snr * symbol * bandwidth * sync_angle.cos().powi(2)
}

/// `erf` via the Abramowitz & Stegun 7.1.26 rational approximation
/// (max error ~1.5e-7); the corpus has no numerics crate that provides it.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

pub fn q_func(x: f64) -> f64 {
    0.5 - 0.5 * erf(x / std::f64::consts::SQRT_2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BerDistribution {
    Rayleigh,
    Awgn,
}

pub fn ber(effective_snr: f64, distribution: BerDistribution, tol: f64) -> f64 {
    if effective_snr < tol {
        return 0.5;
    }
    match distribution {
        BerDistribution::Rayleigh => {
            let t = (1.0 + 2.0 / effective_snr).sqrt();
            0.5 - 1.0 / t + (2.0 / PI) * t.atan() / t
        }
        BerDistribution::Awgn => {
            let t = q_func(effective_snr.sqrt());
            2.0 * t * (1.0 - t)
        }
    }
}
