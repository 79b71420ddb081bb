//! Common Utilities
//!
//! Numeric helpers shared by the link-adaptation and association code

/// Convert a dB value to linear scale
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 10.0)
}

/// Convert a linear value to dB
pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}

/// Absolute-tolerance float comparison
pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// Wrapping modulo that handles negative offsets, e.g. `modulo(-3, 10) == 7`
pub fn modulo(n: i64, m: u32) -> u32 {
    let m = i64::from(m);
    (((n % m) + m) % m) as u32
}
