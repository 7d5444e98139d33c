use crate::CoreError;

/// Floating point type used throughout the coupling layer
pub type Real = f64;

/// Absolute/relative tolerance pair for float comparisons
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Parse a trimmed decimal field, naming the field in the error.
pub fn parse_real(text: &str, what: &str) -> Result<Real, CoreError> {
    text.trim()
        .parse::<Real>()
        .map_err(|_| CoreError::InvalidNumber {
            what: what.to_string(),
            text: text.to_string(),
        })
}

/// Format a value the way the engine files carry it: integral values without
/// a fractional part, everything else in shortest round-trip form.
pub fn format_real(v: Real) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}
