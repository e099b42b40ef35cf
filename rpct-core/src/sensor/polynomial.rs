//! Third-order rational polynomial terms.
//!
//! The order of the 20 terms is the contract with the coefficient arrays of
//! the RPC metadata and must not change.

/// Number of terms in a third-order trivariate polynomial
pub const NUM_TERMS: usize = 20;

/// Compute the 20 monomials for normalized (long, lat, height)
pub fn compute_terms(u: f64, v: f64, w: f64) -> [f64; NUM_TERMS] {
    [
        1.0,
        u,
        v,
        w,
        u * v,
        u * w,
        v * w,
        u * u,
        v * v,
        w * w,
        u * v * w,
        u * u * u,
        u * v * v,
        u * w * w,
        u * u * v,
        v * v * v,
        v * w * w,
        u * u * w,
        v * v * w,
        w * w * w,
    ]
}

/// Dot product of terms and coefficients.
///
/// Even and odd terms are summed separately and combined at the end; the same
/// order is used by [`evaluate4`] so both give identical results.
pub fn evaluate(terms: &[f64; NUM_TERMS], coeffs: &[f64; NUM_TERMS]) -> f64 {
    let mut sum_even = 0.0;
    let mut sum_odd = 0.0;

    for i in (0..NUM_TERMS).step_by(2) {
        sum_even += terms[i] * coeffs[i];
        sum_odd += terms[i + 1] * coeffs[i + 1];
    }

    sum_even + sum_odd
}

/// Evaluate four polynomials sharing one set of terms.
///
/// `packed` holds LINE_NUM, LINE_DEN, SAMP_NUM and SAMP_DEN coefficients back
/// to back. Returns the sums in the same order.
pub fn evaluate4(terms: &[f64; NUM_TERMS], packed: &[f64; 4 * NUM_TERMS]) -> [f64; 4] {
    let mut even = [0.0; 4];
    let mut odd = [0.0; 4];

    for i in (0..NUM_TERMS).step_by(2) {
        for lane in 0..4 {
            let coeffs = &packed[lane * NUM_TERMS..];
            even[lane] += terms[i] * coeffs[i];
            odd[lane] += terms[i + 1] * coeffs[i + 1];
        }
    }

    [
        even[0] + odd[0],
        even[1] + odd[1],
        even[2] + odd[2],
        even[3] + odd[3],
    ]
}
