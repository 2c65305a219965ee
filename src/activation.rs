//! Logistic sigmoid and its derivative.
//!
//! Every layer applies `σ(z) = 1 / (1 + e^-z)` element-wise. Backprop needs
//! `σ'(z) = σ(z)(1 - σ(z))` evaluated at the cached weighted input `z`.

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

#[inline]
pub fn sigmoid_prime(x: f32) -> f32 {
    let s = sigmoid(x);
    s * (1.0 - s)
}
