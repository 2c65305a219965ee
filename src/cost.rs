//! Cost functions.
//!
//! The cost only matters to training in one place: the error signal at the
//! output layer. Its value is computed for monitoring.

use serde::{Deserialize, Serialize};

use crate::arena::Arena;
use crate::tensor::Tensor;
use crate::{Error, Result};

/// Cost used to train a network. The discriminant is the tag stored in
/// network files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum CostFunction {
    /// `C = ½‖a − y‖²`
    Quadratic = 0,
    /// `C = −Σ y ln a + (1 − y) ln(1 − a)`
    #[default]
    CrossEntropy = 1,
}

impl CostFunction {
    #[inline]
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0 => Ok(Self::Quadratic),
            1 => Ok(Self::CrossEntropy),
            other => Err(Error::InvalidFormat(format!("unknown cost function tag {other}"))),
        }
    }

    /// Error signal `δ = ∂C/∂z` at the output layer.
    ///
    /// Quadratic: `(a − y) ∘ σ'(z)`. Cross-entropy: `a − y`; the σ' factor
    /// cancels against the cost's derivative.
    pub fn output_error<T: Tensor>(
        self,
        arena: &mut Arena,
        activation: T,
        target: T,
        weighted_input: T,
    ) -> T {
        let diff = arena.sub(activation, target);
        match self {
            Self::Quadratic => {
                let slope = arena.sigmoid_prime(weighted_input);
                arena.hadamard(diff, slope)
            }
            Self::CrossEntropy => diff,
        }
    }

    /// Cost of one example's output `a` against target `y`.
    pub fn value(self, a: &[f32], y: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), y.len());
        match self {
            Self::Quadratic => {
                0.5 * a
                    .iter()
                    .zip(y)
                    .map(|(a, y)| (a - y) * (a - y))
                    .sum::<f32>()
            }
            Self::CrossEntropy => a
                .iter()
                .zip(y)
                .map(|(&a, &y)| -(xlogy(y, a) + xlogy(1.0 - y, 1.0 - a)))
                .sum(),
        }
    }
}

// x · ln(y) with 0 · ln(0) = 0.
#[inline]
fn xlogy(x: f32, y: f32) -> f32 {
    if x == 0.0 { 0.0 } else { x * y.ln() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Vector;
    use approx::assert_relative_eq;

    #[test]
    fn tags_round_trip_and_reject_unknown() {
        for cost in [CostFunction::Quadratic, CostFunction::CrossEntropy] {
            assert_eq!(CostFunction::from_tag(cost.tag()).unwrap(), cost);
        }
        assert!(matches!(
            CostFunction::from_tag(7),
            Err(Error::InvalidFormat(_))
        ));
        assert_eq!(CostFunction::default(), CostFunction::CrossEntropy);
    }

    #[test]
    fn cross_entropy_error_skips_sigmoid_prime() {
        let mut arena = Arena::new(1024);
        let a = Vector::from_slice(&mut arena, &[0.8, 0.3]);
        let y = Vector::from_slice(&mut arena, &[1.0, 0.0]);
        let z = Vector::from_slice(&mut arena, &[1.2, -0.4]);

        let ce = CostFunction::CrossEntropy.output_error(&mut arena, a, y, z);
        let q = CostFunction::Quadratic.output_error(&mut arena, a, y, z);
        let (ce, q) = (arena.values(ce).to_vec(), arena.values(q).to_vec());

        assert_relative_eq!(ce[0], -0.2, epsilon = 1e-6);
        assert_relative_eq!(ce[1], 0.3, epsilon = 1e-6);
        for (i, &zi) in [1.2_f32, -0.4].iter().enumerate() {
            let expected = ce[i] * crate::activation::sigmoid_prime(zi);
            assert_relative_eq!(q[i], expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn cost_values() {
        let q = CostFunction::Quadratic.value(&[0.5, 1.0], &[0.0, 0.0]);
        assert_relative_eq!(q, 0.625);

        let ce = CostFunction::CrossEntropy.value(&[0.5, 0.0], &[1.0, 0.0]);
        assert_relative_eq!(ce, 2.0_f32.ln(), epsilon = 1e-6);
    }
}
