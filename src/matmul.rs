//! Strided GEMM used by every tensor product.
//!
//! Computes `C <- alpha * A·B + beta * C` where `A` is `m x k`, `B` is `k x n`
//! and `C` is `m x n`, each addressed through a row stride and a column stride.
//! Column-major matrices use `(rs, cs) = (1, rows)`; a transposed operand is
//! the same storage read with the strides swapped.
//!
//! - default: a simple, safe triple loop
//! - optional: a faster backend via the `matrixmultiply` feature

#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn gemm_f32(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    rsa: usize,
    csa: usize,
    b: &[f32],
    rsb: usize,
    csb: usize,
    beta: f32,
    c: &mut [f32],
    rsc: usize,
    csc: usize,
) {
    if m == 0 || n == 0 {
        return;
    }
    if k == 0 {
        // Empty inner dimension: the product is zero.
        for i in 0..m {
            for j in 0..n {
                let idx = i * rsc + j * csc;
                c[idx] = if beta == 0.0 { 0.0 } else { beta * c[idx] };
            }
        }
        return;
    }

    debug_assert!(rsa > 0 || m <= 1);
    debug_assert!(csa > 0 || k <= 1);
    debug_assert!(rsb > 0 || k <= 1);
    debug_assert!(csb > 0 || n <= 1);
    debug_assert!(rsc > 0 || m <= 1);
    debug_assert!(csc > 0 || n <= 1);
    debug_assert!(a.len() > (m - 1) * rsa + (k - 1) * csa);
    debug_assert!(b.len() > (k - 1) * rsb + (n - 1) * csb);
    debug_assert!(c.len() > (m - 1) * rsc + (n - 1) * csc);

    #[cfg(feature = "matrixmultiply")]
    {
        // SAFETY: the debug assertions above bound every strided index inside
        // the slices; callers derive the strides from the tensor shapes. With
        // beta == 0 sgemm does not read C.
        unsafe {
            matrixmultiply::sgemm(
                m,
                k,
                n,
                alpha,
                a.as_ptr(),
                rsa as isize,
                csa as isize,
                b.as_ptr(),
                rsb as isize,
                csb as isize,
                beta,
                c.as_mut_ptr(),
                rsc as isize,
                csc as isize,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0_f32;
            let a0 = i * rsa;
            let b0 = j * csb;

            for p in 0..k {
                let av = a[a0 + p * csa];
                let bv = b[p * rsb + b0];
                acc = av.mul_add(bv, acc);
            }

            let idx = i * rsc + j * csc;
            // Output words may hold stale bits (even NaN) from a reclaimed
            // allocation, so never read them when beta is zero.
            c[idx] = if beta == 0.0 {
                alpha * acc
            } else {
                alpha * acc + beta * c[idx]
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_major_product_and_transposed_read() {
        // A = [1 3; 2 4] column-major, B = [5 7; 6 8].
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let mut c = [f32::NAN; 4];
        gemm_f32(2, 2, 2, 1.0, &a, 1, 2, &b, 1, 2, 0.0, &mut c, 1, 2);
        assert_eq!(c, [23.0, 34.0, 31.0, 46.0]);

        // Aᵗ·B reads A with swapped strides.
        gemm_f32(2, 2, 2, 1.0, &a, 2, 1, &b, 1, 2, 0.0, &mut c, 1, 2);
        assert_eq!(c, [17.0, 39.0, 23.0, 53.0]);
    }

    #[test]
    fn beta_accumulates_into_output() {
        let a = [2.0];
        let b = [3.0];
        let mut c = [1.0];
        gemm_f32(1, 1, 1, 0.5, &a, 1, 1, &b, 1, 1, 2.0, &mut c, 1, 1);
        assert_eq!(c, [5.0]);
    }

    #[test]
    fn empty_inner_dimension_zeroes_output() {
        let mut c = [f32::NAN; 2];
        gemm_f32(2, 1, 0, 1.0, &[], 1, 2, &[], 1, 0, 0.0, &mut c, 1, 2);
        assert_eq!(c, [0.0, 0.0]);
    }
}
