//! Arena-backed vectors and column-major matrices.
//!
//! [`Vector`] and [`Matrix`] are shape-carrying handles over an
//! [`Array<f32>`](crate::arena::Array). Operations are methods on [`Arena`]:
//! each one allocates its result at the current mark and returns a handle, so
//! the lifetime of every result is the scope it was computed in. The two
//! `*_equals` operations are the only ones that write into an operand.
//!
//! Matrices are column-major: element `(r, c)` lives at `c * rows + r`, and a
//! column is a contiguous run of `rows` values. `Aᵗ·B` and `A·Bᵗ` read the
//! transposed operand with swapped strides instead of materializing it.
//!
//! Shape agreement is a caller precondition checked with `debug_assert!`.

use crate::activation;
use crate::arena::{Arena, Array};
use crate::matmul::gemm_f32;
use crate::rng::Lfsr113;

/// Common surface of [`Vector`] and [`Matrix`] used by element-wise kernels.
pub trait Tensor: Copy + std::fmt::Debug {
    /// Backing storage.
    fn data(&self) -> Array<f32>;

    /// A tensor of the same shape over different storage.
    fn with_data(&self, data: Array<f32>) -> Self;

    fn same_shape(&self, other: &Self) -> bool;

    /// Number of elements.
    #[inline]
    fn len(&self) -> usize {
        self.data().len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dense `f32` vector stored in an arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector {
    data: Array<f32>,
}

/// A dense column-major `f32` matrix stored in an arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    data: Array<f32>,
    rows: usize,
    cols: usize,
}

impl Tensor for Vector {
    #[inline]
    fn data(&self) -> Array<f32> {
        self.data
    }

    #[inline]
    fn with_data(&self, data: Array<f32>) -> Self {
        debug_assert_eq!(data.len(), self.dim());
        Self { data }
    }

    #[inline]
    fn same_shape(&self, other: &Self) -> bool {
        self.dim() == other.dim()
    }
}

impl Tensor for Matrix {
    #[inline]
    fn data(&self) -> Array<f32> {
        self.data
    }

    #[inline]
    fn with_data(&self, data: Array<f32>) -> Self {
        debug_assert_eq!(data.len(), self.rows * self.cols);
        Self {
            data,
            rows: self.rows,
            cols: self.cols,
        }
    }

    #[inline]
    fn same_shape(&self, other: &Self) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }
}

impl Vector {
    /// Allocate a vector without initializing it.
    pub fn raw(arena: &mut Arena, dim: usize) -> Self {
        Self {
            data: arena.push_array(dim),
        }
    }

    pub fn zeroed(arena: &mut Arena, dim: usize) -> Self {
        Self {
            data: arena.push_array_zeroed(dim),
        }
    }

    pub fn from_slice(arena: &mut Arena, values: &[f32]) -> Self {
        Self {
            data: arena.push_slice(values),
        }
    }

    /// Allocate a vector filled with Gaussian draws.
    pub fn random_gaussian(
        arena: &mut Arena,
        rng: &mut Lfsr113,
        dim: usize,
        mean: f32,
        standard_deviation: f32,
    ) -> Self {
        let v = Self::raw(arena, dim);
        for x in arena.values_mut(v) {
            *x = rng.gaussian(mean, standard_deviation);
        }
        v
    }

    /// Wrap existing arena storage as a vector of `data.len()` elements.
    pub fn from_array(data: Array<f32>) -> Self {
        Self { data }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.data.len()
    }
}

impl Matrix {
    /// Allocate a matrix without initializing it.
    pub fn raw(arena: &mut Arena, rows: usize, cols: usize) -> Self {
        Self {
            data: arena.push_array(rows * cols),
            rows,
            cols,
        }
    }

    pub fn zeroed(arena: &mut Arena, rows: usize, cols: usize) -> Self {
        Self {
            data: arena.push_array_zeroed(rows * cols),
            rows,
            cols,
        }
    }

    /// Copy column-major `values` into a new `rows x cols` matrix.
    ///
    /// Panics if `values.len() != rows * cols`.
    pub fn from_slice(arena: &mut Arena, rows: usize, cols: usize, values: &[f32]) -> Self {
        assert_eq!(
            values.len(),
            rows * cols,
            "matrix data has {} values, expected {rows}x{cols}",
            values.len()
        );
        Self {
            data: arena.push_slice(values),
            rows,
            cols,
        }
    }

    /// Allocate a matrix filled column by column with Gaussian draws.
    pub fn random_gaussian(
        arena: &mut Arena,
        rng: &mut Lfsr113,
        rows: usize,
        cols: usize,
        mean: f32,
        standard_deviation: f32,
    ) -> Self {
        let m = Self::raw(arena, rows, cols);
        for x in arena.values_mut(m) {
            *x = rng.gaussian(mean, standard_deviation);
        }
        m
    }

    /// Wrap existing arena storage as a `rows x cols` matrix.
    ///
    /// Panics if the storage length does not match the shape.
    pub fn from_array(data: Array<f32>, rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "array of len {} cannot hold a {rows}x{cols} matrix",
            data.len()
        );
        Self { data, rows, cols }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// View of column `col` as a vector sharing this matrix's storage.
    #[inline]
    pub fn column(&self, col: usize) -> Vector {
        assert!(col < self.cols, "column {col} out of bounds for {} columns", self.cols);
        Vector {
            data: self.data.slice(col * self.rows, self.rows),
        }
    }
}

#[inline]
fn operand(below: &[f32], data: Array<f32>) -> &[f32] {
    &below[data.offset()..data.offset() + data.len()]
}

impl Arena {
    /// Read-only view of a tensor's values in storage order.
    #[inline]
    pub fn values<T: Tensor>(&self, t: T) -> &[f32] {
        let data = t.data();
        self.words(data.offset(), data.len())
    }

    /// Mutable view of a tensor's values in storage order.
    #[inline]
    pub fn values_mut<T: Tensor>(&mut self, t: T) -> &mut [f32] {
        let data = t.data();
        self.words_mut(data.offset(), data.len())
    }

    /// Element `(row, col)` of `m`.
    #[inline]
    pub fn element(&self, m: Matrix, row: usize, col: usize) -> f32 {
        assert!(
            row < m.rows && col < m.cols,
            "({row}, {col}) out of bounds for {}x{}",
            m.rows,
            m.cols
        );
        self.values(m)[col * m.rows + row]
    }

    fn alloc_like<T: Tensor>(&mut self, t: T) -> T {
        let data = self.push_array::<f32>(t.len());
        t.with_data(data)
    }

    fn map<T: Tensor>(&mut self, a: T, f: impl Fn(f32) -> f32) -> T {
        let out = self.alloc_like(a);
        let (below, dst) = self.split_output(out.data().offset(), out.len());
        for (d, &x) in dst.iter_mut().zip(operand(below, a.data())) {
            *d = f(x);
        }
        out
    }

    fn zip_map<T: Tensor>(&mut self, a: T, b: T, f: impl Fn(f32, f32) -> f32) -> T {
        debug_assert!(a.same_shape(&b), "shape mismatch: {a:?} vs {b:?}");
        let out = self.alloc_like(a);
        let (below, dst) = self.split_output(out.data().offset(), out.len());
        let xs = operand(below, a.data());
        let ys = operand(below, b.data());
        for ((d, &x), &y) in dst.iter_mut().zip(xs).zip(ys) {
            *d = f(x, y);
        }
        out
    }

    /// Duplicate `a` into fresh storage.
    pub fn copy<T: Tensor>(&mut self, a: T) -> T {
        self.map(a, |x| x)
    }

    pub fn add<T: Tensor>(&mut self, a: T, b: T) -> T {
        self.zip_map(a, b, |x, y| x + y)
    }

    pub fn sub<T: Tensor>(&mut self, a: T, b: T) -> T {
        self.zip_map(a, b, |x, y| x - y)
    }

    /// Element-wise product.
    pub fn hadamard<T: Tensor>(&mut self, a: T, b: T) -> T {
        self.zip_map(a, b, |x, y| x * y)
    }

    pub fn sigmoid<T: Tensor>(&mut self, a: T) -> T {
        self.map(a, activation::sigmoid)
    }

    pub fn sigmoid_prime<T: Tensor>(&mut self, a: T) -> T {
        self.map(a, activation::sigmoid_prime)
    }

    /// `a *= c`
    pub fn scale_equals<T: Tensor>(&mut self, a: T, c: f32) {
        for x in self.values_mut(a) {
            *x *= c;
        }
    }

    /// `a += b`
    pub fn add_equals<T: Tensor>(&mut self, a: T, b: T) {
        debug_assert!(a.same_shape(&b), "shape mismatch: {a:?} vs {b:?}");
        let (da, db) = (a.data(), b.data());
        if da == db {
            self.scale_equals(a, 2.0);
            return;
        }
        let (dst, src) = self.pair_mut((da.offset(), da.len()), (db.offset(), db.len()));
        for (d, &s) in dst.iter_mut().zip(src) {
            *d += s;
        }
    }

    pub fn dot(&self, a: Vector, b: Vector) -> f32 {
        debug_assert_eq!(a.dim(), b.dim(), "dot of vectors with different dims");
        self.values(a)
            .iter()
            .zip(self.values(b))
            .map(|(x, y)| x * y)
            .sum()
    }

    #[allow(clippy::too_many_arguments)]
    fn product(
        &mut self,
        out: Array<f32>,
        (m, n, k): (usize, usize, usize),
        a: Array<f32>,
        (rsa, csa): (usize, usize),
        b: Array<f32>,
        (rsb, csb): (usize, usize),
    ) {
        let (below, dst) = self.split_output(out.offset(), out.len());
        gemm_f32(
            m,
            n,
            k,
            1.0,
            operand(below, a),
            rsa,
            csa,
            operand(below, b),
            rsb,
            csb,
            0.0,
            dst,
            1,
            m,
        );
    }

    /// `M·v`
    pub fn mult_vec(&mut self, m: Matrix, v: Vector) -> Vector {
        debug_assert_eq!(m.cols, v.dim(), "mult_vec: {m:?} · {v:?}");
        let out = Vector::raw(self, m.rows);
        self.product(out.data, (m.rows, 1, m.cols), m.data, (1, m.rows), v.data, (1, v.dim()));
        out
    }

    /// `Mᵗ·v`
    pub fn transpose_mult_vec(&mut self, m: Matrix, v: Vector) -> Vector {
        debug_assert_eq!(m.rows, v.dim(), "transpose_mult_vec: {m:?}ᵗ · {v:?}");
        let out = Vector::raw(self, m.cols);
        self.product(out.data, (m.cols, 1, m.rows), m.data, (m.rows, 1), v.data, (1, v.dim()));
        out
    }

    /// `a·bᵗ`
    pub fn outer(&mut self, a: Vector, b: Vector) -> Matrix {
        let out = Matrix::raw(self, a.dim(), b.dim());
        self.product(out.data, (a.dim(), b.dim(), 1), a.data, (1, a.dim()), b.data, (b.dim(), 1));
        out
    }

    /// `A·B`
    pub fn mult(&mut self, a: Matrix, b: Matrix) -> Matrix {
        debug_assert_eq!(a.cols, b.rows, "mult: {a:?} · {b:?}");
        let out = Matrix::raw(self, a.rows, b.cols);
        self.product(out.data, (a.rows, b.cols, a.cols), a.data, (1, a.rows), b.data, (1, b.rows));
        out
    }

    /// `Aᵗ·B`
    pub fn transpose_mult(&mut self, a: Matrix, b: Matrix) -> Matrix {
        debug_assert_eq!(a.rows, b.rows, "transpose_mult: {a:?}ᵗ · {b:?}");
        let out = Matrix::raw(self, a.cols, b.cols);
        self.product(out.data, (a.cols, b.cols, a.rows), a.data, (a.rows, 1), b.data, (1, b.rows));
        out
    }

    /// `A·Bᵗ`
    pub fn mult_transpose(&mut self, a: Matrix, b: Matrix) -> Matrix {
        debug_assert_eq!(a.cols, b.cols, "mult_transpose: {a:?} · {b:?}ᵗ");
        let out = Matrix::raw(self, a.rows, b.rows);
        self.product(out.data, (a.rows, b.rows, a.cols), a.data, (1, a.rows), b.data, (b.rows, 1));
        out
    }

    /// Materialized `Mᵗ`.
    pub fn transpose(&mut self, m: Matrix) -> Matrix {
        let out = Matrix::raw(self, m.cols, m.rows);
        let (below, dst) = self.split_output(out.data.offset(), out.len());
        let src = operand(below, m.data);
        for c in 0..m.cols {
            for r in 0..m.rows {
                dst[r * m.cols + c] = src[c * m.rows + r];
            }
        }
        out
    }

    /// Add `v` to every column of `m`.
    pub fn add_columnwise(&mut self, m: Matrix, v: Vector) -> Matrix {
        debug_assert_eq!(m.rows, v.dim(), "add_columnwise: {m:?} + {v:?}");
        let out = self.alloc_like(m);
        let (below, dst) = self.split_output(out.data.offset(), out.len());
        let bias = operand(below, v.data);
        let src = operand(below, m.data);
        let rows = m.rows.max(1);
        for (dst_col, src_col) in dst.chunks_exact_mut(rows).zip(src.chunks_exact(rows)) {
            for ((d, &x), &b) in dst_col.iter_mut().zip(src_col).zip(bias) {
                *d = x + b;
            }
        }
        out
    }

    /// Sum of the columns of `m` (a vector of length `rows`).
    pub fn sum_columns(&mut self, m: Matrix) -> Vector {
        let out = Vector::raw(self, m.rows);
        let (below, dst) = self.split_output(out.data.offset(), out.dim());
        dst.fill(0.0);
        let src = operand(below, m.data);
        for col in src.chunks_exact(m.rows.max(1)) {
            for (d, &x) in dst.iter_mut().zip(col) {
                *d += x;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn arena() -> Arena {
        Arena::new(1 << 16)
    }

    fn random_matrix(arena: &mut Arena, rng: &mut StdRng, rows: usize, cols: usize) -> Matrix {
        let values: Vec<f32> = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Matrix::from_slice(arena, rows, cols, &values)
    }

    fn assert_all_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_relative_eq!(*a, *e, epsilon = 1e-5);
        }
    }

    #[test]
    fn elementwise_ops_on_vectors() {
        let mut arena = arena();
        let a = Vector::from_slice(&mut arena, &[1.0, 2.0, 3.0]);
        let b = Vector::from_slice(&mut arena, &[4.0, 5.0, 6.0]);

        let sum = arena.add(a, b);
        let diff = arena.sub(a, b);
        let prod = arena.hadamard(a, b);
        assert_eq!(arena.values(sum), &[5.0, 7.0, 9.0]);
        assert_eq!(arena.values(diff), &[-3.0, -3.0, -3.0]);
        assert_eq!(arena.values(prod), &[4.0, 10.0, 18.0]);
        assert_eq!(arena.dot(a, b), 32.0);
    }

    #[test]
    fn in_place_ops_mutate_first_operand() {
        let mut arena = arena();
        let a = Matrix::from_slice(&mut arena, 2, 1, &[1.0, -2.0]);
        let b = Matrix::from_slice(&mut arena, 2, 1, &[0.5, 0.5]);

        arena.scale_equals(a, 3.0);
        arena.add_equals(a, b);
        assert_eq!(arena.values(a), &[3.5, -5.5]);
        assert_eq!(arena.values(b), &[0.5, 0.5]);

        arena.add_equals(b, b);
        assert_eq!(arena.values(b), &[1.0, 1.0]);
    }

    #[test]
    fn products_follow_column_major_layout() {
        let mut arena = arena();
        // A = [1 2 3; 4 5 6]
        let a = Matrix::from_slice(&mut arena, 2, 3, &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        let v = Vector::from_slice(&mut arena, &[1.0, 0.0, -1.0]);
        let w = Vector::from_slice(&mut arena, &[1.0, 2.0]);

        let av = arena.mult_vec(a, v);
        assert_eq!(arena.values(av), &[-2.0, -2.0]);

        let atw = arena.transpose_mult_vec(a, w);
        assert_eq!(arena.values(atw), &[9.0, 12.0, 15.0]);

        let outer = arena.outer(w, v);
        assert_eq!((outer.rows(), outer.cols()), (2, 3));
        assert_eq!(arena.values(outer), &[1.0, 2.0, 0.0, 0.0, -1.0, -2.0]);
        assert_eq!(arena.element(a, 1, 2), 6.0);

        let at = arena.transpose(a);
        assert_eq!((at.rows(), at.cols()), (3, 2));
        assert_eq!(arena.values(at), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let aat = arena.mult(a, at);
        assert_eq!(arena.values(aat), &[14.0, 32.0, 32.0, 77.0]);
    }

    #[test]
    fn columnwise_broadcast_and_column_sum() {
        let mut arena = arena();
        let m = Matrix::from_slice(&mut arena, 2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Vector::from_slice(&mut arena, &[10.0, 20.0]);

        let shifted = arena.add_columnwise(m, b);
        assert_eq!(arena.values(shifted), &[11.0, 22.0, 13.0, 24.0, 15.0, 26.0]);

        let sums = arena.sum_columns(m);
        assert_eq!(arena.values(sums), &[9.0, 12.0]);

        let col = m.column(1);
        assert_eq!(arena.values(col), &[3.0, 4.0]);
    }

    #[test]
    fn outputs_ignore_stale_words() {
        let mut arena = arena();
        let a = Matrix::from_slice(&mut arena, 2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let b = Matrix::from_slice(&mut arena, 2, 2, &[2.0, 3.0, 4.0, 5.0]);

        arena.with_scope(|arena| {
            let junk = arena.push_array::<f32>(16);
            arena.values_mut(Vector::from_array(junk)).fill(f32::NAN);
        });

        let c = arena.mult(a, b);
        assert_eq!(arena.values(c), &[2.0, 3.0, 4.0, 5.0]);
        let s = arena.sum_columns(b);
        assert_eq!(arena.values(s), &[6.0, 8.0]);
    }

    #[test]
    fn sigmoid_ops_apply_elementwise() {
        let mut arena = arena();
        let z = Vector::from_slice(&mut arena, &[0.0, 2.0]);
        let s = arena.sigmoid(z);
        let sp = arena.sigmoid_prime(z);
        assert_relative_eq!(arena.values(s)[0], 0.5);
        assert_relative_eq!(arena.values(sp)[0], 0.25);
        let s1 = arena.values(s)[1];
        assert_relative_eq!(arena.values(sp)[1], s1 * (1.0 - s1), epsilon = 1e-6);
    }

    #[test]
    fn random_gaussian_fills_in_storage_order() {
        let mut arena = arena();
        let mut rng = Lfsr113::new(31337);
        let m = Matrix::random_gaussian(&mut arena, &mut rng, 3, 2, 0.0, 1.0);

        let mut replay = Lfsr113::new(31337);
        let expected: Vec<f32> = (0..6).map(|_| replay.gaussian(0.0, 1.0)).collect();
        assert_eq!(arena.values(m), expected.as_slice());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "shape mismatch")]
    fn elementwise_shape_mismatch_is_rejected() {
        let mut arena = arena();
        let a = Vector::zeroed(&mut arena, 2);
        let b = Vector::zeroed(&mut arena, 3);
        arena.add(a, b);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "mult")]
    fn product_shape_mismatch_is_rejected() {
        let mut arena = arena();
        let a = Matrix::zeroed(&mut arena, 2, 3);
        let b = Matrix::zeroed(&mut arena, 2, 3);
        arena.mult(a, b);
    }

    proptest! {
        #[test]
        fn transposed_products_match_materialized_transpose(
            m in 1usize..6,
            n in 1usize..6,
            k in 1usize..6,
            seed in any::<u64>(),
        ) {
            let mut arena = arena();
            let mut rng = StdRng::seed_from_u64(seed);

            // Aᵗ·B with A: k x m, B: k x n.
            let a = random_matrix(&mut arena, &mut rng, k, m);
            let b = random_matrix(&mut arena, &mut rng, k, n);
            let fast = arena.transpose_mult(a, b);
            let at = arena.transpose(a);
            let slow = arena.mult(at, b);
            prop_assert_eq!((fast.rows(), fast.cols()), (m, n));
            assert_all_close(arena.values(fast), arena.values(slow));

            // A·Bᵗ with A: m x k, B: n x k.
            let a = random_matrix(&mut arena, &mut rng, m, k);
            let b = random_matrix(&mut arena, &mut rng, n, k);
            let fast = arena.mult_transpose(a, b);
            let bt = arena.transpose(b);
            let slow = arena.mult(a, bt);
            prop_assert_eq!((fast.rows(), fast.cols()), (m, n));
            assert_all_close(arena.values(fast), arena.values(slow));
        }
    }
}
