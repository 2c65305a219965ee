//! Bump allocator with LIFO-nested temporary scopes.
//!
//! [`Arena`] owns one fixed buffer of 4-byte words. Allocation only advances a
//! mark; memory is reclaimed by closing the [`TempScope`] it was allocated
//! under, which resets the mark to where it was when the scope opened. There is
//! no per-object free and the buffer never grows.
//!
//! Allocations are addressed through typed handles ([`Array`], and the tensor
//! handles built on top of it) rather than pointers. A handle is just an offset
//! and a length, so it is `Copy` and carries no lifetime; all reads and writes
//! go through the arena. In debug builds a handle that reaches past the current
//! mark (i.e. one that outlived its scope) is rejected on access.
//!
//! ```text
//! base                          size                         capacity
//! |  network  | epoch batches | step temporaries |   free    |
//!             ^ scope 1       ^ scope 2
//! ```
//!
//! Capacity exhaustion and out-of-order scope closes are fatal inside the
//! kernels. Code that sizes its allocation from external input (a network
//! file, requested layer widths) asks [`Arena::check_fits`] first.

use std::error::Error;
use std::fmt;
use std::marker::PhantomData;

/// Size in bytes of one arena word. Every element type is one word wide.
pub const WORD_BYTES: usize = 4;

/// A plain 4-byte value that can live in an arena word.
pub trait Element: Copy {
    fn to_word(self) -> f32;
    fn from_word(word: f32) -> Self;
}

impl Element for f32 {
    #[inline]
    fn to_word(self) -> f32 {
        self
    }

    #[inline]
    fn from_word(word: f32) -> Self {
        word
    }
}

impl Element for u32 {
    // Stored as raw bits; words are only ever moved, never computed on.
    #[inline]
    fn to_word(self) -> f32 {
        f32::from_bits(self)
    }

    #[inline]
    fn from_word(word: f32) -> Self {
        word.to_bits()
    }
}

/// Errors reported by the fallible allocation entry points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The request does not fit in the remaining capacity.
    CapacityExceeded {
        /// Number of bytes requested.
        requested: usize,
        /// Bytes still free before the request.
        remaining: usize,
        /// Total arena capacity in bytes.
        capacity: usize,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded {
                requested,
                remaining,
                capacity,
            } => write!(
                f,
                "arena capacity exceeded: requested {requested} bytes, \
                 {remaining} of {capacity} bytes remaining"
            ),
        }
    }
}

impl Error for ArenaError {}

/// An untyped contiguous block returned by [`Arena::push_size`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    offset: usize,
    words: usize,
}

impl Span {
    /// Word offset of the block from the arena base.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the block in bytes (always a whole number of words).
    #[inline]
    pub fn len_bytes(&self) -> usize {
        self.words * WORD_BYTES
    }
}

/// Typed handle to `len` consecutive elements of `T` inside an arena.
#[derive(Debug)]
pub struct Array<T> {
    offset: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for Array<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Array<T> {}

impl<T> PartialEq for Array<T> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.len == other.len
    }
}

impl<T> Array<T> {
    #[inline]
    pub(crate) fn from_raw(offset: usize, len: usize) -> Self {
        Self {
            offset,
            len,
            _marker: PhantomData,
        }
    }

    /// Word offset of the first element.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Handle to elements `start..start + len` of this array.
    ///
    /// Panics if the range does not lie inside the array.
    #[inline]
    pub fn slice(&self, start: usize, len: usize) -> Self {
        assert!(
            start.checked_add(len).is_some_and(|end| end <= self.len),
            "sub-array {start}..{} out of bounds for array of len {}",
            start.saturating_add(len),
            self.len
        );
        Self::from_raw(self.offset + start, len)
    }
}

/// Token for an open temporary scope.
///
/// Must be handed back to [`Arena::end_scope`]; scopes close in strict LIFO
/// order.
#[must_use = "a temp scope must be closed with Arena::end_scope"]
#[derive(Debug)]
pub struct TempScope {
    old_size: usize,
    index: u32,
}

impl TempScope {
    /// Sequence id of this scope (1 for the outermost open scope).
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Fixed-capacity bump allocator over 4-byte words.
pub struct Arena {
    words: Vec<f32>,
    size: usize,
    peak: usize,
    temp_count: u32,
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("size", &self.size())
            .field("peak", &self.peak())
            .field("open_scopes", &self.temp_count)
            .finish()
    }
}

impl Arena {
    /// Create an arena with `capacity` bytes (rounded down to whole words).
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0.0; capacity / WORD_BYTES],
            size: 0,
            peak: 0,
            temp_count: 0,
        }
    }

    /// Create an arena of `megabytes` MiB.
    pub fn with_megabytes(megabytes: usize) -> Self {
        Self::new(megabytes.saturating_mul(1024 * 1024))
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BYTES
    }

    /// Current mark in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size * WORD_BYTES
    }

    /// Bytes still available.
    #[inline]
    pub fn remaining(&self) -> usize {
        (self.words.len() - self.size) * WORD_BYTES
    }

    /// Highest mark ever reached, in bytes.
    #[inline]
    pub fn peak(&self) -> usize {
        self.peak * WORD_BYTES
    }

    /// Number of scopes currently open.
    #[inline]
    pub fn open_scopes(&self) -> u32 {
        self.temp_count
    }

    /// Reserve `bytes` bytes, rounded up to whole words.
    pub fn try_push_size(&mut self, bytes: usize) -> Result<Span, ArenaError> {
        let words = bytes.div_ceil(WORD_BYTES);
        let free = self.words.len() - self.size;
        if words > free {
            return Err(ArenaError::CapacityExceeded {
                requested: bytes,
                remaining: free * WORD_BYTES,
                capacity: self.capacity(),
            });
        }

        let span = Span {
            offset: self.size,
            words,
        };
        self.size += words;
        self.peak = self.peak.max(self.size);
        Ok(span)
    }

    /// Check that `bytes` more bytes fit without reserving them.
    pub fn check_fits(&self, bytes: usize) -> Result<(), ArenaError> {
        if bytes.div_ceil(WORD_BYTES) > self.words.len() - self.size {
            return Err(ArenaError::CapacityExceeded {
                requested: bytes,
                remaining: self.remaining(),
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    /// Reserve `bytes` bytes. Panics if the arena is exhausted.
    ///
    /// The block holds whatever a previous (reclaimed) allocation left there.
    pub fn push_size(&mut self, bytes: usize) -> Span {
        match self.try_push_size(bytes) {
            Ok(span) => span,
            Err(err) => panic!("{err}"),
        }
    }

    /// Reserve `count` elements of `T`. Contents are unspecified.
    pub fn push_array<T: Element>(&mut self, count: usize) -> Array<T> {
        let bytes = count
            .checked_mul(WORD_BYTES)
            .unwrap_or_else(|| panic!("arena array of {count} elements overflows usize"));
        let span = self.push_size(bytes);
        Array::from_raw(span.offset, count)
    }

    /// Reserve `count` elements of `T`, all set to zero bits.
    pub fn push_array_zeroed<T: Element>(&mut self, count: usize) -> Array<T> {
        let array = self.push_array::<T>(count);
        self.words[array.offset..array.offset + count].fill(0.0);
        array
    }

    /// Copy `values` into a fresh allocation.
    pub fn push_slice<T: Element>(&mut self, values: &[T]) -> Array<T> {
        let array = self.push_array::<T>(values.len());
        let dst = &mut self.words[array.offset..array.offset + values.len()];
        for (d, &v) in dst.iter_mut().zip(values) {
            *d = v.to_word();
        }
        array
    }

    /// Open a nested temporary scope.
    pub fn begin_scope(&mut self) -> TempScope {
        self.temp_count += 1;
        TempScope {
            old_size: self.size,
            index: self.temp_count,
        }
    }

    /// Close `scope`, reclaiming everything allocated since it opened.
    ///
    /// Panics if `scope` is not the innermost open scope.
    pub fn end_scope(&mut self, scope: TempScope) {
        assert_eq!(
            self.temp_count, scope.index,
            "temp scope {} closed out of order (innermost open scope is {})",
            scope.index, self.temp_count
        );
        assert!(
            scope.old_size <= self.size,
            "temp scope {} mark {} is above the arena mark {}",
            scope.index,
            scope.old_size,
            self.size
        );
        self.size = scope.old_size;
        self.temp_count -= 1;
    }

    /// Run `f` inside a fresh scope that is closed when `f` returns.
    ///
    /// Handles allocated inside `f` must not be used after this returns.
    pub fn with_scope<R>(&mut self, f: impl FnOnce(&mut Arena) -> R) -> R {
        let scope = self.begin_scope();
        let result = f(self);
        self.end_scope(scope);
        result
    }

    /// Panics if any scope is still open.
    pub fn check_empty(&self) {
        assert_eq!(
            self.temp_count, 0,
            "arena has {} temp scope(s) still open",
            self.temp_count
        );
    }

    /// Read element `index` of `array`.
    #[inline]
    pub fn read<T: Element>(&self, array: Array<T>, index: usize) -> T {
        assert!(index < array.len, "index {index} out of bounds for len {}", array.len);
        T::from_word(self.words(array.offset, array.len)[index])
    }

    /// Write element `index` of `array`.
    #[inline]
    pub fn write<T: Element>(&mut self, array: Array<T>, index: usize, value: T) {
        assert!(index < array.len, "index {index} out of bounds for len {}", array.len);
        self.words_mut(array.offset, array.len)[index] = value.to_word();
    }

    /// Swap elements `a` and `b` of `array`.
    #[inline]
    pub fn swap<T: Element>(&mut self, array: Array<T>, a: usize, b: usize) {
        self.words_mut(array.offset, array.len).swap(a, b);
    }

    /// Copy the contents of `array` out of the arena.
    pub fn to_vec<T: Element>(&self, array: Array<T>) -> Vec<T> {
        self.words(array.offset, array.len)
            .iter()
            .map(|&w| T::from_word(w))
            .collect()
    }

    #[inline]
    fn check_live(&self, offset: usize, len: usize) {
        debug_assert!(
            offset + len <= self.size,
            "stale arena handle: words {offset}..{} but arena mark is {}",
            offset + len,
            self.size
        );
    }

    #[inline]
    pub(crate) fn words(&self, offset: usize, len: usize) -> &[f32] {
        self.check_live(offset, len);
        &self.words[offset..offset + len]
    }

    #[inline]
    pub(crate) fn words_mut(&mut self, offset: usize, len: usize) -> &mut [f32] {
        self.check_live(offset, len);
        &mut self.words[offset..offset + len]
    }

    /// Borrow a freshly allocated output region mutably, together with all
    /// words below it (which hold every operand allocated earlier).
    #[inline]
    pub(crate) fn split_output(&mut self, offset: usize, len: usize) -> (&[f32], &mut [f32]) {
        self.check_live(offset, len);
        let (below, above) = self.words.split_at_mut(offset);
        (below, &mut above[..len])
    }

    /// Borrow two disjoint regions: `dst` mutably and `src` shared.
    pub(crate) fn pair_mut(
        &mut self,
        dst: (usize, usize),
        src: (usize, usize),
    ) -> (&mut [f32], &[f32]) {
        self.check_live(dst.0, dst.1);
        self.check_live(src.0, src.1);
        let (dst_off, dst_len) = dst;
        let (src_off, src_len) = src;
        assert!(
            dst_off + dst_len <= src_off || src_off + src_len <= dst_off,
            "in-place operands overlap: {dst_off}+{dst_len} and {src_off}+{src_len}"
        );

        if dst_off < src_off {
            let (lo, hi) = self.words.split_at_mut(src_off);
            (&mut lo[dst_off..dst_off + dst_len], &hi[..src_len])
        } else {
            let (lo, hi) = self.words.split_at_mut(dst_off);
            (&mut hi[..dst_len], &lo[src_off..src_off + src_len])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn push_size_rounds_up_to_words() {
        let mut arena = Arena::new(64);
        let a = arena.push_size(5);
        assert_eq!(a.len_bytes(), 8);
        assert_eq!(arena.size(), 8);

        let b = arena.push_size(4);
        assert_eq!(b.offset(), 2);
        assert_eq!(arena.size(), 12);
        assert_eq!(arena.remaining(), 52);
    }

    #[test]
    fn try_push_size_reports_exhaustion_without_advancing() {
        let mut arena = Arena::new(16);
        arena.push_size(12);
        let err = arena.try_push_size(8).unwrap_err();
        assert_eq!(
            err,
            ArenaError::CapacityExceeded {
                requested: 8,
                remaining: 4,
                capacity: 16,
            }
        );
        assert_eq!(arena.size(), 12);
    }

    #[test]
    fn check_fits_does_not_move_the_mark() {
        let mut arena = Arena::new(16);
        arena.push_size(4);
        assert!(arena.check_fits(12).is_ok());
        assert!(matches!(
            arena.check_fits(13),
            Err(ArenaError::CapacityExceeded { remaining: 12, .. })
        ));
        assert_eq!(arena.size(), 4);
    }

    #[test]
    #[should_panic(expected = "arena capacity exceeded")]
    fn push_size_panics_when_exhausted() {
        let mut arena = Arena::new(16);
        arena.push_size(20);
    }

    #[test]
    fn scope_restores_mark_and_keeps_peak() {
        let mut arena = Arena::new(1024);
        arena.push_size(16);

        let scope = arena.begin_scope();
        assert_eq!(scope.index(), 1);
        arena.push_size(100);
        assert_eq!(arena.open_scopes(), 1);
        arena.end_scope(scope);

        assert_eq!(arena.size(), 16);
        assert_eq!(arena.peak(), 116);
        assert_eq!(arena.open_scopes(), 0);
        arena.check_empty();
    }

    #[test]
    #[should_panic(expected = "closed out of order")]
    fn closing_outer_scope_first_is_rejected() {
        let mut arena = Arena::new(1024);
        let outer = arena.begin_scope();
        let _inner = arena.begin_scope();
        arena.end_scope(outer);
    }

    #[test]
    #[should_panic(expected = "still open")]
    fn check_empty_rejects_leaked_scope() {
        let mut arena = Arena::new(64);
        let _scope = arena.begin_scope();
        arena.check_empty();
    }

    #[test]
    fn with_scope_closes_scope() {
        let mut arena = Arena::new(256);
        let value = arena.with_scope(|arena| {
            let a = arena.push_slice(&[1.0_f32, 2.0, 3.0]);
            arena.read(a, 2)
        });
        assert_eq!(value, 3.0);
        assert_eq!(arena.size(), 0);
        assert_eq!(arena.open_scopes(), 0);
    }

    #[test]
    fn typed_arrays_round_trip_u32_bits() {
        let mut arena = Arena::new(256);
        let idx = arena.push_slice(&[0_u32, 7, u32::MAX, 0x7fc0_0001]);
        arena.swap(idx, 0, 3);
        assert_eq!(arena.to_vec(idx), vec![0x7fc0_0001, 7, u32::MAX, 0]);

        let zeros = arena.push_array_zeroed::<u32>(3);
        assert_eq!(arena.to_vec(zeros), vec![0, 0, 0]);
        arena.write(zeros, 1, 42);
        assert_eq!(arena.read(zeros, 1), 42);
    }

    #[test]
    fn sub_array_views_share_storage() {
        let mut arena = Arena::new(256);
        let all = arena.push_slice(&[1.0_f32, 2.0, 3.0, 4.0]);
        let tail = all.slice(2, 2);
        arena.write(tail, 0, 30.0);
        assert_eq!(arena.to_vec(all), vec![1.0, 2.0, 30.0, 4.0]);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "stale arena handle")]
    fn handle_from_closed_scope_is_rejected() {
        let mut arena = Arena::new(256);
        let scope = arena.begin_scope();
        let a = arena.push_slice(&[1.0_f32, 2.0]);
        arena.end_scope(scope);
        arena.read(a, 0);
    }

    proptest! {
        #[test]
        fn nested_scopes_restore_every_mark(pushes in prop::collection::vec(0usize..64, 1..16)) {
            let mut arena = Arena::new(4096);
            arena.push_size(8);
            let before = arena.size();

            let mut open = Vec::new();
            for &bytes in &pushes {
                let mark = arena.size();
                open.push((arena.begin_scope(), mark));
                arena.push_size(bytes);
            }

            while let Some((scope, mark)) = open.pop() {
                arena.end_scope(scope);
                prop_assert_eq!(arena.size(), mark);
            }
            prop_assert_eq!(arena.size(), before);
            prop_assert_eq!(arena.open_scopes(), 0);
        }
    }
}
