use crate::operand::{Operand, Widen};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use sumlab_error::{IndexOutOfRange, ReductionError};
use sumlab_types::{Algorithm, Operation};

fn non_empty<'a, T: Operand>(
    data: &'a [T],
    algorithm: &'static str,
    op: Operation,
) -> Result<(&'a T, &'a [T]), ReductionError> {
    let split = data
        .split_first()
        .ok_or(ReductionError::EmptyInput { algorithm })?;
    T::check_operation(op)?;
    Ok(split)
}

fn fold<T: Operand>(first: &T, rest: &[T], op: Operation) -> Result<T, ReductionError> {
    rest.iter()
        .try_fold(first.clone(), |acc, x| acc.combine(x, op))
}

/// Left-to-right fold in index order.
///
/// The accumulator starts from the first element, so a product over the data
/// is not forced to zero by an additive identity seed.
pub fn linear<T: Operand>(data: &[T], op: Operation) -> Result<T, ReductionError> {
    let (first, rest) = non_empty(data, "linear", op)?;
    fold(first, rest, op)
}

/// Balanced pairwise reduction over the whole slice.
pub fn split_merge<T: Operand>(data: &[T], op: Operation) -> Result<T, ReductionError> {
    non_empty(data, "split_merge", op)?;
    split_merge_range(data, 0, data.len() - 1, op)
}

/// Balanced pairwise reduction over the inclusive index range `[l, r]`.
///
/// Splits at `mid = l + (r - l) / 2`, reduces `[l, mid]` and `[mid + 1, r]`,
/// then combines the left result with the right one.
pub fn split_merge_range<T: Operand>(
    data: &[T],
    l: usize,
    r: usize,
    op: Operation,
) -> Result<T, ReductionError> {
    non_empty(data, "split_merge", op)?;
    if l > r {
        return Err(ReductionError::InvalidSplit { l, r });
    }
    if r >= data.len() {
        return Err(IndexOutOfRange {
            index: r,
            len: data.len(),
        }
        .into());
    }
    merge_range(data, l, r, op)
}

fn merge_range<T: Operand>(data: &[T], l: usize, r: usize, op: Operation) -> Result<T, ReductionError> {
    if l == r {
        return Ok(data[l].clone());
    }
    let mid = l + (r - l) / 2;
    let left = merge_range(data, l, mid, op)?;
    let right = merge_range(data, mid + 1, r, op)?;
    left.combine(&right, op)
}

/// Total order used by the sorting strategies: ascending magnitude, then the
/// signed key, both under IEEE total ordering.
fn order_keys(a: (f64, f64), b: (f64, f64)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1))
}

/// Sort by ascending magnitude, then fold left to right.
///
/// Ties keep their input order.
pub fn sort_then_linear<T: Operand>(data: &[T], op: Operation) -> Result<T, ReductionError> {
    non_empty(data, "sort_linear", op)?;
    let mut keyed: Vec<((f64, f64), &T)> = data
        .iter()
        .map(|x| ((x.magnitude(), x.signed_key()), x))
        .collect();
    keyed.sort_by(|a, b| order_keys(a.0, b.0));

    let mut iter = keyed.into_iter().map(|(_, x)| x);
    let mut acc = match iter.next() {
        Some(first) => first.clone(),
        None => return Err(ReductionError::EmptyInput { algorithm: "sort_linear" }),
    };
    for x in iter {
        acc = acc.combine(x, op)?;
    }
    Ok(acc)
}

struct HeapEntry<T> {
    magnitude: f64,
    key: f64,
    seq: usize,
    value: T,
}

impl<T: Operand> HeapEntry<T> {
    fn new(value: T, seq: usize) -> Self {
        Self {
            magnitude: value.magnitude(),
            key: value.signed_key(),
            seq,
            value,
        }
    }
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for HeapEntry<T> {}

impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        order_keys((self.magnitude, self.key), (other.magnitude, other.key))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Huffman-style reduction: repeatedly combine the two smallest operands and
/// push the result back until one remains.
///
/// The smaller of the two popped operands is the left argument of `op`.
pub fn sort_then_merge<T: Operand>(data: &[T], op: Operation) -> Result<T, ReductionError> {
    non_empty(data, "sort_merge", op)?;
    let mut heap: BinaryHeap<Reverse<HeapEntry<T>>> = data
        .iter()
        .enumerate()
        .map(|(seq, x)| Reverse(HeapEntry::new(x.clone(), seq)))
        .collect();
    let mut seq = data.len();

    loop {
        let Some(Reverse(first)) = heap.pop() else {
            return Err(ReductionError::EmptyInput { algorithm: "sort_merge" });
        };
        let Some(Reverse(second)) = heap.pop() else {
            return Ok(first.value);
        };
        let combined = first.value.combine(&second.value, op)?;
        heap.push(Reverse(HeapEntry::new(combined, seq)));
        seq += 1;
    }
}

fn widened_fold<T: Widen>(data: &[T], op: Operation) -> Result<T::Wide, ReductionError> {
    non_empty(data, "ground_truth", op)?;
    let mut wide = data.iter().enumerate().map(|(index, x)| {
        x.widen()
            .map_err(|_| ReductionError::NonFiniteInput { index })
    });
    let mut acc = match wide.next() {
        Some(first) => first?,
        None => return Err(ReductionError::EmptyInput { algorithm: "ground_truth" }),
    };
    for x in wide {
        acc = acc.combine(&x?, op)?;
    }
    Ok(acc)
}

/// Linear fold carried out entirely in high precision, narrowed once at the end.
pub fn ground_truth<T: Widen>(data: &[T], op: Operation) -> Result<T, ReductionError> {
    widened_fold(data, op).map(|wide| T::narrow(&wide))
}

/// The reported ground-truth value.
///
/// For matrices the entry sum is taken in high precision before narrowing,
/// so it can differ from `ground_truth(..).report_value()`.
pub fn ground_truth_value<T: Widen>(data: &[T], op: Operation) -> Result<f64, ReductionError> {
    widened_fold(data, op).map(|wide| wide.report_value())
}

/// Run one of the four reduction strategies.
pub fn reduce<T: Operand>(algorithm: Algorithm, data: &[T], op: Operation) -> Result<T, ReductionError> {
    match algorithm {
        Algorithm::Linear => linear(data, op),
        Algorithm::SplitMerge => split_merge(data, op),
        Algorithm::SortLinear => sort_then_linear(data, op),
        Algorithm::SortMerge => sort_then_merge(data, op),
    }
}
