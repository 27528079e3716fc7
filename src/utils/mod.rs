use nalgebra::{DMatrix, DVector, Scalar};
use ndarray::{Array1, Array2, ArrayView2};

/// Copies an ndarray view into an owned, column-major nalgebra matrix.
pub(crate) fn to_dmatrix<T: Scalar>(x: &ArrayView2<T>) -> DMatrix<T> {
    let (rows, cols) = x.dim();
    DMatrix::from_fn(rows, cols, |i, j| x[[i, j]].clone())
}

pub(crate) fn to_array2<T: Scalar>(m: &DMatrix<T>) -> Array2<T> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)].clone())
}

pub(crate) fn to_array1<T: Scalar>(v: &DVector<T>) -> Array1<T> {
    Array1::from_iter(v.iter().cloned())
}

/// Indices that would sort `arr` in ascending order. NaNs sort last.
pub(crate) fn argsort(arr: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..arr.len()).collect();
    indices.sort_by(|&i, &j| arr[i].total_cmp(&arr[j]));
    indices
}
