//! Matrix division in the MATLAB sense.
//!
//! `mrdivide(a, b)` solves `x * b = a` for a square `b`, `mldivide(a, b)`
//! solves `a * x = b` in the least-squares sense for any shape.

use approx::AbsDiffEq;
use log::{debug, warn};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2};

use crate::error::{LinalgError, Result};
use crate::svd::SvdScalar;
use crate::utils::{to_array1, to_array2, to_dmatrix};

/// `a / b`, the solution of `x b = a`.
///
/// Solved as `b^H x^H = a^H` with a partially pivoted LU.
pub fn mrdivide<T: SvdScalar>(a: ArrayView2<T>, b: ArrayView2<T>) -> Result<Array2<T>> {
    if b.nrows() != b.ncols() {
        return Err(LinalgError::DimensionMismatch(format!(
            "divisor must be square, got {:?}",
            b.dim()
        )));
    }
    if a.ncols() != b.nrows() {
        return Err(LinalgError::DimensionMismatch(format!(
            "cannot divide {:?} by {:?}",
            a.dim(),
            b.dim()
        )));
    }
    check_finite(&a)?;
    check_finite(&b)?;

    let a_h = to_dmatrix(&a).adjoint();
    let b_h = to_dmatrix(&b).adjoint();

    let x_h = b_h.lu().solve(&a_h).ok_or(LinalgError::SingularMatrix)?;
    let x = x_h.adjoint();
    if !x.iter().all(|v| v.clone().is_finite()) {
        return Err(LinalgError::SingularMatrix);
    }

    debug!("mrdivide {:?} / {:?}", a.dim(), b.dim());
    Ok(to_array2(&x))
}

/// Least-squares solution of `a x = b`, with the same conventions as
/// `numpy.linalg.lstsq`.
#[derive(Debug, Clone)]
pub struct LeastSquares<T: SvdScalar> {
    pub solution: Array2<T>,
    /// Squared residual norm per column of `b`. Empty unless `a` has full
    /// column rank and more rows than columns.
    pub residuals: Array1<f64>,
    pub rank: usize,
    pub singular_values: Array1<T::RealField>,
}

/// `a \ b`
///
/// Singular values below `eps * max(m, n) * s_max` are treated as zero.
pub fn mldivide<T: SvdScalar>(a: ArrayView2<T>, b: ArrayView2<T>) -> Result<LeastSquares<T>> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err(LinalgError::InvalidShape { rows: m, cols: n });
    }
    if b.nrows() != m {
        return Err(LinalgError::DimensionMismatch(format!(
            "cannot solve {:?} \\ {:?}",
            a.dim(),
            b.dim()
        )));
    }
    check_finite(&a)?;
    check_finite(&b)?;

    let a_mat = to_dmatrix(&a);
    let b_mat = to_dmatrix(&b);

    let svd = nalgebra::SVD::try_new(
        a_mat.clone(),
        true,
        true,
        <T::RealField as AbsDiffEq>::default_epsilon(),
        0,
    )
    .ok_or_else(|| LinalgError::NumericalFailure("SVD did not converge".to_string()))?;

    let singular_values: Vec<f64> = svd
        .singular_values
        .iter()
        .map(|s| T::real_to_f64(s).unwrap_or(f64::NAN))
        .collect();
    let s_max = singular_values.iter().cloned().fold(0.0, f64::max);
    let cutoff = f64::EPSILON * m.max(n) as f64 * s_max;
    let rank = singular_values.iter().filter(|&&s| s > cutoff).count();

    let solution = svd
        .solve(&b_mat, nalgebra::convert::<f64, T::RealField>(cutoff))
        .map_err(|e| LinalgError::NumericalFailure(e.to_string()))?;

    let residuals = if rank == n && m > n {
        let r: DMatrix<T> = &a_mat * &solution - &b_mat;
        Array1::from_iter(r.column_iter().map(|col| {
            col.iter()
                .map(|v| v.modulus_squared_f64().unwrap_or(f64::NAN))
                .sum::<f64>()
        }))
    } else {
        Array1::zeros(0)
    };

    if rank < n.min(m) {
        warn!(
            "mldivide: coefficient matrix {:?} is rank deficient (rank {})",
            a.dim(),
            rank
        );
    }
    debug!("mldivide {:?} \\ {:?}, rank {}", a.dim(), b.dim(), rank);

    Ok(LeastSquares {
        solution: to_array2(&solution),
        residuals,
        rank,
        singular_values: to_array1(&svd.singular_values),
    })
}

fn check_finite<T: SvdScalar>(x: &ArrayView2<T>) -> Result<()> {
    if x.iter().all(|v| v.clone().is_finite()) {
        Ok(())
    } else {
        Err(LinalgError::NumericalFailure(
            "matrix contains non-finite values".to_string(),
        ))
    }
}
