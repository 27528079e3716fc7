//! Thin singular value decompositions behind a pluggable backend.
//!
//! Every backend returns the factors of `A = U diag(s) V^H` with `k = min(m, n)`
//! columns in `U`, `k` singular values in descending order and `k` rows in `V^H`.
//! The ordering matters: truncating to the first `r` components must keep the
//! `r` components with the largest energy.

use approx::AbsDiffEq;
use log::debug;
use nalgebra::{ComplexField, DMatrix, DVector};
use num_traits::ToPrimitive;

use crate::error::{LinalgError, Result};

#[cfg(feature = "lapack")]
pub mod lapack;

#[cfg(feature = "faer")]
pub mod faer;

/// Scalars the decompositions work with: real or complex fields whose real
/// part can be widened to `f64` for accumulation.
pub trait SvdScalar: ComplexField {
    fn real_to_f64(value: &Self::RealField) -> Option<f64>;

    /// `|x|^2` widened to `f64`.
    fn modulus_squared_f64(&self) -> Option<f64> {
        Self::real_to_f64(&self.clone().modulus_squared())
    }
}

impl<T> SvdScalar for T
where
    T: ComplexField,
    T::RealField: ToPrimitive,
{
    fn real_to_f64(value: &T::RealField) -> Option<f64> {
        value.to_f64()
    }
}

pub trait SvdImplementation<T: SvdScalar>: Send + Sync {
    fn compute(&self, matrix: &DMatrix<T>) -> Result<SvdFactors<T>>;
}

#[derive(Debug, Clone)]
pub struct SvdFactors<T: SvdScalar> {
    pub u: DMatrix<T>,
    pub singular_values: DVector<T::RealField>,
    pub v_t: DMatrix<T>,
}

impl<T: SvdScalar> SvdFactors<T> {
    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }

    pub fn singular_values_f64(&self) -> Result<Vec<f64>> {
        self.singular_values
            .iter()
            .map(|s| {
                T::real_to_f64(s)
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        LinalgError::NumericalFailure("non-finite singular value".to_string())
                    })
            })
            .collect()
    }

    /// Reorders the components so singular values are non-increasing.
    /// Backends that already sort are returned untouched.
    pub fn into_sorted(self) -> Self {
        let values: Vec<f64> = self
            .singular_values
            .iter()
            .map(|s| T::real_to_f64(s).unwrap_or(f64::NAN))
            .collect();

        if values.windows(2).all(|w| w[0] >= w[1]) {
            return self;
        }

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

        let k = order.len();
        let u = DMatrix::from_fn(self.u.nrows(), k, |i, j| self.u[(i, order[j])].clone());
        let singular_values =
            DVector::from_fn(k, |j, _| self.singular_values[order[j]].clone());
        let v_t = DMatrix::from_fn(k, self.v_t.ncols(), |i, j| {
            self.v_t[(order[i], j)].clone()
        });

        SvdFactors {
            u,
            singular_values,
            v_t,
        }
    }

    /// Keeps the leading `rank` components. `rank` is clamped to the number
    /// of available components.
    pub fn truncate(self, rank: usize) -> Self {
        let rank = rank.min(self.rank());
        SvdFactors {
            u: self.u.columns(0, rank).into_owned(),
            singular_values: self.singular_values.rows(0, rank).into_owned(),
            v_t: self.v_t.rows(0, rank).into_owned(),
        }
    }

    /// `U diag(s) V^H`
    pub fn reconstruct(&self) -> DMatrix<T> {
        let s_diag = DMatrix::from_diagonal(&self.singular_values.map(T::from_real));
        &self.u * s_diag * &self.v_t
    }
}

/// Pure Rust SVD from nalgebra (Golub-Kahan bidiagonalization followed by
/// implicit QR sweeps).
#[derive(Debug, Clone, Copy, Default)]
pub struct NalgebraSvd {
    eps: Option<f64>,
    max_niter: usize,
}

impl NalgebraSvd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convergence threshold on the off-diagonal elements. Defaults to the
    /// machine epsilon of the matrix's real type.
    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = Some(eps);
        self
    }

    /// Upper bound on QR sweeps, `0` means unbounded.
    pub fn max_niter(mut self, max_niter: usize) -> Self {
        self.max_niter = max_niter;
        self
    }
}

impl<T: SvdScalar> SvdImplementation<T> for NalgebraSvd {
    fn compute(&self, matrix: &DMatrix<T>) -> Result<SvdFactors<T>> {
        let eps = match self.eps {
            Some(eps) => nalgebra::convert::<f64, T::RealField>(eps),
            None => <T::RealField as AbsDiffEq>::default_epsilon(),
        };

        debug!(
            "nalgebra SVD on {}x{} matrix (max_niter = {})",
            matrix.nrows(),
            matrix.ncols(),
            self.max_niter
        );

        let svd = nalgebra::SVD::try_new(matrix.clone(), true, true, eps, self.max_niter)
            .ok_or_else(|| {
                LinalgError::NumericalFailure(format!(
                    "SVD did not converge within {} iterations",
                    self.max_niter
                ))
            })?;

        let u = svd
            .u
            .ok_or_else(|| LinalgError::NumericalFailure("SVD returned no U".to_string()))?;
        let v_t = svd
            .v_t
            .ok_or_else(|| LinalgError::NumericalFailure("SVD returned no V^H".to_string()))?;

        Ok(SvdFactors {
            u,
            singular_values: svd.singular_values,
            v_t,
        }
        .into_sorted())
    }
}
