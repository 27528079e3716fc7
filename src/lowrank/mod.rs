//! # Low-rank reconstruction
//!
//! PCA style approximation of a dense matrix by its leading singular
//! components, together with the lack-of-fit statistic used to judge how many
//! components a dataset needs:
//!
//! ```text
//! lof = 100 * sqrt( sum |X - U_k S_k V_k^H|^2 / sum |X|^2 )
//! ```
//!
//! Sums of squares are always accumulated in `f64`, whatever the input
//! precision.

use log::debug;
use ndarray::{Array1, Array2, ArrayView2};

use crate::error::{LinalgError, Result};
use crate::svd::{NalgebraSvd, SvdImplementation, SvdScalar};
use crate::transform::Transformer;
use crate::utils::{to_array1, to_array2, to_dmatrix};

/// Output of a rank-`k` reconstruction.
#[derive(Debug, Clone)]
pub struct Reconstruction<T: SvdScalar> {
    /// Left singular vectors, `rows x k`
    pub u: Array2<T>,
    /// Leading singular values, descending
    pub singular_values: Array1<T::RealField>,
    /// Conjugate-transposed right singular vectors, `k x cols`
    pub vt: Array2<T>,
    /// `u * diag(singular_values) * vt`, same shape as the input
    pub approximation: Array2<T>,
    /// Residual norm as a percentage of the input norm
    pub lack_of_fit: f64,
}

impl<T: SvdScalar> Reconstruction<T> {
    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }

    /// Singular values as a `k x k` diagonal matrix.
    pub fn s_matrix(&self) -> Array2<T> {
        let k = self.rank();
        Array2::from_shape_fn((k, k), |(i, j)| {
            if i == j {
                T::from_real(self.singular_values[i].clone())
            } else {
                T::zero()
            }
        })
    }

    /// `matrix - approximation`
    pub fn residual(&self, matrix: ArrayView2<T>) -> Result<Array2<T>> {
        if matrix.dim() != self.approximation.dim() {
            return Err(LinalgError::DimensionMismatch(format!(
                "matrix is {:?} but the approximation is {:?}",
                matrix.dim(),
                self.approximation.dim()
            )));
        }
        Ok(Array2::from_shape_fn(matrix.dim(), |(i, j)| {
            matrix[[i, j]].clone() - self.approximation[[i, j]].clone()
        }))
    }
}

#[derive(Debug, Clone)]
pub struct LowRankReconstructorBuilder<S> {
    rank: Option<usize>,
    svd_implementation: S,
}

impl<S> LowRankReconstructorBuilder<S> {
    pub fn new(svd_implementation: S) -> Self {
        LowRankReconstructorBuilder {
            rank: None,
            svd_implementation,
        }
    }

    /// Number of components to keep. Without it the full rank
    /// `min(rows, cols)` of each input is used.
    pub fn rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn build(self) -> LowRankReconstructor<S> {
        LowRankReconstructor {
            rank: self.rank,
            svd_implementation: self.svd_implementation,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LowRankReconstructor<S> {
    rank: Option<usize>,
    svd_implementation: S,
}

impl Default for LowRankReconstructor<NalgebraSvd> {
    fn default() -> Self {
        LowRankReconstructorBuilder::new(NalgebraSvd::default()).build()
    }
}

impl<S> LowRankReconstructor<S> {
    pub fn rank(&self) -> Option<usize> {
        self.rank
    }

    pub fn svd_implementation(&self) -> &S {
        &self.svd_implementation
    }

    pub fn reconstruct<T>(&self, matrix: ArrayView2<T>) -> Result<Reconstruction<T>>
    where
        T: SvdScalar,
        S: SvdImplementation<T>,
    {
        let (rows, cols) = matrix.dim();
        let rank = self.rank.unwrap_or(rows.min(cols));
        let total_ss = validate(&matrix, rank)?;

        let x = to_dmatrix(&matrix);
        let factors = self.svd_implementation.compute(&x)?.truncate(rank);
        if factors.rank() < rank {
            return Err(LinalgError::NumericalFailure(format!(
                "SVD returned {} components, {} requested",
                factors.rank(),
                rank
            )));
        }
        factors.singular_values_f64()?;

        let approximation = factors.reconstruct();
        let residual = &x - &approximation;
        let residual_ss = sum_of_squares(residual.iter())?;
        let lof = lack_of_fit(residual_ss, total_ss)?;

        debug!(
            "Reconstructed {}x{} matrix at rank {}: lack of fit {:.4}%",
            rows, cols, rank, lof
        );

        Ok(Reconstruction {
            u: to_array2(&factors.u),
            singular_values: to_array1(&factors.singular_values),
            vt: to_array2(&factors.v_t),
            approximation: to_array2(&approximation),
            lack_of_fit: lof,
        })
    }

    /// Lack of fit for every rank `1..=max_rank` from a single decomposition,
    /// using `||X - X_k||_F^2 = sum_{i > k} s_i^2`.
    pub fn lack_of_fit_profile<T>(&self, matrix: ArrayView2<T>, max_rank: usize) -> Result<Vec<f64>>
    where
        T: SvdScalar,
        S: SvdImplementation<T>,
    {
        let total_ss = validate(&matrix, max_rank)?;
        let factors = self.svd_implementation.compute(&to_dmatrix(&matrix))?;
        let energies: Vec<f64> = factors
            .singular_values_f64()?
            .into_iter()
            .map(|s| s * s)
            .collect();

        // tail[k] = sum of energies beyond the k leading components
        let mut tail = vec![0.0; energies.len() + 1];
        for k in (0..energies.len()).rev() {
            tail[k] = tail[k + 1] + energies[k];
        }

        let profile = (1..=max_rank)
            .map(|k| lack_of_fit(tail.get(k).copied().unwrap_or(0.0), total_ss))
            .collect::<Result<Vec<f64>>>()?;

        debug!("Lack of fit profile up to rank {}: {:?}", max_rank, profile);
        Ok(profile)
    }

    /// Smallest rank whose lack of fit does not exceed `target_lof` (in %).
    pub fn select_rank<T>(&self, matrix: ArrayView2<T>, target_lof: f64) -> Result<usize>
    where
        T: SvdScalar,
        S: SvdImplementation<T>,
    {
        if !target_lof.is_finite() || target_lof < 0.0 {
            return Err(LinalgError::InvalidTolerance(target_lof));
        }
        let (rows, cols) = matrix.dim();
        let full_rank = rows.min(cols);
        let profile = self.lack_of_fit_profile(matrix, full_rank)?;

        let rank = profile
            .iter()
            .position(|&lof| lof <= target_lof)
            .map(|index| index + 1)
            .unwrap_or(full_rank);

        debug!("Selected rank {} for target lack of fit {}%", rank, target_lof);
        Ok(rank)
    }
}

impl<T, S> Transformer<Array2<T>> for LowRankReconstructor<S>
where
    T: SvdScalar,
    S: SvdImplementation<T>,
{
    type Output = Reconstruction<T>;

    fn fit(&mut self, _input: &Array2<T>) -> anyhow::Result<&mut Self> {
        Ok(self)
    }

    fn transform(&self, input: &Array2<T>) -> anyhow::Result<Self::Output> {
        Ok(self.reconstruct(input.view())?)
    }
}

/// Rank-`rank` reconstruction of `matrix` with the default nalgebra SVD.
///
/// Returns the truncated factors, the approximation and its lack of fit.
pub fn pcarep<T: SvdScalar>(matrix: ArrayView2<T>, rank: usize) -> Result<Reconstruction<T>> {
    LowRankReconstructorBuilder::new(NalgebraSvd::default())
        .rank(rank)
        .build()
        .reconstruct(matrix)
}

pub fn lack_of_fit_profile<T: SvdScalar>(matrix: ArrayView2<T>, max_rank: usize) -> Result<Vec<f64>> {
    LowRankReconstructor::<NalgebraSvd>::default().lack_of_fit_profile(matrix, max_rank)
}

pub fn select_rank<T: SvdScalar>(matrix: ArrayView2<T>, target_lof: f64) -> Result<usize> {
    LowRankReconstructor::<NalgebraSvd>::default().select_rank(matrix, target_lof)
}

/// Checks shape, rank, finiteness and energy. Returns the total sum of squares.
fn validate<T: SvdScalar>(matrix: &ArrayView2<T>, rank: usize) -> Result<f64> {
    let (rows, cols) = matrix.dim();
    if rows == 0 || cols == 0 {
        return Err(LinalgError::InvalidShape { rows, cols });
    }

    let max_rank = rows.min(cols);
    if rank < 1 || rank > max_rank {
        return Err(LinalgError::InvalidRank { rank, max_rank });
    }

    if !matrix.iter().all(|x| x.clone().is_finite()) {
        return Err(LinalgError::NumericalFailure(
            "matrix contains non-finite values".to_string(),
        ));
    }

    let total_ss = sum_of_squares(matrix.iter())?;
    if total_ss == 0.0 {
        return Err(LinalgError::DegenerateInput);
    }
    Ok(total_ss)
}

fn sum_of_squares<'a, T: SvdScalar>(values: impl Iterator<Item = &'a T>) -> Result<f64> {
    let mut total = 0.0f64;
    for value in values {
        total += value.modulus_squared_f64().ok_or_else(|| {
            LinalgError::NumericalFailure("value not representable as f64".to_string())
        })?;
    }
    if !total.is_finite() {
        return Err(LinalgError::NumericalFailure(
            "sum of squares overflowed".to_string(),
        ));
    }
    Ok(total)
}

fn lack_of_fit(residual_ss: f64, total_ss: f64) -> Result<f64> {
    let lof = 100.0 * (residual_ss / total_ss).sqrt();
    if lof.is_finite() {
        Ok(lof)
    } else {
        Err(LinalgError::NumericalFailure(format!(
            "lack of fit is not finite ({} / {})",
            residual_ss, total_ss
        )))
    }
}
