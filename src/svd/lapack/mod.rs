use log::debug;
use nalgebra::DMatrix;

use super::{SvdFactors, SvdImplementation};
use crate::error::{LinalgError, Result};

/// LAPACK (`gesdd` through nalgebra-lapack) backed SVD.
#[derive(Debug, Clone, Copy, Default)]
pub struct LapackSvd;

impl SvdImplementation<f64> for LapackSvd {
    fn compute(&self, matrix: &DMatrix<f64>) -> Result<SvdFactors<f64>> {
        let (m, n) = matrix.shape();
        let k = m.min(n);
        debug!("LAPACK SVD on {}x{} matrix", m, n);

        let svd = nalgebra_lapack::SVD::new(matrix.clone())
            .ok_or_else(|| LinalgError::NumericalFailure("LAPACK SVD did not converge".to_string()))?;

        // LAPACK hands back the full U and V^H.
        Ok(SvdFactors {
            u: svd.u.columns(0, k).into_owned(),
            singular_values: svd.singular_values.rows(0, k).into_owned(),
            v_t: svd.vt.rows(0, k).into_owned(),
        }
        .into_sorted())
    }
}
