use faer_ext::{IntoFaer, IntoNdarray};
use log::debug;
use nalgebra::{DMatrix, DVector};

use super::{SvdFactors, SvdImplementation};
use crate::error::Result;
use crate::utils::{to_array2, to_dmatrix};

#[derive(Debug, Clone, Copy, Default)]
pub struct FaerSvd;

impl SvdImplementation<f64> for FaerSvd {
    fn compute(&self, matrix: &DMatrix<f64>) -> Result<SvdFactors<f64>> {
        debug!("faer SVD on {}x{} matrix", matrix.nrows(), matrix.ncols());

        let array = to_array2(matrix);
        let svd = array.view().into_faer().thin_svd();

        let u = to_dmatrix(&svd.u().into_ndarray());
        let v = to_dmatrix(&svd.v().into_ndarray());
        let s = svd.s_diagonal();
        let singular_values = DVector::from_fn(s.nrows(), |i, _| s.read(i));

        Ok(SvdFactors {
            u,
            singular_values,
            v_t: v.transpose(),
        }
        .into_sorted())
    }
}
