//! Numerical building blocks for multivariate curve resolution of LC-MS data:
//! low-rank (PCA) reconstruction with lack of fit, MATLAB style matrix
//! division and the ROI (regions of interest) compression of raw scans.

pub mod dense;
pub mod error;
pub mod lowrank;
pub mod roi;
pub mod svd;
pub mod transform;
mod utils;

pub use dense::{mldivide, mrdivide, LeastSquares};
pub use error::LinalgError;
pub use lowrank::{
    lack_of_fit_profile, pcarep, select_rank, LowRankReconstructor, LowRankReconstructorBuilder,
    Reconstruction,
};
pub use roi::{
    compute_roi, load_mzxml, parse_mzxml, MsRun, MzRoiUpdater, MzTolerance, RoiExtractor,
    RoiExtractorBuilder, RoiParams, RoiResult,
};
pub use svd::{NalgebraSvd, SvdImplementation, SvdScalar};
pub use transform::Transformer;
