//! # Regions of interest
//!
//! Column-wise compression of LC-MS data: peaks from consecutive scans whose
//! m/z agree within a tolerance are grouped into regions of interest (ROIs).
//! The output is the list of ROI m/z values and the `scans x rois` intensity
//! matrix (`msroi`), ready for PCA or MCR-ALS.
//!
//! Several runs can be processed together. Their scans are concatenated
//! (column-wise augmentation) so every run shares the same ROI axis.

mod cell;
pub mod io;
mod options;

use anyhow::bail;
use log::{debug, trace};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;

use crate::transform::Transformer;

pub use cell::{Roi, Roicell};
pub use io::{load_mzxml, parse_mzxml};
pub use options::{MzRoiUpdater, MzTolerance, RoiParams};

/// One acquisition: a peak list per scan plus the scan retention times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsRun {
    pub name: String,
    /// `n_peaks x 2` per scan, columns are m/z and intensity
    pub peaks: Vec<Array2<f64>>,
    pub times: Array1<f64>,
}

impl MsRun {
    pub fn new(peaks: Vec<Array2<f64>>, times: Array1<f64>) -> anyhow::Result<Self> {
        let run = MsRun {
            name: String::new(),
            peaks,
            times,
        };
        run.validate()?;
        Ok(run)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn n_scans(&self) -> usize {
        self.peaks.len()
    }

    /// Total ion current of every scan.
    pub fn tic(&self) -> Array1<f64> {
        self.peaks
            .iter()
            .map(|scan| {
                if scan.nrows() == 0 || scan.ncols() < 2 {
                    0.0
                } else {
                    scan.column(1).sum()
                }
            })
            .collect()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.peaks.len() != self.times.len() {
            bail!(
                "Run '{}' has {} scans but {} retention times",
                self.name,
                self.peaks.len(),
                self.times.len()
            );
        }
        for (index, scan) in self.peaks.iter().enumerate() {
            if scan.nrows() == 0 {
                continue;
            }
            if scan.ncols() != 2 {
                bail!(
                    "Scan {} of run '{}' must have 2 columns (m/z, intensity), got {}",
                    index,
                    self.name,
                    scan.ncols()
                );
            }
            if !scan.iter().all(|v| v.is_finite()) {
                bail!("Scan {} of run '{}' contains non-finite values", index, self.name);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RoiResult {
    /// ROI m/z values, ascending
    pub mzroi: Array1<f64>,
    /// Summed intensities, `total scans x ROIs`
    pub msroi: Array2<f64>,
    pub roicell: Roicell,
    /// Retention times of the concatenated scans
    pub times: Array1<f64>,
}

/// Searches the regions of interest over every scan of `runs`.
pub fn compute_roi(runs: &[MsRun], params: &RoiParams) -> anyhow::Result<RoiResult> {
    params.validate()?;
    if runs.is_empty() {
        bail!("At least one MS run is required");
    }
    for run in runs {
        run.validate()?;
    }

    let scans: Vec<&Array2<f64>> = runs.iter().flat_map(|run| run.peaks.iter()).collect();
    let times: Vec<f64> = runs
        .iter()
        .flat_map(|run| run.times.iter().copied())
        .collect();

    debug!(
        "Computing ROIs over {} scans from {} runs (threshold {}, tolerance {:?}, updater {})",
        scans.len(),
        runs.len(),
        params.threshold,
        params.mz_error,
        params.mzroi_updater
    );

    let filtered: Vec<Vec<(f64, f64)>> = scans
        .par_iter()
        .map(|peaks| peaks_above(peaks, params.threshold))
        .collect();

    if let MzTolerance::Ppm(_) = params.mz_error {
        let non_positive = filtered.iter().enumerate().find_map(|(scan, peaks)| {
            peaks
                .iter()
                .find(|(mz, _)| *mz <= 0.0)
                .map(|&(mz, _)| (scan, mz))
        });
        if let Some((scan, mz)) = non_positive {
            bail!(
                "Scan {} has a peak at m/z {}, ppm tolerances need positive m/z values",
                scan,
                mz
            );
        }
    }

    let mut roicell = Roicell::new();
    for (scan, peaks) in filtered.iter().enumerate() {
        for &(mz, intensity) in peaks {
            let roi = match roicell.closest_roi(mz, &params.mz_error) {
                Some(roi) => roi,
                None => roicell.new_roi(),
            };
            roicell.update_roi(
                roi,
                &params.mzroi_updater,
                mz,
                times[scan],
                intensity,
                scan,
            )?;
        }
    }
    debug!("{} candidate ROIs", roicell.len());

    roicell.sort_by_mz();
    merge_close_rois(&mut roicell, params)?;

    let min_intensity = params.threshold * params.t_factor;
    let before = roicell.len();
    roicell.retain(|roi| {
        let keep = roi.len() > params.min_occ && roi.max_intensity() > min_intensity;
        if !keep {
            trace!(
                "Dropping ROI at m/z {:.5} ({} points, max intensity {})",
                roi.mz,
                roi.len(),
                roi.max_intensity()
            );
        }
        keep
    });
    debug!(
        "{} ROIs kept, {} dropped by min_occ / intensity filters",
        roicell.len(),
        before - roicell.len()
    );

    let mut msroi = Array2::<f64>::zeros((scans.len(), roicell.len()));
    for (column, roi) in roicell.iter().enumerate() {
        for (&scan, &intensity) in roi.scans.iter().zip(roi.intensities.iter()) {
            msroi[[scan, column]] += intensity;
        }
    }

    Ok(RoiResult {
        mzroi: roicell.mzroi(),
        msroi,
        roicell,
        times: Array1::from_vec(times),
    })
}

fn peaks_above(peaks: &Array2<f64>, threshold: f64) -> Vec<(f64, f64)> {
    if peaks.nrows() == 0 {
        return Vec::new();
    }
    peaks
        .axis_iter(Axis(0))
        .filter(|peak| peak[1] > threshold)
        .map(|peak| (peak[0], peak[1]))
        .collect()
}

/// Merges neighbouring ROIs (sorted by m/z) that ended up closer than the
/// tolerance, lowest pair first, until no such pair is left.
fn merge_close_rois(roicell: &mut Roicell, params: &RoiParams) -> anyhow::Result<()> {
    loop {
        let candidate = roicell
            .rois()
            .windows(2)
            .position(|pair| (pair[1].mz - pair[0].mz).abs() < params.mz_error.get_error(pair[0].mz));

        let Some(index) = candidate else {
            return Ok(());
        };

        trace!(
            "Merging ROI at m/z {:.5} into ROI at m/z {:.5}",
            roicell.rois()[index + 1].mz,
            roicell.rois()[index].mz
        );
        roicell.merge_roi(index, index + 1, &params.mzroi_updater)?;
        roicell.sort_by_mz();
    }
}

/// ROI search as a pipeline stage. The three classic knobs, `threshold`,
/// `t_factor` and the m/z tolerance, are set through [`RoiExtractorBuilder`].
#[derive(Debug, Clone, Default)]
pub struct RoiExtractor {
    params: RoiParams,
}

impl RoiExtractor {
    pub fn new(params: RoiParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(RoiExtractor { params })
    }

    pub fn params(&self) -> &RoiParams {
        &self.params
    }
}

impl Transformer<[MsRun]> for RoiExtractor {
    type Output = RoiResult;

    fn fit(&mut self, _input: &[MsRun]) -> anyhow::Result<&mut Self> {
        Ok(self)
    }

    fn transform(&self, input: &[MsRun]) -> anyhow::Result<Self::Output> {
        compute_roi(input, &self.params)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoiExtractorBuilder {
    params: RoiParams,
}

impl RoiExtractorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.params.threshold = threshold;
        self
    }

    pub fn t_factor(mut self, t_factor: f64) -> Self {
        self.params.t_factor = t_factor;
        self
    }

    pub fn tolerance(mut self, tolerance: MzTolerance) -> Self {
        self.params.mz_error = tolerance;
        self
    }

    pub fn updater(mut self, updater: MzRoiUpdater) -> Self {
        self.params.mzroi_updater = updater;
        self
    }

    pub fn min_occ(mut self, min_occ: usize) -> Self {
        self.params.min_occ = min_occ;
        self
    }

    pub fn build(self) -> anyhow::Result<RoiExtractor> {
        RoiExtractor::new(self.params)
    }
}
