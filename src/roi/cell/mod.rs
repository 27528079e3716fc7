use anyhow::bail;
use ndarray::Array1;

use super::options::{MzRoiUpdater, MzTolerance};

/// Every peak assigned to one region of interest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roi {
    pub mzs: Vec<f64>,
    pub times: Vec<f64>,
    pub intensities: Vec<f64>,
    /// Global scan index of each point
    pub scans: Vec<usize>,
    /// Representative m/z
    pub mz: f64,
}

impl Roi {
    pub fn len(&self) -> usize {
        self.mzs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mzs.is_empty()
    }

    pub fn max_intensity(&self) -> f64 {
        self.intensities
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn push(&mut self, mz: f64, time: f64, intensity: f64, scan: usize) {
        self.mzs.push(mz);
        self.times.push(time);
        self.intensities.push(intensity);
        self.scans.push(scan);
    }

    fn update_mz(&mut self, updater: &MzRoiUpdater) {
        self.mz = updater.calculate(&self.mzs, &self.intensities);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Roicell {
    rois: Vec<Roi>,
}

impl Roicell {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    pub fn rois(&self) -> &[Roi] {
        &self.rois
    }

    pub fn iter(&self) -> impl Iterator<Item = &Roi> {
        self.rois.iter()
    }

    /// Representative m/z of every ROI, in storage order.
    pub fn mzroi(&self) -> Array1<f64> {
        self.rois.iter().map(|roi| roi.mz).collect()
    }

    /// Appends an empty ROI and returns its index.
    pub fn new_roi(&mut self) -> usize {
        self.rois.push(Roi::default());
        self.rois.len() - 1
    }

    pub fn update_roi(
        &mut self,
        roi: usize,
        updater: &MzRoiUpdater,
        mz: f64,
        time: f64,
        intensity: f64,
        scan: usize,
    ) -> anyhow::Result<()> {
        let n_rois = self.rois.len();
        let Some(target) = self.rois.get_mut(roi) else {
            bail!("ROI index {} out of range ({} ROIs)", roi, n_rois);
        };
        target.push(mz, time, intensity, scan);
        target.update_mz(updater);
        Ok(())
    }

    /// Index of the ROI whose m/z is nearest to `mz` within the tolerance.
    /// Ties go to the lower index.
    pub fn closest_roi(&self, mz: f64, tolerance: &MzTolerance) -> Option<usize> {
        let window = tolerance.get_error(mz);
        let mut best: Option<(usize, f64)> = None;
        for (index, roi) in self.rois.iter().enumerate() {
            let diff = (roi.mz - mz).abs();
            if diff > window {
                continue;
            }
            match best {
                Some((_, best_diff)) if best_diff <= diff => {}
                _ => best = Some((index, diff)),
            }
        }
        best.map(|(index, _)| index)
    }

    pub fn sort_by_mz(&mut self) {
        self.rois.sort_by(|a, b| a.mz.total_cmp(&b.mz));
    }

    /// Moves every point of `roi_remove` into `roi_keep` and drops `roi_remove`.
    pub fn merge_roi(
        &mut self,
        roi_keep: usize,
        roi_remove: usize,
        updater: &MzRoiUpdater,
    ) -> anyhow::Result<()> {
        let n_rois = self.rois.len();
        if roi_keep == roi_remove || roi_keep >= n_rois || roi_remove >= n_rois {
            bail!(
                "Cannot merge ROI {} into ROI {} ({} ROIs)",
                roi_remove,
                roi_keep,
                n_rois
            );
        }

        let removed = self.rois.remove(roi_remove);
        let keep = if roi_keep > roi_remove {
            roi_keep - 1
        } else {
            roi_keep
        };

        let target = &mut self.rois[keep];
        target.mzs.extend(removed.mzs);
        target.times.extend(removed.times);
        target.intensities.extend(removed.intensities);
        target.scans.extend(removed.scans);
        target.update_mz(updater);
        Ok(())
    }

    pub fn remove_roi(&mut self, roi: usize) -> anyhow::Result<Roi> {
        if roi >= self.rois.len() {
            bail!("ROI index {} out of range ({} ROIs)", roi, self.rois.len());
        }
        Ok(self.rois.remove(roi))
    }

    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&Roi) -> bool,
    {
        self.rois.retain(f);
    }
}
