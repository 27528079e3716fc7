use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};

use crate::utils::argsort;

/// Width of the m/z window two peaks may differ by and still belong to the
/// same ROI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MzTolerance {
    /// Absolute tolerance in Daltons
    Dalton(f64),
    /// Relative tolerance in parts per million of the m/z value
    Ppm(f64),
}

impl MzTolerance {
    /// Builds a tolerance from a value and its units, `"da"` or `"ppm"`.
    pub fn from_units(tol: f64, units: &str) -> anyhow::Result<Self> {
        match units.to_lowercase().as_str() {
            "da" => Ok(Self::Dalton(tol)),
            "ppm" => Ok(Self::Ppm(tol)),
            _ => bail!(
                "Unknown tolerance units '{}'! Allowed units are: 'da' for Daltons and 'ppm' for ppm",
                units
            ),
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Self::Dalton(x) | Self::Ppm(x) => *x,
        }
    }

    /// Tolerance in Daltons around `mz`.
    pub fn get_error(&self, mz: f64) -> f64 {
        match self {
            Self::Dalton(x) => *x,
            Self::Ppm(x) => x * mz / 1e6,
        }
    }
}

impl Default for MzTolerance {
    fn default() -> Self {
        Self::Dalton(0.5)
    }
}

/// Strategy for the representative m/z of a ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MzRoiUpdater {
    #[default]
    Mean,
    Median,
    /// m/z of the most intense point
    Max,
    /// Intensity weighted mean
    Weighted,
}

impl MzRoiUpdater {
    /// Representative m/z of `values`. NaN for empty or mismatched input.
    pub fn calculate(&self, values: &[f64], intensities: &[f64]) -> f64 {
        if values.is_empty() || values.len() != intensities.len() {
            return f64::NAN;
        }
        match self {
            Self::Mean => mean(values),
            Self::Median => {
                let order = argsort(values);
                values[order[order.len() / 2]]
            }
            Self::Max => {
                let order = argsort(intensities);
                order
                    .last()
                    .map(|&i| values[i])
                    .unwrap_or(f64::NAN)
            }
            Self::Weighted => {
                let total: f64 = intensities.iter().sum();
                if total == 0.0 {
                    return mean(values);
                }
                values
                    .iter()
                    .zip(intensities)
                    .map(|(mz, int)| mz * int)
                    .sum::<f64>()
                    / total
            }
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

impl FromStr for MzRoiUpdater {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            "median" => Ok(Self::Median),
            "weighted" => Ok(Self::Weighted),
            _ => Err(anyhow!(
                "Unknown update method '{}'! Allowed methods are: 'mean', 'max', 'median' and 'weighted'",
                s
            )),
        }
    }
}

impl fmt::Display for MzRoiUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Max => "max",
            Self::Weighted => "weighted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoiParams {
    /// Peaks at or below this intensity are ignored
    pub threshold: f64,
    /// A ROI must peak above `threshold * t_factor` to be kept
    pub t_factor: f64,
    pub mz_error: MzTolerance,
    pub mzroi_updater: MzRoiUpdater,
    /// A ROI must hold more than this many points to be kept
    pub min_occ: usize,
}

impl Default for RoiParams {
    fn default() -> Self {
        RoiParams {
            threshold: 1000.0,
            t_factor: 1.0,
            mz_error: MzTolerance::default(),
            mzroi_updater: MzRoiUpdater::default(),
            min_occ: 1,
        }
    }
}

impl RoiParams {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            bail!(
                "Intensity threshold must be finite and non-negative, got {}",
                self.threshold
            );
        }
        if !self.t_factor.is_finite() || self.t_factor <= 0.0 {
            bail!("t_factor must be finite and positive, got {}", self.t_factor);
        }
        let tol = self.mz_error.value();
        if !tol.is_finite() || tol <= 0.0 {
            bail!("m/z tolerance must be finite and positive, got {}", tol);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tolerance() {
        assert_eq!(MzTolerance::Dalton(0.05).get_error(500.0), 0.05);
        assert_relative_eq!(MzTolerance::Ppm(10.0).get_error(500.0), 0.005);

        assert_eq!(
            MzTolerance::from_units(5.0, "PPM").unwrap(),
            MzTolerance::Ppm(5.0)
        );
        assert_eq!(
            MzTolerance::from_units(0.5, "da").unwrap(),
            MzTolerance::Dalton(0.5)
        );
        assert!(MzTolerance::from_units(0.5, "mmu").is_err());
    }

    #[test]
    fn test_updaters() {
        let values = [1.0, 2.0, 3.0, 10.0];
        let intensities = [1.0, 1.0, 1.0, 5.0];

        assert_relative_eq!(MzRoiUpdater::Mean.calculate(&values, &intensities), 4.0);
        assert_relative_eq!(MzRoiUpdater::Median.calculate(&values, &intensities), 3.0);
        assert_relative_eq!(MzRoiUpdater::Max.calculate(&values, &intensities), 10.0);
        assert_relative_eq!(MzRoiUpdater::Weighted.calculate(&values, &intensities), 7.0);

        assert!(MzRoiUpdater::Mean.calculate(&[], &[]).is_nan());
        assert_relative_eq!(MzRoiUpdater::Weighted.calculate(&[2.0, 4.0], &[0.0, 0.0]), 3.0);
    }

    #[test]
    fn test_updaters_mismatched_lengths() {
        for updater in [
            MzRoiUpdater::Mean,
            MzRoiUpdater::Median,
            MzRoiUpdater::Max,
            MzRoiUpdater::Weighted,
        ] {
            assert!(updater.calculate(&[1.0], &[1.0, 2.0]).is_nan());
            assert!(updater.calculate(&[1.0, 2.0], &[1.0]).is_nan());
        }
    }

    #[test]
    fn test_updater_parsing() {
        for updater in [
            MzRoiUpdater::Mean,
            MzRoiUpdater::Median,
            MzRoiUpdater::Max,
            MzRoiUpdater::Weighted,
        ] {
            assert_eq!(updater.to_string().parse::<MzRoiUpdater>().unwrap(), updater);
        }
        assert_eq!("MEAN".parse::<MzRoiUpdater>().unwrap(), MzRoiUpdater::Mean);
        assert!("mode".parse::<MzRoiUpdater>().is_err());
    }

    #[test]
    fn test_params_validation() {
        assert!(RoiParams::default().validate().is_ok());

        let params = RoiParams {
            threshold: -1.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = RoiParams {
            t_factor: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = RoiParams {
            mz_error: MzTolerance::Ppm(f64::NAN),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
