//! mzXML import.
//!
//! Only MS1 scans (`msLevel="1"`) are kept. MSn scans, nested under their
//! precursor or not, are skipped. Peak lists are base64 encoded, network
//! byte order (m/z, intensity) pairs in 32 or 64 bit precision. Retention times are
//! xs:duration values in seconds (`PT12.5S`).

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, warn};
use ndarray::{Array1, Array2};
use serde::Deserialize;

use super::MsRun;

#[derive(Debug, Deserialize)]
struct MzXml {
    #[serde(rename = "msRun")]
    ms_run: RawRun,
}

#[derive(Debug, Deserialize)]
struct RawRun {
    #[serde(rename = "scan", default)]
    scans: Vec<RawScan>,
}

#[derive(Debug, Deserialize)]
struct RawScan {
    #[serde(rename = "@num", default)]
    num: u64,
    #[serde(rename = "@msLevel")]
    ms_level: u8,
    #[serde(rename = "@peaksCount", default)]
    peaks_count: Option<usize>,
    #[serde(rename = "@retentionTime", default)]
    retention_time: Option<String>,
    #[serde(default)]
    peaks: Option<RawPeaks>,
    /// MSn scans nested under their precursor scan
    #[serde(rename = "scan", default)]
    scans: Vec<RawScan>,
}

#[derive(Debug, Deserialize)]
struct RawPeaks {
    #[serde(rename = "@precision", default = "default_precision")]
    precision: u32,
    #[serde(rename = "@byteOrder", default)]
    byte_order: Option<String>,
    #[serde(rename = "@compressionType", default)]
    compression_type: Option<String>,
    #[serde(rename = "$text", default)]
    data: String,
}

fn default_precision() -> u32 {
    32
}

/// Reads an mzXML file. The run is named after the file stem.
pub fn load_mzxml(path: impl AsRef<Path>) -> anyhow::Result<MsRun> {
    let path = path.as_ref();
    let input = fs::read_to_string(path)
        .with_context(|| format!("Failed to read mzXML file {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let run = parse_mzxml(&input)
        .with_context(|| format!("Failed to parse mzXML file {}", path.display()))?;
    Ok(run.with_name(name))
}

/// Parses mzXML content held in memory.
pub fn parse_mzxml(input: &str) -> anyhow::Result<MsRun> {
    let document: MzXml = quick_xml::de::from_str(input).context("Malformed mzXML document")?;

    let mut scans = Vec::new();
    flatten_scans(&document.ms_run.scans, &mut scans);

    let mut peaks = Vec::new();
    let mut times = Vec::new();
    let mut skipped = 0usize;
    for scan in scans {
        if scan.ms_level != 1 {
            skipped += 1;
            continue;
        }
        let retention_time = scan
            .retention_time
            .as_deref()
            .ok_or_else(|| anyhow!("Scan {} has no retention time", scan.num))
            .and_then(parse_retention_time)
            .with_context(|| format!("Invalid scan {}", scan.num))?;
        let scan_peaks = match &scan.peaks {
            Some(raw) => decode_peaks(raw)
                .with_context(|| format!("Invalid peaks in scan {}", scan.num))?,
            None => Array2::zeros((0, 2)),
        };
        if let Some(expected) = scan.peaks_count {
            if expected != scan_peaks.nrows() {
                warn!(
                    "Scan {} declares {} peaks but holds {}",
                    scan.num,
                    expected,
                    scan_peaks.nrows()
                );
            }
        }
        peaks.push(scan_peaks);
        times.push(retention_time);
    }

    debug!("Read {} MS1 scans, skipped {} MSn scans", peaks.len(), skipped);
    MsRun::new(peaks, Array1::from_vec(times))
}

fn flatten_scans<'a>(scans: &'a [RawScan], out: &mut Vec<&'a RawScan>) {
    for scan in scans {
        out.push(scan);
        flatten_scans(&scan.scans, out);
    }
}

/// `PT12.5S` -> `12.5`
fn parse_retention_time(value: &str) -> anyhow::Result<f64> {
    let seconds = value
        .trim()
        .trim_start_matches('P')
        .trim_start_matches('T')
        .strip_suffix('S')
        .ok_or_else(|| anyhow!("Retention time '{}' is not a duration in seconds", value))?;
    seconds
        .parse::<f64>()
        .with_context(|| format!("Retention time '{}' is not a number", value))
}

fn decode_peaks(raw: &RawPeaks) -> anyhow::Result<Array2<f64>> {
    match raw.compression_type.as_deref() {
        None | Some("none") => {}
        Some(other) => bail!("Unsupported peak compression '{}'", other),
    }
    match raw.byte_order.as_deref() {
        None | Some("network") => {}
        Some(other) => bail!("Unsupported byte order '{}'", other),
    }

    let encoded: String = raw.data.split_whitespace().collect();
    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .context("Peak list is not valid base64")?;

    let pair_bytes = match raw.precision {
        32 | 64 => 2 * raw.precision as usize / 8,
        other => bail!("Unsupported peak precision {}", other),
    };
    if bytes.len() % pair_bytes != 0 {
        bail!(
            "Peak list holds {} bytes, not a whole number of {}-bit pairs",
            bytes.len(),
            raw.precision
        );
    }

    let values: Vec<f64> = match raw.precision {
        32 => bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64)
            .collect(),
        _ => bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buffer = [0u8; 8];
                buffer.copy_from_slice(chunk);
                f64::from_be_bytes(buffer)
            })
            .collect(),
    };

    let n_peaks = values.len() / 2;
    Ok(Array2::from_shape_vec((n_peaks, 2), values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::{compute_roi, MzTolerance, RoiParams};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn encode_f32(pairs: &[(f32, f32)]) -> String {
        let bytes: Vec<u8> = pairs
            .iter()
            .flat_map(|(mz, intensity)| {
                mz.to_be_bytes()
                    .into_iter()
                    .chain(intensity.to_be_bytes())
            })
            .collect();
        STANDARD.encode(bytes)
    }

    fn encode_f64(pairs: &[(f64, f64)]) -> String {
        let bytes: Vec<u8> = pairs
            .iter()
            .flat_map(|(mz, intensity)| {
                mz.to_be_bytes()
                    .into_iter()
                    .chain(intensity.to_be_bytes())
            })
            .collect();
        STANDARD.encode(bytes)
    }

    fn fixture() -> String {
        let first = encode_f32(&[(100.5, 1000.0), (250.25, 20.0)]);
        let fragment = encode_f32(&[(55.0, 10.0)]);
        let second = encode_f64(&[(100.5, 1500.0)]);
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<mzXML xmlns="http://sashimi.sourceforge.net/schema_revision/mzXML_3.2">
  <msRun scanCount="4" startTime="PT0.5S" endTime="PT2S">
    <parentFile fileName="sample.raw" fileType="RAWData" fileSha1="0"/>
    <dataProcessing centroided="1">
      <software type="conversion" name="test" version="1"/>
    </dataProcessing>
    <scan num="1" msLevel="1" peaksCount="2" polarity="+" retentionTime="PT0.5S">
      <peaks precision="32" byteOrder="network" pairOrder="m/z-int">{first}</peaks>
      <scan num="2" msLevel="2" peaksCount="1" retentionTime="PT0.7S">
        <precursorMz precursorIntensity="1000">100.5</precursorMz>
        <peaks precision="32" byteOrder="network" pairOrder="m/z-int">{fragment}</peaks>
      </scan>
    </scan>
    <scan num="3" msLevel="1" peaksCount="0" retentionTime="PT1.25S">
      <peaks precision="32" byteOrder="network" pairOrder="m/z-int"></peaks>
    </scan>
    <scan num="4" msLevel="1" peaksCount="1" retentionTime="PT2S">
      <peaks precision="64" byteOrder="network" pairOrder="m/z-int">{second}</peaks>
    </scan>
  </msRun>
</mzXML>
"#
        )
    }

    #[test]
    fn test_parse_keeps_ms1_scans() -> anyhow::Result<()> {
        let run = parse_mzxml(&fixture())?;

        assert_eq!(run.n_scans(), 3);
        assert_eq!(run.times, array![0.5, 1.25, 2.0]);
        assert_eq!(run.peaks[0], array![[100.5, 1000.0], [250.25, 20.0]]);
        assert_eq!(run.peaks[1].dim(), (0, 2));
        assert_eq!(run.peaks[2], array![[100.5, 1500.0]]);
        assert_eq!(run.tic(), array![1020.0, 0.0, 1500.0]);
        assert!(run.name.is_empty());
        Ok(())
    }

    #[test]
    fn test_parsed_run_feeds_roi_search() -> anyhow::Result<()> {
        let run = parse_mzxml(&fixture())?;
        let params = RoiParams {
            threshold: 100.0,
            mz_error: MzTolerance::Ppm(10.0),
            ..Default::default()
        };
        let result = compute_roi(&[run], &params)?;

        assert_eq!(result.mzroi.len(), 1);
        assert_abs_diff_eq!(result.mzroi[0], 100.5, epsilon = 1e-9);
        assert_eq!(result.msroi, array![[1000.0], [0.0], [1500.0]]);
        Ok(())
    }

    #[test]
    fn test_load_from_file() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join(format!("roimcr_io_{}.mzXML", std::process::id()));
        fs::write(&path, fixture())?;
        let loaded = load_mzxml(&path);
        fs::remove_file(&path)?;

        let run = loaded?;
        assert_eq!(run.name, format!("roimcr_io_{}", std::process::id()));
        assert_eq!(run.n_scans(), 3);

        assert!(load_mzxml(std::env::temp_dir().join("roimcr_missing.mzXML")).is_err());
        Ok(())
    }

    #[test]
    fn test_retention_time() {
        assert_eq!(parse_retention_time("PT12.5S").unwrap(), 12.5);
        assert_eq!(parse_retention_time(" PT3S ").unwrap(), 3.0);
        assert!(parse_retention_time("PT1M30S").is_err());
        assert!(parse_retention_time("12.5").is_err());
    }

    fn single_scan(attributes: &str, peaks: &str) -> String {
        format!(
            r#"<mzXML><msRun><scan num="1" msLevel="1" {attributes}><peaks {peaks}</peaks></scan></msRun></mzXML>"#
        )
    }

    #[test]
    fn test_invalid_documents() {
        let data = encode_f32(&[(100.0, 10.0)]);

        assert!(parse_mzxml("<mzXML><msRun>").is_err());
        assert!(parse_mzxml(&single_scan(r#"retentionTime="PT1S""#, r#"precision="32">@@@"#)).is_err());
        assert!(parse_mzxml(&single_scan("", &format!(r#"precision="32">{data}"#))).is_err());
        assert!(parse_mzxml(&single_scan(
            r#"retentionTime="PT1S""#,
            &format!(r#"precision="32" compressionType="zlib">{data}"#)
        ))
        .is_err());
        assert!(parse_mzxml(&single_scan(
            r#"retentionTime="PT1S""#,
            &format!(r#"precision="16">{data}"#)
        ))
        .is_err());
        // Three bytes cannot hold a 32-bit pair.
        assert!(parse_mzxml(&single_scan(
            r#"retentionTime="PT1S""#,
            &format!(r#"precision="32">{}"#, STANDARD.encode([1u8, 2, 3]))
        ))
        .is_err());

        let run = parse_mzxml(&single_scan(
            r#"retentionTime="PT1S""#,
            &format!(r#"precision="32">{data}"#),
        ))
        .unwrap();
        assert_eq!(run.peaks[0], array![[100.0, 10.0]]);
    }
}
