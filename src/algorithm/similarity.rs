use std::collections::BTreeMap;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::data::spectrum::MassSpectrum;
use crate::error::{ChromalignError, Result};

/// Configuration for the spectral similarity score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityParameters {
    /// Mass window (inclusive) the comparison is restricted to, in Da.
    pub mass_window: (f64, f64),
    /// Peaks below this percentage of the base peak are discarded.
    pub baseline_threshold: f64,
}

impl Default for SimilarityParameters {
    fn default() -> Self {
        SimilarityParameters {
            mass_window: (45.0, 500.0),
            baseline_threshold: 1.0,
        }
    }
}

impl SimilarityParameters {
    pub fn new(mass_window: (f64, f64), baseline_threshold: f64) -> Result<Self> {
        if mass_window.0 >= mass_window.1 {
            return Err(ChromalignError::invalid_parameter(
                "mass_window",
                format!(
                    "window start {} must be below window end {}",
                    mass_window.0, mass_window.1
                ),
            ));
        }
        if !(0.0..100.0).contains(&baseline_threshold) {
            return Err(ChromalignError::invalid_parameter(
                "baseline_threshold",
                format!("must be a percentage in [0, 100), got {}", baseline_threshold),
            ));
        }
        Ok(SimilarityParameters {
            mass_window,
            baseline_threshold,
        })
    }
}

/// Bins a spectrum at unit mass inside the configured window and normalizes
/// the intensities to percent of the base peak, dropping peaks below the
/// baseline threshold. Returns an empty map when nothing survives.
fn binned_intensities(spectrum: &MassSpectrum, params: &SimilarityParameters) -> BTreeMap<i64, f64> {
    let (low, high) = params.mass_window;
    let mut bins: BTreeMap<i64, f64> = BTreeMap::new();

    for (mass, intensity) in spectrum.mass.iter().zip(spectrum.intensity.iter()) {
        if *mass < low || *mass > high {
            continue;
        }
        let bin = mass.round() as i64;
        let entry = bins.entry(bin).or_insert(0.0);
        if *intensity > *entry {
            *entry = *intensity;
        }
    }

    let base = bins.values().cloned().fold(0.0_f64, f64::max);
    if base <= 0.0 {
        return BTreeMap::new();
    }
    bins.iter()
        .map(|(&bin, &intensity)| (bin, intensity / base * 100.0))
        .filter(|(_, intensity)| *intensity >= params.baseline_threshold)
        .collect()
}

fn cosine(u: &DVector<f64>, v: &DVector<f64>) -> f64 {
    let norm = u.norm() * v.norm();
    if norm == 0.0 {
        0.0
    } else {
        u.dot(v) / norm
    }
}

/// Computes the (match, reverse match) similarity for a pair of spectra.
///
/// Both spectra are binned at unit mass within the configured window. The
/// match score is the cosine of the two aligned intensity vectors over the
/// union of occupied bins; the reverse match restricts the comparison to
/// bins where the bottom (library) spectrum has signal. Scores are in [0, 1].
///
/// # Examples
///
/// ```rust
/// # use chromalign::algorithm::similarity::{spectrum_similarity, SimilarityParameters};
/// # use chromalign::data::spectrum::MassSpectrum;
/// let spectrum = MassSpectrum::new(vec![46.0, 76.0], vec![999.0, 312.0]).unwrap();
/// let (m, rm) = spectrum_similarity(&spectrum, &spectrum, &SimilarityParameters::default());
/// assert!((m - 1.0).abs() < 1e-12);
/// assert!((rm - 1.0).abs() < 1e-12);
/// ```
pub fn spectrum_similarity(
    top: &MassSpectrum,
    bottom: &MassSpectrum,
    params: &SimilarityParameters,
) -> (f64, f64) {
    let top_bins = binned_intensities(top, params);
    let bottom_bins = binned_intensities(bottom, params);

    let mut bins: Vec<i64> = top_bins.keys().chain(bottom_bins.keys()).cloned().collect();
    bins.sort_unstable();
    bins.dedup();

    if bins.is_empty() {
        return (0.0, 0.0);
    }

    let u = DVector::from_iterator(
        bins.len(),
        bins.iter().map(|bin| top_bins.get(bin).cloned().unwrap_or(0.0)),
    );
    let v = DVector::from_iterator(
        bins.len(),
        bins.iter().map(|bin| bottom_bins.get(bin).cloned().unwrap_or(0.0)),
    );

    let match_score = cosine(&u, &v);

    // Reverse match: only rows where the bottom spectrum has signal.
    let shared: Vec<usize> = (0..bins.len()).filter(|&i| v[i] > 0.0).collect();
    let u_shared = DVector::from_iterator(shared.len(), shared.iter().map(|&i| u[i]));
    let v_shared = DVector::from_iterator(shared.len(), shared.iter().map(|&i| v[i]));
    let reverse_score = cosine(&u_shared, &v_shared);

    (match_score, reverse_score)
}

/// Performs a mass spectrum similarity calculation for two optional spectra.
///
/// Propagates absence: if either spectrum is `None`, returns `None`.
/// Otherwise returns the match score rescaled onto the 0-1000 scale used by
/// library match factors.
pub fn ms_comparison(
    top: Option<&MassSpectrum>,
    bottom: Option<&MassSpectrum>,
    params: &SimilarityParameters,
) -> Option<f64> {
    match (top, bottom) {
        (Some(top), Some(bottom)) => {
            let (match_score, _) = spectrum_similarity(top, bottom, params);
            Some(match_score * 1000.0)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(mass: Vec<f64>, intensity: Vec<f64>) -> MassSpectrum {
        MassSpectrum::new(mass, intensity).unwrap()
    }

    #[test]
    fn test_identical_spectra_score_1000() {
        let ms = spectrum(vec![46.0, 76.0, 207.0], vec![999.0, 312.0, 45.0]);
        let score = ms_comparison(Some(&ms), Some(&ms), &SimilarityParameters::default()).unwrap();
        assert!((score - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_none_propagates() {
        let ms = spectrum(vec![46.0], vec![999.0]);
        let params = SimilarityParameters::default();
        assert!(ms_comparison(None, Some(&ms), &params).is_none());
        assert!(ms_comparison(Some(&ms), None, &params).is_none());
        assert!(ms_comparison(None, None, &params).is_none());
    }

    #[test]
    fn test_match_score_is_symmetric() {
        let a = spectrum(vec![46.0, 76.0, 120.0], vec![999.0, 312.0, 100.0]);
        let b = spectrum(vec![46.0, 76.0, 150.0], vec![500.0, 700.0, 80.0]);
        let params = SimilarityParameters::default();
        let ab = ms_comparison(Some(&a), Some(&b), &params).unwrap();
        let ba = ms_comparison(Some(&b), Some(&a), &params).unwrap();
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_spectra_score_zero() {
        let a = spectrum(vec![46.0, 76.0], vec![999.0, 312.0]);
        let b = spectrum(vec![120.0, 150.0], vec![500.0, 700.0]);
        let score = ms_comparison(Some(&a), Some(&b), &SimilarityParameters::default()).unwrap();
        assert!(score.abs() < 1e-9);
    }

    #[test]
    fn test_mass_window_excludes_peaks() {
        // The two spectra agree only on a mass outside the window.
        let a = spectrum(vec![30.0, 46.0], vec![999.0, 500.0]);
        let b = spectrum(vec![30.0, 76.0], vec![999.0, 500.0]);
        let score = ms_comparison(Some(&a), Some(&b), &SimilarityParameters::default()).unwrap();
        assert!(score.abs() < 1e-9);
    }

    #[test]
    fn test_baseline_threshold_drops_noise() {
        // The 0.5 % peak at 76 Da is below the 1 % baseline threshold.
        let a = spectrum(vec![46.0, 76.0], vec![1000.0, 5.0]);
        let b = spectrum(vec![76.0], vec![800.0]);
        let score = ms_comparison(Some(&a), Some(&b), &SimilarityParameters::default()).unwrap();
        assert!(score.abs() < 1e-9);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(SimilarityParameters::new((500.0, 45.0), 1.0).is_err());
        assert!(SimilarityParameters::new((45.0, 500.0), 150.0).is_err());
    }

    #[test]
    fn test_reverse_match_ignores_top_only_peaks() {
        // Top has an extra peak the library spectrum lacks; the reverse
        // match discounts it while the forward match is penalized.
        let top = spectrum(vec![46.0, 76.0, 120.0], vec![999.0, 500.0, 400.0]);
        let bottom = spectrum(vec![46.0, 76.0], vec![999.0, 500.0]);
        let (m, rm) = spectrum_similarity(&top, &bottom, &SimilarityParameters::default());
        assert!(rm > m);
        assert!((rm - 1.0).abs() < 1e-9);
    }
}
