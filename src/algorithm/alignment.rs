use std::cmp::Reverse;
use std::ops::Range;

use log::debug;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::algorithm::similarity::{spectrum_similarity, SimilarityParameters};
use crate::data::peak::{Peak, Repeat};
use crate::error::{ChromalignError, Result};
use crate::utility::mean;

/// Tunable knobs for cross-run peak alignment.
///
/// The retention-time tolerance and the spectral acceptance cutoff are
/// instrument and method dependent; validate the values against reference
/// data for the method in use rather than relying on the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentParameters {
    /// Base retention-time tolerance for matching peaks into a group, in
    /// seconds.
    pub rt_modulation: f64,
    /// Widens the effective retention-time window by this fraction; larger
    /// values bias toward fewer, wider groups.
    pub gap_penalty: f64,
    /// Minimum number of reference runs a group must appear in.
    pub min_peaks: usize,
    /// When set, only the top `n` groups ranked by prevalence then total
    /// area are retained.
    pub top_n_peaks: Option<usize>,
    /// Groups whose total reference area falls below this are dropped.
    pub min_peak_area: f64,
    /// Minimum mean spectral similarity (0-1000 scale) for a peak to join a
    /// group, applied only when both sides carry spectra.
    pub min_similarity: f64,
    /// Configuration for the spectral similarity score.
    pub similarity: SimilarityParameters,
}

impl Default for AlignmentParameters {
    fn default() -> Self {
        AlignmentParameters {
            rt_modulation: 5.0,
            gap_penalty: 0.3,
            min_peaks: 1,
            top_n_peaks: None,
            min_peak_area: 0.0,
            min_similarity: 0.0,
            similarity: SimilarityParameters::default(),
        }
    }
}

impl AlignmentParameters {
    pub fn new(
        rt_modulation: f64,
        gap_penalty: f64,
        min_peaks: usize,
        top_n_peaks: Option<usize>,
        min_peak_area: f64,
        min_similarity: f64,
    ) -> Result<Self> {
        if rt_modulation <= 0.0 {
            return Err(ChromalignError::invalid_parameter(
                "rt_modulation",
                format!("must be a positive number of seconds, got {}", rt_modulation),
            ));
        }
        if gap_penalty < 0.0 {
            return Err(ChromalignError::invalid_parameter(
                "gap_penalty",
                format!("must be non-negative, got {}", gap_penalty),
            ));
        }
        if min_peak_area < 0.0 {
            return Err(ChromalignError::invalid_parameter(
                "min_peak_area",
                format!("must be non-negative, got {}", min_peak_area),
            ));
        }
        if !(0.0..=1000.0).contains(&min_similarity) {
            return Err(ChromalignError::invalid_parameter(
                "min_similarity",
                format!("must be on the 0-1000 match factor scale, got {}", min_similarity),
            ));
        }
        Ok(AlignmentParameters {
            rt_modulation,
            gap_penalty,
            min_peaks,
            top_n_peaks,
            min_peak_area,
            min_similarity,
            similarity: SimilarityParameters::default(),
        })
    }

    fn rt_window(&self) -> f64 {
        self.rt_modulation * (1.0 + self.gap_penalty)
    }
}

/// A cross-run cluster of peaks believed to represent the same compound.
///
/// One cell per run; a cell is `None` when the run contributed no peak.
/// Column order is identical to the input run order for every group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignedPeakGroup {
    pub peaks: Vec<Option<Peak>>,
}

impl AlignedPeakGroup {
    fn with_columns(n: usize) -> Self {
        AlignedPeakGroup {
            peaks: vec![None; n],
        }
    }

    /// Iterates over the runs that contributed a peak, with their column index.
    pub fn present(&self) -> impl Iterator<Item = (usize, &Peak)> {
        self.peaks
            .iter()
            .enumerate()
            .filter_map(|(column, peak)| peak.as_ref().map(|p| (column, p)))
    }

    /// The mean retention time of the contributing peaks.
    pub fn mean_rt(&self) -> f64 {
        let rts: Vec<f64> = self.present().map(|(_, p)| p.rt).collect();
        mean(&rts)
    }

    /// The number of contributing runs among the given columns.
    pub fn presence(&self, columns: Range<usize>) -> usize {
        columns.filter(|&c| self.peaks[c].is_some()).count()
    }

    /// The summed peak area over the given columns.
    pub fn total_area(&self, columns: Range<usize>) -> f64 {
        columns
            .filter_map(|c| self.peaks[c].as_ref())
            .map(|p| p.area)
            .sum()
    }
}

/// The product of cross-run peak alignment: an ordered list of aligned peak
/// groups over a fixed set of run columns (reference runs first, then
/// unknowns, both in input order).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    run_names: Vec<String>,
    n_reference_runs: usize,
    groups: Vec<AlignedPeakGroup>,
}

impl AlignmentResult {
    /// The run names, in column order.
    pub fn run_names(&self) -> &[String] {
        &self.run_names
    }

    /// The number of leading columns that belong to reference runs.
    pub fn n_reference_runs(&self) -> usize {
        self.n_reference_runs
    }

    pub fn groups(&self) -> &[AlignedPeakGroup] {
        &self.groups
    }

    /// The number of aligned peak groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The padded peak list for one run: one entry per aligned group, `None`
    /// where the group has no peak from this run. Positions are aligned 1:1
    /// across every run, unknowns included.
    pub fn padded_peaks(&self, run: usize) -> Vec<Option<&Peak>> {
        self.groups.iter().map(|g| g.peaks[run].as_ref()).collect()
    }
}

/// Matches corresponding peaks across runs into aligned peak groups.
///
/// Runs are consumed in input order and peaks in list order, so the grouping
/// is deterministic for a fixed input order; reordering the runs may
/// legitimately change the result. Unknown runs are aligned against the same
/// reference frame but never count toward group acceptance.
///
/// A run with no peaks yields an all-absent column; no peaks anywhere yields
/// an empty result.
pub fn align_runs(
    reference_runs: &[Repeat],
    unknown_runs: &[Repeat],
    params: &AlignmentParameters,
) -> AlignmentResult {
    let n_reference = reference_runs.len();
    let runs: Vec<&Repeat> = reference_runs.iter().chain(unknown_runs.iter()).collect();
    let n_runs = runs.len();

    let mut groups: Vec<AlignedPeakGroup> = Vec::new();

    for (column, run) in runs.iter().enumerate() {
        for peak in &run.peaks {
            match best_group(&groups, column, peak, params) {
                Some(index) => {
                    debug!(
                        "run '{}': peak {} at {:.2}s joins group {} (mean rt {:.2}s)",
                        run.name,
                        peak.uid,
                        peak.rt,
                        index,
                        groups[index].mean_rt()
                    );
                    groups[index].peaks[column] = Some(peak.clone());
                }
                None => {
                    let mut group = AlignedPeakGroup::with_columns(n_runs);
                    group.peaks[column] = Some(peak.clone());
                    groups.push(group);
                }
            }
        }
    }

    retain_accepted(&mut groups, n_reference, params);
    groups.sort_by_key(|g| OrderedFloat(g.mean_rt()));

    AlignmentResult {
        run_names: runs.iter().map(|r| r.name.clone()).collect(),
        n_reference_runs: n_reference,
        groups,
    }
}

/// Finds the group the peak should join, if any.
///
/// A group qualifies when its column for this run is free, the retention
/// time distance is within the effective window, and the spectral evidence
/// (when available on both sides) clears the acceptance cutoff. Among
/// qualifying groups the one with the highest proximity + similarity score
/// wins; ties go to the earliest-created group.
fn best_group(
    groups: &[AlignedPeakGroup],
    column: usize,
    peak: &Peak,
    params: &AlignmentParameters,
) -> Option<usize> {
    let window = params.rt_window();
    let mut best: Option<(usize, f64)> = None;

    for (index, group) in groups.iter().enumerate() {
        if group.peaks[column].is_some() {
            continue;
        }
        let distance = (peak.rt - group.mean_rt()).abs();
        if distance > window {
            continue;
        }
        let proximity = 1.0 - distance / window;

        let similarity = group_similarity(group, peak, &params.similarity);
        if let Some(similarity) = similarity {
            if similarity < params.min_similarity {
                continue;
            }
        }

        let score = proximity + similarity.unwrap_or(0.0) / 1000.0;
        // Strict comparison keeps the earliest-created group on ties.
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    best.map(|(index, _)| index)
}

/// Mean spectral similarity (0-1000) between a candidate peak and the
/// spectra already in the group, or `None` when no comparison is possible.
fn group_similarity(
    group: &AlignedPeakGroup,
    peak: &Peak,
    params: &SimilarityParameters,
) -> Option<f64> {
    let peak_spectrum = peak.spectrum.as_ref()?;
    let scores: Vec<f64> = group
        .present()
        .filter_map(|(_, member)| member.spectrum.as_ref())
        .map(|spectrum| spectrum_similarity(peak_spectrum, spectrum, params).0 * 1000.0)
        .collect();
    if scores.is_empty() {
        None
    } else {
        Some(mean(&scores))
    }
}

/// Applies the group-level acceptance constraints: minimum presence over the
/// reference runs, minimum total reference area, and the optional cap on the
/// number of retained groups.
fn retain_accepted(
    groups: &mut Vec<AlignedPeakGroup>,
    n_reference: usize,
    params: &AlignmentParameters,
) {
    groups.retain(|g| {
        g.presence(0..n_reference) >= params.min_peaks
            && g.total_area(0..n_reference) >= params.min_peak_area
    });

    if let Some(top_n) = params.top_n_peaks {
        if groups.len() > top_n {
            let mut order: Vec<usize> = (0..groups.len()).collect();
            order.sort_by_key(|&i| {
                (
                    Reverse(groups[i].presence(0..n_reference)),
                    Reverse(OrderedFloat(groups[i].total_area(0..n_reference))),
                )
            });
            order.truncate(top_n);
            order.sort_unstable();

            let mut index = 0;
            groups.retain(|_| {
                let keep = order.binary_search(&index).is_ok();
                index += 1;
                keep
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(uid: &str, rt: f64, area: f64) -> Peak {
        Peak::new(uid.to_string(), rt, area, None, Vec::new())
    }

    fn repeat(name: &str, peaks: Vec<Peak>) -> Repeat {
        Repeat::new(name.to_string(), peaks)
    }

    #[test]
    fn test_align_empty_runs() {
        let runs = vec![repeat("Run1", Vec::new()), repeat("Run2", Vec::new())];
        let result = align_runs(&runs, &[], &AlignmentParameters::default());
        assert!(result.is_empty());
        assert_eq!(result.run_names(), &["Run1", "Run2"]);
    }

    #[test]
    fn test_align_matching_peaks() {
        let runs = vec![
            repeat("Run1", vec![peak("a", 100.0, 1e6), peak("b", 300.0, 2e6)]),
            repeat("Run2", vec![peak("c", 101.5, 1.1e6), peak("d", 299.0, 1.9e6)]),
        ];
        let result = align_runs(&runs, &[], &AlignmentParameters::default());

        assert_eq!(result.len(), 2);
        let first = &result.groups()[0];
        assert_eq!(first.peaks.len(), 2);
        assert_eq!(first.peaks[0].as_ref().unwrap().uid, "a");
        assert_eq!(first.peaks[1].as_ref().unwrap().uid, "c");
        // Groups are ordered by mean retention time.
        assert!(result.groups()[0].mean_rt() < result.groups()[1].mean_rt());
    }

    #[test]
    fn test_unmatched_peaks_seed_new_groups() {
        let runs = vec![
            repeat("Run1", vec![peak("a", 100.0, 1e6)]),
            repeat("Run2", vec![peak("b", 500.0, 1e6)]),
        ];
        let result = align_runs(&runs, &[], &AlignmentParameters::default());
        assert_eq!(result.len(), 2);
        assert_eq!(result.groups()[0].presence(0..2), 1);
        assert_eq!(result.groups()[1].presence(0..2), 1);
    }

    #[test]
    fn test_zero_peak_run_yields_absent_column() {
        let runs = vec![
            repeat("Run1", vec![peak("a", 100.0, 1e6)]),
            repeat("Run2", Vec::new()),
        ];
        let result = align_runs(&runs, &[], &AlignmentParameters::default());
        assert_eq!(result.len(), 1);
        assert!(result.groups()[0].peaks[1].is_none());
        assert_eq!(result.padded_peaks(1), vec![None]);
    }

    #[test]
    fn test_one_peak_per_run_per_group() {
        // Two peaks from the same run close in rt must not share a group.
        let runs = vec![repeat("Run1", vec![peak("a", 100.0, 1e6), peak("b", 100.5, 1e6)])];
        let result = align_runs(&runs, &[], &AlignmentParameters::default());
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_tie_break_is_first_seen() {
        // Two groups at exactly the same distance from the new peak; the
        // earlier-created group (from peak "a") must win.
        let params = AlignmentParameters::new(5.0, 0.0, 1, None, 0.0, 0.0).unwrap();
        let runs = vec![
            repeat("Run1", vec![peak("a", 98.0, 1e6), peak("b", 102.0, 1e6)]),
            repeat("Run2", vec![peak("c", 100.0, 1e6)]),
        ];
        let result = align_runs(&runs, &[], &params);
        assert_eq!(result.len(), 2);
        let joined = result
            .groups()
            .iter()
            .find(|g| g.peaks[1].is_some())
            .unwrap();
        assert_eq!(joined.peaks[0].as_ref().unwrap().uid, "a");
    }

    #[test]
    fn test_min_peaks_drops_sparse_groups() {
        let params = AlignmentParameters::new(5.0, 0.0, 2, None, 0.0, 0.0).unwrap();
        let runs = vec![
            repeat("Run1", vec![peak("a", 100.0, 1e6), peak("b", 300.0, 1e6)]),
            repeat("Run2", vec![peak("c", 101.0, 1e6)]),
        ];
        let result = align_runs(&runs, &[], &params);
        assert_eq!(result.len(), 1);
        assert_eq!(result.groups()[0].presence(0..2), 2);
    }

    #[test]
    fn test_min_peak_area_drops_small_groups() {
        let params = AlignmentParameters::new(5.0, 0.0, 1, None, 5e5, 0.0).unwrap();
        let runs = vec![repeat(
            "Run1",
            vec![peak("a", 100.0, 1e6), peak("b", 300.0, 1e3)],
        )];
        let result = align_runs(&runs, &[], &params);
        assert_eq!(result.len(), 1);
        assert_eq!(result.groups()[0].peaks[0].as_ref().unwrap().uid, "a");
    }

    #[test]
    fn test_top_n_peaks_ranks_by_presence_then_area() {
        let params = AlignmentParameters::new(5.0, 0.0, 1, Some(2), 0.0, 0.0).unwrap();
        let runs = vec![
            repeat(
                "Run1",
                vec![peak("a", 100.0, 1e6), peak("b", 300.0, 5e6), peak("c", 500.0, 1e3)],
            ),
            repeat("Run2", vec![peak("d", 100.5, 1e6)]),
        ];
        let result = align_runs(&runs, &[], &params);
        assert_eq!(result.len(), 2);
        // The group at 500s (singleton, tiny area) is the one dropped.
        assert!(result.groups().iter().all(|g| g.mean_rt() < 400.0));
    }

    #[test]
    fn test_unknown_runs_do_not_count_toward_acceptance() {
        let params = AlignmentParameters::new(5.0, 0.0, 2, None, 0.0, 0.0).unwrap();
        let reference = vec![
            repeat("Ref1", vec![peak("a", 100.0, 1e6)]),
            repeat("Ref2", vec![peak("b", 101.0, 1e6)]),
        ];
        // The unknown contributes a peak at 300s which no reference run has.
        let unknown = vec![repeat("Unknown", vec![peak("u", 300.0, 1e6), peak("v", 100.2, 1e6)])];
        let result = align_runs(&reference, &unknown, &params);

        assert_eq!(result.len(), 1);
        assert_eq!(result.n_reference_runs(), 2);
        assert_eq!(result.run_names(), &["Ref1", "Ref2", "Unknown"]);
        // The unknown's matching peak still lands in the surviving group.
        assert_eq!(result.groups()[0].peaks[2].as_ref().unwrap().uid, "v");
    }

    #[test]
    fn test_padded_peaks_align_one_to_one() {
        let runs = vec![
            repeat("Run1", vec![peak("a", 100.0, 1e6), peak("b", 300.0, 1e6)]),
            repeat("Run2", vec![peak("c", 300.5, 1e6)]),
        ];
        let result = align_runs(&runs, &[], &AlignmentParameters::default());
        let run1 = result.padded_peaks(0);
        let run2 = result.padded_peaks(1);
        assert_eq!(run1.len(), result.len());
        assert_eq!(run2.len(), result.len());
        assert!(run1[0].is_some() && run2[0].is_none());
        assert!(run1[1].is_some() && run2[1].is_some());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(AlignmentParameters::new(0.0, 0.3, 1, None, 0.0, 0.0).is_err());
        assert!(AlignmentParameters::new(5.0, -1.0, 1, None, 0.0, 0.0).is_err());
        assert!(AlignmentParameters::new(5.0, 0.3, 1, None, -1.0, 0.0).is_err());
        assert!(AlignmentParameters::new(5.0, 0.3, 1, None, 0.0, 2000.0).is_err());
    }
}
