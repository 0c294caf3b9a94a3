use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde_json::json;

use crate::algorithm::alignment::{AlignedPeakGroup, AlignmentResult};
use crate::algorithm::comparison::pairwise_ms_comparisons;
use crate::algorithm::similarity::SimilarityParameters;
use crate::data::consolidated::{
    ConsolidatedPeak, ConsolidatedSearchResult, MsComparison, META_PEAK_NUMBER,
};
use crate::data::peak::{normalize_cas, Peak};
use crate::data::spectrum::MassSpectrum;
use crate::error::Result;

/// Merges the candidate hit lists of an aligned peak group into one
/// consolidated result per distinct candidate compound.
///
/// Candidates are unioned by name, with the CAS number as a secondary
/// disambiguator for name collisions. For each candidate and each
/// contributing peak, the peak's match factor, reverse match factor and hit
/// number are recorded when its hit list contains the candidate, and `None`
/// otherwise, so a compound absent from some runs is averaged over the runs
/// where it appeared rather than diluted by zeros.
///
/// The returned list is ordered by descending average match factor; every
/// candidate has at least one non-missing entry by construction.
pub fn consolidate_hits(group: &AlignedPeakGroup) -> Vec<ConsolidatedSearchResult> {
    let present: Vec<&Peak> = group.present().map(|(_, peak)| peak).collect();

    let mut candidates: Vec<(String, String)> = Vec::new();
    for peak in &present {
        for hit in &peak.hits {
            let key = (hit.name.clone(), normalize_cas(&hit.cas));
            if !candidates.contains(&key) {
                candidates.push(key);
            }
        }
    }

    let mut results: Vec<ConsolidatedSearchResult> = Vec::with_capacity(candidates.len());
    for (name, cas) in candidates {
        let mut mf_list = Vec::with_capacity(present.len());
        let mut rmf_list = Vec::with_capacity(present.len());
        let mut hit_numbers = Vec::with_capacity(present.len());
        let mut reference_data = None;

        for peak in &present {
            match peak
                .hits
                .iter()
                .find(|h| h.name == name && normalize_cas(&h.cas) == cas)
            {
                Some(hit) => {
                    mf_list.push(Some(hit.match_factor));
                    rmf_list.push(Some(hit.reverse_match_factor));
                    hit_numbers.push(Some(hit.hit_number));
                    // Convergent reference records across runs are assumed
                    // identical; the first non-null one is retained.
                    if reference_data.is_none() {
                        reference_data = hit.reference_data.clone();
                    }
                }
                None => {
                    mf_list.push(None);
                    rmf_list.push(None);
                    hit_numbers.push(None);
                }
            }
        }

        results.push(ConsolidatedSearchResult {
            name,
            cas,
            mf_list,
            rmf_list,
            hit_numbers,
            reference_data,
        });
    }

    // Stable sort: candidates with equal means keep first-seen order.
    results.sort_by_key(|r| Reverse(OrderedFloat(r.match_factor())));
    results
}

/// Builds one consolidated peak from an aligned peak group.
///
/// Retention times, areas and spectra are taken from present peaks only, so
/// absent runs contribute no entry and never bias the statistics. The
/// pairwise mass spectral comparison is computed locally over the group's
/// own spectra, keyed by run name. Returns `None` for an all-absent group.
///
/// Pass `minutes = true` when the upstream retention times are in minutes;
/// they are converted to seconds exactly once, at construction.
pub fn consolidate_peak(
    group: &AlignedPeakGroup,
    run_names: &[String],
    minutes: bool,
    params: &SimilarityParameters,
) -> Result<Option<ConsolidatedPeak>> {
    let present: Vec<(usize, &Peak)> = group.present().collect();
    if present.is_empty() {
        return Ok(None);
    }

    let rt_list: Vec<f64> = present.iter().map(|(_, p)| p.rt).collect();
    let area_list: Vec<f64> = present.iter().map(|(_, p)| p.area).collect();
    let ms_list: Vec<Option<MassSpectrum>> =
        present.iter().map(|(_, p)| p.spectrum.clone()).collect();

    let spectra: Vec<(String, Option<MassSpectrum>)> = present
        .iter()
        .map(|(column, p)| (run_names[*column].clone(), p.spectrum.clone()))
        .collect();
    let ms_comparison = pairwise_ms_comparisons(&spectra, false, params);

    let hits = consolidate_hits(group);

    let peak = ConsolidatedPeak::new(
        rt_list, area_list, ms_list, minutes, hits, ms_comparison, None,
    )?;
    Ok(Some(peak))
}

/// Builds consolidated peaks for every group of an alignment, numbering them
/// in order via the `peak_number` metadata key.
pub fn consolidate_alignment(
    alignment: &AlignmentResult,
    minutes: bool,
    params: &SimilarityParameters,
) -> Result<Vec<ConsolidatedPeak>> {
    let run_names = alignment.run_names();
    let mut peaks = Vec::with_capacity(alignment.len());
    for (number, group) in alignment.groups().iter().enumerate() {
        if let Some(mut peak) = consolidate_peak(group, run_names, minutes, params)? {
            peak.meta.insert(META_PEAK_NUMBER.to_string(), json!(number));
            peaks.push(peak);
        }
    }
    Ok(peaks)
}

/// Builds a consolidated view of a subset of a group's columns, for padded
/// per-project peak lists. Returns `None` when none of the selected columns
/// holds a peak.
pub fn consolidate_columns(
    group: &AlignedPeakGroup,
    columns: std::ops::Range<usize>,
    run_names: &[String],
    params: &SimilarityParameters,
) -> Result<Option<ConsolidatedPeak>> {
    let sub_group = AlignedPeakGroup {
        peaks: group.peaks[columns.clone()].to_vec(),
    };
    consolidate_peak(&sub_group, &run_names[columns], false, params)
}
