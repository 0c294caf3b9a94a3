use serde::{Deserialize, Serialize};

use crate::algorithm::alignment::{align_runs, AlignmentParameters, AlignmentResult};
use crate::algorithm::consolidate::consolidate_alignment;
use crate::algorithm::filter::ConsolidatedPeakFilter;
use crate::data::consolidated::{ConsolidatedPeak, MsComparison};
use crate::data::peak::Repeat;
use crate::error::Result;

/// A set of repeated measurements of one sample, with the derived alignment
/// and consolidation results.
///
/// `alignment` and `consolidated_peaks` are derived fields: they start empty
/// and are populated by [`Project::align`] and [`Project::consolidate`], but
/// callers may also set them directly (e.g. when loading saved results).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    /// The individual runs, in acquisition order. The alignment tie-break
    /// depends on this order, so it must be kept stable.
    pub repeats: Vec<Repeat>,
    pub alignment: Option<AlignmentResult>,
    pub consolidated_peaks: Option<Vec<ConsolidatedPeak>>,
}

impl Project {
    pub fn new(name: String, repeats: Vec<Repeat>) -> Self {
        Project {
            name,
            repeats,
            alignment: None,
            consolidated_peaks: None,
        }
    }

    /// Aligns the project's repeats, reusing a previously computed (or
    /// externally supplied) alignment when present.
    pub fn align(&mut self, params: &AlignmentParameters) -> &AlignmentResult {
        self.alignment
            .get_or_insert_with(|| align_runs(&self.repeats, &[], params))
    }

    /// Aligns, consolidates and filters the project's peaks.
    ///
    /// Stores the filtered consolidated peaks on the project and returns the
    /// per-peak pairwise mass spectral comparison tables (one per
    /// consolidated peak, before filtering) for quality control.
    pub fn consolidate(
        &mut self,
        params: &AlignmentParameters,
        filter: &ConsolidatedPeakFilter,
    ) -> Result<Vec<MsComparison>> {
        let alignment = self.align(params).clone();
        let peaks = consolidate_alignment(&alignment, false, &params.similarity)?;
        let comparisons: Vec<MsComparison> =
            peaks.iter().map(|p| p.ms_comparison.clone()).collect();
        self.consolidated_peaks = Some(filter.filter_peaks(&peaks));
        Ok(comparisons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::consolidated::META_PEAK_NUMBER;
    use crate::data::peak::{CandidateHit, Peak};
    use crate::data::spectrum::MassSpectrum;

    fn hit(name: &str, mf: f64, number: u32) -> CandidateHit {
        CandidateHit::new(name.to_string(), "---".to_string(), mf, mf + 5.0, number, None)
    }

    fn peak(uid: &str, rt: f64, hits: Vec<CandidateHit>) -> Peak {
        let spectrum = MassSpectrum::new(vec![46.0, 76.0], vec![999.0, 312.0]).unwrap();
        Peak::new(uid.to_string(), rt, 1e6, Some(spectrum), hits)
    }

    fn example_project() -> Project {
        Project::new(
            "Eley Contact".to_string(),
            vec![
                Repeat::new(
                    "Run1".to_string(),
                    vec![
                        peak("a", 100.0, vec![hit("Nitroglycerin", 900.0, 1)]),
                        peak("b", 300.0, vec![hit("Glycerol", 500.0, 1)]),
                    ],
                ),
                Repeat::new(
                    "Run2".to_string(),
                    vec![peak("c", 101.0, vec![hit("Nitroglycerin", 910.0, 1)])],
                ),
            ],
        )
    }

    #[test]
    fn test_align_populates_derived_field() {
        let mut project = example_project();
        assert!(project.alignment.is_none());
        let params = AlignmentParameters::default();
        assert_eq!(project.align(&params).len(), 2);
        assert!(project.alignment.is_some());
    }

    #[test]
    fn test_consolidate_end_to_end() {
        let mut project = example_project();
        let params = AlignmentParameters::default();
        let filter = ConsolidatedPeakFilter::new(Vec::new(), 600.0, 1, false).unwrap();

        let comparisons = project.consolidate(&params, &filter).unwrap();
        assert_eq!(comparisons.len(), 2);

        let peaks = project.consolidated_peaks.as_ref().unwrap();
        assert_eq!(peaks.len(), 2);

        let first = &peaks[0];
        assert_eq!(first.meta[META_PEAK_NUMBER], 0);
        assert_eq!(first.hits.len(), 1);
        assert_eq!(first.hits[0].name, "Nitroglycerin");
        assert!((first.hits[0].match_factor() - 905.0).abs() < 1e-9);

        // Glycerol falls below the 600 match factor threshold.
        assert!(peaks[1].hits.is_empty());

        // The identical spectra of the two contributing runs give a full
        // comparison score in the QC table.
        let qc = &comparisons[0];
        assert!((qc.get("Run1", "Run2").unwrap() - 1000.0).abs() < 1e-9);
    }
}
