use itertools::Itertools;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::algorithm::alignment::{align_runs, AlignmentParameters, AlignmentResult};
use crate::algorithm::consolidate::consolidate_columns;
use crate::algorithm::similarity::{ms_comparison, SimilarityParameters};
use crate::data::consolidated::{ConsolidatedPeak, MsComparison, PairScore};
use crate::data::peak::Repeat;
use crate::data::project::Project;
use crate::data::spectrum::MassSpectrum;
use crate::error::Result;

type NamedSpectrum = (String, Option<MassSpectrum>);

/// Computes the pairwise mass spectral comparison table for a set of spectra
/// keyed by run identity.
///
/// Every unordered pair is scored once; self-pairs are excluded. Pairs where
/// either spectrum is absent are omitted from the table. Pair evaluation is
/// pure and independent, so the parallel mode changes wall-clock time only:
/// the numeric output is identical to the sequential mode. A failing pair
/// evaluation aborts the whole computation rather than leaving a silently
/// incomplete table.
pub fn pairwise_ms_comparisons(
    spectra: &[NamedSpectrum],
    parallel: bool,
    params: &SimilarityParameters,
) -> MsComparison {
    let pairs: Vec<(&NamedSpectrum, &NamedSpectrum)> =
        spectra.iter().tuple_combinations().collect();

    let score_pair = |&(left, right): &(&NamedSpectrum, &NamedSpectrum)| -> Option<PairScore> {
        ms_comparison(left.1.as_ref(), right.1.as_ref(), params).map(|score| PairScore {
            left: left.0.clone(),
            right: right.0.clone(),
            score,
        })
    };

    let scores: Vec<Option<PairScore>> = if parallel {
        let pool = ThreadPoolBuilder::new().build().unwrap();
        pool.install(|| pairs.par_iter().map(score_pair).collect())
    } else {
        pairs.iter().map(score_pair).collect()
    };

    MsComparison::from_pairs(scores.into_iter().flatten().collect())
}

/// Aligns the repeats of one or more projects, together with optional
/// "unknown" projects that are matched against the same reference frame but
/// never count toward group acceptance.
///
/// Run columns follow the input order: every repeat of every reference
/// project, then every repeat of every unknown project.
pub fn align_projects(
    projects: &[&Project],
    unknowns: &[&Project],
    params: &AlignmentParameters,
) -> AlignmentResult {
    let reference: Vec<Repeat> = projects
        .iter()
        .flat_map(|p| p.repeats.iter().cloned())
        .collect();
    let unknown: Vec<Repeat> = unknowns
        .iter()
        .flat_map(|p| p.repeats.iter().cloned())
        .collect();
    align_runs(&reference, &unknown, params)
}

/// Builds per-project padded peak lists for a cross-project alignment.
///
/// For each project (references first, then unknowns) the returned list has
/// one entry per aligned group: a consolidated view of the project's peaks
/// in that group, or `None` when the project contributed nothing. Positions
/// are aligned 1:1 across all returned lists, so callers can zip them.
#[allow(clippy::type_complexity)]
pub fn get_padded_peak_lists(
    alignment: &AlignmentResult,
    projects: &[&Project],
    unknowns: &[&Project],
    params: &SimilarityParameters,
) -> Result<(
    Vec<Vec<Option<ConsolidatedPeak>>>,
    Vec<Vec<Option<ConsolidatedPeak>>>,
)> {
    let mut reference_lists = Vec::with_capacity(projects.len());
    let mut unknown_lists = Vec::with_capacity(unknowns.len());
    let run_names = alignment.run_names();

    let mut offset = 0;
    for project in projects.iter().chain(unknowns.iter()) {
        let columns = offset..offset + project.repeats.len();
        offset = columns.end;

        let mut padded = Vec::with_capacity(alignment.len());
        for group in alignment.groups() {
            padded.push(consolidate_columns(
                group,
                columns.clone(),
                run_names,
                params,
            )?);
        }
        if reference_lists.len() < projects.len() {
            reference_lists.push(padded);
        } else {
            unknown_lists.push(padded);
        }
    }

    Ok((reference_lists, unknown_lists))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::peak::Peak;

    fn spectrum(mass: Vec<f64>, intensity: Vec<f64>) -> MassSpectrum {
        MassSpectrum::new(mass, intensity).unwrap()
    }

    fn five_spectra() -> Vec<NamedSpectrum> {
        vec![
            ("Run1".to_string(), Some(spectrum(vec![46.0, 76.0], vec![999.0, 312.0]))),
            ("Run2".to_string(), Some(spectrum(vec![46.0, 76.0], vec![900.0, 400.0]))),
            ("Run3".to_string(), Some(spectrum(vec![46.0, 120.0], vec![700.0, 650.0]))),
            ("Run4".to_string(), Some(spectrum(vec![50.0, 150.0], vec![820.0, 270.0]))),
            ("Run5".to_string(), Some(spectrum(vec![46.0, 76.0, 150.0], vec![999.0, 312.0, 100.0]))),
        ]
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let spectra = five_spectra();
        let params = SimilarityParameters::default();
        let sequential = pairwise_ms_comparisons(&spectra, false, &params);
        let parallel = pairwise_ms_comparisons(&spectra, true, &params);
        // Bit-identical, not merely close.
        assert_eq!(sequential, parallel);
        // 5 choose 2 unordered pairs, no self-pairs.
        assert_eq!(sequential.len(), 10);
    }

    #[test]
    fn test_absent_spectra_are_omitted() {
        let spectra = vec![
            ("Run1".to_string(), Some(spectrum(vec![46.0], vec![999.0]))),
            ("Run2".to_string(), None),
            ("Run3".to_string(), Some(spectrum(vec![46.0], vec![500.0]))),
        ];
        let params = SimilarityParameters::default();
        let table = pairwise_ms_comparisons(&spectra, false, &params);
        assert_eq!(table.len(), 1);
        assert!(table.get("Run1", "Run3").is_some());
        assert!(table.get("Run1", "Run2").is_none());
    }

    #[test]
    fn test_align_projects_and_padded_lists() {
        let make_peak = |uid: &str, rt: f64| Peak::new(uid.to_string(), rt, 1e6, None, Vec::new());

        let project1 = Project::new(
            "Ammo A".to_string(),
            vec![
                Repeat::new("A1".to_string(), vec![make_peak("a", 100.0), make_peak("b", 300.0)]),
                Repeat::new("A2".to_string(), vec![make_peak("c", 100.8)]),
            ],
        );
        let unknown = Project::new(
            "Case sample".to_string(),
            vec![Repeat::new("U1".to_string(), vec![make_peak("u", 99.5)])],
        );

        let params = AlignmentParameters::default();
        let alignment = align_projects(&[&project1], &[&unknown], &params);
        assert_eq!(alignment.run_names(), &["A1", "A2", "U1"]);

        let (reference_lists, unknown_lists) = get_padded_peak_lists(
            &alignment,
            &[&project1],
            &[&unknown],
            &params.similarity,
        )
        .unwrap();
        assert_eq!(reference_lists.len(), 1);
        assert_eq!(unknown_lists.len(), 1);

        let padded_project = &reference_lists[0];
        let padded_unknown = &unknown_lists[0];
        assert_eq!(padded_project.len(), alignment.len());
        assert_eq!(padded_unknown.len(), alignment.len());

        // Zip aligned positions: the ~100s group has peaks from both, the
        // ~300s group only from the reference project.
        let paired: Vec<(bool, bool)> = padded_project
            .iter()
            .zip(padded_unknown.iter())
            .map(|(p, u)| (p.is_some(), u.is_some()))
            .collect();
        assert!(paired.contains(&(true, true)));
        assert!(paired.contains(&(true, false)));
    }
}
