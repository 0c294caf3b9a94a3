use log::info;
use regex::{Regex, RegexBuilder};

use crate::data::consolidated::{ConsolidatedPeak, ConsolidatedSearchResult};
use crate::error::{ChromalignError, Result};

/// Per-peak diagnostic counts from a verbose filter pass.
///
/// A hit failing several conditions is counted once per failed condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterReport {
    /// Hits whose name matched none of the configured patterns.
    pub name_rejected: usize,
    /// Hits whose mean match factor fell below the minimum.
    pub match_factor_rejected: usize,
    /// Hits seen in fewer runs than the minimum appearance count.
    pub appearance_rejected: usize,
}

/// A declarative keep/drop predicate over a consolidated peak's hit list.
///
/// A hit is kept when its name matches at least one of the configured glob
/// patterns (case-insensitive; an empty pattern list matches everything),
/// its mean match factor is at least `min_match_factor`, and it appeared in
/// at least `min_appearances` runs. The [inverted](Self::inverted) filter
/// keeps exactly the complement set: for every peak, the two kept sets are
/// disjoint and their union is the full hit list.
///
/// Filtering never mutates the peaks it is given; it returns derived views.
#[derive(Clone, Debug)]
pub struct ConsolidatedPeakFilter {
    name_filter: Vec<String>,
    patterns: Vec<Regex>,
    min_match_factor: f64,
    min_appearances: usize,
    verbose: bool,
    invert: bool,
}

impl ConsolidatedPeakFilter {
    /// Constructs a new filter.
    ///
    /// # Arguments
    ///
    /// * `name_filter` - Glob patterns (`*` and `?` wildcards) the compound
    ///   name must match; empty means "match all".
    /// * `min_match_factor` - Minimum mean match factor, on the 0-999 scale.
    /// * `min_appearances` - Minimum number of runs the compound must have
    ///   appeared in.
    /// * `verbose` - Emit per-peak rejection diagnostics.
    pub fn new(
        name_filter: Vec<String>,
        min_match_factor: f64,
        min_appearances: usize,
        verbose: bool,
    ) -> Result<Self> {
        if !(0.0..=1000.0).contains(&min_match_factor) {
            return Err(ChromalignError::invalid_parameter(
                "min_match_factor",
                format!("must be on the 0-999 match factor scale, got {}", min_match_factor),
            ));
        }

        let patterns = name_filter
            .iter()
            .map(|glob| compile_glob(glob))
            .collect::<Result<Vec<Regex>>>()?;

        Ok(ConsolidatedPeakFilter {
            name_filter,
            patterns,
            min_match_factor,
            min_appearances,
            verbose,
            invert: false,
        })
    }

    /// Returns the logical complement of this filter: it keeps exactly the
    /// hits this filter drops, evaluated by the same three conditions.
    pub fn inverted(&self) -> Self {
        let mut filter = self.clone();
        filter.invert = !filter.invert;
        filter
    }

    pub fn name_filter(&self) -> &[String] {
        &self.name_filter
    }

    pub fn min_match_factor(&self) -> f64 {
        self.min_match_factor
    }

    pub fn min_appearances(&self) -> usize {
        self.min_appearances
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn name_matches(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(name))
    }

    fn base_keep(&self, hit: &ConsolidatedSearchResult) -> bool {
        self.name_matches(&hit.name)
            && hit.match_factor() >= self.min_match_factor
            && hit.len() >= self.min_appearances
    }

    /// Whether this filter keeps the given hit.
    pub fn keep(&self, hit: &ConsolidatedSearchResult) -> bool {
        self.base_keep(hit) != self.invert
    }

    /// Returns the kept subset of a consolidated peak's hit list.
    pub fn filter_hits(&self, peak: &ConsolidatedPeak) -> Vec<ConsolidatedSearchResult> {
        peak.hits.iter().filter(|h| self.keep(h)).cloned().collect()
    }

    /// Returns the kept hits together with per-condition rejection counts.
    ///
    /// The counts always describe the base conditions, so an inverted filter
    /// reports why its *kept* hits failed the base filter.
    pub fn filter_report(
        &self,
        peak: &ConsolidatedPeak,
    ) -> (Vec<ConsolidatedSearchResult>, FilterReport) {
        let mut report = FilterReport::default();
        for hit in &peak.hits {
            if !self.name_matches(&hit.name) {
                report.name_rejected += 1;
            }
            if hit.match_factor() < self.min_match_factor {
                report.match_factor_rejected += 1;
            }
            if hit.len() < self.min_appearances {
                report.appearance_rejected += 1;
            }
        }
        (self.filter_hits(peak), report)
    }

    /// Applies the filter across a list of consolidated peaks, returning
    /// derived copies whose hit lists hold only the kept hits.
    pub fn filter_peaks(&self, peaks: &[ConsolidatedPeak]) -> Vec<ConsolidatedPeak> {
        peaks
            .iter()
            .map(|peak| {
                let (hits, report) = self.filter_report(peak);
                if self.verbose {
                    info!(
                        "peak at {:.2}s: kept {} of {} hits (rejected: {} by name, {} by match factor, {} by appearances)",
                        peak.rt(),
                        hits.len(),
                        peak.hits.len(),
                        report.name_rejected,
                        report.match_factor_rejected,
                        report.appearance_rejected,
                    );
                }
                let mut filtered = peak.clone();
                filtered.hits = hits;
                filtered
            })
            .collect()
    }
}

/// Translates a glob pattern (`*`, `?` wildcards) into an anchored,
/// case-insensitive regular expression.
fn compile_glob(glob: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 2);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            ChromalignError::invalid_parameter("name_filter", format!("bad pattern '{}': {}", glob, e))
        })
}
