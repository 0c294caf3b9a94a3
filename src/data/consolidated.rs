use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::data::peak::{normalize_cas, ReferenceData};
use crate::data::spectrum::MassSpectrum;
use crate::error::{ChromalignError, Result};
use crate::utility::{mean, nan_mean, nan_std, std_dev};

/// Recognized `meta` key: ordinal index of the peak within its project.
pub const META_PEAK_NUMBER: &str = "peak_number";
/// Recognized `meta` key: whether the peak should be hidden from display.
pub const META_HIDDEN: &str = "hidden";

const PAIR_KEY_SEPARATOR: &str = " & ";

/// Pairwise mass spectral comparison score for two runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub left: String,
    pub right: String,
    pub score: f64,
}

/// Ordered table of pairwise mass spectral comparison scores, keyed by run
/// identity. Self-pairs are excluded; entry order follows insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MsComparison {
    pairs: Vec<PairScore>,
}

impl MsComparison {
    pub fn new() -> Self {
        MsComparison::default()
    }

    pub fn from_pairs(pairs: Vec<PairScore>) -> Self {
        MsComparison { pairs }
    }

    pub fn insert(&mut self, left: String, right: String, score: f64) {
        self.pairs.push(PairScore { left, right, score });
    }

    /// Looks up the score for an unordered pair of run names.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.pairs
            .iter()
            .find(|p| (p.left == a && p.right == b) || (p.left == b && p.right == a))
            .map(|p| p.score)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PairScore> {
        self.pairs.iter()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.pairs.iter().map(|p| p.score).collect()
    }

    /// Mean score, or 0.0 for an empty table.
    pub fn mean(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            mean(&self.scores())
        }
    }

    /// Population standard deviation of the scores, or 0.0 for an empty table.
    pub fn std_dev(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            std_dev(&self.scores())
        }
    }

    /// Returns a flat pair-to-score mapping with string keys.
    pub fn to_dict(&self) -> Value {
        let mut map = Map::new();
        for pair in &self.pairs {
            map.insert(
                format!("{}{}{}", pair.left, PAIR_KEY_SEPARATOR, pair.right),
                json!(pair.score),
            );
        }
        Value::Object(map)
    }

    pub fn from_dict(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or(ChromalignError::UnexpectedType {
            field: "ms_comparison",
            expected: "a mapping",
            found: value_kind(value),
        })?;
        let mut pairs = Vec::with_capacity(map.len());
        for (key, score) in map {
            let (left, right) =
                key.split_once(PAIR_KEY_SEPARATOR)
                    .ok_or(ChromalignError::UnexpectedType {
                        field: "ms_comparison",
                        expected: "keys of the form 'left & right'",
                        found: format!("\"{}\"", key),
                    })?;
            let score = score.as_f64().ok_or(ChromalignError::UnexpectedType {
                field: "ms_comparison",
                expected: "a number",
                found: value_kind(score),
            })?;
            pairs.push(PairScore {
                left: left.to_string(),
                right: right.to_string(),
                score,
            });
        }
        Ok(MsComparison { pairs })
    }
}

/// A candidate compound for an aligned peak group, merged from the search
/// results of the group's individual peaks.
///
/// The three value lists run in parallel, one slot per aligned peak; a slot
/// is `None` where the compound was not in that peak's hit list. Missing
/// slots are excluded from every derived statistic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedSearchResult {
    /// The name of the candidate compound.
    pub name: String,
    /// The CAS registry number of the compound, normalized.
    pub cas: String,
    /// Match factors for each aligned peak.
    pub mf_list: Vec<Option<f64>>,
    /// Reverse match factors for each aligned peak.
    pub rmf_list: Vec<Option<f64>>,
    /// Hit-list positions for each aligned peak; lower is better.
    pub hit_numbers: Vec<Option<u32>>,
    /// The reference library record for the compound, when retrieved.
    pub reference_data: Option<ReferenceData>,
}

impl ConsolidatedSearchResult {
    /// Constructs a new `ConsolidatedSearchResult`.
    ///
    /// # Errors
    ///
    /// Returns an error if the three value lists differ in length.
    pub fn new(
        name: String,
        cas: String,
        mf_list: Vec<Option<f64>>,
        rmf_list: Vec<Option<f64>>,
        hit_numbers: Vec<Option<u32>>,
        reference_data: Option<ReferenceData>,
    ) -> Result<Self> {
        if mf_list.len() != rmf_list.len() || mf_list.len() != hit_numbers.len() {
            return Err(ChromalignError::invalid_parameter(
                "mf_list",
                format!(
                    "mf_list, rmf_list and hit_numbers must have the same length ({}, {}, {})",
                    mf_list.len(),
                    rmf_list.len(),
                    hit_numbers.len()
                ),
            ));
        }
        Ok(ConsolidatedSearchResult {
            name,
            cas: normalize_cas(&cas),
            mf_list,
            rmf_list,
            hit_numbers,
            reference_data,
        })
    }

    /// The average match factor, excluding missing observations.
    pub fn match_factor(&self) -> f64 {
        nan_mean(&self.mf_list)
    }

    /// The population standard deviation of the match factors.
    pub fn match_factor_stdev(&self) -> f64 {
        nan_std(&self.mf_list)
    }

    /// The average reverse match factor, excluding missing observations.
    pub fn reverse_match_factor(&self) -> f64 {
        nan_mean(&self.rmf_list)
    }

    pub fn reverse_match_factor_stdev(&self) -> f64 {
        nan_std(&self.rmf_list)
    }

    /// The average hit number, excluding missing observations.
    pub fn average_hit_number(&self) -> f64 {
        nan_mean(&self.hit_number_list())
    }

    pub fn hit_number_stdev(&self) -> f64 {
        nan_std(&self.hit_number_list())
    }

    /// The number of aligned peaks whose hit list contained this compound.
    pub fn len(&self) -> usize {
        self.hit_numbers.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hit_number_list(&self) -> Vec<Option<f64>> {
        self.hit_numbers
            .iter()
            .map(|n| n.map(f64::from))
            .collect()
    }

    /// Returns a dictionary representation with JSON-compatible values only.
    ///
    /// Missing observations serialize as `null`, never as `0`.
    pub fn to_dict(&self) -> Value {
        json!({
            "name": self.name,
            "cas": self.cas,
            "mf_list": self.mf_list,
            "rmf_list": self.rmf_list,
            "hit_numbers": self.hit_numbers,
            "reference_data": self.reference_data.as_ref().map(|r| r.to_dict()),
        })
    }

    /// Constructs a `ConsolidatedSearchResult` from a dictionary.
    pub fn from_dict(value: &Value) -> Result<Self> {
        let map = as_object(value, "search result")?;
        Self::new(
            get_string(map, "name")?,
            get_string(map, "cas")?,
            get_opt_f64_list(map, "mf_list")?,
            get_opt_f64_list(map, "rmf_list")?,
            get_opt_u32_list(map, "hit_numbers")?,
            ReferenceData::from_value(map.get("reference_data"))?,
        )
    }
}

impl Display for ConsolidatedSearchResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Consolidated Search Result: {} mf={} n={}>",
            self.name,
            self.match_factor(),
            self.len()
        )
    }
}

/// A peak produced by consolidating the properties and search results of a
/// group of aligned peaks.
///
/// The retention time, area and spectrum lists each carry one entry per
/// contributing run; runs with no peak in the group contribute nothing.
/// Immutable after construction apart from the open `meta` mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedPeak {
    /// Retention times of the aligned peaks, in seconds.
    pub rt_list: Vec<f64>,
    /// Peak areas of the aligned peaks.
    pub area_list: Vec<f64>,
    /// Mass spectra of the aligned peaks.
    pub ms_list: Vec<Option<MassSpectrum>>,
    /// Candidate identities, sorted by descending average match factor.
    pub hits: Vec<ConsolidatedSearchResult>,
    /// Pairwise mass spectral comparison scores between the contributing runs.
    pub ms_comparison: MsComparison,
    /// Open mapping for auxiliary metadata; see [`META_PEAK_NUMBER`] and
    /// [`META_HIDDEN`] for the recognized keys.
    pub meta: BTreeMap<String, Value>,
}

impl ConsolidatedPeak {
    /// Constructs a new `ConsolidatedPeak`.
    ///
    /// # Arguments
    ///
    /// * `rt_list` - Retention times of the aligned peaks.
    /// * `area_list` - Peak areas of the aligned peaks.
    /// * `ms_list` - Mass spectra of the aligned peaks.
    /// * `minutes` - When true the retention times are given in minutes and
    ///   are converted to seconds here, exactly once.
    /// * `hits` - Candidate identities for the peak.
    /// * `ms_comparison` - Pairwise mass spectral comparison scores.
    /// * `meta` - Optional initial metadata mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the retention time, area and spectrum lists
    /// differ in length.
    pub fn new(
        rt_list: Vec<f64>,
        area_list: Vec<f64>,
        ms_list: Vec<Option<MassSpectrum>>,
        minutes: bool,
        hits: Vec<ConsolidatedSearchResult>,
        ms_comparison: MsComparison,
        meta: Option<BTreeMap<String, Value>>,
    ) -> Result<Self> {
        if rt_list.len() != area_list.len() || rt_list.len() != ms_list.len() {
            return Err(ChromalignError::invalid_parameter(
                "rt_list",
                format!(
                    "rt_list, area_list and ms_list must have the same length ({}, {}, {})",
                    rt_list.len(),
                    area_list.len(),
                    ms_list.len()
                ),
            ));
        }

        let rt_list = if minutes {
            rt_list.into_iter().map(|rt| rt * 60.0).collect()
        } else {
            rt_list
        };

        Ok(ConsolidatedPeak {
            rt_list,
            area_list,
            ms_list,
            hits,
            ms_comparison,
            meta: meta.unwrap_or_default(),
        })
    }

    /// The average retention time across the aligned peaks, in seconds.
    pub fn rt(&self) -> f64 {
        mean(&self.rt_list)
    }

    /// The population standard deviation of the retention times.
    pub fn rt_stdev(&self) -> f64 {
        std_dev(&self.rt_list)
    }

    /// The average peak area across the aligned peaks.
    pub fn area(&self) -> f64 {
        mean(&self.area_list)
    }

    pub fn area_stdev(&self) -> f64 {
        std_dev(&self.area_list)
    }

    /// The average of the pairwise mass spectral comparison scores, or 0.0
    /// when no comparisons were recorded.
    pub fn average_ms_comparison(&self) -> f64 {
        self.ms_comparison.mean()
    }

    pub fn ms_comparison_stdev(&self) -> f64 {
        self.ms_comparison.std_dev()
    }

    /// The number of runs contributing a peak to this consolidated peak.
    pub fn len(&self) -> usize {
        self.rt_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rt_list.is_empty()
    }

    /// Returns a dictionary representation with JSON-compatible values only.
    pub fn to_dict(&self) -> Value {
        json!({
            "rt_list": self.rt_list,
            "area_list": self.area_list,
            "meta": self.meta,
            "hits": self.hits.iter().map(|hit| hit.to_dict()).collect::<Vec<Value>>(),
            "ms_list": self.ms_list,
            "ms_comparison": self.ms_comparison.to_dict(),
        })
    }

    /// Constructs a `ConsolidatedPeak` from a dictionary.
    ///
    /// Retention times are taken as already being in seconds; the `minutes`
    /// normalization is applied at first construction only, never again.
    pub fn from_dict(value: &Value) -> Result<Self> {
        let map = as_object(value, "consolidated peak")?;

        let hits = get(map, "hits")?
            .as_array()
            .ok_or(ChromalignError::UnexpectedType {
                field: "hits",
                expected: "an array",
                found: value_kind(get(map, "hits")?),
            })?
            .iter()
            .map(ConsolidatedSearchResult::from_dict)
            .collect::<Result<Vec<_>>>()?;

        let ms_list = get(map, "ms_list")?
            .as_array()
            .ok_or(ChromalignError::UnexpectedType {
                field: "ms_list",
                expected: "an array",
                found: value_kind(get(map, "ms_list")?),
            })?
            .iter()
            .map(|ms| match ms {
                Value::Null => Ok(None),
                dict @ Value::Object(_) => serde_json::from_value::<MassSpectrum>(dict.clone())
                    .map(Some)
                    .map_err(|_| ChromalignError::UnexpectedType {
                        field: "ms_list",
                        expected: "a mass spectrum mapping or null",
                        found: value_kind(dict),
                    }),
                other => Err(ChromalignError::UnexpectedType {
                    field: "ms_list",
                    expected: "a mass spectrum mapping or null",
                    found: value_kind(other),
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        let meta = as_object(get(map, "meta")?, "meta")?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self::new(
            get_f64_list(map, "rt_list")?,
            get_f64_list(map, "area_list")?,
            ms_list,
            false,
            hits,
            MsComparison::from_dict(get(map, "ms_comparison")?)?,
            Some(meta),
        )
    }
}

impl Display for ConsolidatedPeak {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<Consolidated Peak: {}>", self.rt())
    }
}

fn value_kind(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
    .to_string()
}

fn as_object<'a>(value: &'a Value, field: &'static str) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or(ChromalignError::UnexpectedType {
        field,
        expected: "a mapping",
        found: value_kind(value),
    })
}

fn get<'a>(map: &'a Map<String, Value>, key: &'static str) -> Result<&'a Value> {
    map.get(key).ok_or(ChromalignError::MissingKey(key))
}

fn get_string(map: &Map<String, Value>, key: &'static str) -> Result<String> {
    let value = get(map, key)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or(ChromalignError::UnexpectedType {
            field: key,
            expected: "a string",
            found: value_kind(value),
        })
}

fn get_f64_list(map: &Map<String, Value>, key: &'static str) -> Result<Vec<f64>> {
    get_list(map, key)?
        .iter()
        .map(|v| {
            v.as_f64().ok_or(ChromalignError::UnexpectedType {
                field: key,
                expected: "a number",
                found: value_kind(v),
            })
        })
        .collect()
}

fn get_opt_f64_list(map: &Map<String, Value>, key: &'static str) -> Result<Vec<Option<f64>>> {
    get_list(map, key)?
        .iter()
        .map(|v| match v {
            Value::Null => Ok(None),
            other => other
                .as_f64()
                .map(Some)
                .ok_or(ChromalignError::UnexpectedType {
                    field: key,
                    expected: "a number or null",
                    found: value_kind(other),
                }),
        })
        .collect()
}

fn get_opt_u32_list(map: &Map<String, Value>, key: &'static str) -> Result<Vec<Option<u32>>> {
    get_list(map, key)?
        .iter()
        .map(|v| match v {
            Value::Null => Ok(None),
            other => other
                .as_u64()
                .map(|n| Some(n as u32))
                .ok_or(ChromalignError::UnexpectedType {
                    field: key,
                    expected: "a non-negative integer or null",
                    found: value_kind(other),
                }),
        })
        .collect()
}

fn get_list<'a>(map: &'a Map<String, Value>, key: &'static str) -> Result<&'a Vec<Value>> {
    let value = get(map, key)?;
    value.as_array().ok_or(ChromalignError::UnexpectedType {
        field: key,
        expected: "an array",
        found: value_kind(value),
    })
}
