use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::data::spectrum::MassSpectrum;
use crate::error::{ChromalignError, Result};

/// Canonical sentinel for an unknown or absent CAS registry number.
pub const UNKNOWN_CAS: &str = "---";

/// Normalizes a CAS registry number.
///
/// Some spectral libraries report a null CAS number as `0-00-0`; this is
/// mapped to the canonical `---` sentinel. Anything else passes through.
pub fn normalize_cas(cas: &str) -> String {
    if cas == "0-00-0" {
        UNKNOWN_CAS.to_string()
    } else {
        cas.to_string()
    }
}

const REFERENCE_DATA_KEYS: &str =
    "{name, cas, formula, contributor, nist_no, id, mw, mass_spec, synonyms}";

/// Reference library record for a candidate compound.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub name: String,
    pub cas: String,
    pub formula: String,
    pub contributor: String,
    pub nist_no: u64,
    pub id: u64,
    pub mw: f64,
    pub mass_spec: Option<MassSpectrum>,
    pub synonyms: Vec<String>,
}

impl ReferenceData {
    /// Constructs a `ReferenceData` from a dictionary representation.
    ///
    /// The mapping must carry exactly the keys
    /// `{name, cas, formula, contributor, nist_no, id, mw, mass_spec, synonyms}`;
    /// any other shape is rejected with a validation error naming the
    /// expected key set.
    pub fn from_dict(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Self::malformed(value))?;

        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort_unstable();
        let mut expected: Vec<&str> = [
            "name", "cas", "formula", "contributor", "nist_no", "id", "mw", "mass_spec",
            "synonyms",
        ]
        .to_vec();
        expected.sort_unstable();
        if keys != expected {
            return Err(Self::malformed(value));
        }

        let mut reference_data: ReferenceData =
            serde_json::from_value(value.clone()).map_err(|_| Self::malformed(value))?;
        reference_data.cas = normalize_cas(&reference_data.cas);
        Ok(reference_data)
    }

    /// Constructs an optional `ReferenceData` from a tagged dictionary value.
    ///
    /// Accepts `None`/`null` (no reference data), a mapping (validated via
    /// [`ReferenceData::from_dict`]), or fails on any other shape.
    pub fn from_value(value: Option<&Value>) -> Result<Option<Self>> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(dict @ Value::Object(_)) => Ok(Some(Self::from_dict(dict)?)),
            Some(other) => Err(Self::malformed(other)),
        }
    }

    /// Returns a dictionary representation with JSON-compatible values only.
    pub fn to_dict(&self) -> Value {
        json!({
            "name": self.name,
            "cas": self.cas,
            "formula": self.formula,
            "contributor": self.contributor,
            "nist_no": self.nist_no,
            "id": self.id,
            "mw": self.mw,
            "mass_spec": self.mass_spec,
            "synonyms": self.synonyms,
        })
    }

    fn malformed(found: &Value) -> ChromalignError {
        ChromalignError::MalformedReferenceData {
            expected: REFERENCE_DATA_KEYS,
            found: match found {
                Value::Object(map) => {
                    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                    format!("a mapping with keys {{{}}}", keys.join(", "))
                }
                other => format!("{}", other),
            },
        }
    }
}

/// A single library-search result for one peak.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateHit {
    /// The name of the candidate compound.
    pub name: String,
    /// The CAS registry number of the compound, normalized.
    pub cas: String,
    /// Match factor between the peak spectrum and the reference spectrum (0-999).
    pub match_factor: f64,
    /// Reverse match factor (reference spectrum against the peak spectrum).
    pub reverse_match_factor: f64,
    /// Position in the search engine's ranked hit list; 1 is the best hit.
    pub hit_number: u32,
    /// Reference library record for the compound, when retrieved.
    pub reference_data: Option<ReferenceData>,
}

impl CandidateHit {
    pub fn new(
        name: String,
        cas: String,
        match_factor: f64,
        reverse_match_factor: f64,
        hit_number: u32,
        reference_data: Option<ReferenceData>,
    ) -> Self {
        CandidateHit {
            name,
            cas: normalize_cas(&cas),
            match_factor,
            reverse_match_factor,
            hit_number,
            reference_data,
        }
    }
}

/// A detected chromatographic peak, as produced by upstream peak detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Stable identity for the peak within its run.
    pub uid: String,
    /// Retention time in seconds.
    pub rt: f64,
    /// Peak area.
    pub area: f64,
    /// Mass spectrum at the peak apex, when recorded.
    pub spectrum: Option<MassSpectrum>,
    /// Retention time bounds (left, right), when recorded.
    pub bounds: Option<(f64, f64)>,
    /// Candidate identifications, ordered by search-engine rank.
    pub hits: Vec<CandidateHit>,
}

impl Peak {
    pub fn new(
        uid: String,
        rt: f64,
        area: f64,
        spectrum: Option<MassSpectrum>,
        hits: Vec<CandidateHit>,
    ) -> Self {
        Peak {
            uid,
            rt,
            area,
            spectrum,
            bounds: None,
            hits,
        }
    }
}

/// One instrument run: a named, ordered peak list for a single repeat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Repeat {
    pub name: String,
    pub peaks: Vec<Peak>,
}

impl Repeat {
    pub fn new(name: String, peaks: Vec<Peak>) -> Self {
        Repeat { name, peaks }
    }
}
