use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::{ChromalignError, Result};

/// A mass spectrum: paired mass and intensity lists, ordered by mass.
///
/// Produced by upstream peak detection; immutable once constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct MassSpectrum {
    pub mass: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl MassSpectrum {
    /// Constructs a new `MassSpectrum`.
    ///
    /// # Arguments
    ///
    /// * `mass` - A vector of mass values, sorted ascending.
    /// * `intensity` - A vector of intensity values corresponding to the masses.
    ///
    /// # Errors
    ///
    /// Returns an error if the two lists differ in length.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use chromalign::data::spectrum::MassSpectrum;
    /// let spectrum = MassSpectrum::new(vec![45.0, 46.0], vec![100.0, 50.0]).unwrap();
    /// assert_eq!(spectrum.len(), 2);
    /// ```
    pub fn new(mass: Vec<f64>, intensity: Vec<f64>) -> Result<Self> {
        if mass.len() != intensity.len() {
            return Err(ChromalignError::MismatchedSpectrum {
                masses: mass.len(),
                intensities: intensity.len(),
            });
        }
        Ok(MassSpectrum { mass, intensity })
    }

    /// The number of (mass, intensity) pairs in the spectrum.
    pub fn len(&self) -> usize {
        self.mass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }

    /// The intensity of the most intense peak, or `None` for an empty spectrum.
    pub fn base_peak_intensity(&self) -> Option<f64> {
        self.intensity.iter().cloned().fold(None, |acc, i| match acc {
            Some(max) if max >= i => Some(max),
            _ => Some(i),
        })
    }

    /// Returns a copy of the spectrum restricted to `[mass_min, mass_max]`.
    pub fn filter_ranged(&self, mass_min: f64, mass_max: f64) -> Self {
        let mut mass_vec: Vec<f64> = Vec::new();
        let mut intensity_vec: Vec<f64> = Vec::new();

        for (mass, intensity) in self.mass.iter().zip(self.intensity.iter()) {
            if mass_min <= *mass && *mass <= mass_max {
                mass_vec.push(*mass);
                intensity_vec.push(*intensity);
            }
        }

        MassSpectrum {
            mass: mass_vec,
            intensity: intensity_vec,
        }
    }
}
