//! Photon event datasets.
//!
//! A [`Dataset`] is created once by the (external) loading layer and is
//! read-only for the engine. The `unit` tag is authoritative: the engine
//! never guesses the energy unit from magnitudes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Minimum number of samples any statistic can be computed on.
pub const MIN_SAMPLES: usize = 3;

/// Energy unit of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergyUnit {
    /// Giga-electronvolts.
    GeV,
    /// Mega-electronvolts.
    MeV,
}

impl EnergyUnit {
    /// Multiplicative factor converting this unit into GeV.
    #[must_use]
    pub fn to_gev_factor(self) -> f64 {
        match self {
            Self::GeV => 1.0,
            Self::MeV => 1e-3,
        }
    }

    /// Factor converting an energy in `self` into `target`.
    #[must_use]
    pub fn conversion_factor(self, target: Self) -> f64 {
        self.to_gev_factor() / target.to_gev_factor()
    }
}

/// A single photon observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Photon energy in the dataset's unit.
    pub energy: f64,
    /// Arrival time in seconds relative to the dataset's reference epoch.
    pub time: f64,
}

impl Sample {
    /// Creates a new sample.
    #[must_use]
    pub fn new(energy: f64, time: f64) -> Self {
        Self { energy, time }
    }
}

/// An immutable collection of samples from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    source_id: String,
    unit: EnergyUnit,
    redshift: Option<f64>,
    reference_epoch: Option<DateTime<Utc>>,
    samples: Vec<Sample>,
}

impl Dataset {
    /// Creates a dataset from samples.
    ///
    /// # Errors
    /// Returns `InsufficientSample` for fewer than three samples and
    /// `InvalidInput` if any energy or time is not finite.
    pub fn new(source_id: impl Into<String>, unit: EnergyUnit, samples: Vec<Sample>) -> Result<Self> {
        if samples.len() < MIN_SAMPLES {
            return Err(EngineError::insufficient(MIN_SAMPLES, samples.len()));
        }
        if let Some(idx) = samples
            .iter()
            .position(|s| !s.energy.is_finite() || !s.time.is_finite())
        {
            return Err(EngineError::InvalidInput(format!(
                "sample {idx} has a non-finite energy or time"
            )));
        }

        Ok(Self {
            source_id: source_id.into(),
            unit,
            redshift: None,
            reference_epoch: None,
            samples,
        })
    }

    /// Creates a dataset from parallel energy and time columns.
    ///
    /// # Errors
    /// Returns `InsufficientSample` if the columns differ in length or hold
    /// fewer than three values, `InvalidInput` for non-finite values.
    pub fn from_columns(
        source_id: impl Into<String>,
        unit: EnergyUnit,
        energies: &[f64],
        times: &[f64],
    ) -> Result<Self> {
        if energies.len() != times.len() {
            return Err(EngineError::insufficient(
                energies.len().max(times.len()),
                energies.len().min(times.len()),
            ));
        }
        let samples = energies
            .iter()
            .zip(times)
            .map(|(&energy, &time)| Sample::new(energy, time))
            .collect();
        Self::new(source_id, unit, samples)
    }

    /// Attaches the source redshift.
    #[must_use]
    pub fn with_redshift(mut self, redshift: f64) -> Self {
        self.redshift = Some(redshift);
        self
    }

    /// Attaches the reference epoch times are measured from (e.g. trigger time).
    #[must_use]
    pub fn with_reference_epoch(mut self, epoch: DateTime<Utc>) -> Self {
        self.reference_epoch = Some(epoch);
        self
    }

    /// Source identifier.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Energy unit of every sample.
    #[must_use]
    pub fn unit(&self) -> EnergyUnit {
        self.unit
    }

    /// Source redshift, if known.
    #[must_use]
    pub fn redshift(&self) -> Option<f64> {
        self.redshift
    }

    /// Reference epoch of the time axis, if known.
    #[must_use]
    pub fn reference_epoch(&self) -> Option<DateTime<Utc>> {
        self.reference_epoch
    }

    /// All samples.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: a dataset holds at least three samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Energy column.
    #[must_use]
    pub fn energies(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.energy).collect()
    }

    /// Time column.
    #[must_use]
    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// Returns a copy with energies expressed in `unit`.
    #[must_use]
    pub fn normalized_to(&self, unit: EnergyUnit) -> Self {
        let factor = self.unit.conversion_factor(unit);
        let samples = self
            .samples
            .iter()
            .map(|s| Sample::new(s.energy * factor, s.time))
            .collect();
        Self {
            source_id: self.source_id.clone(),
            unit,
            redshift: self.redshift,
            reference_epoch: self.reference_epoch,
            samples,
        }
    }

    /// Returns the `(energies, times)` columns of the samples matching
    /// `predicate`.
    pub fn filter<P>(&self, predicate: P) -> (Vec<f64>, Vec<f64>)
    where
        P: Fn(&Sample) -> bool,
    {
        self.samples
            .iter()
            .filter(|s| predicate(s))
            .map(|s| (s.energy, s.time))
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_dataset() -> Dataset {
        Dataset::from_columns(
            "GRB090902B",
            EnergyUnit::MeV,
            &[100.0, 2_000.0, 33_400.0, 500.0],
            &[1.0, 5.0, 82.0, 12.0],
        )
        .unwrap()
    }

    #[test]
    fn from_columns_builds_samples_in_order() {
        let ds = sample_dataset();
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.samples()[2], Sample::new(33_400.0, 82.0));
        assert_eq!(ds.source_id(), "GRB090902B");
    }

    #[test]
    fn rejects_fewer_than_three_samples() {
        let err = Dataset::from_columns("x", EnergyUnit::GeV, &[1.0, 2.0], &[1.0, 2.0]).unwrap_err();
        assert_eq!(err, EngineError::insufficient(3, 2));
    }

    #[test]
    fn rejects_mismatched_columns() {
        let err =
            Dataset::from_columns("x", EnergyUnit::GeV, &[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0])
                .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientSample { .. }));
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = Dataset::from_columns(
            "x",
            EnergyUnit::GeV,
            &[1.0, f64::NAN, 3.0],
            &[1.0, 2.0, 3.0],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn normalized_to_gev_divides_by_thousand() {
        let ds = sample_dataset().normalized_to(EnergyUnit::GeV);
        assert_eq!(ds.unit(), EnergyUnit::GeV);
        assert!((ds.samples()[2].energy - 33.4).abs() < 1e-12);
        assert!((ds.samples()[2].time - 82.0).abs() < f64::EPSILON);
    }

    #[test]
    fn normalized_to_same_unit_is_identity() {
        let ds = sample_dataset();
        assert_eq!(ds.normalized_to(EnergyUnit::MeV), ds);
    }

    #[test]
    fn filter_returns_matching_columns() {
        let ds = sample_dataset();
        let (e, t) = ds.filter(|s| s.energy > 1_000.0);
        assert_eq!(e, vec![2_000.0, 33_400.0]);
        assert_eq!(t, vec![5.0, 82.0]);
    }

    #[test]
    fn metadata_builders_attach_values() {
        let epoch = Utc.with_ymd_and_hms(2009, 9, 2, 11, 5, 8).unwrap();
        let ds = sample_dataset()
            .with_redshift(1.822)
            .with_reference_epoch(epoch);
        assert_eq!(ds.redshift(), Some(1.822));
        assert_eq!(ds.reference_epoch(), Some(epoch));
    }

    #[test]
    fn dataset_serializes_to_json() {
        let ds = sample_dataset().with_redshift(1.822);
        let json = serde_json::to_string(&ds).unwrap();
        assert!(json.contains("\"unit\":\"MeV\""), "json was {json}");
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ds);
    }
}
