use serde::{Deserialize, Serialize};

use crate::error::TraceError;

/// Allowed deviation of a categorical belief's sum from 1.
pub const SIMPLEX_TOLERANCE: f64 = 1e-6;

/// How the entries of a belief relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeliefKind {
    /// One random variable over K labels; entries sum to 1.
    #[default]
    Categorical,
    /// One probability per item with no joint constraint.
    Independent,
}

/// Belief over hidden-state labels, validated at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBelief")]
pub struct BeliefDistribution {
    kind: BeliefKind,
    probs: Vec<f64>,
}

#[derive(Deserialize)]
struct RawBelief {
    #[serde(default)]
    kind: BeliefKind,
    probs: Vec<f64>,
}

impl TryFrom<RawBelief> for BeliefDistribution {
    type Error = TraceError;

    fn try_from(raw: RawBelief) -> Result<Self, Self::Error> {
        BeliefDistribution::new(raw.kind, raw.probs)
    }
}

fn check_entries(probs: &[f64]) -> Result<(), TraceError> {
    if probs.is_empty() {
        return Err(TraceError::EmptyBelief);
    }
    for (label, &value) in probs.iter().enumerate() {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(TraceError::OutOfRange { label, value });
        }
    }
    Ok(())
}

impl BeliefDistribution {
    pub fn new(kind: BeliefKind, probs: Vec<f64>) -> Result<Self, TraceError> {
        match kind {
            BeliefKind::Categorical => Self::categorical(probs),
            BeliefKind::Independent => Self::independent(probs),
        }
    }

    /// Categorical belief; entries must sum to 1 within [`SIMPLEX_TOLERANCE`].
    pub fn categorical(probs: Vec<f64>) -> Result<Self, TraceError> {
        check_entries(&probs)?;
        let sum: f64 = probs.iter().sum();
        if (sum - 1.0).abs() > SIMPLEX_TOLERANCE {
            return Err(TraceError::NotOnSimplex { sum });
        }
        Ok(Self {
            kind: BeliefKind::Categorical,
            probs,
        })
    }

    pub fn independent(probs: Vec<f64>) -> Result<Self, TraceError> {
        check_entries(&probs)?;
        Ok(Self {
            kind: BeliefKind::Independent,
            probs,
        })
    }

    /// Categorical belief from particle counts per label, renormalized.
    pub fn from_particles(counts: &[u64]) -> Result<Self, TraceError> {
        if counts.is_empty() {
            return Err(TraceError::EmptyBelief);
        }
        // Summed in f64 so that very large counts cannot overflow.
        let total: f64 = counts.iter().map(|&c| c as f64).sum();
        if total == 0.0 {
            return Err(TraceError::NoParticles);
        }
        let probs = counts.iter().map(|&c| c as f64 / total).collect();
        Ok(Self {
            kind: BeliefKind::Categorical,
            probs,
        })
    }

    pub fn kind(&self) -> BeliefKind {
        self.kind
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn get(&self, label: usize) -> Option<f64> {
        self.probs.get(label).copied()
    }

    /// Label with the largest probability; the first one on ties.
    pub fn dominant_label(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (label, &p) in self.probs.iter().enumerate() {
            match best {
                Some((_, q)) if q >= p => {}
                _ => best = Some((label, p)),
            }
        }
        best.map(|(label, _)| label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorical_requires_unit_sum() {
        assert!(BeliefDistribution::categorical(vec![0.5, 0.5]).is_ok());
        assert!(BeliefDistribution::categorical(vec![0.5, 0.5 + 5e-7]).is_ok());
        assert!(matches!(
            BeliefDistribution::categorical(vec![0.5, 0.6]),
            Err(TraceError::NotOnSimplex { .. })
        ));
        assert!(matches!(
            BeliefDistribution::categorical(vec![]),
            Err(TraceError::EmptyBelief)
        ));
        assert!(matches!(
            BeliefDistribution::categorical(vec![1.5, -0.5]),
            Err(TraceError::OutOfRange { label: 0, .. })
        ));
    }

    #[test]
    fn independent_has_no_sum_constraint() {
        let b = BeliefDistribution::independent(vec![0.9, 0.8, 0.1]).expect("valid");
        assert_eq!(b.kind(), BeliefKind::Independent);
        assert!(BeliefDistribution::independent(vec![f64::NAN]).is_err());
    }

    #[test]
    fn particles_are_normalized() {
        let b = BeliefDistribution::from_particles(&[1, 3, 0]).expect("valid");
        assert_eq!(b.probs(), &[0.25, 0.75, 0.0]);
        assert_eq!(b.dominant_label(), Some(1));
        assert!(matches!(
            BeliefDistribution::from_particles(&[0, 0]),
            Err(TraceError::NoParticles)
        ));
    }

    #[test]
    fn huge_particle_counts_do_not_overflow() {
        let b = BeliefDistribution::from_particles(&[u64::MAX, u64::MAX, 0]).expect("valid");
        assert_eq!(b.probs(), &[0.5, 0.5, 0.0]);
        assert_eq!(b.kind(), BeliefKind::Categorical);
    }

    #[test]
    fn dominant_label_prefers_first_on_ties() {
        let b = BeliefDistribution::categorical(vec![0.4, 0.4, 0.2]).expect("valid");
        assert_eq!(b.dominant_label(), Some(0));
    }

    #[test]
    fn deserialization_validates() {
        let ok: BeliefDistribution =
            serde_json::from_str(r#"{"probs": [0.25, 0.75]}"#).expect("valid json");
        assert_eq!(ok.kind(), BeliefKind::Categorical);
        let bad = serde_json::from_str::<BeliefDistribution>(r#"{"probs": [0.25, 0.25]}"#);
        assert!(bad.is_err());
        let ind: BeliefDistribution =
            serde_json::from_str(r#"{"kind": "independent", "probs": [0.25, 0.25]}"#)
                .expect("valid json");
        assert_eq!(ind.kind(), BeliefKind::Independent);
    }
}
