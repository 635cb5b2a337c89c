//! Oracle variable names.
//!
//! Names carry the rule index so that encodings of different rules sharing
//! one oracle never collide.

use crate::rule::{BandBound, BandKind, ThresholdRef};

/// Real threshold of `tref` in rule `rule`.
pub fn threshold_var(rule: usize, tref: ThresholdRef) -> String {
    match tref {
        ThresholdRef::Label { constraint, label } => format!("t_r{rule}_c{constraint}_l{label}"),
        ThresholdRef::Band {
            constraint,
            band,
            bound,
        } => {
            let band = match band {
                BandKind::ActionBelief => "ab",
                BandKind::Distance => "dist",
            };
            let bound = match bound {
                BandBound::Lower => "lo",
                BandBound::Upper => "hi",
            };
            format!("t_r{rule}_c{constraint}_{band}_{bound}")
        }
    }
}

/// Soft indicator of step `step` (1-based) of run index `run` in rule `rule`.
pub fn indicator_var(rule: usize, run: usize, step: usize) -> String {
    format!("b_r{rule}_{run}_{step}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_distinct_across_rules() {
        let t = ThresholdRef::new(1, 2);
        assert_eq!(threshold_var(0, t), "t_r0_c1_l2");
        assert_ne!(threshold_var(0, t), threshold_var(1, t));
        assert_eq!(indicator_var(3, 0, 7), "b_r3_0_7");
        assert_ne!(indicator_var(0, 1, 11), indicator_var(0, 11, 1));
        let far = ThresholdRef::band(1, BandKind::Distance, BandBound::Upper);
        assert_eq!(threshold_var(2, far), "t_r2_c1_dist_hi");
        let low = ThresholdRef::band(0, BandKind::ActionBelief, BandBound::Lower);
        assert_eq!(threshold_var(0, low), "t_r0_c0_ab_lo");
    }
}
