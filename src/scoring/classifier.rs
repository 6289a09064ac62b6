//! 3T classification (Tolerate / Treat / Transfer).

use crate::models::{Action, ClassifiedRisk, ScoredRisk};

/// Lowest combined score routed to Transfer.
pub const TRANSFER_THRESHOLD: u16 = 65;
/// Lowest combined score routed to Treat.
pub const TREAT_THRESHOLD: u16 = 40;

/// Action for a combined `likelihood * impact` score.
pub fn action_for(risk_score: u16) -> Action {
    if risk_score >= TRANSFER_THRESHOLD {
        Action::Transfer
    } else if risk_score >= TREAT_THRESHOLD {
        Action::Treat
    } else {
        Action::Tolerate
    }
}

pub fn classify(scored: &ScoredRisk) -> ClassifiedRisk {
    let risk_score = u16::from(scored.likelihood) * u16::from(scored.impact);
    ClassifiedRisk {
        risk: scored.risk.clone(),
        likelihood: scored.likelihood,
        impact: scored.impact,
        risk_score,
        action: action_for(risk_score),
    }
}

pub fn classify_all(scored: &[ScoredRisk]) -> Vec<ClassifiedRisk> {
    scored.iter().map(classify).collect()
}

/// Per-action totals of a classified register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounts {
    pub tolerate: usize,
    pub treat: usize,
    pub transfer: usize,
}

impl ActionCounts {
    pub fn tally(classified: &[ClassifiedRisk]) -> Self {
        classified.iter().fold(Self::default(), |mut counts, c| {
            match c.action {
                Action::Tolerate => counts.tolerate += 1,
                Action::Treat => counts.treat += 1,
                Action::Transfer => counts.transfer += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.tolerate + self.treat + self.transfer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Score;

    fn scored(likelihood: u8, impact: u8) -> ScoredRisk {
        ScoredRisk::new("risk", Score { likelihood, impact })
    }

    #[test]
    fn test_thresholds() {
        let cases = [
            ((10, 10), 100, Action::Transfer),
            ((8, 5), 40, Action::Treat),
            ((5, 5), 25, Action::Tolerate),
            ((8, 8), 64, Action::Treat),
            ((7, 10), 70, Action::Transfer),
            ((7, 9), 63, Action::Treat),
            ((4, 9), 36, Action::Tolerate),
            ((1, 1), 1, Action::Tolerate),
        ];
        for ((l, i), expected_score, expected_action) in cases {
            let c = classify(&scored(l, i));
            assert_eq!(c.risk_score, expected_score, "{l}x{i}");
            assert_eq!(c.action, expected_action, "{l}x{i}");
        }
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        assert_eq!(action_for(65), Action::Transfer);
        assert_eq!(action_for(64), Action::Treat);
        assert_eq!(action_for(40), Action::Treat);
        assert_eq!(action_for(39), Action::Tolerate);
    }

    #[test]
    fn test_classify_keeps_fields() {
        let c = classify(&ScoredRisk::new("Supplier default", Score { likelihood: 7, impact: 6 }));
        assert_eq!(c.risk, "Supplier default");
        assert_eq!((c.likelihood, c.impact), (7, 6));
        assert_eq!(c.action, Action::Treat);
    }

    #[test]
    fn test_action_counts() {
        let classified = classify_all(&[scored(10, 10), scored(8, 5), scored(1, 1), scored(2, 2)]);
        let counts = ActionCounts::tally(&classified);
        assert_eq!(
            counts,
            ActionCounts {
                tolerate: 2,
                treat: 1,
                transfer: 1
            }
        );
        assert_eq!(counts.total(), 4);
    }
}
