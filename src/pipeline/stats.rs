//! Score summary
//!
//! Mean is only reported for more than one score and the sample standard
//! deviation for more than two; max and min are always defined for a
//! non-empty collection.

use std::fmt;

use serde::Serialize;

use crate::error::{EvalError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub max: f64,
    pub min: f64,
}

impl ScoreSummary {
    /// Summarise `scores`; an empty slice is an `EmptyScores` error
    pub fn from_scores(scores: &[f64]) -> Result<Self> {
        if scores.is_empty() {
            return Err(EvalError::EmptyScores);
        }

        let count = scores.len();
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let average = scores.iter().sum::<f64>() / count as f64;

        let mean = (count > 1).then_some(average);
        let std = (count > 2).then(|| {
            let ss: f64 = scores.iter().map(|s| (s - average).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });

        Ok(Self {
            count,
            mean,
            std,
            max,
            min,
        })
    }

    /// The four console lines, in print order
    pub fn lines(&self) -> [String; 4] {
        [
            format!("MEAN PESQ: {}", optional(self.mean)),
            format!("STD PESQ: {}", optional(self.std)),
            format!("MAX PESQ: {:?}", self.max),
            format!("MIN PESQ: {:?}", self.min),
        ]
    }
}

impl fmt::Display for ScoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

fn optional(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:?}", v),
        None => "None".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_is_error() {
        assert!(matches!(
            ScoreSummary::from_scores(&[]),
            Err(EvalError::EmptyScores)
        ));
    }

    #[test]
    fn test_single_score() {
        let summary = ScoreSummary::from_scores(&[3.2]).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.mean, None);
        assert_eq!(summary.std, None);
        assert_eq!(summary.max, 3.2);
        assert_eq!(summary.min, 3.2);
        assert_eq!(summary.lines()[0], "MEAN PESQ: None");
        assert_eq!(summary.lines()[1], "STD PESQ: None");
        assert_eq!(summary.lines()[2], "MAX PESQ: 3.2");
    }

    #[test]
    fn test_two_scores_have_mean_but_no_std() {
        let summary = ScoreSummary::from_scores(&[2.0, 4.0]).unwrap();
        assert_eq!(summary.mean, Some(3.0));
        assert_eq!(summary.std, None);
    }

    #[test]
    fn test_sample_std() {
        let summary = ScoreSummary::from_scores(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_relative_eq!(summary.mean.unwrap(), 2.5);
        assert_relative_eq!(summary.std.unwrap(), 1.2909944, epsilon = 1e-6);
        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.min, 1.0);
    }

    #[test]
    fn test_whole_numbers_keep_decimal_point() {
        let summary = ScoreSummary::from_scores(&[1.0, 3.0]).unwrap();
        assert_eq!(
            summary.lines(),
            [
                "MEAN PESQ: 2.0".to_string(),
                "STD PESQ: None".to_string(),
                "MAX PESQ: 3.0".to_string(),
                "MIN PESQ: 1.0".to_string(),
            ]
        );
    }

    #[test]
    fn test_display_prints_four_lines() {
        let summary = ScoreSummary::from_scores(&[1.5, 2.5, 3.5]).unwrap();
        let text = summary.to_string();
        assert_eq!(
            text,
            "MEAN PESQ: 2.5\nSTD PESQ: 1.0\nMAX PESQ: 3.5\nMIN PESQ: 1.5\n"
        );
    }
}
