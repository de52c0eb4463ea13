//! Cumulative-threshold leveling.

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelThreshold {
    pub level: i64,
    pub points_cumulative: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_title: Option<String>,
}

impl LevelThreshold {
    pub fn new(level: i64, points_cumulative: i64) -> Self {
        Self {
            level,
            points_cumulative,
            reward_title: None,
        }
    }
}

/// Where a point total sits in the level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: i64,
    pub points_to_next: i64,
    pub current_threshold: i64,
    pub next_threshold: Option<i64>,
    pub is_max_level: bool,
}

/// Level thresholds sorted by level, with strictly increasing cumulative points.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LevelTable {
    thresholds: Vec<LevelThreshold>,
}

impl LevelTable {
    pub fn new(mut thresholds: Vec<LevelThreshold>) -> Result<Self, RuleError> {
        thresholds.sort_by_key(|t| t.level);
        for pair in thresholds.windows(2) {
            if pair[0].level == pair[1].level {
                return Err(RuleError::InvalidLevelTable(format!(
                    "level {} defined twice",
                    pair[0].level
                )));
            }
            if pair[1].points_cumulative <= pair[0].points_cumulative {
                return Err(RuleError::InvalidLevelTable(format!(
                    "level {} needs more points than level {}",
                    pair[1].level, pair[0].level
                )));
            }
        }
        if thresholds.iter().any(|t| t.points_cumulative < 0) {
            return Err(RuleError::InvalidLevelTable(
                "cumulative points must not be negative".to_string(),
            ));
        }
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &[LevelThreshold] {
        &self.thresholds
    }

    /// Highest level whose cumulative threshold does not exceed `lifetime_points`.
    pub fn resolve(&self, lifetime_points: i64) -> LevelProgress {
        let position = self
            .thresholds
            .iter()
            .rposition(|t| t.points_cumulative <= lifetime_points);

        let Some(index) = position else {
            let next = self.thresholds.first().map(|t| t.points_cumulative);
            return LevelProgress {
                level: 1,
                points_to_next: next.map_or(0, |n| (n - lifetime_points).max(0)),
                current_threshold: 0,
                next_threshold: next,
                is_max_level: next.is_none(),
            };
        };

        let current = &self.thresholds[index];
        let next = self.thresholds.get(index + 1).map(|t| t.points_cumulative);
        LevelProgress {
            level: current.level,
            points_to_next: next.map_or(0, |n| (n - lifetime_points).max(0)),
            current_threshold: current.points_cumulative,
            next_threshold: next,
            is_max_level: next.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LevelTable {
        LevelTable::new(vec![
            LevelThreshold::new(1, 0),
            LevelThreshold::new(2, 100),
            LevelThreshold::new(3, 200),
            LevelThreshold::new(4, 300),
        ])
        .unwrap()
    }

    #[test]
    fn resolves_between_thresholds() {
        let p = table().resolve(250);
        assert_eq!(p.level, 3);
        assert_eq!(p.points_to_next, 50);
        assert_eq!(p.current_threshold, 200);
        assert_eq!(p.next_threshold, Some(300));
        assert!(!p.is_max_level);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(table().resolve(100).level, 2);
        assert_eq!(table().resolve(99).level, 1);
    }

    #[test]
    fn max_level_has_nothing_to_next() {
        let p = table().resolve(10_000);
        assert_eq!(p.level, 4);
        assert_eq!(p.points_to_next, 0);
        assert!(p.is_max_level);
    }

    #[test]
    fn defaults_to_level_one_when_nothing_matches() {
        let t = LevelTable::new(vec![LevelThreshold::new(2, 50)]).unwrap();
        let p = t.resolve(10);
        assert_eq!(p.level, 1);
        assert_eq!(p.points_to_next, 40);

        let empty = LevelTable::default().resolve(500);
        assert_eq!(empty.level, 1);
        assert!(empty.is_max_level);
    }

    #[test]
    fn unsorted_input_is_ordered() {
        let t = LevelTable::new(vec![
            LevelThreshold::new(3, 200),
            LevelThreshold::new(1, 0),
            LevelThreshold::new(2, 100),
        ])
        .unwrap();
        assert_eq!(t.resolve(150).level, 2);
    }

    #[test]
    fn rejects_non_increasing_points() {
        let err = LevelTable::new(vec![LevelThreshold::new(1, 0), LevelThreshold::new(2, 0)])
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidLevelTable(_)));
    }

    #[test]
    fn level_never_decreases_as_lifetime_grows() {
        let t = table();
        let mut last = 0;
        for points in (0..400).step_by(7) {
            let level = t.resolve(points).level;
            assert!(level >= last);
            last = level;
        }
    }
}
