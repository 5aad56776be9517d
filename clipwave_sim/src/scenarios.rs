//! Regression scenarios for the clipping machinery.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// CW-001: one stationary and one moving node, exact notification cadence
    PositionChange,

    /// CW-002: broadcast grid, clipped vs unclipped reception counts
    Clipping,

    /// CW-003: random walkers, index audited against ground truth
    RandomWalk,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::PositionChange, ScenarioId::Clipping, ScenarioId::RandomWalk]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::PositionChange => "position_change",
            ScenarioId::Clipping => "clipping",
            ScenarioId::RandomWalk => "random_walk",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::PositionChange => {
                "Stationary node times out every 4s, 100 u/s mover reports every 50 units"
            }
            ScenarioId::Clipping => "Grid of broadcasters 757 units apart, clip at 1070, compare with unclipped",
            ScenarioId::RandomWalk => "Random walkers with periodic broadcasts, index audited after every event",
        }
    }

    /// Default simulated duration in seconds.
    pub fn default_duration_secs(&self) -> f64 {
        match self {
            ScenarioId::PositionChange => 12.0,
            ScenarioId::Clipping => 100.0,
            ScenarioId::RandomWalk => 30.0,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "position_change" | "positionchange" | "cw-001" => Ok(ScenarioId::PositionChange),
            "clipping" | "cw-002" => Ok(ScenarioId::Clipping),
            "random_walk" | "randomwalk" | "cw-003" => Ok(ScenarioId::RandomWalk),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
        assert_eq!("CW-002".parse::<ScenarioId>(), Ok(ScenarioId::Clipping));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
