use serde::{Deserialize, Serialize};

/// Ordered pre-close steps of the sales pipeline.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Lead,
    Qualified,
    Proposal,
    Negotiation,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Lead,
        Stage::Qualified,
        Stage::Proposal,
        Stage::Negotiation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Lead => "LEAD",
            Stage::Qualified => "QUALIFIED",
            Stage::Proposal => "PROPOSAL",
            Stage::Negotiation => "NEGOTIATION",
        }
    }

    pub fn from_key(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LEAD" => Some(Stage::Lead),
            "QUALIFIED" => Some(Stage::Qualified),
            "PROPOSAL" => Some(Stage::Proposal),
            "NEGOTIATION" => Some(Stage::Negotiation),
            _ => None,
        }
    }

    /// Next stage in pipeline order; `None` at the last pre-close stage.
    pub fn next(self) -> Option<Self> {
        match self {
            Stage::Lead => Some(Stage::Qualified),
            Stage::Qualified => Some(Stage::Proposal),
            Stage::Proposal => Some(Stage::Negotiation),
            Stage::Negotiation => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Lead => "Lead",
            Stage::Qualified => "Qualified",
            Stage::Proposal => "Proposal",
            Stage::Negotiation => "Negotiation",
        }
    }

    pub fn sort_order(self) -> i16 {
        match self {
            Stage::Lead => 10,
            Stage::Qualified => 20,
            Stage::Proposal => 30,
            Stage::Negotiation => 40,
        }
    }

    /// Win probability in percent used to weight the forecast.
    pub fn probability(self) -> i16 {
        match self {
            Stage::Lead => 10,
            Stage::Qualified => 25,
            Stage::Proposal => 50,
            Stage::Negotiation => 70,
        }
    }

    pub fn info(self) -> StageInfo {
        StageInfo {
            key: self,
            display_name: self.display_name(),
            sort_order: self.sort_order(),
            probability: self.probability(),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a deal is still in the pipeline or closed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Open,
    Won,
    Lost,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Open => "OPEN",
            Outcome::Won => "WON",
            Outcome::Lost => "LOST",
        }
    }

    pub fn from_key(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(Outcome::Open),
            "WON" => Some(Outcome::Won),
            "LOST" => Some(Outcome::Lost),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::Open)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInfo {
    pub key: Stage,
    pub display_name: &'static str,
    pub sort_order: i16,
    pub probability: i16,
}

pub fn pipeline_stages() -> Vec<StageInfo> {
    Stage::ALL.iter().map(|stage| stage.info()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_in_order_and_stop_at_negotiation() {
        assert_eq!(Stage::Lead.next(), Some(Stage::Qualified));
        assert_eq!(Stage::Qualified.next(), Some(Stage::Proposal));
        assert_eq!(Stage::Proposal.next(), Some(Stage::Negotiation));
        assert_eq!(Stage::Negotiation.next(), None);
    }

    #[test]
    fn probabilities_increase_toward_close() {
        let probabilities: Vec<i16> = Stage::ALL.iter().map(|s| s.probability()).collect();
        assert!(probabilities.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(probabilities.iter().all(|p| (0..=100).contains(p)));
    }

    #[test]
    fn keys_parse_case_insensitively() {
        assert_eq!(Stage::from_key(" proposal "), Some(Stage::Proposal));
        assert_eq!(Stage::from_key("WON"), None);
        assert_eq!(Outcome::from_key("lost"), Some(Outcome::Lost));
        for stage in Stage::ALL {
            assert_eq!(Stage::from_key(stage.as_str()), Some(stage));
        }
    }

    #[test]
    fn stage_serializes_as_screaming_key() {
        let json = serde_json::to_string(&Stage::Negotiation).unwrap();
        assert_eq!(json, "\"NEGOTIATION\"");
    }
}
