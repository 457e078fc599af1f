use serde::{Deserialize, Serialize};

/// A named section of generated prose in the adaptation plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeKey {
    ExecutiveSummary,
    Introduction,
    ClimateContext,
    RiskAssessment,
    AdaptationStrategy,
    AdaptiveCapacity,
    MonitoringReview,
    Conclusion,
}

impl NarrativeKey {
    pub const ALL: [NarrativeKey; 8] = [
        NarrativeKey::ExecutiveSummary,
        NarrativeKey::Introduction,
        NarrativeKey::ClimateContext,
        NarrativeKey::RiskAssessment,
        NarrativeKey::AdaptationStrategy,
        NarrativeKey::AdaptiveCapacity,
        NarrativeKey::MonitoringReview,
        NarrativeKey::Conclusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NarrativeKey::ExecutiveSummary => "executive_summary",
            NarrativeKey::Introduction => "introduction",
            NarrativeKey::ClimateContext => "climate_context",
            NarrativeKey::RiskAssessment => "risk_assessment",
            NarrativeKey::AdaptationStrategy => "adaptation_strategy",
            NarrativeKey::AdaptiveCapacity => "adaptive_capacity",
            NarrativeKey::MonitoringReview => "monitoring_review",
            NarrativeKey::Conclusion => "conclusion",
        }
    }

    /// Heading text used in logs and progress messages
    pub fn title(&self) -> &'static str {
        match self {
            NarrativeKey::ExecutiveSummary => "Executive Summary",
            NarrativeKey::Introduction => "Introduction",
            NarrativeKey::ClimateContext => "Climate Context",
            NarrativeKey::RiskAssessment => "Climate Risk Assessment",
            NarrativeKey::AdaptationStrategy => "Adaptation Strategy",
            NarrativeKey::AdaptiveCapacity => "Adaptive Capacity",
            NarrativeKey::MonitoringReview => "Monitoring and Review",
            NarrativeKey::Conclusion => "Conclusion",
        }
    }

    /// Template marker the narrative replaces (`[[narrative:<key>]]`)
    pub fn marker(&self) -> String {
        format!("[[narrative:{}]]", self.as_str())
    }
}

impl std::fmt::Display for NarrativeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NarrativeKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NarrativeKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Unknown narrative key: {}", s))
    }
}

/// Which tier produced a narrative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    Cache,
    Ai,
    Template,
    Fallback,
}

impl NarrativeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NarrativeSource::Cache => "cache",
            NarrativeSource::Ai => "ai",
            NarrativeSource::Template => "template",
            NarrativeSource::Fallback => "fallback",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_marker_format() {
        assert_eq!(
            NarrativeKey::ExecutiveSummary.marker(),
            "[[narrative:executive_summary]]"
        );
    }

    proptest! {
        #[test]
        fn every_key_parses_from_its_name(idx in 0usize..NarrativeKey::ALL.len()) {
            let key = NarrativeKey::ALL[idx];
            prop_assert_eq!(key.as_str().parse::<NarrativeKey>(), Ok(key));
        }

        #[test]
        fn unknown_names_are_rejected(name in "[A-Z]{3,12}") {
            prop_assert!(name.parse::<NarrativeKey>().is_err());
        }
    }
}
