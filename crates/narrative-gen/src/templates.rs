//! Default prompts, static templates and hard-coded fallbacks
//!
//! Prompts and templates reference metadata fields as `{field}`; missing
//! fields render as the empty string.

use shared_types::{NarrativeKey, ReportMetadata};

const PROMPT_PREAMBLE: &str = "You are writing a section of a climate adaptation plan for \
{client_name}, a {industry} business located in {client_location}. Write in clear, \
professional British English for a business audience. Use plain paragraphs separated by \
blank lines; use '- ' bullet lines for lists. Do not include a heading.";

/// Default prompt for a narrative key
pub fn default_prompt(key: NarrativeKey) -> &'static str {
    match key {
        NarrativeKey::ExecutiveSummary => {
            "Write a concise executive summary (about 200 words) of the climate adaptation \
             plan, covering the main climate risks identified, the priority adaptation \
             actions and the expected benefits. Key risks noted: {key_risks}."
        }
        NarrativeKey::Introduction => {
            "Write an introduction (about 150 words) explaining why {client_name} has \
             prepared a climate adaptation plan and how the plan will be used. Business \
             description: {business_description}."
        }
        NarrativeKey::ClimateContext => {
            "Describe the projected climate for {client_location} (about 200 words), \
             covering temperature, rainfall, extreme heat and flooding under a high \
             emissions scenario to {projection_year}."
        }
        NarrativeKey::RiskAssessment => {
            "Summarise the climate risk assessment (about 200 words) for a {industry} \
             business, explaining how the identified risks could affect operations, \
             supply chains, staff and assets. Key risks noted: {key_risks}."
        }
        NarrativeKey::AdaptationStrategy => {
            "Describe the adaptation strategy (about 200 words), grouping actions into \
             near-term and longer-term measures and explaining how they reduce the \
             identified risks. Planned actions: {adaptation_actions}."
        }
        NarrativeKey::AdaptiveCapacity => {
            "Assess the adaptive capacity of {client_name} (about 150 words): current \
             strengths, gaps, and the capabilities that should be developed."
        }
        NarrativeKey::MonitoringReview => {
            "Explain how the plan will be monitored and reviewed (about 150 words), \
             including indicators, review frequency and responsibilities."
        }
        NarrativeKey::Conclusion => {
            "Write a short conclusion (about 120 words) restating the commitment of \
             {client_name} to adapting to climate change and the next steps."
        }
    }
}

/// Prompt for a key: the override when it is non-blank, otherwise the
/// default, with metadata filled in
pub fn build_prompt(key: &str, metadata: &ReportMetadata, prompt_override: Option<&str>) -> String {
    let body = match prompt_override.map(str::trim).filter(|p| !p.is_empty()) {
        Some(custom) => custom.to_string(),
        None => match key.parse::<NarrativeKey>() {
            Ok(key) => default_prompt(key).to_string(),
            Err(_) => format!(
                "Write a short section titled '{}' for the adaptation plan.",
                key.replace('_', " ")
            ),
        },
    };
    metadata.fill(&format!("{}\n\n{}", PROMPT_PREAMBLE, body))
}

/// Static template for a key, used when the text API gives nothing
pub fn static_template(key: NarrativeKey) -> &'static str {
    match key {
        NarrativeKey::ExecutiveSummary => {
            "This climate adaptation plan sets out how {client_name} will manage the risks \
             that a changing climate poses to its operations in {client_location}. It \
             identifies the most significant climate hazards, assesses their likely impact \
             on the business and prioritises practical adaptation actions.\n\n\
             Implementing the plan will reduce disruption from extreme weather, protect \
             assets and people, and position {client_name} to take advantage of \
             opportunities as conditions change."
        }
        NarrativeKey::Introduction => {
            "{client_name} has prepared this plan to understand and respond to the effects \
             of climate change on its {industry} activities in {client_location}. The plan \
             draws on climate projections and on the knowledge of the people who run the \
             business day to day."
        }
        NarrativeKey::ClimateContext => {
            "Climate projections for {client_location} indicate hotter, drier summers, \
             warmer and wetter winters, and more frequent extreme events such as heatwaves, \
             heavy rainfall and flooding. These changes are expected to intensify over the \
             coming decades under higher emissions scenarios."
        }
        NarrativeKey::RiskAssessment => "",
        NarrativeKey::AdaptationStrategy => "",
        NarrativeKey::AdaptiveCapacity => {
            "{client_name} already has strengths it can build on, including local knowledge \
             and established relationships. Developing skills, monitoring and contingency \
             planning will further increase its capacity to adapt."
        }
        NarrativeKey::MonitoringReview => {
            "Progress against this plan will be reviewed at least annually. Indicators will \
             be tracked and the plan updated following significant weather events or \
             changes to the business."
        }
        NarrativeKey::Conclusion => {
            "By acting on this plan, {client_name} is taking practical steps to remain \
             resilient as the climate changes in {client_location}."
        }
    }
}

/// Static template rendered with metadata, if the key has one
pub fn render_template(key: &str, metadata: &ReportMetadata) -> Option<String> {
    let key = key.parse::<NarrativeKey>().ok()?;
    let rendered = metadata.fill(static_template(key));
    let rendered = rendered.trim();
    if rendered.is_empty() {
        None
    } else {
        Some(rendered.to_string())
    }
}

/// Last-resort text; never empty
pub fn fallback_text(key: &str) -> String {
    let text = match key.parse::<NarrativeKey>() {
        Ok(NarrativeKey::ExecutiveSummary) => {
            "This plan identifies the key climate risks facing the business and the actions \
             that will be taken to adapt to them."
        }
        Ok(NarrativeKey::Introduction) => {
            "This document sets out the business's plan for adapting to climate change."
        }
        Ok(NarrativeKey::ClimateContext) => {
            "The local climate is projected to become warmer, with more frequent extreme \
             weather events."
        }
        Ok(NarrativeKey::RiskAssessment) => {
            "Climate risks have been assessed for their likelihood and their impact on the \
             business. The highest-rated risks are listed in the tables in this plan."
        }
        Ok(NarrativeKey::AdaptationStrategy) => {
            "The adaptation strategy prioritises actions that reduce the highest-rated \
             risks, starting with measures that can be taken in the near term."
        }
        Ok(NarrativeKey::AdaptiveCapacity) => {
            "The business has existing strengths to build on and has identified areas in \
             which its capacity to adapt can be developed."
        }
        Ok(NarrativeKey::MonitoringReview) => {
            "The plan will be monitored and reviewed regularly."
        }
        Ok(NarrativeKey::Conclusion) => {
            "The business is committed to implementing this plan and adapting to a changing \
             climate."
        }
        Err(_) => "This section will be completed as part of the next plan review.",
    };
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn metadata() -> ReportMetadata {
        ReportMetadata::from_json_str(
            r#"{"client_name": "Acme Farm", "client_location": "Devon", "industry": "dairy"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_default_prompt_is_filled() {
        let prompt = build_prompt("conclusion", &metadata(), None);
        assert!(prompt.contains("Acme Farm"));
        assert!(prompt.contains("dairy business located in Devon"));
        assert!(!prompt.contains("{client_name}"));
    }

    #[test]
    fn test_override_replaces_default_prompt() {
        let prompt = build_prompt(
            "conclusion",
            &metadata(),
            Some("Write a haiku about {client_location}."),
        );
        assert!(prompt.ends_with("Write a haiku about Devon."));
        assert!(!prompt.contains("restating the commitment"));
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let prompt = build_prompt("conclusion", &metadata(), Some("   "));
        assert!(prompt.contains("restating the commitment"));
    }

    #[test]
    fn test_missing_fields_render_empty() {
        let prompt = build_prompt("introduction", &ReportMetadata::new(), None);
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_render_template() {
        let text = render_template("conclusion", &metadata()).unwrap();
        assert!(text.contains("Acme Farm"));
        assert_eq!(render_template("risk_assessment", &metadata()), None);
        assert_eq!(render_template("not_a_section", &metadata()), None);
    }

    #[test]
    fn test_fallback_is_never_empty() {
        for key in NarrativeKey::ALL {
            assert!(!fallback_text(key.as_str()).is_empty());
        }
        assert!(!fallback_text("something_else").is_empty());
    }
}
