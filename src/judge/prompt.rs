use crate::config::Scoring;
use crate::manifest::{Category, Sample};

pub const SYSTEM_PROMPT: &str = "You are a strict evaluator of instruction-based image editing. \
You compare an edited image against the editing instruction, the original image and the \
reference answer, and you grade it on three dimensions. Follow the output format exactly.";

const USER_TEMPLATE: &str = "\
Editing instruction:
{instruction}

Reasoning category: {category}
Subtask: {subtask}

Reference answer:
{reference}

{category_guidance}

The images attached below are, in order: {image_roles}.

Score the edited image on each dimension with an integer from {min} to {max}:
- Consistency: content that the instruction does not ask to change is preserved.
- Reasoning: the edit reflects the correct outcome of the {category_short} reasoning required.
- Quality: the edited image is visually plausible and free of artifacts.

Respond with exactly these four lines and nothing else:
Consistency: <score>
Reasoning: <score>
Quality: <score>
Rationale: <one short paragraph>";

fn category_guidance(category: Category) -> &'static str {
    match category {
        Category::TemporalReasoning => {
            "Check that the scene shows the state the instruction implies after the stated passage of time."
        }
        Category::CausalReasoning => {
            "Check that the edit shows the physical consequence of the described cause."
        }
        Category::SpatialReasoning => {
            "Check positions, orientations and arrangements against the instruction."
        }
        Category::LogicalReasoning => {
            "Check that the drawn solution is the logically correct one (e.g. a solved puzzle), not only plausible."
        }
    }
}

fn category_short(category: Category) -> &'static str {
    match category {
        Category::TemporalReasoning => "temporal",
        Category::CausalReasoning => "causal",
        Category::SpatialReasoning => "spatial",
        Category::LogicalReasoning => "logical",
    }
}

pub fn render_user_prompt(sample: &Sample, scoring: &Scoring, image_roles: &[&str]) -> String {
    let reference = sample
        .reference
        .as_deref()
        .unwrap_or("(no textual reference; judge from the instruction)");
    USER_TEMPLATE
        .replace("{instruction}", &sample.instruction)
        .replace("{category}", sample.category.as_str())
        .replace("{category_short}", category_short(sample.category))
        .replace("{subtask}", &sample.subtask)
        .replace("{reference}", reference)
        .replace("{category_guidance}", category_guidance(sample.category))
        .replace("{image_roles}", &image_roles.join(", then "))
        .replace("{min}", &format_score(scoring.min_score))
        .replace("{max}", &format_score(scoring.max_score))
}

fn format_score(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_placeholder() {
        let sample = Sample {
            index: 4,
            category: Category::SpatialReasoning,
            subtask: "rotation".into(),
            instruction: "Turn the chair to face left.".into(),
            reference: None,
            source_image: None,
            reasoning_image: None,
        };
        let text = render_user_prompt(&sample, &Scoring::default(), &["a", "b"]);
        assert!(!text.contains('{'), "{text}");
        assert!(text.contains("from 1 to 5"));
        assert!(text.contains("a, then b"));
        assert!(text.contains("spatial reasoning required"));
    }
}
