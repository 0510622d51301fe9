use super::client::RawAnalysis;
use crate::days::model::{
    AnalysisDetails, AnalysisResult, ImprovementSuggestion, Metric, Progress, ScanType,
};

/// Metrics that carry a 0-100 score and count towards the overall score.
pub const SCORE_METRICS: [&str; 12] = [
    "abs",
    "arms",
    "chest",
    "genetics",
    "muscleDefinition",
    "muscleMass",
    "posture",
    "potential",
    "proportions",
    "symmetry",
    "vascularity",
    "wellbeing",
];

const SUMMARY_SUGGESTIONS: usize = 3;

pub fn is_score_metric(key: &str) -> bool {
    SCORE_METRICS.contains(&key)
}

pub fn into_result(raw: &RawAnalysis) -> AnalysisResult {
    let details = details(raw);
    let body_fat = details
        .metrics
        .get("fatPercentage")
        .and_then(|m| m.percentage);
    AnalysisResult {
        general_score: Some(general_score(&details)),
        body_fat_percentage: body_fat,
        explanation: Some(summary(&details)),
        details: Some(details),
    }
}

fn details(raw: &RawAnalysis) -> AnalysisDetails {
    let mut out = AnalysisDetails::default();
    for (key, value) in raw {
        if key == "improvementSuggestions" {
            out.improvement_suggestions = value
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|s| serde_json::from_value::<ImprovementSuggestion>(s.clone()).ok())
                        .collect()
                })
                .unwrap_or_default();
            continue;
        }
        if !value.is_object() {
            continue;
        }
        if let Ok(metric) = serde_json::from_value::<Metric>(value.clone()) {
            out.metrics.insert(key.clone(), metric);
        }
    }
    out
}

/// Rounded mean of the score metrics present, 0 when there are none.
pub fn general_score(details: &AnalysisDetails) -> f64 {
    let scores: Vec<f64> = details
        .metrics
        .iter()
        .filter(|(key, _)| is_score_metric(key))
        .filter_map(|(_, m)| m.score)
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    (scores.iter().sum::<f64>() / scores.len() as f64).round()
}

fn summary(details: &AnalysisDetails) -> String {
    let mut points = Vec::new();
    if let Some(fat) = details.metrics.get("fatPercentage").and_then(|m| m.percentage) {
        points.push(format!("Body fat: {}%", fmt_number(fat)));
    }
    if let Some(age) = details.metrics.get("bodyAge").and_then(|m| m.age) {
        points.push(format!("Body age: {} years", fmt_number(age)));
    }
    if !details.improvement_suggestions.is_empty() {
        let top: Vec<&str> = details
            .improvement_suggestions
            .iter()
            .take(SUMMARY_SUGGESTIONS)
            .map(|s| s.suggestion.as_str())
            .collect();
        points.push(top.join(". "));
    }
    points.join(". ")
}

fn fmt_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Headline score for a day: rounded mean of the full-body detail scores.
pub fn total_score(progress: &Progress) -> f64 {
    progress
        .get(&ScanType::Fullbody)
        .and_then(|r| r.details.as_ref())
        .map(general_score)
        .unwrap_or(0.0)
}

/// Full-body fat percentage formatted for display, `-` when unknown.
pub fn average_body_fat(progress: &Progress) -> String {
    progress
        .get(&ScanType::Fullbody)
        .and_then(|r| r.details.as_ref())
        .and_then(|d| d.metrics.get("fatPercentage"))
        .and_then(|m| m.percentage)
        .map(|p| format!("{}%", fmt_number(p)))
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn raw(v: Value) -> RawAnalysis {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn sample() -> RawAnalysis {
        raw(json!({
            "abs": { "score": 70, "explanation": "defined" },
            "arms": { "score": 81 },
            "chest": { "score": null },
            "fatPercentage": { "percentage": 14.5, "explanation": "lean" },
            "bodyAge": { "age": 27 },
            "timeToGoal": { "monthsNumber": 6 },
            "improvementSuggestions": [
                { "suggestion": "Train legs", "explanation": "imbalance" },
                { "suggestion": "Sleep more", "explanation": "recovery" },
                { "suggestion": "Eat protein", "explanation": "growth" },
                { "suggestion": "Stretch", "explanation": "posture" }
            ],
            "model": "v2"
        }))
    }

    #[test]
    fn general_score_is_rounded_mean_of_present_scores() {
        let result = into_result(&sample());
        // (70 + 81) / 2 = 75.5
        assert_eq!(result.general_score, Some(76.0));
    }

    #[test]
    fn general_score_defaults_to_zero() {
        let result = into_result(&raw(json!({ "fatPercentage": { "percentage": 20 } })));
        assert_eq!(result.general_score, Some(0.0));
        assert_eq!(result.body_fat_percentage, Some(20.0));
    }

    #[test]
    fn unknown_metrics_do_not_count_towards_score() {
        let result = into_result(&raw(json!({
            "abs": { "score": 50 },
            "jawline": { "score": 100 }
        })));
        assert_eq!(result.general_score, Some(50.0));
        assert!(result.details.unwrap().metrics.contains_key("jawline"));
    }

    #[test]
    fn summary_mentions_fat_age_and_top_three_suggestions() {
        let result = into_result(&sample());
        assert_eq!(
            result.explanation.as_deref(),
            Some("Body fat: 14.5%. Body age: 27 years. Train legs. Sleep more. Eat protein")
        );
    }

    #[test]
    fn details_keep_every_metric_and_all_suggestions() {
        let details = into_result(&sample()).details.unwrap();
        assert_eq!(details.metrics["timeToGoal"].months_number, Some(6.0));
        assert_eq!(details.metrics["bodyAge"].age, Some(27.0));
        assert_eq!(details.improvement_suggestions.len(), 4);
        assert!(!details.metrics.contains_key("model"));
    }

    #[test]
    fn daily_summary_helpers() {
        let mut progress = Progress::new();
        assert_eq!(total_score(&progress), 0.0);
        assert_eq!(average_body_fat(&progress), "-");

        progress.insert(ScanType::Fullbody, into_result(&sample()));
        assert_eq!(total_score(&progress), 76.0);
        assert_eq!(average_body_fat(&progress), "14.5%");
    }
}
