//! Human-readable grading reports

use crate::reference::ReferenceResult;
use serde::{Deserialize, Serialize};

/// Restrict a report to satisfied or unsatisfied references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowOnly {
    Satisfied,
    Unsatisfied,
}

impl ShowOnly {
    fn includes(self, result: &ReferenceResult) -> bool {
        match self {
            ShowOnly::Satisfied => result.satisfied,
            ShowOnly::Unsatisfied => !result.satisfied,
        }
    }
}

/// Render one block per reference result
///
/// Returns an empty string when `show_only` filters out every result.
pub fn generate_report(results: &[ReferenceResult], show_only: Option<ShowOnly>) -> String {
    let blocks: Vec<String> = results
        .iter()
        .filter(|result| show_only.map_or(true, |filter| filter.includes(result)))
        .map(render_result)
        .collect();

    blocks.join("\n")
}

fn render_result(result: &ReferenceResult) -> String {
    let mut report = String::new();

    if result.satisfied {
        report.push_str(&format!("✅ REFERENCE: {} (SATISFIED)\n", result.name));
    } else {
        report.push_str(&format!("❌ REFERENCE: {} (NOT SATISFIED)\n", result.name));
    }

    for annotation in &result.results {
        let mark = if annotation.satisfied { "✓" } else { "✗" };
        let fit = annotation
            .value
            .map(|class| class.name())
            .unwrap_or("no class fits");
        report.push_str(&format!(
            "  {} {} -> {}\n",
            mark, annotation.annotation, fit
        ));
    }

    report
}
