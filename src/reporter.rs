//! Reporter: formats a [`RunSummary`] into a plain-text,
//! markdown-acceptable report. Delivery is left to the SMTP collaborator
//! (`src/smtp.rs`); this module only produces the message body.

use chrono::{DateTime, Utc};

use crate::model::RunSummary;

/// Render `summary` as a report body. `next_activation`, when the caller
/// is running under the scheduler, is appended as the final line.
pub fn render(summary: &RunSummary, next_activation: Option<DateTime<Utc>>) -> String {
    let mut out = String::new();

    out.push_str("# Kometa-AI run report\n\n");
    if let (Some(started), Some(finished)) = (summary.started_at, summary.finished_at) {
        out.push_str(&format!(
            "Run: {} → {} ({}s){}\n\n",
            started.to_rfc3339(),
            finished.to_rfc3339(),
            (finished - started).num_seconds(),
            if summary.dry_run { " [dry run]" } else { "" }
        ));
    }

    out.push_str(&format!(
        "Totals: {} added, {} removed, {} categories processed\n\n",
        summary.total_added(),
        summary.total_removed(),
        summary.categories.len()
    ));

    for category in &summary.categories {
        out.push_str(&format!(
            "## {}\n\nReused {}, asked {}\n",
            category.category, category.reused, category.asked
        ));
        if !category.added.is_empty() {
            out.push_str("\nAdded:\n");
            for title in &category.added {
                out.push_str(&format!("- {title}\n"));
            }
        }
        if !category.removed.is_empty() {
            out.push_str("\nRemoved:\n");
            for title in &category.removed {
                out.push_str(&format!("- {title}\n"));
            }
        }
        if !category.errors.is_empty() {
            out.push_str("\nErrors:\n");
            for err in &category.errors {
                out.push_str(&format!("- {err}\n"));
            }
        }
        out.push_str(&format!(
            "\nUsage: {} input tokens, {} output tokens, ${:.4}\n\n",
            category.usage.input_tokens, category.usage.output_tokens, category.usage.estimated_cost
        ));
    }

    out.push_str(&format!(
        "Total usage: {} input tokens, {} output tokens, ${:.4} across {} requests\n",
        summary.total_usage.input_tokens,
        summary.total_usage.output_tokens,
        summary.total_usage.estimated_cost,
        summary.total_usage.request_count
    ));

    if !summary.errors.is_empty() {
        out.push_str(&format!("\n{} run-level error(s):\n", summary.errors.len()));
        for err in &summary.errors {
            out.push_str(&format!("- [{}] {}\n", err.context, err.message));
        }
    }

    if let Some(next) = next_activation {
        out.push_str(&format!("\nNext scheduled run: {}\n", next.to_rfc3339()));
    }

    out
}

/// True if `summary` should produce a notification given the operator's
/// `notify_on_no_changes`/`notify_on_errors_only` preferences.
pub fn should_notify(summary: &RunSummary, notify_on_no_changes: bool, notify_on_errors_only: bool) -> bool {
    let has_changes = summary.total_added() > 0 || summary.total_removed() > 0;
    let has_errors = !summary.errors.is_empty() || summary.categories.iter().any(|c| !c.errors.is_empty());

    if notify_on_errors_only {
        return has_errors;
    }
    has_changes || has_errors || notify_on_no_changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategorySummary, UsageRecord};

    fn summary() -> RunSummary {
        RunSummary {
            started_at: Some(Utc::now()),
            finished_at: Some(Utc::now()),
            dry_run: false,
            categories: vec![CategorySummary {
                category: "Film Noir".into(),
                reused: 2,
                asked: 1,
                added: vec!["Chinatown".into()],
                removed: vec![],
                usage: UsageRecord { input_tokens: 100, output_tokens: 20, estimated_cost: 0.01, request_count: 1 },
                errors: vec![],
            }],
            total_usage: UsageRecord { input_tokens: 100, output_tokens: 20, estimated_cost: 0.01, request_count: 1 },
            errors: vec![],
        }
    }

    #[test]
    fn render_includes_category_and_totals() {
        let report = render(&summary(), None);
        assert!(report.contains("Film Noir"));
        assert!(report.contains("Chinatown"));
        assert!(report.contains("1 added"));
    }

    #[test]
    fn render_appends_next_activation_when_present() {
        let report = render(&summary(), Some(Utc::now()));
        assert!(report.contains("Next scheduled run"));
    }

    #[test]
    fn should_notify_true_when_changes_present() {
        assert!(should_notify(&summary(), false, false));
    }

    #[test]
    fn should_notify_false_for_no_op_run_without_opt_in() {
        let mut s = summary();
        s.categories[0].added.clear();
        assert!(!should_notify(&s, false, false));
    }

    #[test]
    fn notify_on_errors_only_suppresses_change_only_runs() {
        assert!(!should_notify(&summary(), false, true));
    }
}
