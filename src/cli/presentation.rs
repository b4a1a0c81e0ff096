//! CLI presentation: comfy-table formatters for run and provider output.

use crate::provider::ProviderStatus;
use crate::types::{ItemId, Outcome};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use std::collections::HashMap;
use std::time::Duration;

/// Totals for one `summa run`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub provider: String,
    pub model: String,
    pub items: usize,
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn tally(&mut self, outcomes: &HashMap<ItemId, Outcome>) {
        self.succeeded = outcomes.values().filter(|o| o.is_success()).count();
        self.failed = outcomes.len() - self.succeeded;
    }
}

fn format_section_heading(title: &str) -> String {
    format!("{}\n{}", title, "-".repeat(title.len()))
}

pub fn format_run_summary(summary: &RunSummary) -> String {
    let rate = if summary.items == 0 {
        "-".to_string()
    } else {
        format!("{:.1}%", summary.succeeded as f64 * 100.0 / summary.items as f64)
    };

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec![
        "Provider".to_string(),
        format!("{} ({})", summary.provider, summary.model),
    ]);
    table.add_row(vec!["Items".to_string(), summary.items.to_string()]);
    table.add_row(vec!["Batches".to_string(), summary.batches.to_string()]);
    table.add_row(vec!["Succeeded".to_string(), summary.succeeded.to_string()]);
    table.add_row(vec!["Failed".to_string(), summary.failed.to_string()]);
    table.add_row(vec!["Success rate".to_string(), rate]);
    table.add_row(vec![
        "Elapsed".to_string(),
        format!("{:.1}s", summary.elapsed.as_secs_f64()),
    ]);

    format!("{}\n\n{}", format_section_heading("Summarization run"), table)
}

pub fn format_provider_status_table(entries: &[ProviderStatus]) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Providers"));
    if entries.is_empty() {
        out.push_str("No providers configured.\n");
        return out;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Name", "Type", "Model", "Default", "Status"]);
    for entry in entries {
        let status = match (&entry.last_error, entry.connected) {
            (Some(error), _) => format!("error: {}", error),
            (None, true) => "connected".to_string(),
            (None, false) => "not checked".to_string(),
        };
        table.add_row(vec![
            entry.name.clone(),
            entry.provider_type.to_string(),
            entry.model.clone(),
            if entry.is_default { "yes" } else { "" }.to_string(),
            status,
        ]);
    }
    out.push_str(&format!("{}\n", table));
    out
}
