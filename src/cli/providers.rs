//! `providers` command implementation.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::cli::print_json;
use crate::core::models::Capability;
use crate::core::provider::{ProviderKind, Tier};
use crate::error::Result;
use crate::storage::config::Config;

/// One row of the provider listing.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRow {
    pub id: String,
    pub kind: ProviderKind,
    pub tier: Tier,
    pub priority: u32,
    pub capabilities: Vec<Capability>,
    /// Number of credential references in the ring (not resolved).
    pub credentials: usize,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Rows for every configured provider, lowest priority value first.
#[must_use]
pub fn rows(config: &Config) -> Vec<ProviderRow> {
    let mut rows: Vec<_> = config
        .providers
        .iter()
        .zip(config.descriptors())
        .map(|(entry, descriptor)| ProviderRow {
            id: descriptor.id,
            kind: descriptor.kind,
            tier: descriptor.tier,
            priority: descriptor.priority,
            capabilities: descriptor.capabilities,
            credentials: entry.credentials.len(),
            enabled: descriptor.enabled,
            endpoint: descriptor.endpoint,
        })
        .collect();
    rows.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    rows
}

/// Execute the `providers` command.
pub fn execute(config_path: Option<&Path>, format: OutputFormat, pretty: bool) -> Result<()> {
    let config = Config::load(config_path)?;
    let rows = rows(&config);

    match format {
        OutputFormat::Json => print_json(&rows, pretty),
        OutputFormat::Human => {
            print!("{}", render_table(&rows));
            Ok(())
        }
    }
}

fn render_table(rows: &[ProviderRow]) -> String {
    let mut out = format!(
        "{:<16} {:<12} {:<9} {:>8}  {:<28} {}\n",
        "ID", "KIND", "TIER", "PRIORITY", "CAPABILITIES", "CREDENTIALS"
    );
    out.push_str(&format!(
        "{:-<16} {:-<12} {:-<9} {:->8}  {:-<28} {:-<11}\n",
        "", "", "", "", "", ""
    ));
    for row in rows {
        let capabilities = row
            .capabilities
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let id = if row.enabled {
            row.id.clone()
        } else {
            format!("{} (off)", row.id)
        };
        out.push_str(&format!(
            "{:<16} {:<12} {:<9} {:>8}  {:<28} {}\n",
            id,
            row.kind.cli_name(),
            row.tier.as_str(),
            row.priority,
            capabilities,
            row.credentials
        ));
    }
    out
}
