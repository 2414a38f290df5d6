//! Contact loading and the startup announcement.
//!
//! Contacts are a phone-number column in a CSV fetched from a URL (e.g. a
//! published Google Sheet). Nothing is persisted: the list is fetched, used
//! for one announcement pass, and dropped.

use crate::channels::ChannelHandle;
use anyhow::{Context, Result};

/// Fetch the CSV at `url` and extract the `column` values.
///
/// Missing column is an error so the caller can log it; rows with an empty
/// value in the column are skipped. Parsing is a plain comma split — the
/// source is a machine-exported sheet, not hand-written CSV.
pub async fn fetch_contacts(
    client: &reqwest::Client,
    url: &str,
    column: &str,
) -> Result<Vec<String>> {
    let res = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("fetching contacts from {}", url))?;
    if !res.status().is_success() {
        anyhow::bail!("contact source returned {}", res.status());
    }
    let body = res.text().await.context("reading contact csv body")?;
    parse_phone_column(&body, column)
}

/// Extract `column` from CSV text. The header row names the columns.
pub fn parse_phone_column(csv: &str, column: &str) -> Result<Vec<String>> {
    // Sheet exports often carry a UTF-8 BOM in front of the first header cell.
    let csv = csv.strip_prefix('\u{feff}').unwrap_or(csv);
    let mut lines = csv.lines();
    let header = lines.next().unwrap_or("");
    let index = header
        .split(',')
        .position(|h| h.trim() == column)
        .with_context(|| format!("contact source is missing a '{}' column", column))?;
    let contacts = lines
        .filter_map(|line| line.split(',').nth(index))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    Ok(contacts)
}

/// Bulk announcer: one sequential template send per contact, at startup only.
/// Per-send failures are logged and skipped; there is no batching or backoff,
/// so a large list blocks startup linearly.
pub async fn announce(
    channel: &dyn ChannelHandle,
    contacts: &[String],
    template_name: &str,
    template_lang: &str,
) {
    log::info!("announcing '{}' to {} contact(s)", template_name, contacts.len());
    for to in contacts {
        if let Err(e) = channel.send_template(to, template_name, template_lang).await {
            log::warn!("announcement to {} failed: {}", to, e);
        }
    }
    log::info!("announcement pass finished");
}
