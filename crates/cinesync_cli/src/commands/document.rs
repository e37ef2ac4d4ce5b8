//! Document command implementation.

use crate::settings::Settings;
use cinesync_engine::IndexWriter;
use std::io::Write;

/// Runs the `document` command.
pub async fn show(
    settings: &Settings,
    index: &str,
    id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let writer = settings.writer()?;
    let stdout = std::io::stdout();
    let found = write_document(&mut stdout.lock(), &writer, index, id).await?;
    if !found {
        tracing::debug!(index, id, "document not found");
    }
    Ok(())
}

/// Prints the stored source of one document. Returns false if it is absent.
async fn write_document(
    out: &mut impl Write,
    writer: &impl IndexWriter,
    index: &str,
    id: &str,
) -> Result<bool, Box<dyn std::error::Error>> {
    match writer.get(index, id).await? {
        Some(source) => {
            writeln!(out, "{}", serde_json::to_string_pretty(&source)?)?;
            Ok(true)
        }
        None => {
            writeln!(out, "No document {} in index {}.", id, index)?;
            Ok(false)
        }
    }
}
