use std::fs;
use std::path::Path;
use tracing::{info, warn};
use sdui_core::legacy::LegacyImage;
use sdui_core::{Error, RequestId};
use crate::error::AppError;
use crate::generator::artifact::{encode_jpeg, ArtifactWriter};
use crate::generator::db::MetadataStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Reads a JSON array of rows in the retired inline-image schema.
pub fn load_legacy_export(path: &Path) -> Result<Vec<LegacyImage>, AppError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Moves legacy rows into the current layout: bytes become an artifact file,
/// the rest becomes a record.
///
/// Rows without image data, rows already in the store, rows whose seed or
/// sampling values have no canonical form and rows whose bytes do not decode
/// are skipped. Safe to run again over the same export.
pub async fn migrate_legacy(
    rows: Vec<LegacyImage>,
    artifacts: &ArtifactWriter,
    store: &dyn MetadataStore,
    jpeg_quality: u8,
) -> Result<MigrationReport, Error> {
    let mut report = MigrationReport::default();

    for row in rows {
        let id = RequestId::from_uuid(row.id);

        let Some(bytes) = row.image.as_deref().filter(|_| row.has_image()) else {
            warn!(legacy_id = %id, "Legacy row has no image, skipping");
            report.skipped += 1;
            continue;
        };

        if store.get(id).await?.is_some() {
            report.skipped += 1;
            continue;
        }

        let path = artifacts.path_for(id);
        let record = match row.to_record(path.clone()) {
            Ok(record) => record,
            Err(err) => {
                warn!(legacy_id = %id, "Legacy row skipped: {err}");
                report.skipped += 1;
                continue;
            }
        };

        // A file left by an interrupted earlier run is reused as is
        if !path.exists() {
            let jpeg = match image::load_from_memory(bytes) {
                Ok(decoded) => encode_jpeg(&decoded, jpeg_quality)?,
                Err(err) => {
                    warn!(legacy_id = %id, "Legacy image does not decode, skipping: {err}");
                    report.skipped += 1;
                    continue;
                }
            };
            artifacts.persist(&jpeg, id)?;
        }

        store.append(&record).await?;
        report.imported += 1;
    }

    info!(imported = report.imported, skipped = report.skipped, "Legacy migration done");
    Ok(report)
}
