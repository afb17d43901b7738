use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::record::CharacterRecord;

/// Overwrite `path` with the records as a JSON array.
pub fn write_records(path: &Path, records: &[CharacterRecord]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!("Wrote {} records to {:?}", records.len(), path);
    Ok(())
}

/// Read the intermediate file. A missing file is not an error: it is logged
/// and `None` comes back so the caller can skip loading.
pub fn read_records(path: &Path) -> Result<Option<Vec<CharacterRecord>>> {
    if !path.exists() {
        warn!("Intermediate file not found: {:?}", path);
        return Ok(None);
    }
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let records: Vec<CharacterRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Malformed intermediate file {:?}", path))?;
    Ok(Some(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Gender, Status};

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/characters.json");
        let record = CharacterRecord {
            name: Some("Kohaku".into()),
            source_collection: Some("dr stone".into()),
            fandom: Some("dr-stone".into()),
            source_url: "https://dr-stone.fandom.com/wiki/Kohaku".into(),
            gender: Gender::Female,
            status: Status::Alive,
            image_url: None,
            scraped_at: crate::record::parse_timestamp("2025-03-01T12:00:00Z"),
        };
        write_records(&path, &[record.clone()]).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"gender\": \"Female\""));
        assert_eq!(read_records(&path).unwrap(), Some(vec![record]));
    }

    #[test]
    fn rewrite_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("characters.json");
        fs::write(&path, "[{\"name\": \"old\", \"source_url\": \"a\"}, {\"name\": \"old\", \"source_url\": \"b\"}]").unwrap();
        write_records(&path, &[]).unwrap();
        assert_eq!(read_records(&path).unwrap(), Some(vec![]));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_records(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn canonical_export_with_loose_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("characters.json");
        fs::write(
            &path,
            r#"[{"name": "Nana Osaki", "source_collection": "nana",
                 "source_url": "https://nana.fandom.com/wiki/Nana_Osaki",
                 "gender": "Female", "status": "Unknown", "image_url": null,
                 "scraped_at": "2025-01-12T09:30:15.123456"},
                {"name": null, "source_url": "https://nana.fandom.com/wiki/Y",
                 "scraped_at": "not a date"}]"#,
        )
        .unwrap();
        let records = read_records(&path).unwrap().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].scraped_at.is_some());
        assert!(records[1].name.is_none());
        assert!(records[1].scraped_at.is_none());
    }

    #[test]
    fn raw_labels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("characters.json");
        fs::write(
            &path,
            r#"[{"name": "Nana Komatsu", "source_url": "https://nana.fandom.com/wiki/Hachi",
                 "gender": "\u2640 Female", "status": "Alive"}]"#,
        )
        .unwrap();
        assert!(read_records(&path).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("characters.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(read_records(&path).is_err());
    }
}
