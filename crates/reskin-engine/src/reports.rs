//! Phase reports on disk, written as JCS so identical state gives identical bytes.

use camino::Utf8Path;
use serde::Serialize;
use serde::de::DeserializeOwned;

use reskin_utils::atomic_write::{append_line, write_file_atomic};
use reskin_utils::canonicalization::emit_jcs;
use reskin_utils::error::ReskinError;

pub fn write_report<T: Serialize>(path: &Utf8Path, report: &T) -> Result<(), ReskinError> {
    let json =
        emit_jcs(report).map_err(|e| ReskinError::serialization("report", format!("{e:#}")))?;
    write_file_atomic(path, &json).map_err(|e| ReskinError::write_failed(path, &e))?;
    Ok(())
}

/// `None` when the report has not been written yet.
pub fn read_report<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, ReskinError> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ReskinError::corrupted(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ReskinError::Io(e)),
    }
}

/// Append one JCS record to a JSON-lines log.
pub fn append_record<T: Serialize>(path: &Utf8Path, record: &T) -> Result<(), ReskinError> {
    let line =
        emit_jcs(record).map_err(|e| ReskinError::serialization("record", format!("{e:#}")))?;
    append_line(path, &line).map_err(|e| ReskinError::write_failed(path, &e))
}

/// Every record in a JSON-lines log, oldest first. A missing log is empty.
///
/// An unparsable final line is a torn append and is dropped; an unparsable line
/// anywhere else means the log is corrupted.
pub fn read_records<T: DeserializeOwned>(path: &Utf8Path) -> Result<Vec<T>, ReskinError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ReskinError::Io(e)),
    };
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut records = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(_) if index + 1 == lines.len() => {
                tracing::warn!(path = %path, "Dropping truncated final record");
            }
            Err(e) => {
                return Err(ReskinError::corrupted(path, format!("line {}: {e}", index + 1)));
            }
        }
    }
    Ok(records)
}

/// Replace a JSON-lines log with exactly `records`. An empty slice removes the log.
pub fn rewrite_records<T: Serialize>(path: &Utf8Path, records: &[T]) -> Result<(), ReskinError> {
    if records.is_empty() {
        return match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReskinError::Io(e)),
        };
    }
    let mut content = String::new();
    for record in records {
        let line =
            emit_jcs(record).map_err(|e| ReskinError::serialization("record", format!("{e:#}")))?;
        content.push_str(&line);
        content.push('\n');
    }
    write_file_atomic(path, &content).map_err(|e| ReskinError::write_failed(path, &e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        total: u32,
        cost: f64,
    }

    #[test]
    fn test_write_is_canonical_and_readable() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("r/report.json")).unwrap();
        assert!(read_report::<Sample>(&path).unwrap().is_none());

        let sample = Sample { total: 3, cost: 0.12 };
        write_report(&path, &sample).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"cost":0.12,"total":3}"#);
        assert_eq!(read_report::<Sample>(&path).unwrap(), Some(sample));
    }

    #[test]
    fn test_append_record() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("log.jsonl")).unwrap();
        append_record(&path, &Sample { total: 1, cost: 0.0 }).unwrap();
        append_record(&path, &Sample { total: 2, cost: 0.5 }).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_read_records_skips_torn_tail() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("log.jsonl")).unwrap();
        assert!(read_records::<Sample>(&path).unwrap().is_empty());

        append_record(&path, &Sample { total: 1, cost: 0.0 }).unwrap();
        append_record(&path, &Sample { total: 2, cost: 0.5 }).unwrap();
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str(r#"{"cost":0.2,"to"#);
        std::fs::write(&path, &content).unwrap();

        let records = read_records::<Sample>(&path).unwrap();
        assert_eq!(records, vec![Sample { total: 1, cost: 0.0 }, Sample { total: 2, cost: 0.5 }]);
    }

    #[test]
    fn test_read_records_rejects_damaged_interior_line() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("log.jsonl")).unwrap();
        std::fs::write(&path, "{\"cost\":0.0,\"total\":1}\nnot json\n{\"cost\":0.0,\"total\":3}\n")
            .unwrap();
        let err = read_records::<Sample>(&path).unwrap_err();
        assert!(matches!(err, ReskinError::ArtifactCorrupted { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_rewrite_records_keeps_only_given_records() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("log.jsonl")).unwrap();
        for total in 1..=3 {
            append_record(&path, &Sample { total, cost: 0.5 }).unwrap();
        }
        rewrite_records(&path, &[Sample { total: 1, cost: 0.5 }]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"cost\":0.5,\"total\":1}\n");

        rewrite_records::<Sample>(&path, &[]).unwrap();
        assert!(!path.exists());
        rewrite_records::<Sample>(&path, &[]).unwrap();
    }
}
