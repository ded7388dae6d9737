//! CSV reports: every detected track and every track flagged for review.
//!
//! Both files are append-only during a run and keyed by `track_id`: a row
//! whose id is already in the file is never written twice, so a resumed run
//! reproduces the same files. `export` rebuilds both from the state store.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bhasha_core::model::{Classification, ClassificationRecord, Language, Status, Thresholds};
use bhasha_core::schema::Database;

use crate::error::{PipelineError, PipelineResult};

/// Header of the detected-tracks report.
pub fn detected_header() -> Vec<String> {
    let mut header: Vec<String> = ["track_id", "name", "artists", "added_at", "languages"]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    for language in Language::ALL {
        header.push(format!("{}_confidence", language.slug()));
        header.push(format!("in_{}_playlist", language.slug()));
    }
    header
}

/// Header of the needs-review report.
pub fn review_header() -> Vec<String> {
    [
        "track_id",
        "name",
        "artists",
        "added_at",
        "review_languages",
        "review_confidences",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn track_columns(record: &ClassificationRecord) -> Vec<String> {
    vec![
        record.track.id.to_string(),
        record.track.name.clone(),
        record.track.artists_display(),
        record.track.added_at_display(),
    ]
}

/// Detected-report row: included languages plus confidence and membership
/// for every supported language.
pub fn detected_row(record: &ClassificationRecord, classification: &Classification) -> Vec<String> {
    let mut row = track_columns(record);
    row.push(
        classification
            .included
            .iter()
            .map(|l| l.name())
            .collect::<Vec<_>>()
            .join(", "),
    );
    for language in Language::ALL {
        row.push(format!("{:.4}", record.confidence(language)));
        row.push(record.is_member(language).to_string());
    }
    row
}

/// Needs-review row: flagged languages and their confidences.
pub fn review_row(record: &ClassificationRecord, classification: &Classification) -> Vec<String> {
    let mut row = track_columns(record);
    row.push(
        classification
            .review
            .iter()
            .map(|l| l.name())
            .collect::<Vec<_>>()
            .join(", "),
    );
    row.push(
        classification
            .review
            .iter()
            .map(|l| format!("{}={:.4}", l.slug(), record.confidence(*l)))
            .collect::<Vec<_>>()
            .join("; "),
    );
    row
}

/// An append-only CSV file keyed by its first column.
#[derive(Debug)]
pub struct ReportWriter {
    path: PathBuf,
    header: Vec<String>,
    seen: HashSet<String>,
    writer: csv::Writer<File>,
}

impl ReportWriter {
    /// Open (or create) a report.
    ///
    /// Existing ids are loaded so that appends stay idempotent. A final row
    /// cut short by a crash is truncated away.
    pub fn open(path: impl Into<PathBuf>, header: Vec<String>) -> PipelineResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        drop_partial_row(&mut file)?;

        let is_new = file.metadata()?.len() == 0;
        let seen = if is_new {
            HashSet::new()
        } else {
            existing_ids(&path, &header)?
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(&header)?;
            writer.flush()?;
        }

        Ok(Self {
            path,
            header,
            seen,
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.seen.contains(track_id)
    }

    /// Number of data rows in the file.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Append a row unless its id is already present. The row is flushed
    /// and synced before returning.
    ///
    /// Returns whether the row was written.
    pub fn append(&mut self, row: &[String]) -> PipelineResult<bool> {
        let Some(id) = row.first() else {
            return Ok(false);
        };
        if self.seen.contains(id) {
            return Ok(false);
        }
        self.writer.write_record(row)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.seen.insert(id.clone());
        Ok(true)
    }

    /// Replace the whole file with `rows` (atomic rename).
    pub fn rewrite(&mut self, rows: &[Vec<String>]) -> PipelineResult<()> {
        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut tmp = csv::Writer::from_path(&tmp_path)?;
            tmp.write_record(&self.header)?;
            for row in rows {
                tmp.write_record(row)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_data()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        *self = Self::open(self.path.clone(), self.header.clone())?;
        Ok(())
    }
}

/// Truncate an unterminated trailing line left by an interrupted append.
fn drop_partial_row(file: &mut File) -> std::io::Result<()> {
    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut contents)?;
    if contents.is_empty() || contents.ends_with(b"\n") {
        return Ok(());
    }
    let keep = contents
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |idx| idx + 1);
    log::warn!("Dropping {} byte(s) of partial report row", contents.len() - keep);
    file.set_len(keep as u64)?;
    Ok(())
}

fn existing_ids(path: &Path, header: &[String]) -> PipelineResult<HashSet<String>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if found != header {
        return Err(PipelineError::ReportHeader {
            path: path.to_path_buf(),
        });
    }
    let mut ids = HashSet::new();
    for record in reader.records() {
        if let Some(id) = record?.get(0) {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}

/// Counts of rows written by an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub detected: usize,
    pub review: usize,
}

/// The detected-tracks report and the needs-review report.
#[derive(Debug)]
pub struct Reports {
    detected: ReportWriter,
    review: ReportWriter,
}

impl Reports {
    pub fn open(detected_path: impl Into<PathBuf>, review_path: impl Into<PathBuf>) -> PipelineResult<Self> {
        Ok(Self {
            detected: ReportWriter::open(detected_path, detected_header())?,
            review: ReportWriter::open(review_path, review_header())?,
        })
    }

    pub fn detected(&self) -> &ReportWriter {
        &self.detected
    }

    pub fn review(&self) -> &ReportWriter {
        &self.review
    }

    /// Append the rows a finalized record calls for.
    pub fn record(
        &mut self,
        record: &ClassificationRecord,
        classification: &Classification,
    ) -> PipelineResult<()> {
        if classification.is_detected() {
            self.detected
                .append(&detected_row(record, classification))?;
        }
        if classification.needs_review() {
            self.review.append(&review_row(record, classification))?;
        }
        Ok(())
    }

    /// Rebuild both reports from every finalized record in the store.
    pub fn export(&mut self, store: &Database, thresholds: &Thresholds) -> PipelineResult<ExportSummary> {
        let mut detected = Vec::new();
        let mut review = Vec::new();
        for record in store.list_by_status(Status::Finalized)? {
            let classification = record.classification(thresholds);
            if classification.is_detected() {
                detected.push(detected_row(&record, &classification));
            }
            if classification.needs_review() {
                review.push(review_row(&record, &classification));
            }
        }
        self.detected.rewrite(&detected)?;
        self.review.rewrite(&review)?;
        log::info!(
            "Exported {} detected and {} review row(s)",
            detected.len(),
            review.len()
        );
        Ok(ExportSummary {
            detected: detected.len(),
            review: review.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bhasha_core::model::Track;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn record(id: &str, scores: &[(Language, f64)]) -> (ClassificationRecord, Classification) {
        let thresholds = Thresholds::default();
        let mut record = ClassificationRecord::new(Track::new(
            id,
            "Kun Faya Kun",
            vec!["A.R. Rahman".to_string(), "Javed Ali".to_string()],
            Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap(),
        ));
        record.record_scores(scores.iter().copied().collect::<BTreeMap<_, _>>(), &thresholds);
        let classification = record.classification(&thresholds);
        for language in &classification.included {
            record.mark_member(*language);
        }
        record.mark_finalized();
        (record, classification)
    }

    #[test]
    fn test_detected_header() {
        let header = detected_header();
        assert_eq!(header.len(), 5 + 2 * Language::ALL.len());
        assert_eq!(header[5], "hindi_confidence");
        assert_eq!(header[6], "in_hindi_playlist");
        assert_eq!(header.last().unwrap(), "in_kannada_playlist");
    }

    #[test]
    fn test_detected_row_multi_language() {
        let (record, classification) =
            record("t1", &[(Language::Hindi, 0.85), (Language::Tamil, 0.82)]);
        let row = detected_row(&record, &classification);
        assert_eq!(
            row,
            vec![
                "t1",
                "Kun Faya Kun",
                "A.R. Rahman, Javed Ali",
                "2021-03-04T05:06:07",
                "Hindi, Tamil",
                "0.8500",
                "true",
                "0.8200",
                "true",
                "0.0000",
                "false",
                "0.0000",
                "false",
                "0.0000",
                "false",
            ]
        );
    }

    #[test]
    fn test_review_row() {
        let (record, classification) =
            record("t2", &[(Language::Telugu, 0.55), (Language::Kannada, 0.7)]);
        let row = review_row(&record, &classification);
        assert_eq!(row[4], "Telugu, Kannada");
        assert_eq!(row[5], "telugu=0.5500; kannada=0.7000");
    }

    #[test]
    fn test_append_is_idempotent_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("songs.csv");
        let (rec, classification) = record("t1", &[(Language::Hindi, 0.9)]);
        let row = detected_row(&rec, &classification);

        let mut writer = ReportWriter::open(&path, detected_header()).unwrap();
        assert!(writer.append(&row).unwrap());
        assert!(!writer.append(&row).unwrap());
        drop(writer);

        let mut writer = ReportWriter::open(&path, detected_header()).unwrap();
        assert!(writer.contains("t1"));
        assert!(!writer.append(&row).unwrap());
        assert_eq!(writer.len(), 1);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.starts_with("track_id,name,artists,added_at,languages,"));
        assert!(contents.contains("\"A.R. Rahman, Javed Ali\""));
    }

    #[test]
    fn test_partial_row_is_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("review.csv");
        {
            let mut writer = ReportWriter::open(&path, review_header()).unwrap();
            let (rec, classification) = record("t1", &[(Language::Hindi, 0.5)]);
            writer.append(&review_row(&rec, &classification)).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "t2,Half wri").unwrap();
        drop(file);

        let writer = ReportWriter::open(&path, review_header()).unwrap();
        assert!(writer.contains("t1"));
        assert!(!writer.contains("t2"));
        assert!(fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[test]
    fn test_foreign_header_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("songs.csv");
        fs::write(&path, "id,title\nx,y\n").unwrap();
        assert!(matches!(
            ReportWriter::open(&path, detected_header()),
            Err(PipelineError::ReportHeader { .. })
        ));
    }

    #[test]
    fn test_export_rebuilds_from_store() {
        let dir = TempDir::new().unwrap();
        let store = Database::open_in_memory().unwrap();
        let (a, _) = record("a", &[(Language::Hindi, 0.9)]);
        let (b, _) = record("b", &[(Language::Tamil, 0.5)]);
        let (c, _) = record("c", &[]);
        for rec in [&a, &b, &c] {
            store.commit_finalized(rec).unwrap();
        }

        let mut reports =
            Reports::open(dir.path().join("songs.csv"), dir.path().join("review.csv")).unwrap();
        let summary = reports.export(&store, &Thresholds::default()).unwrap();
        assert_eq!(summary, ExportSummary { detected: 1, review: 1 });
        assert!(reports.detected().contains("a"));
        assert!(reports.review().contains("b"));
        assert!(!reports.detected().contains("c"));

        // A second export produces the same files.
        let before = fs::read_to_string(reports.detected().path()).unwrap();
        reports.export(&store, &Thresholds::default()).unwrap();
        assert_eq!(fs::read_to_string(reports.detected().path()).unwrap(), before);
    }
}
