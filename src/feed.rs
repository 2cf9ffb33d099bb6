use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Split};

use crate::alert::{AlertCandidate, RawAlert};
use crate::detection::{Detection, RawDetection, PERSON_CLASS};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read feed {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid frame on line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
    #[error("line {line} is not valid UTF-8")]
    Encoding { line: usize },
}

const POSE_BOX_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameRecord {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
    #[serde(default)]
    pub alert: Option<RawAlert>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub detections: Vec<Detection>,
    pub alert: Option<AlertCandidate>,
}

impl From<FrameRecord> for Frame {
    fn from(record: FrameRecord) -> Self {
        let alert = record.alert.and_then(RawAlert::into_candidate);
        let mut detections: Vec<Detection> =
            record.detections.into_iter().map(Detection::from).collect();

        // pose services report no detections, only the alert boxes
        if detections.is_empty() {
            if let Some(alert) = &alert {
                detections = alert
                    .bounding_boxes
                    .iter()
                    .map(|bbox| Detection::new(PERSON_CLASS, POSE_BOX_CONFIDENCE, *bbox))
                    .collect();
            }
        }

        Self { detections, alert }
    }
}

/// Parse a single feed line. Blank lines yield `None`.
pub fn parse_frame(line: &str, line_no: usize) -> Result<Option<Frame>, FeedError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let record: FrameRecord = serde_json::from_str(line).map_err(|source| FeedError::Json {
        line: line_no,
        source,
    })?;
    Ok(Some(record.into()))
}

pub struct FeedReader {
    path: PathBuf,
    lines: Split<BufReader<File>>,
    line_no: usize,
    skipped: usize,
}

impl FeedReader {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, FeedError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|source| FeedError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            lines: BufReader::new(file).split(b'\n'),
            line_no: 0,
            skipped: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Malformed lines are logged and skipped.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, FeedError> {
        loop {
            let bytes = self.lines.next_segment().await.map_err(|source| FeedError::Io {
                path: self.path.clone(),
                source,
            })?;
            let Some(bytes) = bytes else {
                return Ok(None);
            };
            self.line_no += 1;

            let parsed = match String::from_utf8(bytes) {
                Ok(line) => parse_frame(&line, self.line_no),
                Err(_) => Err(FeedError::Encoding { line: self.line_no }),
            };

            match parsed {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) => continue,
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!(feed = %self.path.display(), "skipping frame: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{HANDS_UP, WEAPON};
    use crate::geometry::BoundingBox;
    use std::io::Write;

    #[test]
    fn test_parse_frame_normalizes() {
        let line = r#"{"detections":[
            {"class_name":" person ","confidence":1.7,"bbox":[10,10,50,100]},
            {"class_name":"person","confidence":0.5,"bbox":[10,10]}
        ],"alert":{"type_of_alert":"Hands_Up, Weapon","Image_bb":[[10,10,50,100],[1,2]]}}"#;

        let frame = parse_frame(line, 1).unwrap().unwrap();
        assert_eq!(frame.detections.len(), 2);
        assert_eq!(frame.detections[0].class_name, "person");
        assert_eq!(frame.detections[0].confidence, 1.0);
        assert_eq!(frame.detections[0].bbox, Some(BoundingBox::new(10.0, 10.0, 50.0, 100.0)));
        assert_eq!(frame.detections[1].bbox, None);

        let alert = frame.alert.unwrap();
        assert!(alert.contains(HANDS_UP));
        assert!(alert.contains(WEAPON));
        assert_eq!(alert.bounding_boxes.len(), 1);
    }

    #[test]
    fn test_parse_frame_no_alert() {
        let line = r#"{"alert":{"type_of_alert":"No_Alert","Image_bb":[[0,0,9,9]]}}"#;
        let frame = parse_frame(line, 1).unwrap().unwrap();
        assert!(frame.detections.is_empty());
        assert!(frame.alert.is_none());

        assert!(parse_frame("   ", 2).unwrap().is_none());
        assert!(matches!(
            parse_frame("{not json", 3),
            Err(FeedError::Json { line: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_reader_skips_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let person = r#"{"detections":[{"class_name":"person","bbox":[0,0,10,10]}]}"#;
        let weapon = r#"{"alert":{"type_of_alert":"Weapon","Image_bb":[[0,0,10,10]]}}"#;
        writeln!(file, "{person}").unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{weapon}").unwrap();
        file.flush().unwrap();

        let mut reader = FeedReader::open(file.path()).await.unwrap();
        let first = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(first.detections.len(), 1);

        let second = reader.next_frame().await.unwrap().unwrap();
        assert!(second.alert.unwrap().contains(WEAPON));

        assert!(reader.next_frame().await.unwrap().is_none());
        assert_eq!(reader.skipped(), 1);
    }

    #[tokio::test]
    async fn test_reader_skips_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let person = r#"{"detections":[{"class_name":"person","bbox":[0,0,10,10]}]}"#;
        let weapon = r#"{"alert":{"type_of_alert":"Weapon","Image_bb":[[0,0,10,10]]}}"#;
        writeln!(file, "{person}").unwrap();
        file.write_all(b"{\"x\":\"\xff\xfe\"}\n").unwrap();
        writeln!(file, "{weapon}").unwrap();
        file.flush().unwrap();

        let mut reader = FeedReader::open(file.path()).await.unwrap();
        assert_eq!(reader.next_frame().await.unwrap().unwrap().detections.len(), 1);

        let second = reader.next_frame().await.unwrap().unwrap();
        assert!(second.alert.unwrap().contains(WEAPON));
        assert!(reader.next_frame().await.unwrap().is_none());
        assert_eq!(reader.skipped(), 1);
    }

    #[test]
    fn test_pose_alert_boxes_become_detections() {
        let line = r#"{"alert":{"type_of_alert":"Hands_Up","Image_bb":[[10,10,50,100],[1,2]]}}"#;
        let frame = parse_frame(line, 1).unwrap().unwrap();

        assert_eq!(
            frame.detections,
            vec![Detection::new("person", 0.9, BoundingBox::new(10.0, 10.0, 50.0, 100.0))]
        );
        assert!(frame.alert.unwrap().contains(HANDS_UP));

        let with_detections = r#"{"detections":[{"class_name":"car","bbox":[0,0,5,5]}],
            "alert":{"type_of_alert":"Hands_Up","Image_bb":[[10,10,50,100]]}}"#;
        let frame = parse_frame(with_detections, 2).unwrap().unwrap();
        assert_eq!(frame.detections.len(), 1);
        assert_eq!(frame.detections[0].class_name, "car");
    }

    #[tokio::test]
    async fn test_open_missing_feed() {
        let dir = tempfile::tempdir().unwrap();
        let result = FeedReader::open(dir.path().join("missing.jsonl")).await;
        assert!(matches!(result, Err(FeedError::Io { .. })));
    }
}
