//! Streaming reader for the `{"videos": [...]}` export.
//!
//! The whole document is never held in memory: a background thread walks the
//! top-level object with a `DeserializeSeed` and hands each element of the
//! `videos` array over a bounded channel.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};

use crate::ingest::record::RawVideo;
use crate::ingest::IngestError;
use crate::models::VideoRecord;

/// Elements parsed ahead of the consumer.
const READ_AHEAD: usize = 256;

const CONSUMER_GONE: &str = "video reader dropped";

type Sender = SyncSender<Result<RawVideo, IngestError>>;

/// Lazy, finite, non-restartable sequence of [`VideoRecord`]s.
///
/// The first error ends the sequence. Dropping the reader stops the parser
/// thread at its next element.
pub struct VideoReader {
    receiver: Receiver<Result<RawVideo, IngestError>>,
    handle: Option<JoinHandle<()>>,
    next_index: u64,
    finished: bool,
}

impl VideoReader {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => IngestError::SourceMissing(path.to_path_buf()),
            _ => IngestError::Io(e),
        })?;

        let (sender, receiver) = sync_channel(READ_AHEAD);
        let handle = thread::Builder::new()
            .name("video-reader".to_string())
            .spawn(move || parse_document(file, sender))?;

        Ok(Self {
            receiver,
            handle: Some(handle),
            next_index: 0,
            finished: false,
        })
    }

    /// Discard the first `count` elements without converting them.
    ///
    /// Used when resuming a partial load. Parse errors in the skipped region
    /// still surface. Returns how many elements were actually skipped, which
    /// is less than `count` only if the document is shorter.
    pub fn skip_committed(&mut self, count: u64) -> Result<u64, IngestError> {
        let mut skipped = 0;
        while skipped < count && !self.finished {
            match self.receiver.recv() {
                Ok(Ok(_)) => {
                    self.next_index += 1;
                    skipped += 1;
                }
                Ok(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                Err(_) => {
                    self.finished = true;
                    self.join()?;
                }
            }
        }
        Ok(skipped)
    }

    /// Position of the next element in the source array.
    pub fn position(&self) -> u64 {
        self.next_index
    }

    fn join(&mut self) -> Result<(), IngestError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle.join().map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "reader thread panicked".to_string());
            IngestError::Reader(message)
        })
    }
}

impl Iterator for VideoReader {
    type Item = Result<VideoRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.receiver.recv() {
            Ok(Ok(raw)) => {
                let index = self.next_index;
                self.next_index += 1;
                let record = raw.into_record(index, Utc::now().naive_utc());
                if record.is_err() {
                    self.finished = true;
                }
                Some(record)
            }
            Ok(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            Err(_) => {
                self.finished = true;
                self.join().err().map(Err)
            }
        }
    }
}

fn parse_document(file: File, sender: Sender) {
    let mut de = serde_json::Deserializer::from_reader(BufReader::new(file));
    let result = DocumentSeed { sender: &sender }
        .deserialize(&mut de)
        .and_then(|()| de.end());

    if let Err(e) = result {
        // Fails only when the consumer is already gone.
        let _ = sender.send(Err(IngestError::Parse(e)));
    }
}

struct DocumentSeed<'a> {
    sender: &'a Sender,
}

impl<'de, 'a> DeserializeSeed<'de> for DocumentSeed<'a> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for DocumentSeed<'a> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object with a `videos` array")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            if key == "videos" {
                map.next_value_seed(VideosSeed { sender: self.sender })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

struct VideosSeed<'a> {
    sender: &'a Sender,
}

impl<'de, 'a> DeserializeSeed<'de> for VideosSeed<'a> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de, 'a> Visitor<'de> for VideosSeed<'a> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of videos")
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        Ok(())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(video) = seq.next_element::<RawVideo>()? {
            self.sender
                .send(Ok(video))
                .map_err(|_| de::Error::custom(CONSUMER_GONE))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn document(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reads_videos_in_order() {
        let file = document(
            r#"{"meta": {"exported": true}, "videos": [
                {"id": "a", "creator_id": "c", "video_created_at": "2024-01-01T00:00:00"},
                {"id": "b", "creator_id": "c", "video_created_at": "2024-01-01T00:00:00",
                 "snapshots": [{"id": "s", "created_at": "2024-01-02T00:00:00"}]}
            ], "trailer": [1, 2, 3]}"#,
        );

        let records: Vec<VideoRecord> = VideoReader::open(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.video.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(records[1].snapshots.len(), 1);
    }

    #[test]
    fn test_document_without_videos_is_empty() {
        let file = document(r#"{"other": 1}"#);
        assert_eq!(VideoReader::open(file.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_file_reports_source_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = VideoReader::open(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(IngestError::SourceMissing(_))));
    }

    #[test]
    fn test_truncated_document_yields_error_then_stops() {
        let file = document(
            r#"{"videos": [{"id": "a", "creator_id": "c", "video_created_at": "2024-01-01"}, {"id": "#,
        );

        let mut reader = VideoReader::open(file.path()).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next(), Some(Err(IngestError::Parse(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_skip_committed_advances_position() {
        let file = document(
            r#"{"videos": [
                {"id": "a", "creator_id": "c", "video_created_at": "2024-01-01"},
                {"id": "b", "creator_id": "c", "video_created_at": "2024-01-01"},
                {"id": "c", "creator_id": "c", "video_created_at": "2024-01-01"}
            ]}"#,
        );

        let mut reader = VideoReader::open(file.path()).unwrap();
        assert_eq!(reader.skip_committed(2).unwrap(), 2);
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.next().unwrap().unwrap().video.id, "c");
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_records_are_stamped_when_consumed() {
        let file = document(
            r#"{"videos": [
                {"id": "a", "creator_id": "c", "video_created_at": "2024-01-01"},
                {"id": "b", "creator_id": "c", "video_created_at": "2024-01-01"}
            ]}"#,
        );

        let mut reader = VideoReader::open(file.path()).unwrap();
        let first = reader.next().unwrap().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let second = reader.next().unwrap().unwrap();

        assert!(second.video.created_at > first.video.created_at);
        assert_eq!(second.video.created_at, second.video.updated_at);
    }
}
