//! Append-only mutation log for the durable backend.
//!
//! On-disk format, one frame per entry:
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized LogEntry)]
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{KvError, KvResult};
use crate::types::Revision;

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Flush/sync strategy for the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every append.
    EveryWrite,
    /// Flush to the OS and rely on its page cache.
    #[default]
    OsDefault,
}

/// A single logged mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LogEntry {
    /// Store revision after the mutation.
    pub revision: Revision,
    pub op: LogOp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum LogOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
    /// Carries the store revision across a compaction that dropped the
    /// entries which produced it.
    Checkpoint,
}

/// Points in [`MutationLog::append`] where tests can make I/O fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FailPoint {
    /// After the frame is buffered, before it reaches the file.
    Flush,
    /// After the frame reaches the file, before it is synced.
    Sync,
    /// While cutting a failed frame back off the file.
    Truncate,
}

/// The mutation log file.
///
/// Entries that fail the CRC check on recovery are skipped; a truncated
/// tail (a torn write from a crash) ends recovery.
///
/// A failed append is rolled back: its buffered bytes are discarded and the
/// file is cut back to the last complete frame. If that rollback fails too
/// the log closes, and every later append returns [`KvError::Closed`] until
/// the log is reopened or rewritten.
pub(crate) struct MutationLog {
    path: PathBuf,
    /// `None` once the log has closed.
    writer: Option<BufWriter<File>>,
    /// End offset of the last complete frame.
    offset: u64,
    sync_mode: SyncMode,
    #[cfg(test)]
    fail_points: Vec<FailPoint>,
}

impl MutationLog {
    /// Open (or create) the log at `path`.
    pub(crate) fn open(path: &Path, sync_mode: SyncMode) -> KvResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            offset,
            sync_mode,
            #[cfg(test)]
            fail_points: Vec::new(),
        })
    }

    /// Append one entry and make it as durable as the sync mode demands.
    /// Returns the byte offset of the entry.
    ///
    /// On error nothing of the entry is left in the log, unless the log had
    /// to close (see [`MutationLog`]).
    pub(crate) fn append(&mut self, entry: &LogEntry) -> KvResult<u64> {
        let payload =
            bincode::serialize(entry).map_err(|e| KvError::Serialization(e.to_string()))?;
        let entry_offset = self.offset;
        self.writer_mut()?;

        if let Err(e) = self.write_frame_durably(&payload) {
            warn!(offset = entry_offset, error = %e, "log append failed; rolling back");
            if let Err(rollback) = self.roll_back() {
                warn!(path = %self.path.display(), error = %rollback, "log rollback failed; closing log");
            }
            return Err(e);
        }

        self.offset += (HEADER_SIZE + payload.len()) as u64;
        debug!(offset = entry_offset, len = payload.len(), "log append");
        Ok(entry_offset)
    }

    fn write_frame_durably(&mut self, payload: &[u8]) -> KvResult<()> {
        write_frame(self.writer_mut()?, payload)?;
        self.inject(FailPoint::Flush)?;
        self.writer_mut()?.flush()?;
        self.inject(FailPoint::Sync)?;
        if self.sync_mode == SyncMode::EveryWrite {
            self.writer_mut()?.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Discard unwritten bytes and cut the file back to `self.offset`.
    ///
    /// The writer is only put back once the file is known to end at a frame
    /// boundary; otherwise the log stays closed.
    fn roll_back(&mut self) -> KvResult<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        // `into_parts` hands back the buffer instead of flushing it.
        let (file, _unwritten) = writer.into_parts();
        self.inject(FailPoint::Truncate)?;
        file.set_len(self.offset)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn writer_mut(&mut self) -> KvResult<&mut BufWriter<File>> {
        self.writer.as_mut().ok_or_else(|| {
            KvError::Closed(format!(
                "{} closed after a failed write",
                self.path.display()
            ))
        })
    }

    #[cfg(test)]
    pub(crate) fn fail_at(&mut self, points: &[FailPoint]) {
        self.fail_points = points.to_vec();
    }

    #[cfg(test)]
    fn inject(&mut self, at: FailPoint) -> KvResult<()> {
        match self.fail_points.iter().position(|p| *p == at) {
            Some(i) => {
                self.fail_points.remove(i);
                Err(io::Error::other(format!("injected failure at {at:?}")).into())
            }
            None => Ok(()),
        }
    }

    #[cfg(not(test))]
    fn inject(&mut self, _at: FailPoint) -> KvResult<()> {
        Ok(())
    }

    /// Read every valid entry from the start of the file.
    pub(crate) fn recover(&self) -> KvResult<Vec<LogEntry>> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let file_len = reader.get_ref().metadata()?.len();
        let mut entries = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            let mut header = [0u8; HEADER_SIZE];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + u64::from(length) > file_len {
                warn!(offset, length, file_len, "invalid log entry length; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated log entry; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            offset += HEADER_SIZE as u64 + u64::from(length);

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping entry");
                continue;
            }

            match bincode::deserialize::<LogEntry>(&payload) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(offset, error = %e, "undecodable log entry; skipping"),
            }
        }

        debug!(recovered = entries.len(), "log recovery complete");
        Ok(entries)
    }

    /// Atomically replace the log contents with `entries`.
    ///
    /// Writes a sibling temp file, syncs it, then renames it over the log.
    /// A closed log is open again afterwards.
    pub(crate) fn rewrite(&mut self, entries: &[LogEntry]) -> KvResult<()> {
        let tmp_path = self.path.with_extension("compact");
        let mut written: u64 = 0;
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for entry in entries {
                let payload = bincode::serialize(entry)
                    .map_err(|e| KvError::Serialization(e.to_string()))?;
                write_frame(&mut tmp, &payload)?;
                written += (HEADER_SIZE + payload.len()) as u64;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        self.offset = written;

        debug!(entries = entries.len(), bytes = written, "log rewritten");
        Ok(())
    }

    /// Current end-of-file offset.
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }
}

fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> KvResult<()> {
    let length = u32::try_from(payload.len())
        .map_err(|_| KvError::Serialization(format!("log entry too large: {} bytes", payload.len())))?;
    let crc = crc32fast::hash(payload);
    w.write_all(&length.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    fn put(rev: u64, key: &str, value: &[u8]) -> LogEntry {
        LogEntry {
            revision: Revision::new(rev),
            op: LogOp::Put {
                key: key.into(),
                value: value.to_vec(),
            },
        }
    }

    #[test]
    fn append_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.log");
        let mut log = MutationLog::open(&path, SyncMode::EveryWrite).unwrap();

        let e1 = put(1, "a", b"1");
        let e2 = LogEntry {
            revision: Revision::new(2),
            op: LogOp::Delete { key: "a".into() },
        };
        assert_eq!(log.append(&e1).unwrap(), 0);
        assert!(log.append(&e2).unwrap() > 0);

        let reopened = MutationLog::open(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(reopened.recover().unwrap(), vec![e1, e2]);
        assert_eq!(reopened.offset(), log.offset());
    }

    #[test]
    fn torn_tail_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.log");
        let mut log = MutationLog::open(&path, SyncMode::OsDefault).unwrap();
        log.append(&put(1, "a", b"1")).unwrap();
        log.append(&put(2, "b", b"2")).unwrap();
        drop(log);

        // Chop off the last few bytes as a crash mid-write would.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.set_len(len - 3).unwrap();

        let log = MutationLog::open(&path, SyncMode::OsDefault).unwrap();
        let entries = log.recover().unwrap();
        assert_eq!(entries, vec![put(1, "a", b"1")]);
    }

    #[test]
    fn corrupt_entry_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.log");
        let mut log = MutationLog::open(&path, SyncMode::OsDefault).unwrap();
        log.append(&put(1, "a", b"1")).unwrap();
        let second = log.append(&put(2, "b", b"2")).unwrap();
        log.append(&put(3, "c", b"3")).unwrap();
        drop(log);

        // Flip a payload byte of the middle entry.
        let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(second + HEADER_SIZE as u64 + 2)).unwrap();
        let mut b = [0u8; 1];
        file.read_exact(&mut b).unwrap();
        file.seek(SeekFrom::Start(second + HEADER_SIZE as u64 + 2)).unwrap();
        file.write_all(&[b[0] ^ 0xFF]).unwrap();
        drop(file);

        let log = MutationLog::open(&path, SyncMode::OsDefault).unwrap();
        let entries = log.recover().unwrap();
        assert_eq!(entries, vec![put(1, "a", b"1"), put(3, "c", b"3")]);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.log");
        let mut log = MutationLog::open(&path, SyncMode::OsDefault).unwrap();
        for i in 1..=5 {
            log.append(&put(i, "a", &[i as u8])).unwrap();
        }
        let before = log.offset();

        let compacted = vec![put(5, "a", &[5])];
        log.rewrite(&compacted).unwrap();
        assert!(log.offset() < before);

        log.append(&put(6, "b", b"x")).unwrap();
        let entries = log.recover().unwrap();
        assert_eq!(entries, vec![put(5, "a", &[5]), put(6, "b", b"x")]);
    }

    #[test]
    fn failed_append_leaves_no_trace() {
        for point in [FailPoint::Flush, FailPoint::Sync] {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("kv.log");
            let mut log = MutationLog::open(&path, SyncMode::EveryWrite).unwrap();
            log.append(&put(1, "a", b"1")).unwrap();
            let good_len = log.offset();

            log.fail_at(&[point]);
            assert!(matches!(log.append(&put(2, "big", b"lost")), Err(KvError::Io(_))));
            assert_eq!(log.offset(), good_len);
            assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len, "{point:?}");

            log.append(&put(2, "b", b"2")).unwrap();
            drop(log);

            let log = MutationLog::open(&path, SyncMode::OsDefault).unwrap();
            assert_eq!(
                log.recover().unwrap(),
                vec![put(1, "a", b"1"), put(2, "b", b"2")],
                "{point:?}"
            );
        }
    }

    #[test]
    fn failed_rollback_closes_until_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.log");
        let mut log = MutationLog::open(&path, SyncMode::OsDefault).unwrap();
        log.append(&put(1, "a", b"1")).unwrap();

        log.fail_at(&[FailPoint::Sync, FailPoint::Truncate]);
        assert!(matches!(log.append(&put(2, "x", b"?")), Err(KvError::Io(_))));
        assert!(matches!(log.append(&put(2, "y", b"2")), Err(KvError::Closed(_))));

        log.rewrite(&[put(1, "a", b"1")]).unwrap();
        log.append(&put(2, "y", b"2")).unwrap();
        assert_eq!(
            log.recover().unwrap(),
            vec![put(1, "a", b"1"), put(2, "y", b"2")]
        );
    }
}
