use crate::format::{frame_record, SegmentHeader, SEGMENT_HEADER_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// A single log segment file: an immutable-once-closed sequence of framed
/// records behind a [`SegmentHeader`] (spec §4.2: segments exist so
/// `truncate` can discard whole files instead of rewriting one growing one).
pub struct WalSegment {
    file: File,
    segment_number: u64,
    write_position: u64,
    path: PathBuf,
}

fn segment_path(dir: &Path, segment_number: u64) -> PathBuf {
    dir.join(format!("log-{segment_number:020}.seg"))
}

impl WalSegment {
    /// Create a brand new segment file, writing its header.
    pub fn create(dir: &Path, segment_number: u64) -> io::Result<Self> {
        let path = segment_path(dir, segment_number);
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .read(true)
            .open(&path)?;
        file.write_all(&SegmentHeader::new(segment_number).to_bytes())?;
        file.sync_all()?;
        Ok(WalSegment {
            file,
            segment_number,
            write_position: SEGMENT_HEADER_SIZE as u64,
            path,
        })
    }

    /// Open an existing segment for appending, seeking to end-of-file.
    pub fn open_append(dir: &Path, segment_number: u64) -> io::Result<Self> {
        let path = segment_path(dir, segment_number);
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        file.seek_to_end()?;
        Ok(WalSegment {
            file,
            segment_number,
            write_position: len,
            path,
        })
    }

    /// Open an existing segment read-only, for recovery.
    pub fn open_read(dir: &Path, segment_number: u64) -> io::Result<File> {
        let path = segment_path(dir, segment_number);
        File::open(path)
    }

    /// This segment's number.
    pub fn number(&self) -> u64 {
        self.segment_number
    }

    /// Current size of the segment file, in bytes.
    pub fn size(&self) -> u64 {
        self.write_position
    }

    /// Path of this segment's file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one framed record and advance the write cursor.
    pub fn append(&mut self, payload: &[u8]) -> io::Result<()> {
        let framed = frame_record(payload);
        self.file.write_all(&framed)?;
        self.write_position += framed.len() as u64;
        Ok(())
    }

    /// fsync this segment's data and metadata to disk.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Delete this segment's backing file.
    pub fn remove(self) -> io::Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(path)
    }
}

trait SeekExt {
    fn seek_to_end(&mut self) -> io::Result<u64>;
}

impl SeekExt for File {
    fn seek_to_end(&mut self) -> io::Result<u64> {
        use std::io::{Seek, SeekFrom};
        self.seek(SeekFrom::End(0))
    }
}

/// List every existing segment number under `dir`, ascending.
pub fn list_segment_numbers(dir: &Path) -> io::Result<Vec<u64>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut numbers = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix("log-").and_then(|s| s.strip_suffix(".seg")) {
            if let Ok(n) = rest.parse::<u64>() {
                numbers.push(n);
            }
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

/// Read every well-formed, checksum-valid record payload out of a segment
/// file, skipping the header. Stops at the first truncated or corrupt
/// record, since that marks the tail of a log that was mid-write at crash
/// time (spec §4.5: recovery treats a short last record as "not durable").
pub fn read_segment_records(mut file: File) -> io::Result<Vec<Vec<u8>>> {
    let mut header_bytes = [0u8; SEGMENT_HEADER_SIZE];
    if file.read_exact(&mut header_bytes).is_err() {
        return Ok(Vec::new());
    }
    if SegmentHeader::from_bytes(&header_bytes).is_none() {
        return Ok(Vec::new());
    }

    let mut reader = BufReader::new(file);
    let mut records = Vec::new();
    loop {
        let mut len_bytes = [0u8; 4];
        if reader.read_exact(&mut len_bytes).is_err() {
            break;
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut payload = vec![0u8; len];
        if reader.read_exact(&mut payload).is_err() {
            break;
        }
        let mut crc_bytes = [0u8; 4];
        if reader.read_exact(&mut crc_bytes).is_err() {
            break;
        }
        let expected = u32::from_le_bytes(crc_bytes);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        if hasher.finalize() != expected {
            tracing::warn!(segment_len = len, "checksum mismatch, truncating recovery at this record");
            break;
        }
        records.push(payload);
    }
    Ok(records)
}
