//! Append-only, line-delimited record store
//!
//! One JSON object per line. Opening a store replays every line into an
//! in-memory `url -> record` index (later lines win) before any append
//! happens. Appends are a single write of one complete line followed by a
//! flush, so an interrupted process leaves at most one torn line at the end
//! of the file; the next open truncates it away.

use crate::model::SchoolRecord;
use crate::StorageError;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistent record log plus its deduplication index
pub struct RecordStore {
    path: PathBuf,
    file: File,
    records: Vec<SchoolRecord>,
    index: HashMap<String, usize>,
    lines_read: usize,
}

/// What replaying a store file produced
struct Replay {
    records: Vec<SchoolRecord>,
    index: HashMap<String, usize>,
    lines_read: usize,
    /// Byte offset where an unparseable, unterminated last line starts
    torn_tail: Option<usize>,
    /// The last line parsed but has no trailing newline
    missing_newline: bool,
}

impl RecordStore {
    /// Opens (or creates) the store at `path` and replays it
    ///
    /// A torn final line is truncated from the file. A malformed line
    /// anywhere else is an error: the file was not written by this store.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_error(path, e)),
        };

        let replay = replay(&content, path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_error(path, e))?;

        if let Some(offset) = replay.torn_tail {
            tracing::warn!(
                "Discarding torn last line of {} ({} bytes)",
                path.display(),
                content.len() - offset
            );
            file.set_len(offset as u64).map_err(|e| io_error(path, e))?;
        } else if replay.missing_newline {
            file.write_all(b"\n").map_err(|e| io_error(path, e))?;
        }

        tracing::debug!(
            "Loaded {} records ({} lines) from {}",
            replay.records.len(),
            replay.lines_read,
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            records: replay.records,
            index: replay.index,
            lines_read: replay.lines_read,
        })
    }

    /// Reads the de-duplicated records of a store without opening it for append
    ///
    /// A torn final line is skipped, not repaired.
    pub fn load(path: &Path) -> StorageResult<Vec<SchoolRecord>> {
        Self::load_counted(path).map(|(records, _)| records)
    }

    /// Like [`RecordStore::load`], also returning the number of complete lines
    pub fn load_counted(path: &Path) -> StorageResult<(Vec<SchoolRecord>, usize)> {
        let content = fs::read(path).map_err(|e| io_error(path, e))?;
        let replay = replay(&content, path)?;
        if replay.torn_tail.is_some() {
            tracing::warn!("Ignoring torn last line of {}", path.display());
        }
        Ok((replay.records, replay.lines_read))
    }

    /// Appends one record as a single line and flushes it to disk
    ///
    /// Refuses a record whose url is already stored.
    pub fn append(&mut self, record: SchoolRecord) -> StorageResult<()> {
        let url = record
            .url()
            .ok_or_else(|| StorageError::MissingUrl {
                path: self.path.display().to_string(),
                line: self.lines_read + 1,
            })?
            .to_string();

        if self.index.contains_key(&url) {
            return Err(StorageError::DuplicateUrl(url));
        }

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data())
            .map_err(|e| io_error(&self.path, e))?;

        self.index.insert(url, self.records.len());
        self.records.push(record);
        self.lines_read += 1;
        Ok(())
    }

    /// Replaces the whole file with `records`, de-duplicated by url
    ///
    /// Writes a sibling temp file and renames it over the store, so the
    /// store is either fully old or fully new.
    pub fn rewrite(&mut self, records: Vec<SchoolRecord>) -> StorageResult<()> {
        let (records, index) = dedup(records);

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
            let mut buf = String::new();
            for record in &records {
                buf.push_str(&serde_json::to_string(record)?);
                buf.push('\n');
            }
            tmp.write_all(buf.as_bytes())
                .and_then(|_| tmp.sync_all())
                .map_err(|e| io_error(&tmp_path, e))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| io_error(&self.path, e))?;

        self.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| io_error(&self.path, e))?;
        self.lines_read = records.len();
        self.records = records;
        self.index = index;
        Ok(())
    }

    /// Rewrites the store keeping only the latest record per url
    ///
    /// Returns `(lines_before, records_after)`.
    pub fn compact(&mut self) -> StorageResult<(usize, usize)> {
        let before = self.lines_read;
        let records = self.records.clone();
        self.rewrite(records)?;
        Ok((before, self.records.len()))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&SchoolRecord> {
        self.index.get(url).map(|&i| &self.records[i])
    }

    /// Number of stored records tagged with `region` (and `borough`, if given)
    pub fn count_region(&self, region: &str, borough: Option<&str>) -> usize {
        self.records
            .iter()
            .filter(|r| r.region() == Some(region))
            .filter(|r| borough.is_none() || r.borough() == borough)
            .count()
    }

    /// De-duplicated records in first-seen order, latest value per url
    pub fn records(&self) -> &[SchoolRecord] {
        &self.records
    }

    /// Unique records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Lines in the file, duplicates included
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses the store byte-wise, so a tail cut inside a UTF-8 sequence is
/// still recognised as torn instead of failing the whole read
fn replay(content: &[u8], path: &Path) -> StorageResult<Replay> {
    let mut parsed = Vec::new();
    let mut torn_tail = None;
    let mut missing_newline = false;
    let mut offset = 0;

    let mut segments = content.split(|&b| b == b'\n').enumerate().peekable();
    while let Some((i, segment)) = segments.next() {
        let start = offset;
        offset += segment.len() + 1;
        let is_last = segments.peek().is_none();

        if segment.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match serde_json::from_slice::<SchoolRecord>(segment) {
            Ok(record) => {
                if record.url().is_none() {
                    return Err(StorageError::MissingUrl {
                        path: path.display().to_string(),
                        line: i + 1,
                    });
                }
                parsed.push(record);
                missing_newline = is_last;
            }
            // Only an unterminated final line can be the product of a torn write
            Err(_) if is_last => torn_tail = Some(start),
            Err(source) => {
                return Err(StorageError::MalformedLine {
                    path: path.display().to_string(),
                    line: i + 1,
                    source,
                })
            }
        }
    }

    let lines_read = parsed.len();
    let (records, index) = dedup(parsed);
    Ok(Replay {
        records,
        index,
        lines_read,
        torn_tail,
        missing_newline,
    })
}

/// Keeps the first-seen position and the latest value of every url
fn dedup(records: Vec<SchoolRecord>) -> (Vec<SchoolRecord>, HashMap<String, usize>) {
    let mut unique: Vec<SchoolRecord> = Vec::with_capacity(records.len());
    let mut index = HashMap::with_capacity(records.len());

    for record in records {
        let Some(url) = record.url().map(str::to_string) else {
            continue;
        };
        match index.get(&url) {
            Some(&i) => unique[i] = record,
            None => {
                index.insert(url, unique.len());
                unique.push(record);
            }
        }
    }

    (unique, index)
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}
