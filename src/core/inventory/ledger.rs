//! Append-only JSON Lines ledger, the default persistent backend.
//!
//! One record per line. The file is read whole on open into an in-memory
//! index; commits append a line and `fsync` it before the record becomes
//! visible. An interrupted append leaves at most one torn final line, which
//! is dropped on the next open. Anything else that fails to parse is treated
//! as corruption and refuses to load.
//!
//! A failed append is cut back to the previous length, and the ledger then
//! refuses further commits for the rest of the process, so no later line can
//! land behind a fragment.

use super::{InventoryBackend, InventoryRecord};
use crate::core::fingerprint::Fingerprint;
use crate::error::InventoryError;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

struct LedgerState {
    index: HashMap<Fingerprint, InventoryRecord>,
    /// Fingerprints in file order
    order: Vec<Fingerprint>,
    file: File,
    /// Set after a failed append; no further commits are accepted
    failed: bool,
}

/// JSON Lines inventory file
pub struct JsonlLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl JsonlLedger {
    /// Open or create a ledger at the given path
    pub fn open(path: &Path) -> Result<Self, InventoryError> {
        let io_err = |source: std::io::Error| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_err(e)),
        };

        let parsed = parse_ledger(path, &bytes)?;

        if parsed.valid_len < bytes.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = bytes.len() - parsed.valid_len,
                "Discarding torn final inventory line from an interrupted run"
            );
            let file = OpenOptions::new().write(true).open(path).map_err(io_err)?;
            file.set_len(parsed.valid_len as u64).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;

        if parsed.needs_newline {
            file.write_all(b"\n").map_err(io_err)?;
            file.sync_data().map_err(io_err)?;
        }

        info!(path = %path.display(), records = parsed.order.len(), "Loaded inventory ledger");

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(LedgerState {
                index: parsed.index,
                order: parsed.order,
                file,
                failed: false,
            }),
        })
    }
}

struct ParsedLedger {
    index: HashMap<Fingerprint, InventoryRecord>,
    order: Vec<Fingerprint>,
    /// Bytes worth keeping; less than the file length when the tail was torn
    valid_len: usize,
    /// Last line is complete JSON but lacks its newline
    needs_newline: bool,
}

fn parse_ledger(path: &Path, bytes: &[u8]) -> Result<ParsedLedger, InventoryError> {
    let mut index = HashMap::new();
    let mut order = Vec::new();
    let ends_with_newline = bytes.last().map_or(true, |b| *b == b'\n');

    let mut offset = 0usize;
    let mut valid_len = bytes.len();
    let mut needs_newline = false;
    let segments: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
    let last = segments.len() - 1;

    for (i, segment) in segments.iter().enumerate() {
        let line_no = i + 1;
        let start = offset;
        offset += segment.len() + 1;

        if segment.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }

        let is_unterminated_tail = i == last && !ends_with_newline;

        let record: InventoryRecord = match serde_json::from_slice(segment) {
            Ok(record) => record,
            Err(_) if is_unterminated_tail => {
                valid_len = start;
                break;
            }
            Err(e) => {
                return Err(InventoryError::Corrupt {
                    path: path.to_path_buf(),
                    line: line_no,
                    reason: e.to_string(),
                })
            }
        };

        if index.contains_key(&record.fingerprint) {
            return Err(InventoryError::Corrupt {
                path: path.to_path_buf(),
                line: line_no,
                reason: format!("second record for fingerprint {}", record.fingerprint),
            });
        }

        if is_unterminated_tail {
            needs_newline = true;
        }
        order.push(record.fingerprint);
        index.insert(record.fingerprint, record);
    }

    Ok(ParsedLedger {
        index,
        order,
        valid_len,
        needs_newline,
    })
}

/// Where ledger lines are appended
trait AppendTarget: Write {
    fn length(&self) -> io::Result<u64>;
    fn cut_back(&self, len: u64) -> io::Result<()>;
    fn sync(&self) -> io::Result<()>;
}

impl AppendTarget for File {
    fn length(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn cut_back(&self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Append one line in a single write and sync it. On failure the target is
/// truncated back to where it was.
fn append_line<T: AppendTarget>(target: &mut T, line: &[u8]) -> io::Result<()> {
    let len = target.length()?;
    let result = target.write_all(line).and_then(|()| target.sync());
    if let Err(ref e) = result {
        warn!("Inventory append failed, cutting back to {len} bytes: {e}");
        if let Err(cut) = target.cut_back(len) {
            warn!("Could not cut back the failed inventory append: {cut}");
        }
    }
    result
}

impl InventoryBackend for JsonlLedger {
    fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<InventoryRecord>, InventoryError> {
        let state = self.state.lock().map_err(|_| InventoryError::Poisoned)?;
        Ok(state.index.get(fingerprint).cloned())
    }

    fn commit(&self, record: InventoryRecord) -> Result<(), InventoryError> {
        let mut state = self.state.lock().map_err(|_| InventoryError::Poisoned)?;

        if state.failed {
            return Err(InventoryError::Unwritable {
                path: self.path.clone(),
            });
        }
        if state.index.contains_key(&record.fingerprint) {
            return Err(InventoryError::DuplicateCommit {
                fingerprint: record.fingerprint.to_string(),
            });
        }

        let io_err = |source: std::io::Error| InventoryError::Io {
            path: self.path.clone(),
            source,
        };

        let mut line = serde_json::to_vec(&record)
            .map_err(|e| io_err(std::io::Error::new(ErrorKind::InvalidData, e)))?;
        line.push(b'\n');

        if let Err(e) = append_line(&mut state.file, &line) {
            state.failed = true;
            return Err(io_err(e));
        }

        state.order.push(record.fingerprint);
        state.index.insert(record.fingerprint, record);
        Ok(())
    }

    fn len(&self) -> Result<usize, InventoryError> {
        let state = self.state.lock().map_err(|_| InventoryError::Poisoned)?;
        Ok(state.index.len())
    }

    fn records(&self) -> Result<Vec<InventoryRecord>, InventoryError> {
        let state = self.state.lock().map_err(|_| InventoryError::Poisoned)?;
        Ok(state
            .order
            .iter()
            .filter_map(|fp| state.index.get(fp).cloned())
            .collect())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
