//! Writing files into the destination tree.
//!
//! A destination name never holds a partial file and an existing file is
//! never overwritten: bytes stream into a temporary file in the target
//! directory, are synced, and are then linked into place only if the name
//! is still free.

use crate::core::router::Route;
use crate::error::PlacementError;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;

/// Where a file landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Copied to `path`
    Written { path: PathBuf, bytes: u64 },
    /// A byte-identical file was already at `path`
    AlreadyPresent { path: PathBuf },
}

impl Placement {
    pub fn path(&self) -> &Path {
        match self {
            Placement::Written { path, .. } | Placement::AlreadyPresent { path } => path,
        }
    }
}

/// Copy `source` to the first usable candidate of `route`.
///
/// Candidates are tried in order. One holding identical bytes ends the search
/// without writing; one holding different bytes is skipped.
pub fn place(
    source: &Path,
    route: &Route,
    modified: Option<SystemTime>,
) -> Result<Placement, PlacementError> {
    fs::create_dir_all(&route.directory).map_err(|e| PlacementError::CreateDirectory {
        path: route.directory.clone(),
        source: e,
    })?;

    let copy_err = |to: &Path, e: io::Error| PlacementError::Copy {
        from: source.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    };

    for candidate in route.candidates() {
        if occupied(&candidate).map_err(|e| copy_err(&candidate, e))? {
            if files_identical(source, &candidate).map_err(|e| copy_err(&candidate, e))? {
                return Ok(Placement::AlreadyPresent { path: candidate });
            }
            continue;
        }

        match copy_new(source, &candidate, modified)? {
            Some(bytes) => {
                return Ok(Placement::Written {
                    path: candidate,
                    bytes,
                })
            }
            // Lost a race for the name; look at what won
            None => {
                if files_identical(source, &candidate).map_err(|e| copy_err(&candidate, e))? {
                    return Ok(Placement::AlreadyPresent { path: candidate });
                }
            }
        }
    }

    Err(PlacementError::SuffixesExhausted {
        path: route.preferred(),
    })
}

/// Where [`place`] would put `source` right now. Reads only.
///
/// `claimed` maps slots already promised to earlier files of the same plan
/// to those files; they count as occupied.
pub fn preview(
    source: &Path,
    route: &Route,
    claimed: &HashMap<PathBuf, PathBuf>,
) -> Result<Placement, PlacementError> {
    let copy_err = |to: &Path, e: io::Error| PlacementError::Copy {
        from: source.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    };

    for candidate in route.candidates() {
        if let Some(claimant) = claimed.get(&candidate) {
            if files_identical(source, claimant).map_err(|e| copy_err(&candidate, e))? {
                return Ok(Placement::AlreadyPresent { path: candidate });
            }
            continue;
        }
        if !occupied(&candidate).map_err(|e| copy_err(&candidate, e))? {
            let bytes = fs::metadata(source)
                .map_err(|e| copy_err(&candidate, e))?
                .len();
            return Ok(Placement::Written {
                path: candidate,
                bytes,
            });
        }
        if files_identical(source, &candidate).map_err(|e| copy_err(&candidate, e))? {
            return Ok(Placement::AlreadyPresent { path: candidate });
        }
    }

    Err(PlacementError::SuffixesExhausted {
        path: route.preferred(),
    })
}

fn occupied(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Copy into a fresh temporary file beside `target`, then link it in.
/// `Ok(None)` if `target` appeared in the meantime.
fn copy_new(
    source: &Path,
    target: &Path,
    modified: Option<SystemTime>,
) -> Result<Option<u64>, PlacementError> {
    let copy_err = |e: io::Error| PlacementError::Copy {
        from: source.to_path_buf(),
        to: target.to_path_buf(),
        source: e,
    };

    let directory = target.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(directory).map_err(copy_err)?;
    let mut input = File::open(source).map_err(copy_err)?;
    let bytes = io::copy(&mut input, temp.as_file_mut()).map_err(copy_err)?;

    if let Some(mtime) = modified {
        temp.as_file().set_modified(mtime).map_err(copy_err)?;
    }
    temp.as_file().sync_all().map_err(copy_err)?;

    match temp.persist_noclobber(target) {
        Ok(_) => Ok(Some(bytes)),
        // The temporary file is removed when the error drops
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(PlacementError::Persist {
            path: target.to_path_buf(),
            source: e.error,
        }),
    }
}

/// Byte-for-byte comparison. Sizes are checked first.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut reader_a = BufReader::new(File::open(a)?);
    let mut reader_b = BufReader::new(File::open(b)?);
    let mut buf_a = vec![0u8; 64 * 1024];
    let mut buf_b = vec![0u8; 64 * 1024];

    loop {
        let n = read_full(&mut reader_a, &mut buf_a)?;
        let m = read_full(&mut reader_b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as possible; short only at end of input
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::Router;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn quarantine_route(dest: &Path, name: &str) -> Route {
        Router::new(dest).quarantine(name)
    }

    #[test]
    fn writes_into_free_slot_and_creates_directories() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let file = write(src.path(), "a.jpg", b"hello");

        let placement = place(&file, &quarantine_route(dest.path(), "a.jpg"), None).unwrap();

        assert_eq!(
            placement,
            Placement::Written {
                path: dest.path().join("_quarantine/a.jpg"),
                bytes: 5
            }
        );
        assert_eq!(fs::read(placement.path()).unwrap(), b"hello");
    }

    #[test]
    fn identical_occupant_means_already_present() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let file = write(src.path(), "a.jpg", b"same bytes");
        let route = quarantine_route(dest.path(), "a.jpg");

        place(&file, &route, None).unwrap();
        let second = place(&file, &route, None).unwrap();

        assert_eq!(
            second,
            Placement::AlreadyPresent {
                path: dest.path().join("_quarantine/a.jpg")
            }
        );
    }

    #[test]
    fn different_occupant_gets_suffix_and_is_untouched() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(dest.path().join("_quarantine")).unwrap();
        let occupant = write(&dest.path().join("_quarantine"), "a.jpg", b"someone else");
        let file = write(src.path(), "a.jpg", b"mine");

        let placement = place(&file, &quarantine_route(dest.path(), "a.jpg"), None).unwrap();

        assert_eq!(placement.path(), dest.path().join("_quarantine/a_001.jpg"));
        assert_eq!(fs::read(&occupant).unwrap(), b"someone else");
    }

    #[test]
    fn source_mtime_is_preserved() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let file = write(src.path(), "a.jpg", b"x");
        let mtime = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_577_880_000);

        let placement = place(&file, &quarantine_route(dest.path(), "a.jpg"), Some(mtime)).unwrap();

        let placed = fs::metadata(placement.path()).unwrap().modified().unwrap();
        assert_eq!(placed, mtime);
    }

    #[test]
    fn no_temporary_files_are_left_behind() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let file = write(src.path(), "a.jpg", b"x");

        place(&file, &quarantine_route(dest.path(), "a.jpg"), None).unwrap();

        let names: Vec<_> = fs::read_dir(dest.path().join("_quarantine"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.jpg")]);
    }

    #[test]
    fn missing_source_is_a_copy_error() {
        let dest = TempDir::new().unwrap();
        let err = place(
            Path::new("/nonexistent/a.jpg"),
            &quarantine_route(dest.path(), "a.jpg"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PlacementError::Copy { .. }));
    }

    #[test]
    fn preview_picks_the_same_slot_without_writing() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(dest.path().join("_quarantine")).unwrap();
        write(&dest.path().join("_quarantine"), "a.jpg", b"someone else");
        let file = write(src.path(), "a.jpg", b"mine");
        let route = quarantine_route(dest.path(), "a.jpg");

        let planned = preview(&file, &route, &HashMap::new()).unwrap();

        assert_eq!(
            planned,
            Placement::Written {
                path: dest.path().join("_quarantine/a_001.jpg"),
                bytes: 4
            }
        );
        assert!(!planned.path().exists());
        assert_eq!(place(&file, &route, None).unwrap().path(), planned.path());
    }

    #[test]
    fn preview_treats_claimed_slots_as_taken() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let first = write(src.path(), "a.jpg", b"first");
        fs::create_dir_all(src.path().join("x")).unwrap();
        let twin = write(&src.path().join("x"), "a.jpg", b"first");
        let other = write(&src.path().join("x"), "b.jpg", b"second");
        let route = quarantine_route(dest.path(), "a.jpg");
        let claimed = HashMap::from([(dest.path().join("_quarantine/a.jpg"), first)]);

        assert_eq!(
            preview(&twin, &route, &claimed).unwrap(),
            Placement::AlreadyPresent {
                path: dest.path().join("_quarantine/a.jpg")
            }
        );
        assert_eq!(
            preview(&other, &route, &claimed).unwrap().path(),
            dest.path().join("_quarantine/a_001.jpg")
        );
    }

    #[test]
    fn identical_compares_sizes_then_bytes() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a", &[1u8; 100_000]);
        let b = write(dir.path(), "b", &[1u8; 100_000]);
        let mut other = vec![1u8; 100_000];
        other[99_999] = 2;
        let c = write(dir.path(), "c", &other);
        let d = write(dir.path(), "d", &[1u8; 10]);

        assert!(files_identical(&a, &b).unwrap());
        assert!(!files_identical(&a, &c).unwrap());
        assert!(!files_identical(&a, &d).unwrap());
    }
}
