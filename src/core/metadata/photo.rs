//! EXIF capture time, via kamadak-exif.

use super::{DateOrigin, DateSource};
use crate::core::scanner::{MediaKind, SourceFile};
use crate::error::MetadataError;
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;

/// Tags tried in order: when the shutter fired, when it was digitized, last edit
const DATE_TAGS: [(Tag, &str); 3] = [
    (Tag::DateTimeOriginal, "DateTimeOriginal"),
    (Tag::DateTimeDigitized, "DateTimeDigitized"),
    (Tag::DateTime, "DateTime"),
];

/// Reads the EXIF block of photos (JPEG, TIFF, HEIF, PNG, WebP)
pub struct ExifDateSource;

impl DateSource for ExifDateSource {
    fn origin(&self) -> DateOrigin {
        DateOrigin::Exif
    }

    fn capture_time(&self, file: &SourceFile) -> Result<NaiveDateTime, MetadataError> {
        if file.kind != MediaKind::Photo {
            return Err(MetadataError::Unsupported { source_kind: "EXIF" });
        }

        let handle = File::open(&file.path)?;
        let mut reader = BufReader::new(handle);
        let exif = Reader::new()
            .read_from_container(&mut reader)
            .map_err(|e| match e {
                exif::Error::Io(io) => MetadataError::Io(io),
                exif::Error::NotFound(_) => MetadataError::MissingTag { tag: "EXIF" },
                other => MetadataError::CorruptContainer {
                    reason: other.to_string(),
                },
            })?;

        DATE_TAGS
            .iter()
            .filter_map(|(tag, _)| exif.get_field(*tag, In::PRIMARY))
            .find_map(|field| parse_exif_datetime(&field.value))
            .ok_or(MetadataError::MissingTag {
                tag: DATE_TAGS[0].1,
            })
    }
}

/// Parse an EXIF ASCII timestamp.
///
/// EXIF mandates `YYYY:MM:DD HH:MM:SS`; some phone apps write dashes instead.
/// Blank and zeroed values (`0000:00:00 00:00:00`) fail to parse.
fn parse_exif_datetime(value: &Value) -> Option<NaiveDateTime> {
    let Value::Ascii(ref parts) = value else {
        return None;
    };
    let raw = std::str::from_utf8(parts.first()?).ok()?;
    let raw = raw.trim_end_matches('\0').trim();

    NaiveDateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};
    use std::path::PathBuf;

    fn ascii(s: &str) -> Value {
        Value::Ascii(vec![s.as_bytes().to_vec()])
    }

    #[test]
    fn parses_standard_exif_format() {
        let parsed = parse_exif_datetime(&ascii("2012:07:03 10:15:00")).unwrap();
        assert_eq!(
            parsed.date(),
            NaiveDate::from_ymd_opt(2012, 7, 3).unwrap()
        );
    }

    #[test]
    fn parses_dashed_variant_and_trailing_nul() {
        let parsed = parse_exif_datetime(&ascii("2019-12-31 23:59:59\0")).unwrap();
        assert_eq!(parsed.year(), 2019);
    }

    #[test]
    fn zeroed_and_blank_values_are_rejected() {
        assert!(parse_exif_datetime(&ascii("0000:00:00 00:00:00")).is_none());
        assert!(parse_exif_datetime(&ascii("    ")).is_none());
        assert!(parse_exif_datetime(&Value::Short(vec![1])).is_none());
    }

    /// Minimal JPEG carrying a little-endian EXIF block with DateTimeOriginal
    fn jpeg_with_exif_date(stamp: &str) -> Vec<u8> {
        assert_eq!(stamp.len(), 19);
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II\x2a\x00");
        tiff.extend_from_slice(&8u32.to_le_bytes());
        // IFD0: one entry pointing at the Exif IFD
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x8769u16.to_le_bytes());
        tiff.extend_from_slice(&4u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&26u32.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());
        // Exif IFD at 26
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x9003u16.to_le_bytes());
        tiff.extend_from_slice(&2u16.to_le_bytes());
        tiff.extend_from_slice(&20u32.to_le_bytes());
        tiff.extend_from_slice(&44u32.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());
        tiff.extend_from_slice(stamp.as_bytes());
        tiff.push(0);

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        jpeg.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
        jpeg.extend_from_slice(b"Exif\0\0");
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn reads_date_time_original_from_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, jpeg_with_exif_date("2012:07:03 10:00:00")).unwrap();

        let file = SourceFile {
            path,
            size: 0,
            modified: None,
            kind: MediaKind::Photo,
        };
        let datetime = ExifDateSource.capture_time(&file).unwrap();
        assert_eq!((datetime.year(), datetime.month()), (2012, 7));
    }

    #[test]
    fn jpeg_without_exif_is_missing_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();

        let file = SourceFile {
            path,
            size: 4,
            modified: None,
            kind: MediaKind::Photo,
        };
        assert!(ExifDateSource.capture_time(&file).is_err());
    }

    #[test]
    fn videos_are_not_exif_sources() {
        let file = SourceFile {
            path: PathBuf::from("/card/clip.mp4"),
            size: 10,
            modified: None,
            kind: MediaKind::Video,
        };
        assert!(matches!(
            ExifDateSource.capture_time(&file),
            Err(MetadataError::Unsupported { .. })
        ));
    }

    #[test]
    fn unreadable_file_is_an_io_failure() {
        let file = SourceFile {
            path: PathBuf::from("/nonexistent/file.jpg"),
            size: 10,
            modified: None,
            kind: MediaKind::Photo,
        };
        assert!(matches!(
            ExifDateSource.capture_time(&file),
            Err(MetadataError::Io(_))
        ));
    }
}
