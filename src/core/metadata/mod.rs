//! # Metadata Module
//!
//! Resolves the true capture date of a media file.
//!
//! ## Resolution Chain
//! Sources are tried in order until one yields a plausible timestamp:
//! 1. EXIF capture time (`DateTimeOriginal`, `DateTimeDigitized`, `DateTime`)
//! 2. QuickTime/MP4 movie header creation time
//! 3. Filesystem modification (or creation) time
//!
//! A failing source never aborts the chain. A timestamp outside the
//! [`PlausibleWindow`] counts as a failure of that source. When every source
//! fails the file is [`DateResolution::Unresolved`] and ends up in quarantine
//! rather than under a guessed date.

mod filesystem;
mod photo;
mod video;

pub use filesystem::FilesystemDateSource;
pub use photo::ExifDateSource;
pub use video::QuickTimeDateSource;

use crate::core::scanner::SourceFile;
use crate::error::MetadataError;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Where a capture date came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateOrigin {
    #[serde(rename = "exif")]
    Exif,
    #[serde(rename = "quicktime")]
    QuickTime,
    #[serde(rename = "filesystem-fallback")]
    FilesystemFallback,
}

impl DateOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateOrigin::Exif => "exif",
            DateOrigin::QuickTime => "quicktime",
            DateOrigin::FilesystemFallback => "filesystem-fallback",
        }
    }

    /// Whether the date came from inside the file rather than the filesystem
    pub fn is_embedded(&self) -> bool {
        !matches!(self, DateOrigin::FilesystemFallback)
    }
}

impl FromStr for DateOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exif" => Ok(DateOrigin::Exif),
            "quicktime" => Ok(DateOrigin::QuickTime),
            "filesystem-fallback" => Ok(DateOrigin::FilesystemFallback),
            other => Err(format!("unknown date origin {other:?}")),
        }
    }
}

impl fmt::Display for DateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved (year, month) and the source that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureDate {
    pub year: i32,
    pub month: u32,
    pub origin: DateOrigin,
}

impl CaptureDate {
    pub fn new(year: i32, month: u32, origin: DateOrigin) -> Self {
        Self {
            year,
            month,
            origin,
        }
    }

    pub fn from_datetime(datetime: NaiveDateTime, origin: DateOrigin) -> Self {
        Self::new(datetime.year(), datetime.month(), origin)
    }

    /// `YYYY` folder name
    pub fn year_dir(&self) -> String {
        format!("{:04}", self.year)
    }

    /// `MM` folder name
    pub fn month_dir(&self) -> String {
        format!("{:02}", self.month)
    }
}

/// Outcome of running the resolution chain for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateResolution {
    Resolved(CaptureDate),
    /// Every source failed; one reason per source, in chain order
    Unresolved { failures: Vec<String> },
}

impl DateResolution {
    pub fn date(&self) -> Option<CaptureDate> {
        match self {
            DateResolution::Resolved(date) => Some(*date),
            DateResolution::Unresolved { .. } => None,
        }
    }
}

/// One strategy in the resolution chain
pub trait DateSource: Send + Sync {
    /// Tag recorded on dates produced by this source
    fn origin(&self) -> DateOrigin;

    /// Read a capture timestamp, or explain why there is none
    fn capture_time(&self, file: &SourceFile) -> Result<NaiveDateTime, MetadataError>;

    /// Every timestamp this source can offer, preferred first. The resolver
    /// takes the first plausible one.
    fn candidate_times(&self, file: &SourceFile) -> Result<Vec<NaiveDateTime>, MetadataError> {
        self.capture_time(file).map(|datetime| vec![datetime])
    }
}

/// Range of timestamps accepted as real capture dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlausibleWindow {
    pub earliest: NaiveDateTime,
    pub latest: NaiveDateTime,
}

impl PlausibleWindow {
    /// Default floor. Zeroed QuickTime headers (1904) fall below it.
    pub const DEFAULT_MIN_YEAR: i32 = 1970;

    /// From `min_year`-01-01 up to one day after `now` (clock and timezone skew)
    pub fn new(min_year: i32, now: NaiveDateTime) -> Self {
        let earliest = NaiveDate::from_ymd_opt(min_year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(NaiveDateTime::MIN);
        Self {
            earliest,
            latest: now + Duration::days(1),
        }
    }

    /// Window ending at the current time
    pub fn until_now(min_year: i32) -> Self {
        Self::new(min_year, Utc::now().naive_utc())
    }

    pub fn contains(&self, datetime: NaiveDateTime) -> bool {
        datetime >= self.earliest && datetime <= self.latest
    }
}

impl Default for PlausibleWindow {
    fn default() -> Self {
        Self::until_now(Self::DEFAULT_MIN_YEAR)
    }
}

/// Ordered chain of date sources
pub struct DateResolver {
    sources: Vec<Box<dyn DateSource>>,
    window: PlausibleWindow,
}

impl DateResolver {
    pub fn new(sources: Vec<Box<dyn DateSource>>, window: PlausibleWindow) -> Self {
        Self { sources, window }
    }

    /// EXIF, then QuickTime, then filesystem time
    pub fn standard(window: PlausibleWindow) -> Self {
        Self::new(
            vec![
                Box::new(ExifDateSource),
                Box::new(QuickTimeDateSource),
                Box::new(FilesystemDateSource),
            ],
            window,
        )
    }

    pub fn window(&self) -> PlausibleWindow {
        self.window
    }

    /// Run the chain. Reads only; never fails.
    pub fn resolve(&self, file: &SourceFile) -> DateResolution {
        let mut failures = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let attempt = source.candidate_times(file).and_then(|times| {
                times
                    .iter()
                    .copied()
                    .find(|datetime| self.window.contains(*datetime))
                    .ok_or_else(|| MetadataError::Implausible {
                        value: times
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
            });

            match attempt {
                Ok(datetime) => {
                    return DateResolution::Resolved(CaptureDate::from_datetime(
                        datetime,
                        source.origin(),
                    ))
                }
                Err(e) => {
                    debug!(path = %file.path.display(), source = %source.origin(), "date source failed: {e}");
                    failures.push(format!("{}: {e}", source.origin()));
                }
            }
        }

        DateResolution::Unresolved { failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::MediaKind;
    use std::path::PathBuf;

    struct Fixed(DateOrigin, Option<NaiveDateTime>);

    impl DateSource for Fixed {
        fn origin(&self) -> DateOrigin {
            self.0
        }

        fn capture_time(&self, _file: &SourceFile) -> Result<NaiveDateTime, MetadataError> {
            self.1.ok_or(MetadataError::MissingTag { tag: "fixed" })
        }
    }

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn file() -> SourceFile {
        SourceFile {
            path: PathBuf::from("/card/x.jpg"),
            size: 1,
            modified: None,
            kind: MediaKind::Photo,
        }
    }

    fn window() -> PlausibleWindow {
        PlausibleWindow::new(1970, at(2026, 10, 17))
    }

    #[test]
    fn first_successful_source_wins() {
        let resolver = DateResolver::new(
            vec![
                Box::new(Fixed(DateOrigin::Exif, Some(at(2012, 7, 3)))),
                Box::new(Fixed(DateOrigin::FilesystemFallback, Some(at(2020, 1, 1)))),
            ],
            window(),
        );

        assert_eq!(
            resolver.resolve(&file()),
            DateResolution::Resolved(CaptureDate::new(2012, 7, DateOrigin::Exif))
        );
    }

    #[test]
    fn failing_source_falls_through() {
        let resolver = DateResolver::new(
            vec![
                Box::new(Fixed(DateOrigin::Exif, None)),
                Box::new(Fixed(DateOrigin::QuickTime, None)),
                Box::new(Fixed(DateOrigin::FilesystemFallback, Some(at(2020, 1, 1)))),
            ],
            window(),
        );

        let date = resolver.resolve(&file()).date().unwrap();
        assert_eq!((date.year, date.month), (2020, 1));
        assert_eq!(date.origin, DateOrigin::FilesystemFallback);
    }

    #[test]
    fn implausible_dates_fall_through_like_errors() {
        let resolver = DateResolver::new(
            vec![
                Box::new(Fixed(DateOrigin::QuickTime, Some(at(1904, 1, 1)))),
                Box::new(Fixed(DateOrigin::Exif, Some(at(2099, 1, 1)))),
                Box::new(Fixed(DateOrigin::FilesystemFallback, Some(at(2015, 5, 5)))),
            ],
            window(),
        );

        let date = resolver.resolve(&file()).date().unwrap();
        assert_eq!(date.origin, DateOrigin::FilesystemFallback);
    }

    /// Offers several timestamps, like mtime then ctime
    struct Several(Vec<NaiveDateTime>);

    impl DateSource for Several {
        fn origin(&self) -> DateOrigin {
            DateOrigin::FilesystemFallback
        }

        fn capture_time(&self, _file: &SourceFile) -> Result<NaiveDateTime, MetadataError> {
            self.0.first().copied().ok_or(MetadataError::MissingTag { tag: "several" })
        }

        fn candidate_times(&self, _file: &SourceFile) -> Result<Vec<NaiveDateTime>, MetadataError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn later_candidate_of_one_source_is_used_when_the_first_is_implausible() {
        let resolver = DateResolver::new(
            vec![Box::new(Several(vec![at(1904, 1, 1), at(2016, 4, 2)]))],
            window(),
        );

        let date = resolver.resolve(&file()).date().unwrap();
        assert_eq!((date.year, date.month), (2016, 4));
    }

    #[test]
    fn all_sources_failing_is_unresolved_not_a_default_date() {
        let resolver = DateResolver::new(
            vec![
                Box::new(Fixed(DateOrigin::Exif, None)),
                Box::new(Fixed(DateOrigin::FilesystemFallback, Some(at(1969, 12, 31)))),
            ],
            window(),
        );

        match resolver.resolve(&file()) {
            DateResolution::Unresolved { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(failures[1].contains("Implausible"));
            }
            other => panic!("expected unresolved, got {other:?}"),
        }
    }

    #[test]
    fn window_allows_a_day_of_clock_skew() {
        let window = window();
        assert!(window.contains(at(2026, 10, 18)));
        assert!(!window.contains(at(2026, 10, 19)));
    }

    #[test]
    fn origin_tags_parse_back() {
        for origin in [DateOrigin::Exif, DateOrigin::QuickTime, DateOrigin::FilesystemFallback] {
            assert_eq!(origin.as_str().parse::<DateOrigin>(), Ok(origin));
        }
        assert!("sundial".parse::<DateOrigin>().is_err());
    }

    #[test]
    fn capture_date_folders_are_zero_padded() {
        let date = CaptureDate::new(2012, 7, DateOrigin::Exif);
        assert_eq!(date.year_dir(), "2012");
        assert_eq!(date.month_dir(), "07");
    }
}
