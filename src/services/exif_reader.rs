//! Capture-timestamp extraction from photo metadata.

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Why a candidate file could not yield a capture timestamp.
///
/// These become skip-list entries, never pipeline failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No EXIF block, or no `DateTimeOriginal` field in it.
    MissingExif,
    /// EXIF present but the datetime could not be parsed.
    InvalidExif,
    /// The file itself could not be opened or read.
    Unreadable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingExif => f.write_str("missing_exif"),
            SkipReason::InvalidExif => f.write_str("invalid_exif"),
            SkipReason::Unreadable(detail) => write!(f, "unreadable:{detail}"),
        }
    }
}

/// Metadata reader collaborator consumed by the scan phase.
pub trait CaptureTimeReader: Send + Sync {
    fn read_capture_time(&self, path: &Path) -> Result<NaiveDateTime, SkipReason>;
}

/// EXIF-backed implementation reading `DateTimeOriginal`.
#[derive(Debug, Default)]
pub struct ExifCaptureTimeReader;

impl CaptureTimeReader for ExifCaptureTimeReader {
    fn read_capture_time(&self, path: &Path) -> Result<NaiveDateTime, SkipReason> {
        let file = File::open(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
        let mut reader = BufReader::new(file);
        let exif = exif::Reader::new()
            .read_from_container(&mut reader)
            .map_err(|e| match e {
                exif::Error::Io(io) => SkipReason::Unreadable(io.to_string()),
                exif::Error::NotFound(_) => SkipReason::MissingExif,
                _ => SkipReason::InvalidExif,
            })?;

        let field = exif
            .get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
            .ok_or(SkipReason::MissingExif)?;

        let ascii = match &field.value {
            exif::Value::Ascii(lines) if !lines.is_empty() => &lines[0],
            _ => return Err(SkipReason::InvalidExif),
        };
        let datetime = exif::DateTime::from_ascii(ascii).map_err(|_| SkipReason::InvalidExif)?;

        NaiveDate::from_ymd_opt(
            i32::from(datetime.year),
            u32::from(datetime.month),
            u32::from(datetime.day),
        )
        .and_then(|date| {
            date.and_hms_opt(
                u32::from(datetime.hour),
                u32::from(datetime.minute),
                u32::from(datetime.second),
            )
        })
        .ok_or(SkipReason::InvalidExif)
    }
}
