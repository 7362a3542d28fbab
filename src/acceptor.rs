//! Input filtering.
//!
//! Hosts misreport or omit the media type of less common containers
//! (MKV, TS, raw HEVC), so a file is accepted when either its declared media
//! type is `video/*` or its name carries a known video extension.
//!
//! # Example
//!
//! ```
//! use endframe::{VideoFile, is_acceptable};
//!
//! assert!(is_acceptable(&VideoFile::new("holiday.MKV")));
//! assert!(is_acceptable(&VideoFile::new("capture.bin").with_media_type("video/mp2t")));
//! assert!(!is_acceptable(&VideoFile::new("notes.txt")));
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Container and bare-codec extensions recognised without a media type.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "webm", "avi", "mkv", "hevc", "ts", "m4v", "h264", "h265", "264", "265", "avc",
    "3gp",
];

/// An owned reference to one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    path: PathBuf,
    name: String,
    media_type: Option<String>,
}

impl VideoFile {
    /// Reference a file on disk. The display name is the final path component.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            path,
            name,
            media_type: None,
        }
    }

    /// Attach the media type the host declared for this file (e.g. from a
    /// drag-and-drop payload).
    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Path the file is read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name including its extension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared media type, if the host supplied one.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// File name with its last extension removed (`clip.final.mov` -> `clip.final`).
    pub fn base_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(index) if index > 0 => &self.name[..index],
            _ => &self.name,
        }
    }
}

impl Display for VideoFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.name)
    }
}

/// Returns `true` if the file is plausibly a video.
pub fn is_acceptable(file: &VideoFile) -> bool {
    let declared_video = file
        .media_type()
        .is_some_and(|media_type| media_type.trim().to_ascii_lowercase().starts_with("video/"));

    declared_video || has_video_extension(file.name())
}

fn has_video_extension(name: &str) -> bool {
    let Some((_, extension)) = name.rsplit_once('.') else {
        return false;
    };
    VIDEO_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(extension))
}

/// Split `files` into accepted and rejected inputs, preserving order.
pub fn partition_acceptable(files: Vec<VideoFile>) -> (Vec<VideoFile>, Vec<VideoFile>) {
    files.into_iter().partition(is_acceptable)
}
