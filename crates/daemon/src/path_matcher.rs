//! Filename matcher for files that are ready to transcode.
//!
//! A file is eligible when its name ends with one or two whitespace
//! characters, the marker `xx` or `XX`, a dot and one of the allowed media
//! extensions, e.g. `Show s01e01 xx.mp4` or `Movie  XX.mkv`. The output name
//! drops the whitespace and marker and always uses the `.mp4` container.

use std::path::{Path, PathBuf};

/// Media extensions accepted by default (matched case-sensitively in the marker grammar).
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "wmv"];

/// Extension that is only accepted when explicitly enabled.
pub const OPTIONAL_EXTENSION: &str = "mpg";

/// Container extension of every output file.
pub const OUTPUT_EXTENSION: &str = "mp4";

/// How a file found inside a delivery unit is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// Carries the marker pattern and an allowed extension.
    Eligible,
    /// Has a media extension but not the marker pattern. Recorded as an error.
    NearMiss,
    /// Not a media file at all (subtitles, nfo, images...). Silently ignored.
    Ignored,
}

/// Recognizes eligible input files and derives their output names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatcher {
    extensions: Vec<&'static str>,
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::new(false)
    }
}

impl PathMatcher {
    /// Create a matcher for the default extension set, plus `mpg` when `accept_mpg` is set.
    pub fn new(accept_mpg: bool) -> Self {
        let mut extensions = MEDIA_EXTENSIONS.to_vec();
        if accept_mpg {
            extensions.push(OPTIONAL_EXTENSION);
        }
        Self { extensions }
    }

    /// The extension set this matcher accepts.
    pub fn extensions(&self) -> &[&'static str] {
        &self.extensions
    }

    /// Returns the part of the name before the whitespace + marker, if the
    /// name matches the grammar.
    ///
    /// An empty stem (` xx.mp4`) is rejected: its output would be named `.mp4`.
    fn marker_stem<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let (rest, ext) = file_name.rsplit_once('.')?;
        if !self.extensions.contains(&ext) {
            return None;
        }

        let before_marker = rest
            .strip_suffix("xx")
            .or_else(|| rest.strip_suffix("XX"))?;

        let stem = before_marker.trim_end_matches(char::is_whitespace);
        let whitespace = before_marker[stem.len()..].chars().count();
        if !(1..=2).contains(&whitespace) || stem.is_empty() {
            return None;
        }

        Some(stem)
    }

    /// True iff `file_name` matches the marker grammar.
    pub fn is_eligible(&self, file_name: &str) -> bool {
        self.marker_stem(file_name).is_some()
    }

    /// True if the extension is one of the accepted media extensions, ignoring case.
    pub fn is_media_file(&self, file_name: &str) -> bool {
        file_name
            .rsplit_once('.')
            .map(|(_, ext)| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Classify a bare file name.
    pub fn classify(&self, file_name: &str) -> FileClass {
        if self.is_eligible(file_name) {
            FileClass::Eligible
        } else if self.is_media_file(file_name) {
            FileClass::NearMiss
        } else {
            FileClass::Ignored
        }
    }

    /// Derive the output file name.
    ///
    /// For an eligible name the whitespace and marker are removed and the
    /// extension is forced to `.mp4`: `movie  xx.mkv` -> `movie.mp4`. Any
    /// other name only has its extension replaced.
    pub fn derive_output_name(&self, file_name: &str) -> String {
        let stem = match self.marker_stem(file_name) {
            Some(stem) => stem,
            None => file_name
                .rsplit_once('.')
                .map(|(stem, _)| stem)
                .filter(|stem| !stem.is_empty())
                .unwrap_or(file_name),
        };
        format!("{}.{}", stem, OUTPUT_EXTENSION)
    }

    /// Output path beside `input`, or `None` when the input has no usable file name.
    pub fn output_path(&self, input: &Path) -> Option<PathBuf> {
        let name = input.file_name()?.to_str()?;
        Some(input.with_file_name(self.derive_output_name(name)))
    }
}

/// [`PathMatcher::is_eligible`] with the default extension set.
pub fn is_eligible(file_name: &str) -> bool {
    PathMatcher::default().is_eligible(file_name)
}

/// [`PathMatcher::derive_output_name`] with the default extension set.
pub fn derive_output_name(file_name: &str) -> String {
    PathMatcher::default().derive_output_name(file_name)
}
