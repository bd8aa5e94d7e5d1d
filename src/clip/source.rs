use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::clip::types::{ClipDescriptor, SILENCE_TOKEN};
use crate::error::{ClipError, Result};

/// File read before any other in a clip directory
pub const FACTORY_CLIP_FILE: &str = "default.conf";

/// A finite, ordered, pull-based supply of clips.
///
/// Exhaustion ends the sequence; there is no terminator value.
pub trait ClipSource: Iterator<Item = ClipDescriptor> {}

impl<I: Iterator<Item = ClipDescriptor>> ClipSource for I {}

/// Group holding the clip keys
pub const CLIP_GROUP: &str = "splash";

/// Groups of a key file, each mapping keys to unescaped values
type KeyFile = HashMap<String, HashMap<String, String>>;

/// Parse desktop-entry style `[group]` / `key=value` text.
///
/// `#` starts a comment line. Keys and values are trimmed, values are not
/// quoted, and the last occurrence of a key wins.
fn parse_key_file(content: &str) -> std::result::Result<KeyFile, String> {
    let mut groups = KeyFile::new();
    let mut current: Option<String> = None;

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if name.is_empty() || name.contains(['[', ']']) {
                return Err(format!("line {}: invalid group name", number + 1));
            }
            groups.entry(name.to_string()).or_default();
            current = Some(name.to_string());
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(format!("line {}: not a group, key or comment", number + 1));
        };
        let key = key.trim_end();
        if key.is_empty() {
            return Err(format!("line {}: empty key", number + 1));
        }
        let Some(group) = current.as_ref() else {
            return Err(format!("line {}: key outside of any group", number + 1));
        };

        groups
            .entry(group.clone())
            .or_default()
            .insert(key.to_string(), unescape(value.trim_start()));
    }

    Ok(groups)
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Clip source backed by a directory of clip files.
///
/// `default.conf` plays first, then every other file in name order. Each file
/// is a key file whose `[splash]` group has `filename`, `sound` and
/// `duration` keys, all optional:
///
/// ```text
/// [splash]
/// filename=intro.avi
/// sound=s
/// duration=4000
/// ```
///
/// Relative media paths resolve under the media directory.
pub struct ConfDirSource {
    pending: VecDeque<PathBuf>,
    media_dir: PathBuf,
}

impl ConfDirSource {
    /// List the clip directory. A missing or unreadable directory yields no clips.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(conf_dir: P, media_dir: Q) -> Self {
        let conf_dir = conf_dir.as_ref();
        let pending = match Self::list(conf_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("Could not read clip directory {:?}: {}", conf_dir, e);
                VecDeque::new()
            }
        };

        info!("Found {} clip files in {:?}", pending.len(), conf_dir);

        Self {
            pending,
            media_dir: media_dir.as_ref().to_path_buf(),
        }
    }

    fn list(conf_dir: &Path) -> Result<VecDeque<PathBuf>> {
        let mut others = Vec::new();
        for entry in std::fs::read_dir(conf_dir)? {
            let path = entry?.path();
            if !path.is_file() || Self::is_hidden_file(&path) {
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some(FACTORY_CLIP_FILE) {
                continue;
            }
            others.push(path);
        }
        others.sort();

        let mut files = VecDeque::with_capacity(others.len() + 1);
        let factory = conf_dir.join(FACTORY_CLIP_FILE);
        if factory.is_file() {
            files.push_back(factory);
        }
        files.extend(others);
        Ok(files)
    }

    fn is_hidden_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
    }

    /// Parse one clip file
    pub fn read_clip_file(&self, path: &Path) -> Result<ClipDescriptor> {
        let content = std::fs::read_to_string(path).map_err(|_| ClipError::ReadFailed {
            path: path.display().to_string(),
        })?;

        let parse_failed = |reason: String| ClipError::ParseFailed {
            path: path.display().to_string(),
            reason,
        };
        let mut groups = parse_key_file(&content).map_err(parse_failed)?;
        let mut entry = groups
            .remove(CLIP_GROUP)
            .ok_or_else(|| parse_failed(format!("no [{}] group", CLIP_GROUP)))?;

        let filename = entry.remove("filename").unwrap_or_default();
        let sound = entry.remove("sound").unwrap_or_default();
        let duration_ms = match entry.get("duration").map(|d| d.parse::<i64>()) {
            None => 0,
            Some(Ok(ms)) => u64::try_from(ms).unwrap_or_else(|_| {
                warn!("Negative duration {} in {:?}, using 0", ms, path);
                0
            }),
            Some(Err(_)) => {
                warn!("Invalid duration in {:?}, using 0", path);
                0
            }
        };

        let video = self.resolve_media(&filename);
        let audio = if sound == SILENCE_TOKEN {
            sound
        } else {
            self.resolve_media(&sound)
        };

        Ok(ClipDescriptor::from_fields(&video, &audio, duration_ms))
    }

    fn resolve_media(&self, name: &str) -> String {
        if name.is_empty() || Path::new(name).is_absolute() {
            return name.to_string();
        }
        self.media_dir.join(name).display().to_string()
    }
}

impl Iterator for ConfDirSource {
    type Item = ClipDescriptor;

    fn next(&mut self) -> Option<ClipDescriptor> {
        while let Some(path) = self.pending.pop_front() {
            debug!("Reading clip file {:?}", path);
            match self.read_clip_file(&path) {
                Ok(clip) => return Some(clip),
                Err(e) => warn!("Skipping clip file {:?}: {}", path, e),
            }
        }
        None
    }
}
