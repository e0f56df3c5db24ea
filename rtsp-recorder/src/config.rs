use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What kind of output a recorder produces.
///
/// Unknown category strings fall back to [`RecorderCategory::Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecorderCategory {
    /// Archived file segments, one per rotation interval
    #[default]
    Record,
    /// Rolling HLS manifest plus transport-stream segments
    Stream,
    /// Audio-only segments, video stripped
    Audio,
    /// A single captured frame
    Image,
}

impl RecorderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderCategory::Record => "record",
            RecorderCategory::Stream => "stream",
            RecorderCategory::Audio => "audio",
            RecorderCategory::Image => "image",
        }
    }

    /// File extension for segments of this category.
    pub fn extension(&self) -> &'static str {
        match self {
            RecorderCategory::Record => ".mp4",
            RecorderCategory::Stream => ".m3u8",
            RecorderCategory::Audio => ".avi",
            RecorderCategory::Image => ".jpg",
        }
    }
}

impl FromStr for RecorderCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "stream" => RecorderCategory::Stream,
            "audio" => RecorderCategory::Audio,
            "image" => RecorderCategory::Image,
            _ => RecorderCategory::Record,
        })
    }
}

impl From<String> for RecorderCategory {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<RecorderCategory> for String {
    fn from(c: RecorderCategory) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for RecorderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for one recorder. Immutable once the recorder is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// RTSP URL with embedded credentials, if a real camera is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Output category (default: record)
    #[serde(default)]
    pub category: RecorderCategory,
    /// Segment rotation interval in seconds (default: 60)
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: u64,
    /// Root folder all output lands under
    #[serde(default = "default_folder")]
    pub folder: PathBuf,
    /// strftime format for per-day directory names
    #[serde(default = "default_dir_name_format")]
    pub dir_name_format: String,
    /// strftime format for segment file names
    #[serde(default = "default_file_name_format")]
    pub file_name_format: String,
    /// Human-readable camera name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// When set, the mock source substitutes for a missing camera URL
    #[serde(default)]
    pub mock_enabled: bool,
    /// Source used in mock mode, typically a local test file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_source: Option<String>,
}

fn default_time_limit() -> u64 {
    60
}

fn default_folder() -> PathBuf {
    PathBuf::from("media")
}

fn default_dir_name_format() -> String {
    "%-d-%b-%Y".to_string()
}

fn default_file_name_format() -> String {
    "%-d-%b-%Y %H-%M-%S".to_string()
}

impl RecorderConfig {
    /// Create a new config with defaults, rooted at the given folder
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            source_url: None,
            category: RecorderCategory::default(),
            time_limit_secs: default_time_limit(),
            folder: folder.into(),
            dir_name_format: default_dir_name_format(),
            file_name_format: default_file_name_format(),
            name: None,
            mock_enabled: false,
            mock_source: None,
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_category(mut self, category: RecorderCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_time_limit(mut self, secs: u64) -> Self {
        self.time_limit_secs = secs;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_mock_source(mut self, source: impl Into<String>) -> Self {
        self.mock_enabled = true;
        self.mock_source = Some(source.into());
        self
    }

    /// Overlay environment-provided settings: `HLS_MOCK`, `MOCK_CAM_URL`
    /// and `SEGMENT_TIME_LIMIT`.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("HLS_MOCK") {
            self.mock_enabled = v == "true";
        }
        if let Ok(v) = std::env::var("MOCK_CAM_URL") {
            self.mock_source = Some(v);
        }
        if let Ok(v) = std::env::var("SEGMENT_TIME_LIMIT") {
            if let Ok(secs) = v.parse() {
                self.time_limit_secs = secs;
            }
        }
        self
    }

    /// The URL the encoder should read from: the configured camera URL,
    /// else the mock source when mock mode is enabled.
    pub fn effective_source_url(&self) -> Option<String> {
        self.source_url.clone().or_else(|| {
            if self.mock_enabled {
                self.mock_source.clone()
            } else {
                None
            }
        })
    }

    /// Load config from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
