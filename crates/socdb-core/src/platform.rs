use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// The closed set of platforms a collector exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Facebook,
    Twitter,
    Threads,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Instagram,
        Platform::Facebook,
        Platform::Twitter,
        Platform::Threads,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::Threads => "threads",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            "twitter" | "x" => Ok(Platform::Twitter),
            "threads" => Ok(Platform::Threads),
            other => Err(format!(
                "unsupported platform '{other}'; expected one of instagram, facebook, twitter, threads"
            )),
        }
    }
}

/// Per-platform collection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    pub enabled: bool,
    pub post_limit: u32,
    /// `None` collects every available story.
    pub story_limit: Option<u32>,
    pub download_media: bool,
    pub hashtag_limit: u32,
    pub search_sort: String,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            post_limit: 50,
            story_limit: None,
            download_media: true,
            hashtag_limit: 50,
            search_sort: "Latest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformsFile {
    #[serde(default)]
    pub platforms: BTreeMap<Platform, PlatformSettings>,
}

impl PlatformsFile {
    /// Settings for `platform`, falling back to defaults when the file omits it.
    #[must_use]
    pub fn settings(&self, platform: Platform) -> PlatformSettings {
        self.platforms.get(&platform).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn is_enabled(&self, platform: Platform) -> bool {
        self.platforms.get(&platform).is_some_and(|s| s.enabled)
    }

    /// Enabled platforms in declaration order.
    #[must_use]
    pub fn enabled_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.is_enabled(*p))
            .collect()
    }
}

/// Load and validate per-platform settings from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_platform_settings(path: &Path) -> Result<PlatformsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_platform_settings(&content)
}

fn parse_platform_settings(content: &str) -> Result<PlatformsFile, ConfigError> {
    let file: PlatformsFile =
        serde_yaml::from_str(content).map_err(ConfigError::PlatformsFileParse)?;

    for (platform, settings) in &file.platforms {
        if settings.post_limit == 0 {
            return Err(ConfigError::Validation(format!(
                "platform '{platform}' has post_limit 0; must be at least 1"
            )));
        }
        if !matches!(settings.search_sort.as_str(), "Latest" | "Top") {
            return Err(ConfigError::Validation(format!(
                "platform '{platform}' has invalid search_sort '{}'; must be Latest or Top",
                settings.search_sort
            )));
        }
    }

    Ok(file)
}
