use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use log::info;
use serde::Deserialize;

use crate::playlist::Playlist;
use crate::schedule::{self, DaySelector, ScheduleRule};

/// A playlist with this name doubles as the fallback when no rule matches.
pub const DEFAULT_PLAYLIST_NAME: &str = "default";

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    playlists: BTreeMap<String, RawPlaylist>,
    #[serde(default)]
    schedules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlaylist {
    tracks: Option<Vec<PathBuf>>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    days: Option<Vec<u8>>,
    date: Option<NaiveDate>,
    hours: Vec<u8>,
    playlist: String,
}

/// Validated playlists-and-schedules configuration.
///
/// All referential and range checks happen here, at load time; resolution at
/// runtime can then never fail on a dangling playlist name.
#[derive(Debug)]
pub struct MusicConfig {
    pub playlists: HashMap<String, Playlist>,
    pub rules: Vec<ScheduleRule>,
    pub default_name: Option<String>,
    pub music_dir: PathBuf,
}

impl MusicConfig {
    pub fn load(path: &Path, music_dir: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config = Self::from_yaml(&contents, music_dir)
            .with_context(|| format!("invalid config {}", path.display()))?;
        info!(
            "loaded {} playlists and {} schedule rules from {}",
            config.playlists.len(),
            config.rules.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_yaml(yaml: &str, music_dir: &Path) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml).context("malformed YAML")?;

        let mut playlists = HashMap::new();
        for (name, raw_playlist) in raw.playlists {
            let playlist = validate_playlist(&name, raw_playlist, music_dir)?;
            playlists.insert(name, playlist);
        }

        let mut rules = Vec::with_capacity(raw.schedules.len());
        for (position, raw_rule) in raw.schedules.into_iter().enumerate() {
            let rule = validate_rule(position, raw_rule, &playlists)?;
            rules.push(rule);
        }

        let default_name = playlists
            .contains_key(DEFAULT_PLAYLIST_NAME)
            .then(|| DEFAULT_PLAYLIST_NAME.to_string());

        Ok(Self {
            playlists,
            rules,
            default_name,
            music_dir: music_dir.to_path_buf(),
        })
    }

    /// Configuration used when no config file exists: a single default
    /// playlist over the whole music directory, no schedule rules.
    pub fn fallback(music_dir: &Path) -> Self {
        let default = Playlist::from_directory(DEFAULT_PLAYLIST_NAME, music_dir);
        Self {
            playlists: HashMap::from([(DEFAULT_PLAYLIST_NAME.to_string(), default)]),
            rules: Vec::new(),
            default_name: Some(DEFAULT_PLAYLIST_NAME.to_string()),
            music_dir: music_dir.to_path_buf(),
        }
    }

    /// The playlist scheduled for `now`, if any.
    pub fn active_playlist(&self, now: NaiveDateTime) -> Option<&Playlist> {
        schedule::resolve(now, &self.rules, &self.playlists, self.default_name.as_deref())
    }
}

fn validate_playlist(name: &str, raw: RawPlaylist, music_dir: &Path) -> Result<Playlist> {
    match (raw.tracks, raw.directory) {
        (Some(_), Some(_)) => {
            bail!("playlist '{name}' sets both tracks and directory; pick one")
        }
        (None, None) => bail!("playlist '{name}' sets neither tracks nor directory"),
        (Some(tracks), None) => {
            if tracks.is_empty() {
                bail!("playlist '{name}' has an empty track list");
            }
            Ok(Playlist::from_tracks(name, tracks))
        }
        (None, Some(directory)) => {
            let anchored = if directory.is_absolute() {
                directory.clone()
            } else {
                music_dir.join(&directory)
            };
            if !anchored.is_dir() {
                bail!(
                    "playlist '{name}' directory {} is missing or unreadable",
                    anchored.display()
                );
            }
            Ok(Playlist::from_directory(name, directory))
        }
    }
}

fn validate_rule(
    position: usize,
    raw: RawRule,
    playlists: &HashMap<String, Playlist>,
) -> Result<ScheduleRule> {
    let selector = match (raw.days, raw.date) {
        (Some(_), Some(_)) => {
            bail!("schedule entry {position} sets both days and date; pick one")
        }
        (None, None) => bail!("schedule entry {position} sets neither days nor date"),
        (Some(days), None) => {
            if days.is_empty() {
                bail!("schedule entry {position} has an empty day list");
            }
            if let Some(bad) = days.iter().find(|day| **day > 6) {
                bail!("schedule entry {position} has day {bad} outside 0-6 (0 = Monday)");
            }
            DaySelector::Days(days.into_iter().collect())
        }
        (None, Some(date)) => DaySelector::Date(date),
    };

    if raw.hours.is_empty() {
        bail!("schedule entry {position} has an empty hour list");
    }
    if let Some(bad) = raw.hours.iter().find(|hour| **hour > 23) {
        bail!("schedule entry {position} has hour {bad} outside 0-23");
    }
    let hours: BTreeSet<u8> = raw.hours.into_iter().collect();

    if !playlists.contains_key(&raw.playlist) {
        bail!(
            "schedule entry {position} references unknown playlist '{}'",
            raw.playlist
        );
    }

    Ok(ScheduleRule {
        selector,
        hours,
        playlist: raw.playlist,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn load(yaml: &str) -> Result<MusicConfig> {
        MusicConfig::from_yaml(yaml, Path::new("music"))
    }

    #[test]
    fn parses_the_persisted_format() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            r#"
playlists:
  morning:
    tracks:
      - one.mp3
      - two.mp3
  default:
    directory: "{}"
schedules:
  - days: [0, 1, 2, 3, 4]
    hours: [7, 8, 9, 10, 11]
    playlist: morning
  - date: 2025-07-12
    hours: [10]
    playlist: default
"#,
            dir.path().display()
        );

        let config = MusicConfig::from_yaml(&yaml, Path::new("music")).unwrap();
        assert_eq!(config.playlists.len(), 2);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.default_name.as_deref(), Some("default"));
        assert_eq!(
            config.rules[1].selector,
            DaySelector::Date(NaiveDate::from_ymd_opt(2025, 7, 12).unwrap())
        );
    }

    #[test]
    fn unknown_playlist_reference_is_rejected() {
        let yaml = r#"
playlists:
  morning:
    tracks: [one.mp3]
schedules:
  - days: [0]
    hours: [7]
    playlist: evening
"#;
        let err = load(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown playlist 'evening'"));
    }

    #[test]
    fn out_of_range_hours_and_days_are_rejected() {
        let yaml = r#"
playlists:
  morning:
    tracks: [one.mp3]
schedules:
  - days: [0]
    hours: [24]
    playlist: morning
"#;
        assert!(load(yaml).unwrap_err().to_string().contains("hour 24"));

        let yaml = r#"
playlists:
  morning:
    tracks: [one.mp3]
schedules:
  - days: [7]
    hours: [10]
    playlist: morning
"#;
        assert!(load(yaml).unwrap_err().to_string().contains("day 7"));
    }

    #[test]
    fn selector_must_be_days_or_date_not_both() {
        let yaml = r#"
playlists:
  morning:
    tracks: [one.mp3]
schedules:
  - days: [0]
    date: 2025-07-12
    hours: [10]
    playlist: morning
"#;
        assert!(load(yaml).unwrap_err().to_string().contains("both days and date"));

        let yaml = r#"
playlists:
  morning:
    tracks: [one.mp3]
schedules:
  - hours: [10]
    playlist: morning
"#;
        assert!(load(yaml)
            .unwrap_err()
            .to_string()
            .contains("neither days nor date"));
    }

    #[test]
    fn playlist_needs_exactly_one_source() {
        let yaml = r#"
playlists:
  broken: {}
"#;
        assert!(load(yaml)
            .unwrap_err()
            .to_string()
            .contains("neither tracks nor directory"));
    }

    #[test]
    fn missing_playlist_directory_is_fatal() {
        let yaml = r#"
playlists:
  default:
    directory: /definitely/not/here
"#;
        assert!(load(yaml)
            .unwrap_err()
            .to_string()
            .contains("missing or unreadable"));
    }

    #[test]
    fn fallback_config_covers_the_music_dir() {
        let config = MusicConfig::fallback(Path::new("music"));
        let now = NaiveDate::from_ymd_opt(2025, 7, 9)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap();
        assert_eq!(config.active_playlist(now).unwrap().name, "default");
    }

    #[test]
    fn resolution_honours_declaration_order_through_the_config() {
        let yaml = r#"
playlists:
  morning:
    tracks: [one.mp3]
  afternoon:
    tracks: [two.mp3]
schedules:
  - days: [0, 1, 2, 3, 4]
    hours: [7, 8, 9, 10, 11]
    playlist: morning
  - days: [0, 1, 2, 3, 4]
    hours: [11, 12, 13]
    playlist: afternoon
"#;
        let config = load(yaml).unwrap();
        // Both rules cover Wednesday 11:00; the first declared wins.
        let now = NaiveDate::from_ymd_opt(2025, 7, 9)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();
        assert_eq!(config.active_playlist(now).unwrap().name, "morning");
    }
}
