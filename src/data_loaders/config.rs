use std::{fs, path::Path};

use serde_yaml::{Mapping, Value};

use crate::{info, warn};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debug: bool,
    pub log_level: String,
    pub settings: AppSettings,
    pub wallpapers: Vec<WallpaperProfile>,
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub pausing: PausingSettings,
    pub runtime: RuntimeSettings,
    pub watcher: WatcherSettings,
    pub development: DevelopmentSettings,
}

#[derive(Debug, Clone)]
pub struct PausingSettings {
    /// Pause rendering while a foreground window fully covers a monitor.
    pub fullscreen: bool,
    /// Pause rendering after the user has been idle for `idle_timeout_secs`.
    pub idle: bool,
    pub idle_timeout_secs: u64,
    pub check_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub tick_sleep_ms: u64,
    /// Settle time after a display-change notification before reconciling.
    pub reconcile_debounce_ms: u64,
}

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub enabled: bool,
    pub interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct DevelopmentSettings {
    pub debug: bool,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct WallpaperProfile {
    pub section: String,
    pub enabled: bool,
    pub url: String,
    pub monitor_index: Vec<String>,
    pub interactive: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            pausing: PausingSettings::default(),
            runtime: RuntimeSettings::default(),
            watcher: WatcherSettings::default(),
            development: DevelopmentSettings::default(),
        }
    }
}

impl Default for PausingSettings {
    fn default() -> Self {
        Self {
            fullscreen: true,
            idle: false,
            idle_timeout_secs: 300,
            check_interval_ms: 1000,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_sleep_ms: 16,
            reconcile_debounce_ms: 400,
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 600,
        }
    }
}

impl Default for DevelopmentSettings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let settings = AppSettings::default();
        Self {
            debug: settings.development.debug,
            log_level: settings.development.log_level.clone(),
            settings,
            wallpapers: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Option<Self> {
        let txt = fs::read_to_string(path).ok()?;
        let value: Value = serde_yaml::from_str(&txt).ok()?;
        Self::from_yaml(&value)
    }

    pub fn from_yaml(root: &Value) -> Option<Self> {
        let map = root.as_mapping()?;

        let settings = parse_settings(map);
        let debug = settings.development.debug;
        let log_level = settings.development.log_level.clone();

        let mut wallpapers = parse_wallpaper_sections(map);
        wallpapers.sort_by(|a, b| section_order_key(&a.section).cmp(&section_order_key(&b.section)));

        Some(Self {
            debug,
            log_level,
            settings,
            wallpapers,
        })
    }

    pub fn enabled_wallpapers(&self) -> Vec<&WallpaperProfile> {
        self.wallpapers.iter().filter(|w| w.enabled).collect()
    }
}

fn parse_wallpaper_sections(map: &Mapping) -> Vec<WallpaperProfile> {
    let mut wallpapers = Vec::<WallpaperProfile>::new();

    for (k, v) in map.iter() {
        let Some(section) = k.as_str() else {
            continue;
        };

        if !section.starts_with("wallpaper") {
            continue;
        }

        if let Some(section_map) = v.as_mapping() {
            if let Some(parsed) = parse_wallpaper_section(section, section_map) {
                wallpapers.push(parsed);
            }
        }
    }

    wallpapers
}

fn parse_wallpaper_section(section: &str, section_map: &Mapping) -> Option<WallpaperProfile> {
    let url = str_at(section_map, "url")?.trim().to_string();
    if url.is_empty() {
        return None;
    }

    let enabled = bool_at(section_map, "enabled").unwrap_or(true);
    let monitor_index =
        string_list_at(section_map, "monitor_index").unwrap_or_else(|| vec!["*".to_string()]);
    let interactive = bool_any(section_map, &["interactive", "mouse_input"]).unwrap_or(true);

    Some(WallpaperProfile {
        section: section.to_string(),
        enabled,
        url,
        monitor_index,
        interactive,
    })
}

fn parse_settings(root: &Mapping) -> AppSettings {
    let mut settings = AppSettings::default();

    settings.development.debug = bool_at(root, "debug").unwrap_or(settings.development.debug);
    if let Some(level) = str_at(root, "log_level") {
        settings.development.log_level = level.to_lowercase();
    }

    let settings_map = mapping_at(root, "settings");
    let pausing_map = settings_map.and_then(|v| mapping_at(v, "pausing"));
    let runtime_map = settings_map.and_then(|v| mapping_at(v, "runtime"));
    let watcher_map = settings_map.and_then(|v| mapping_at(v, "watcher"));
    let development_map = settings_map.and_then(|v| mapping_at(v, "development"));

    if let Some(pausing) = pausing_map {
        settings.pausing.fullscreen = bool_any(pausing, &["fullscreen", "pause_on_fullscreen"])
            .unwrap_or(settings.pausing.fullscreen);
        settings.pausing.idle =
            bool_any(pausing, &["idle", "pause_on_idle"]).unwrap_or(settings.pausing.idle);
        settings.pausing.idle_timeout_secs = u64_any(pausing, &["idle_timeout_secs", "idle_secs"])
            .unwrap_or(settings.pausing.idle_timeout_secs)
            .max(10);
        settings.pausing.check_interval_ms = u64_at(pausing, "check_interval_ms")
            .unwrap_or(settings.pausing.check_interval_ms)
            .max(100);
    }

    if let Some(runtime) = runtime_map {
        settings.runtime.tick_sleep_ms = u64_at(runtime, "tick_sleep_ms")
            .unwrap_or(settings.runtime.tick_sleep_ms)
            .max(1);
        settings.runtime.reconcile_debounce_ms = u64_any(
            runtime,
            &["reconcile_debounce_ms", "display_debounce_ms"],
        )
        .unwrap_or(settings.runtime.reconcile_debounce_ms)
        .max(50);
    }

    if let Some(watcher) = watcher_map {
        settings.watcher.enabled = bool_any(watcher, &["enabled", "auto_reload", "watch_files"])
            .unwrap_or(settings.watcher.enabled);
        settings.watcher.interval_ms = u64_any(watcher, &["interval_ms", "scan_interval_ms"])
            .unwrap_or(settings.watcher.interval_ms)
            .max(100);
    }

    if let Some(dev) = development_map {
        settings.development.debug =
            bool_any(dev, &["debug", "debug_mode"]).unwrap_or(settings.development.debug);
        if let Some(level) = str_any(dev, &["log_level", "logging"]) {
            settings.development.log_level = level.to_lowercase();
        }
    }

    settings
}

/// Write a starter config on first run instead of failing on a missing file.
pub fn scaffold_default(path: &Path) {
    if path.exists() {
        return;
    }

    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }

    let content = r#"settings:
  pausing:
    fullscreen: true
    idle: false
    idle_timeout_secs: 300
    check_interval_ms: 1000
  runtime:
    tick_sleep_ms: 16
    reconcile_debounce_ms: 400
  watcher:
    enabled: true
    interval_ms: 600
  development:
    debug: false
    log_level: warn

wallpaper:
  enabled: false
  url: "https://example.com"
  monitor_index:
    - "*"
  interactive: true
"#;
    match fs::write(path, content) {
        Ok(_) => info!("Created default config at {}", path.display()),
        Err(e) => warn!("Failed to create default config at {}: {e}", path.display()),
    }
}

fn bool_at(map: &Mapping, key: &str) -> Option<bool> {
    map.get(Value::String(key.to_string()))?.as_bool()
}

fn bool_any(map: &Mapping, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| bool_at(map, k))
}

fn str_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(Value::String(key.to_string()))?.as_str()
}

fn str_any<'a>(map: &'a Mapping, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| str_at(map, k))
}

fn mapping_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    map.get(Value::String(key.to_string()))?.as_mapping()
}

fn u64_at(map: &Mapping, key: &str) -> Option<u64> {
    map.get(Value::String(key.to_string()))?
        .as_i64()
        .and_then(|v| if v >= 0 { Some(v as u64) } else { None })
}

fn u64_any(map: &Mapping, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| u64_at(map, k))
}

fn string_list_at(map: &Mapping, key: &str) -> Option<Vec<String>> {
    let list = map.get(Value::String(key.to_string()))?.as_sequence()?;
    let parsed: Vec<String> = list
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect();

    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

fn section_order_key(section: &str) -> (u8, u32, String) {
    if section == "wallpaper" {
        return (0, 0, section.to_string());
    }

    if let Some(suffix) = section.strip_prefix("wallpaper") {
        if let Ok(number) = suffix.parse::<u32>() {
            return (1, number, section.to_string());
        }
    }

    (2, u32::MAX, section.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> AppConfig {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        AppConfig::from_yaml(&value).unwrap()
    }

    #[test]
    fn defaults_when_sections_missing() {
        let cfg = parse("{}");
        assert!(cfg.settings.pausing.fullscreen);
        assert!(!cfg.settings.pausing.idle);
        assert_eq!(cfg.settings.runtime.tick_sleep_ms, 16);
        assert!(cfg.wallpapers.is_empty());
    }

    #[test]
    fn wallpaper_sections_are_ordered_and_filtered() {
        let cfg = parse(
            r#"
wallpaper2:
  url: "https://b.example"
wallpaper:
  url: "https://a.example"
  interactive: false
wallpaper9:
  enabled: false
  url: "https://c.example"
"#,
        );
        assert_eq!(cfg.wallpapers.len(), 3);
        assert_eq!(cfg.wallpapers[0].section, "wallpaper");
        assert!(!cfg.wallpapers[0].interactive);
        assert_eq!(cfg.wallpapers[1].section, "wallpaper2");
        assert_eq!(cfg.enabled_wallpapers().len(), 2);
    }

    #[test]
    fn empty_url_drops_section() {
        let cfg = parse("wallpaper:\n  url: \"  \"\n");
        assert!(cfg.wallpapers.is_empty());
    }

    #[test]
    fn clamps_and_aliases() {
        let cfg = parse(
            r#"
settings:
  pausing:
    idle: true
    idle_timeout_secs: 1
  runtime:
    tick_sleep_ms: 0
  watcher:
    auto_reload: false
"#,
        );
        assert!(cfg.settings.pausing.idle);
        assert_eq!(cfg.settings.pausing.idle_timeout_secs, 10);
        assert_eq!(cfg.settings.runtime.tick_sleep_ms, 1);
        assert!(!cfg.settings.watcher.enabled);
    }
}
