//! Configuration loading.
//!
//! Defaults are overlaid by `/etc/sqtop/config.toml`, then the user config
//! file, then `SQTOP_*` environment variables. Invalid values fall back to
//! defaults with a warning unless `SQTOP_STRICT_CONFIG=1`, in which case the
//! first problem is returned as an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::models::EntityKind;
use crate::parser::ColumnLayout;
use crate::parser::layout::{DEFAULT_JOBS_FORMAT, DEFAULT_NODES_FORMAT};

const SYSTEM_CONFIG_PATH: &str = "/etc/sqtop/config.toml";

/// Minimum poll interval in seconds (prevents tight polling loops)
const MIN_POLL_INTERVAL: f64 = 0.5;

/// Minimum command timeout in seconds
const MIN_COMMAND_TIMEOUT: f64 = 1.0;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SqtopConfig {
    pub system: SystemConfig,
    pub refresh: RefreshConfig,
    pub columns: ColumnCaps,
    pub layout: LayoutConfig,
    pub attach: AttachConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Directory containing squeue, sinfo, scontrol and srun.
    /// Auto-detected via PATH when unset.
    pub slurm_bin_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds between refresh ticks
    pub poll_interval: f64,

    /// Seconds before a query command is killed
    pub command_timeout: f64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            poll_interval: 2.0,
            command_timeout: 10.0,
        }
    }
}

impl RefreshConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval)
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.command_timeout)
    }

    /// Age after which a snapshot counts as stale: two missed ticks plus
    /// one full command timeout.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.poll_interval() * 2 + self.command_timeout()
    }

    /// Validate values, correcting them to defaults unless `strict`.
    pub fn validate(&mut self, strict: bool) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();
        let defaults = Self::default();

        validate_seconds(
            &mut self.poll_interval,
            "poll_interval",
            MIN_POLL_INTERVAL,
            defaults.poll_interval,
            strict,
            &mut warnings,
        )?;
        validate_seconds(
            &mut self.command_timeout,
            "command_timeout",
            MIN_COMMAND_TIMEOUT,
            defaults.command_timeout,
            strict,
            &mut warnings,
        )?;

        Ok(warnings)
    }
}

fn validate_seconds(
    value: &mut f64,
    field: &str,
    min: f64,
    default: f64,
    strict: bool,
    warnings: &mut Vec<String>,
) -> Result<(), String> {
    if !value.is_finite() || *value < min {
        let msg = format!("refresh.{field} must be at least {min} second(s), got {value}");
        if strict {
            return Err(msg);
        }
        warnings.push(format!("{msg} - using default ({default})"));
        *value = default;
    }
    Ok(())
}

/// Maximum display widths per column, in characters. 0 disables the cap.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ColumnCaps {
    pub name: usize,
    pub user: usize,
    pub partition: usize,
    pub nodelist_reason: usize,
}

impl Default for ColumnCaps {
    fn default() -> Self {
        Self {
            name: 24,
            user: 12,
            partition: 14,
            nodelist_reason: 40,
        }
    }
}

/// Slurm `-o` format strings for the job and node queries.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub jobs_format: String,
    pub nodes_format: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            jobs_format: DEFAULT_JOBS_FORMAT.to_string(),
            nodes_format: DEFAULT_NODES_FORMAT.to_string(),
        }
    }
}

impl LayoutConfig {
    /// Build both layouts, replacing unusable format strings with defaults.
    pub fn build(&mut self, strict: bool) -> Result<(QueryLayouts, Vec<String>), String> {
        let mut warnings = Vec::new();
        let jobs = build_layout(EntityKind::Jobs, &mut self.jobs_format, DEFAULT_JOBS_FORMAT, strict, &mut warnings)?;
        let nodes = build_layout(EntityKind::Nodes, &mut self.nodes_format, DEFAULT_NODES_FORMAT, strict, &mut warnings)?;
        Ok((QueryLayouts { jobs, nodes }, warnings))
    }
}

fn build_layout(
    kind: EntityKind,
    format: &mut String,
    default: &str,
    strict: bool,
    warnings: &mut Vec<String>,
) -> Result<ColumnLayout, String> {
    match ColumnLayout::from_format(kind, format) {
        Ok(layout) => Ok(layout),
        Err(e) if strict => Err(format!("layout.{kind}_format: {e}")),
        Err(e) => {
            warnings.push(format!("layout.{kind}_format: {e} - using default"));
            *format = default.to_string();
            ColumnLayout::from_format(kind, default).map_err(|e| e.to_string())
        }
    }
}

/// Column layouts shared by the query commands and the parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLayouts {
    pub jobs: ColumnLayout,
    pub nodes: ColumnLayout,
}

impl Default for QueryLayouts {
    fn default() -> Self {
        Self {
            jobs: ColumnLayout::default_jobs(),
            nodes: ColumnLayout::default_nodes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AttachConfig {
    pub enabled: bool,

    /// Command run inside the allocation; `$VAR` expands locally.
    pub default_command: String,

    /// Extra srun arguments placed before `--jobid`
    pub extra_args: String,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_command: "$SHELL -l".to_string(),
            extra_args: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub theme: String,

    /// View shown on startup: jobs, nodes or partitions
    pub default_view: String,

    /// Start with the job list restricted to the current user
    pub only_mine: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            default_view: "jobs".to_string(),
            only_mine: false,
        }
    }
}

/// Fully validated configuration plus anything worth telling the user.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: SqtopConfig,
    pub layouts: QueryLayouts,
    pub warnings: Vec<String>,
}

impl SqtopConfig {
    /// User config file path.
    ///
    /// `$XDG_CONFIG_HOME/sqtop/config.toml`, then `~/.config/sqtop/config.toml`,
    /// then the platform config dir from `dirs`.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
            && !xdg_config.is_empty()
        {
            return Some(PathBuf::from(xdg_config).join("sqtop/config.toml"));
        }

        if let Some(home) = std::env::var_os("HOME") {
            return Some(PathBuf::from(home).join(".config/sqtop/config.toml"));
        }

        dirs::config_dir().map(|dir| dir.join("sqtop/config.toml"))
    }

    /// Load from the standard locations and the process environment.
    pub fn load() -> Result<LoadedConfig> {
        let mut paths = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
        if let Some(user_path) = Self::user_config_path() {
            paths.push(user_path);
        }
        let strict = is_strict(|name| std::env::var(name).ok());
        Self::load_with(&paths, strict, |name| std::env::var(name).ok())
    }

    /// Load from explicit files with an injectable environment.
    pub fn load_with<F>(paths: &[PathBuf], strict: bool, env: F) -> Result<LoadedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut warnings = Vec::new();

        for path in paths {
            if let Some(parsed) = Self::read_file(path, strict, &mut warnings)? {
                config.merge(parsed);
            }
        }

        config.apply_env_overrides(&env, strict, &mut warnings)?;

        let refresh_warnings = config
            .refresh
            .validate(strict)
            .map_err(|e| anyhow::anyhow!("{e} (SQTOP_STRICT_CONFIG is set)"))?;
        warnings.extend(refresh_warnings);

        let (layouts, layout_warnings) = config
            .layout
            .build(strict)
            .map_err(|e| anyhow::anyhow!("{e} (SQTOP_STRICT_CONFIG is set)"))?;
        warnings.extend(layout_warnings);

        if !matches!(config.display.default_view.as_str(), "jobs" | "nodes" | "partitions") {
            let msg = format!(
                "display.default_view must be jobs, nodes or partitions, got {:?}",
                config.display.default_view
            );
            if strict {
                bail!("{msg} (SQTOP_STRICT_CONFIG is set)");
            }
            warnings.push(format!("{msg} - using default (jobs)"));
            config.display.default_view = "jobs".to_string();
        }

        Ok(LoadedConfig {
            config,
            layouts,
            warnings,
        })
    }

    /// Read one config file. Missing files are silently skipped.
    fn read_file(path: &Path, strict: bool, warnings: &mut Vec<String>) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) if strict => {
                return Err(e).with_context(|| format!("Could not read config file '{}'", path.display()));
            }
            Err(e) => {
                warnings.push(format!("Could not read config '{}': {}", path.display(), e));
                return Ok(None);
            }
        };

        match toml::from_str::<SqtopConfig>(&content) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) if strict => {
                Err(e).with_context(|| format!("Failed to parse config file '{}'", path.display()))
            }
            Err(e) => {
                warnings.push(format!("Config parse error in '{}': {}", path.display(), e));
                Ok(None)
            }
        }
    }

    fn merge(&mut self, other: SqtopConfig) {
        self.system.slurm_bin_path = other
            .system
            .slurm_bin_path
            .or(self.system.slurm_bin_path.take());
        self.refresh = other.refresh;
        self.columns = other.columns;
        self.layout = other.layout;
        self.attach = other.attach;
        self.display = other.display;
    }

    fn apply_env_overrides<F>(&mut self, env: &F, strict: bool, warnings: &mut Vec<String>) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = env("SQTOP_SLURM_PATH")
            && !val.is_empty()
        {
            let path = PathBuf::from(&val);
            if path.is_dir() {
                self.system.slurm_bin_path = Some(path);
            } else {
                report_env_error(strict, warnings, "SQTOP_SLURM_PATH", &val, "not a valid directory")?;
            }
        }

        if let Some(val) = env("SQTOP_POLL_INTERVAL") {
            match val.parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs >= MIN_POLL_INTERVAL => {
                    self.refresh.poll_interval = secs;
                }
                _ => report_env_error(
                    strict,
                    warnings,
                    "SQTOP_POLL_INTERVAL",
                    &val,
                    &format!("expected seconds >= {MIN_POLL_INTERVAL}"),
                )?,
            }
        }

        if let Some(val) = env("SQTOP_COMMAND_TIMEOUT") {
            match val.parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs >= MIN_COMMAND_TIMEOUT => {
                    self.refresh.command_timeout = secs;
                }
                _ => report_env_error(
                    strict,
                    warnings,
                    "SQTOP_COMMAND_TIMEOUT",
                    &val,
                    &format!("expected seconds >= {MIN_COMMAND_TIMEOUT}"),
                )?,
            }
        }

        if let Some(val) = env("SQTOP_THEME")
            && !val.is_empty()
        {
            self.display.theme = val;
        }

        Ok(())
    }
}

fn is_strict<F: Fn(&str) -> Option<String>>(env: F) -> bool {
    env("SQTOP_STRICT_CONFIG").is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn report_env_error(
    strict: bool,
    warnings: &mut Vec<String>,
    var_name: &str,
    value: &str,
    reason: &str,
) -> Result<()> {
    if strict {
        bail!("Invalid value '{value}' for {var_name}: {reason} (SQTOP_STRICT_CONFIG is set)");
    }
    warnings.push(format!(
        "Invalid value '{value}' for {var_name}, {reason} - using default"
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_files() {
        let loaded = SqtopConfig::load_with(&[PathBuf::from("/nonexistent/sqtop.toml")], false, no_env).unwrap();
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.config.refresh.poll_interval, 2.0);
        assert_eq!(loaded.config.refresh.command_timeout, 10.0);
        assert!(loaded.config.attach.enabled);
        assert_eq!(loaded.config.attach.default_command, "$SHELL -l");
        assert_eq!(loaded.config.attach.extra_args, "");
        assert_eq!(loaded.layouts, QueryLayouts::default());
        assert_eq!(loaded.config.refresh.stale_after(), Duration::from_secs(14));
    }

    #[test]
    fn test_partial_attach_section_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "config.toml", "[attach]\nenabled = false\n\n[refresh]\npoll_interval = 10.0\n");
        let loaded = SqtopConfig::load_with(&[path], false, no_env).unwrap();
        assert!(!loaded.config.attach.enabled);
        assert_eq!(loaded.config.attach.default_command, "$SHELL -l");
        assert_eq!(loaded.config.refresh.poll_interval, 10.0);
        assert_eq!(loaded.config.refresh.command_timeout, 10.0);
    }

    #[test]
    fn test_later_file_wins_but_keeps_slurm_path() {
        let dir = tempfile::tempdir().unwrap();
        let system = write_config(&dir, "system.toml", "[system]\nslurm_bin_path = \"/opt/slurm/bin\"\n");
        let user = write_config(&dir, "user.toml", "[display]\ntheme = \"light\"\n");
        let loaded = SqtopConfig::load_with(&[system, user], false, no_env).unwrap();
        assert_eq!(
            loaded.config.system.slurm_bin_path,
            Some(PathBuf::from("/opt/slurm/bin"))
        );
        assert_eq!(loaded.config.display.theme, "light");
    }

    #[test]
    fn test_parse_error_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "config.toml", "[refresh\npoll_interval = ");
        let loaded = SqtopConfig::load_with(&[path.clone()], false, no_env).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Config parse error"));

        assert!(SqtopConfig::load_with(&[path], true, no_env).is_err());
    }

    #[test]
    fn test_refresh_validate_corrects_values() {
        let mut refresh = RefreshConfig {
            poll_interval: 0.0,
            command_timeout: 10.0,
        };
        let warnings = refresh.validate(false).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("poll_interval"));
        assert_eq!(refresh.poll_interval, 2.0);
    }

    #[test]
    fn test_refresh_validate_strict_mode_error() {
        let mut refresh = RefreshConfig {
            poll_interval: 2.0,
            command_timeout: 0.1,
        };
        let err = refresh.validate(true).unwrap_err();
        assert!(err.contains("command_timeout"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SQTOP_POLL_INTERVAL", "5"),
            ("SQTOP_COMMAND_TIMEOUT", "30"),
            ("SQTOP_THEME", "light"),
        ]);
        let loaded = SqtopConfig::load_with(&[], false, |name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(loaded.config.refresh.poll_interval, 5.0);
        assert_eq!(loaded.config.refresh.command_timeout, 30.0);
        assert_eq!(loaded.config.display.theme, "light");
    }

    #[test]
    fn test_invalid_env_value() {
        let env = |name: &str| (name == "SQTOP_POLL_INTERVAL").then(|| "fast".to_string());
        let loaded = SqtopConfig::load_with(&[], false, env).unwrap();
        assert_eq!(loaded.config.refresh.poll_interval, 2.0);
        assert!(loaded.warnings[0].contains("SQTOP_POLL_INTERVAL"));

        assert!(SqtopConfig::load_with(&[], true, env).is_err());
    }

    #[test]
    fn test_custom_layout_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "config.toml", "[layout]\njobs_format = \"%i|%u|%T\"\n");
        let loaded = SqtopConfig::load_with(&[path], false, no_env).unwrap();
        assert_eq!(loaded.layouts.jobs.format(), "%i|%u|%T");
        assert_eq!(loaded.layouts.nodes, ColumnLayout::default_nodes());
    }

    #[test]
    fn test_invalid_layout_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "config.toml", "[layout]\nnodes_format = \"%T|%P\"\n");
        let loaded = SqtopConfig::load_with(&[path], false, no_env).unwrap();
        assert_eq!(loaded.layouts.nodes, ColumnLayout::default_nodes());
        assert!(loaded.warnings.iter().any(|w| w.contains("nodes_format")));
    }

    #[test]
    fn test_strict_flag_parsing() {
        assert!(is_strict(|_| Some("1".to_string())));
        assert!(is_strict(|_| Some("TRUE".to_string())));
        assert!(!is_strict(|_| Some("0".to_string())));
        assert!(!is_strict(no_env));
    }
}
