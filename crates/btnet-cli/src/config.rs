//! Configuration Vault – reads/writes `~/.btnet/config.toml`.

use btnet_hal::{SimAdapter, SimAdapterBuilder};
use btnet_kernel::RequestCodes;
use btnet_types::ActivityOutcome;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Identity and behaviour of the simulated adapter the CLI drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// `false` simulates a device without Bluetooth hardware.
    pub present: bool,
    pub address: String,
    pub name: String,
    /// Power state at start-up.
    pub enabled: bool,
    /// Settle power transitions immediately instead of waiting for `/finish`.
    pub auto_complete: bool,
    /// Answer every dialog with this outcome instead of waiting for
    /// `/approve` or `/deny`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialog_outcome: Option<ActivityOutcome>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            present: true,
            address: "00:1A:7D:DA:71:13".to_string(),
            name: "btnet-sim".to_string(),
            enabled: false,
            auto_complete: true,
            dialog_outcome: None,
        }
    }
}

impl AdapterConfig {
    /// A [`SimAdapter`] builder preloaded with these settings.
    pub fn builder(&self) -> SimAdapterBuilder {
        SimAdapter::builder()
            .present(self.present)
            .address(self.address.clone())
            .name(self.name.clone())
            .enabled(self.enabled)
            .auto_complete(self.auto_complete)
            .dialog_outcome(self.dialog_outcome)
    }
}

/// Persisted user configuration stored in `~/.btnet/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub adapter: AdapterConfig,

    /// Slot numbers for the long-running request classes.
    #[serde(default)]
    pub request_codes: RequestCodes,
}

/// Return the path to `~/.btnet/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".btnet").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    let mut cfg = read_file(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Read `path` as-is, without environment overrides.
fn read_file(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `BTNET_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `BTNET_ADAPTER_NAME` | `adapter.name` |
/// | `BTNET_ADAPTER_ADDRESS` | `adapter.address` |
/// | `BTNET_AUTO_COMPLETE` | `adapter.auto_complete` (`true` / `false`) |
/// | `BTNET_DIALOG_OUTCOME` | `adapter.dialog_outcome` (`ok` / `cancelled` / `none`) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("BTNET_ADAPTER_NAME") {
        cfg.adapter.name = v;
    }
    if let Ok(v) = std::env::var("BTNET_ADAPTER_ADDRESS")
        && !v.trim().is_empty()
    {
        cfg.adapter.address = v.trim().to_string();
    }
    if let Ok(v) = std::env::var("BTNET_AUTO_COMPLETE")
        && let Ok(auto) = v.trim().parse::<bool>()
    {
        cfg.adapter.auto_complete = auto;
    }
    if let Ok(v) = std::env::var("BTNET_DIALOG_OUTCOME") {
        if v.trim().eq_ignore_ascii_case("none") {
            cfg.adapter.dialog_outcome = None;
        } else if let Ok(outcome) = v.parse::<ActivityOutcome>() {
            cfg.adapter.dialog_outcome = Some(outcome);
        }
    }
}

/// Save the config to disk, creating `~/.btnet/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use btnet_types::RequestCode;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = read_file(&path).expect("load ok").expect("some");

        assert_eq!(loaded.request_codes, RequestCodes::default());
        assert_eq!(loaded.adapter.name, "btnet-sim");
        assert!(loaded.adapter.present);
        assert_eq!(loaded.adapter.dialog_outcome, None);
    }

    #[test]
    fn dialog_outcome_roundtrips() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.adapter.dialog_outcome = Some(ActivityOutcome::Cancelled);
        save_to(&cfg, &path).expect("save");

        let loaded = read_file(&path).expect("load ok").expect("some");
        assert_eq!(loaded.adapter.dialog_outcome, Some(ActivityOutcome::Cancelled));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[adapter]\nenabled = true\n\n[request_codes]\ndiscoverable_dialog = 1773\n",
        )
        .expect("write");

        let cfg = read_file(&path).expect("load ok").expect("some");
        assert!(cfg.adapter.enabled);
        assert_eq!(cfg.adapter.address, "00:1A:7D:DA:71:13");
        assert_eq!(cfg.request_codes.discoverable_dialog, RequestCode(1773));
        assert_eq!(cfg.request_codes.disable_dialog, RequestCode(1775));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[adapter\nname = ").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("file").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap())
            .expect("dir")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn config_path_points_to_btnet_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".btnet"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_name() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("BTNET_ADAPTER_NAME", "lab-bench") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.adapter.name, "lab-bench");
        unsafe { std::env::remove_var("BTNET_ADAPTER_NAME") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_auto_complete() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("BTNET_AUTO_COMPLETE", "sometimes") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(cfg.adapter.auto_complete);
        unsafe { std::env::remove_var("BTNET_AUTO_COMPLETE") };
    }

    #[test]
    fn apply_env_overrides_sets_dialog_outcome() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("BTNET_DIALOG_OUTCOME", "OK") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.adapter.dialog_outcome, Some(ActivityOutcome::Ok));

        unsafe { std::env::set_var("BTNET_DIALOG_OUTCOME", "none") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.adapter.dialog_outcome, None);
        unsafe { std::env::remove_var("BTNET_DIALOG_OUTCOME") };
    }

    #[test]
    fn apply_env_overrides_trims_address() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("BTNET_ADAPTER_ADDRESS", " 11:22:33:44:55:66 ") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.adapter.address, "11:22:33:44:55:66");
        unsafe { std::env::remove_var("BTNET_ADAPTER_ADDRESS") };
    }

    #[test]
    fn adapter_builder_honours_settings() {
        use btnet_hal::BluetoothAdapter;
        let cfg = AdapterConfig {
            enabled: true,
            name: "desk".into(),
            ..AdapterConfig::default()
        };
        let (adapter, _feed) = cfg.builder().build();
        assert!(adapter.is_enabled());
        assert_eq!(adapter.name(), "desk");
    }
}
