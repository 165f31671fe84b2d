use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct IdsConfig {
    pub search_bar: Option<String>,
    pub client_select: Option<String>,
    pub filter_form: Option<String>,
    pub listing: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    #[serde(alias = "url")]
    pub base_url: Option<String>,
    pub timeout: Option<u64>,
    pub proxy: Option<String>,
    pub header: Option<String>,
    pub follow_redirects: Option<bool>,
    pub use_env_proxy: Option<bool>,
    pub debounce_ms: Option<u64>,
    pub recovery: Option<String>,
    pub output_format: Option<String>,
    pub no_color: Option<bool>,
    pub ids: Option<IdsConfig>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".listsync").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn parse_config(contents: &str) -> Result<ConfigFile, String> {
    serde_yaml::from_str::<ConfigFile>(contents).map_err(|e| e.to_string())
}

pub fn load_config(path: &PathBuf, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

pub(crate) fn default_config_yaml() -> String {
    r#"# listsync config
#
# Location (default):
#   ~/.listsync/config.yml

# Site serving the project listing
# base_url: http://127.0.0.1:5001/

# HTTP
timeout: 10
# proxy: http://127.0.0.1:8080
# header: "Cookie: session=..."
follow_redirects: true
# Use HTTP_PROXY / HTTPS_PROXY from the environment when no proxy is set
use_env_proxy: true

# Refresh behaviour
# Wait this long after an event before fetching; newer events cancel older ones.
# 0 fetches on every event.
debounce_ms: 0
# keep | notice
recovery: notice

# Output: text | json | html
output_format: text
no_color: false

# Element ids on the page
ids:
  search_bar: search-bar
  client_select: client-select
  filter_form: filter-form
  listing: projects-list
"#
    .to_string()
}

pub fn ensure_default_config_file(path: &PathBuf) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid config path '{}'", path.display()))?;
    std::fs::create_dir_all(parent).map_err(|e| {
        format!(
            "failed to create config directory '{}': {e}",
            parent.display()
        )
    })?;
    let contents = default_config_yaml();
    std::fs::write(path, contents)
        .map_err(|e| format!("failed to write config file '{}': {e}", path.display()))?;
    Ok(())
}
