//! Converge の設定ファイル探索と読み込み

pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{ConvergenceTimings, EngineSettings, LimiterConfig, TimingOverride};

use std::path::{Path, PathBuf};

const APP_DIR: &str = "converge";
const GLOBAL_FILE: &str = "converge.yaml";
const PROJECT_DIR: &str = ".converge";

/// ディレクトリ内の候補 (優先順)
const CANDIDATES: [&str; 4] = [
    "converge.local.yaml",
    ".converge.local.yaml",
    "converge.yaml",
    ".converge.yaml",
];

/// Converge の設定ディレクトリを取得 (なければ作成)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join(APP_DIR);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 検索順:
/// 1. 環境変数 CONVERGE_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ、続いて ./.converge/ の候補ファイル
/// 3. ~/.config/converge/converge.yaml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    if let Some(path) = env_config_path() {
        return Ok(path);
    }

    let current_dir = std::env::current_dir()?;
    let search_dirs = [current_dir.clone(), current_dir.join(PROJECT_DIR)];
    if let Some(path) = search_dirs.iter().find_map(|dir| first_existing(dir)) {
        return Ok(path);
    }

    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(GLOBAL_FILE))
        .filter(|path| path.is_file())
        .ok_or(ConfigError::ConfigFileNotFound)
}

/// CONVERGE_CONFIG_PATH が存在するファイルを指していればそのパス
fn env_config_path() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var_os("CONVERGE_CONFIG_PATH")?);
    if path.exists() {
        return Some(path);
    }
    // 指定先がない場合は通常の探索に戻る
    tracing::warn!(
        "CONVERGE_CONFIG_PATH points at {} which does not exist",
        path.display()
    );
    None
}

/// `dir` 内で最初に見つかった候補ファイル
fn first_existing(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// 有効な設定を読み込む
///
/// 見つかったファイル (なければデフォルト) に `CONVERGE_*` 環境変数を適用する。
/// 読み込み元のファイルも返す。
pub fn load_settings() -> Result<(EngineSettings, Option<PathBuf>)> {
    let (mut settings, source) = match find_config_file() {
        Ok(path) => {
            tracing::debug!("Loading settings from {}", path.display());
            (EngineSettings::from_file(&path)?, Some(path))
        }
        Err(ConfigError::ConfigFileNotFound) => {
            tracing::debug!("No settings file found, using defaults");
            (EngineSettings::default(), None)
        }
        Err(e) => return Err(e),
    };
    settings.apply_env_overrides()?;
    Ok((settings, source))
}

/// グローバル設定ファイルがなければデフォルト設定で作成
pub fn init_global_settings() -> Result<PathBuf> {
    let path = get_config_dir()?.join(GLOBAL_FILE);
    if !path.exists() {
        std::fs::write(&path, EngineSettings::default().to_yaml()?)?;
    }
    Ok(path)
}
