//! 设置协作者
//!
//! 对应浏览器端的 storage.sync：一组简单的键值设置，
//! 引擎只消费 load/save 两个操作。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// 默认语言
pub const DEFAULT_LOCALE: &str = "zh-tw";

/// 默认模糊匹配阈值
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.95;

/// 引擎设置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// 是否启用翻译
    pub translation_enabled: bool,
    /// 调试模式（输出页面叶子文本）
    pub debug_mode: bool,
    /// 当前语言
    pub locale: String,
    /// 关闭站点提示弹窗
    pub disable_alert: bool,
    /// 模糊匹配阈值
    pub fuzzy_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            translation_enabled: false,
            debug_mode: false,
            locale: DEFAULT_LOCALE.to_string(),
            disable_alert: false,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

impl Settings {
    /// 验证设置
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(EngineError::ConfigError(format!(
                "模糊匹配阈值必须在 0~1 之间: {}",
                self.fuzzy_threshold
            )));
        }
        if self.locale.trim().is_empty() {
            return Err(EngineError::ConfigError("语言代码不能为空".to_string()));
        }
        Ok(())
    }
}

/// 设置存储：toml 文件的读写
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 载入设置；文件不存在时返回默认值
    pub fn load(&self) -> EngineResult<Settings> {
        if !self.path.exists() {
            tracing::debug!("设置文件不存在，使用默认设置: {}", self.path.display());
            return Ok(Settings::default());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        let settings: Settings = toml::from_str(&raw)
            .map_err(|e| EngineError::ConfigError(format!("设置文件解析失败: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// 保存整组设置（键值对逐项保存在这里合并为整体写回）
    pub fn save(&self, settings: &Settings) -> EngineResult<()> {
        settings.validate()?;
        let raw = toml::to_string_pretty(settings)
            .map_err(|e| EngineError::ConfigError(format!("设置序列化失败: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.toml"));

        let settings = store.load().unwrap();
        assert!(!settings.translation_enabled);
        assert!(!settings.debug_mode);
        assert_eq!(settings.locale, DEFAULT_LOCALE);
        assert!(!settings.disable_alert);
        assert_eq!(settings.fuzzy_threshold, DEFAULT_FUZZY_THRESHOLD);
    }

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.toml"));

        let mut settings = Settings::default();
        settings.translation_enabled = true;
        settings.locale = "jpn".to_string();
        settings.fuzzy_threshold = 0.9;
        store.save(&settings).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.translation_enabled);
        assert_eq!(loaded.locale, "jpn");
        assert_eq!(loaded.fuzzy_threshold, 0.9);
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let mut settings = Settings::default();
        settings.fuzzy_threshold = 1.5;
        assert!(settings.validate().is_err());
    }
}
