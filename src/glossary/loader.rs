//! 词典载入与持久化缓存
//!
//! 每个语言对应一个目录，目录下的每个 JSON 文件都是一份
//! key→value 资源；逐个载入、逐个容错，最后合并成一份映射。
//! 合并结果按语言写入缓存目录，供下次启动直接读取。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::glossary::GlossaryMap;

/// 词典存储
///
/// `root` 下按语言分目录存放来源文件；`cache_dir` 存放合并后的缓存。
#[derive(Debug, Clone)]
pub struct GlossaryStore {
    root: PathBuf,
    cache_dir: PathBuf,
}

impl GlossaryStore {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(root: P, cache_dir: Q) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    /// 载入指定语言的合并映射
    ///
    /// 优先读取持久化缓存；缓存不可用时从来源文件合并并回写缓存。
    /// 单个来源文件失败只告警不中断；全部失败时返回空映射，
    /// 引擎在空映射下表现为直通（不做任何替换）。
    pub fn load_locale(&self, locale: &str) -> EngineResult<GlossaryMap> {
        if let Some(cached) = self.read_cached(locale) {
            tracing::info!("使用缓存词典: {} ({} 条)", locale, cached.len());
            return Ok(cached);
        }

        let merged = self.merge_sources(locale)?;
        if let Err(e) = self.write_cache(locale, &merged) {
            tracing::warn!("词典缓存写入失败: {}", e);
        }
        Ok(merged)
    }

    /// 从来源目录合并映射，跳过缓存
    pub fn merge_sources(&self, locale: &str) -> EngineResult<GlossaryMap> {
        let dir = self.root.join(locale);
        if !dir.is_dir() {
            return Err(EngineError::GlossaryError {
                locale: locale.to_string(),
                message: format!("词典目录不存在: {}", dir.display()),
            });
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        // 合并顺序决定覆盖关系，按文件名固定
        files.sort();

        let mut merged = GlossaryMap::new();
        let mut loaded = 0usize;
        for path in &files {
            match Self::read_source_file(path) {
                Ok(entries) => {
                    let count = entries.len();
                    for (key, value) in entries {
                        merged.insert(key, value);
                    }
                    loaded += 1;
                    tracing::debug!("已载入 {} ({} 条)", path.display(), count);
                }
                Err(e) => {
                    tracing::warn!("载入 {} 失败: {}", path.display(), e);
                }
            }
        }

        tracing::info!(
            "词典合并完成: {} ({}/{} 个文件, {} 条)",
            locale,
            loaded,
            files.len(),
            merged.len()
        );
        Ok(merged)
    }

    fn read_source_file(path: &Path) -> EngineResult<Vec<(String, String)>> {
        let raw = fs::read_to_string(path)?;
        // BTreeMap 做反序列化容器即可，顺序由文件内条目决定并不可靠，
        // 跨文件的覆盖顺序才是约定的一部分
        let map: BTreeMap<String, String> = serde_json::from_str(&raw)?;
        Ok(map.into_iter().collect())
    }

    /// 读取持久化缓存；不存在或损坏时返回 None
    pub fn read_cached(&self, locale: &str) -> Option<GlossaryMap> {
        let path = self.cache_path(locale);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<Vec<(String, String)>>(&raw) {
            Ok(entries) => Some(entries.into_iter().collect()),
            Err(e) => {
                tracing::warn!("词典缓存损坏，忽略 {}: {}", path.display(), e);
                None
            }
        }
    }

    /// 写入持久化缓存
    pub fn write_cache(&self, locale: &str, map: &GlossaryMap) -> EngineResult<()> {
        fs::create_dir_all(&self.cache_dir)?;
        let entries: Vec<(&str, &str)> = map.iter().collect();
        let raw = serde_json::to_string(&entries)?;
        fs::write(self.cache_path(locale), raw)?;
        Ok(())
    }

    /// 清空持久化缓存（所有语言）
    pub fn clear_cache(&self) -> EngineResult<()> {
        if !self.cache_dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                fs::remove_file(&path)
                    .map_err(|e| EngineError::CacheError(format!("删除缓存失败: {e}")))?;
            }
        }
        tracing::info!("词典缓存已清空");
        Ok(())
    }

    fn cache_path(&self, locale: &str) -> PathBuf {
        self.cache_dir.join(format!("{locale}.json"))
    }
}
