//! 编译索引
//!
//! 把词典映射预编译为匹配就绪的结构：按词组长度降序排序的条目表、
//! 每条一个大小写不敏感的字面正则，以及精确查找用的散列表。
//! 长词组永远先于短词组尝试，避免长词被其子串部分遮蔽。

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::glossary::GlossaryMap;
use crate::matching::similarity::similarity;

/// 模糊扫描的长度剪枝比例
pub const LENGTH_PRUNE_RATIO: f64 = 0.3;

/// 短串不做长度剪枝的界限（两侧长度都超过才剪）
pub const LENGTH_PRUNE_MIN: usize = 5;

/// 模糊扫描提前退出的分数
pub const EARLY_EXIT_SCORE: f64 = 0.985;

/// 传给翻译通道的纯数据模式（pattern 已转义）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternSpec {
    pub pattern: String,
    pub replacement: String,
}

/// 单个编译条目
#[derive(Debug)]
struct IndexEntry {
    source: String,
    target: String,
    source_chars: usize,
    pattern: Regex,
}

/// 编译后的词典索引
///
/// 编译完成后只读；切换语言或清缓存时整体替换，从不原地修改。
#[derive(Debug, Default)]
pub struct CompiledIndex {
    entries: Vec<IndexEntry>,
    exact: HashMap<String, String>,
}

impl CompiledIndex {
    /// 把合并映射编译为索引
    ///
    /// 空映射产生空索引，所有查找都返回「无匹配」。
    pub fn compile(map: &GlossaryMap) -> Self {
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(map.len());
        let mut exact = HashMap::with_capacity(map.len());

        for (source, target) in map.iter() {
            exact.insert(source.to_string(), target.to_string());

            let escaped = regex::escape(source);
            match RegexBuilder::new(&escaped).case_insensitive(true).build() {
                Ok(pattern) => entries.push(IndexEntry {
                    source: source.to_string(),
                    target: target.to_string(),
                    source_chars: source.chars().count(),
                    pattern,
                }),
                Err(e) => {
                    tracing::warn!("词组模式编译失败，跳过 {:?}: {}", source, e);
                }
            }
        }

        // 稳定排序：同长条目保持插入顺序
        entries.sort_by(|a, b| b.source_chars.cmp(&a.source_chars));

        Self { entries, exact }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 精确整串查找
    pub fn find_exact(&self, text: &str) -> Option<&str> {
        self.exact.get(text).map(String::as_str)
    }

    /// 模糊整串查找
    ///
    /// 按长度顺序扫描；长度差超过 `LENGTH_PRUNE_RATIO * len(text)`
    /// 且两侧长度都大于 `LENGTH_PRUNE_MIN` 的条目直接跳过
    /// （短串的相对长度剪枝不可靠，一律全量比较）。
    /// 跟踪最佳条目，达到 `EARLY_EXIT_SCORE` 即提前返回；
    /// 最佳分数不低于 `threshold` 时返回其译文。
    pub fn find_fuzzy(&self, text: &str, threshold: f64) -> Option<&str> {
        let text_chars = text.chars().count();
        let mut best: Option<(&IndexEntry, f64)> = None;

        for entry in &self.entries {
            let diff = entry.source_chars.abs_diff(text_chars);
            if diff as f64 > LENGTH_PRUNE_RATIO * text_chars as f64
                && entry.source_chars > LENGTH_PRUNE_MIN
                && text_chars > LENGTH_PRUNE_MIN
            {
                continue;
            }

            let score = similarity(&entry.source, text);
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((entry, score));
                if score >= EARLY_EXIT_SCORE {
                    break;
                }
            }
        }

        match best {
            Some((entry, score)) if score >= threshold => Some(entry.target.as_str()),
            _ => None,
        }
    }

    /// 导出通道用的纯数据模式表（长度降序，与条目同序）
    pub fn worker_patterns(&self) -> Vec<PatternSpec> {
        self.entries
            .iter()
            .map(|entry| PatternSpec {
                pattern: regex::escape(&entry.source),
                replacement: entry.target.clone(),
            })
            .collect()
    }

    /// 用索引条目对一段文本做字面替换（长词优先）
    ///
    /// 与通道内的替换同义；通道握手失败时重写引擎用它
    /// 做进程内降级替换。
    pub fn apply_literal(&self, text: &str) -> String {
        let mut result = text.to_string();
        for entry in &self.entries {
            if entry.pattern.is_match(&result) {
                result = entry
                    .pattern
                    .replace_all(&result, regex::NoExpand(&entry.target))
                    .into_owned();
            }
        }
        result
    }
}
