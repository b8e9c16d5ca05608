//! 词典协作者
//!
//! 负责把多个来源文件的 key→value JSON 资源合并成一份映射，
//! 并提供按语言的持久化缓存。引擎只消费合并后的映射。

pub mod loader;

pub use loader::GlossaryStore;

use std::collections::HashMap;

/// 插入有序的 key→value 映射
///
/// 编译索引按「长度降序、同长保持插入顺序」排序，
/// 所以合并结果必须保留首次插入的顺序；后载入的来源覆盖同 key 的值。
#[derive(Debug, Clone, Default)]
pub struct GlossaryMap {
    entries: Vec<(String, String)>,
    by_key: HashMap<String, usize>,
}

impl GlossaryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一个条目；key 已存在时原地覆盖值，保持原有顺序
    pub fn insert(&mut self, key: String, value: String) {
        match self.by_key.get(&key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.by_key.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.by_key
            .get(key)
            .map(|&pos| self.entries[pos].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入顺序迭代
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 合并另一份映射（对方的条目覆盖本方同 key 的值）
    pub fn merge(&mut self, other: GlossaryMap) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }
}

impl FromIterator<(String, String)> for GlossaryMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = GlossaryMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
