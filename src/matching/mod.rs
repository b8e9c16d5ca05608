//! 词组匹配
//!
//! 把合并后的词典编译成可匹配的索引（长度排序 + 预编译字面模式），
//! 并提供精确与模糊两种整串查找。

pub mod index;
pub mod similarity;

pub use index::{CompiledIndex, PatternSpec};
pub use similarity::{distance, similarity};
