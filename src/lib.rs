//! # PageGloss
//!
//! 页面内术语表替换引擎：按本地词典把文档里的游戏术语
//! 原地替换成目标语言，支持精确与模糊匹配、相邻载体合并、
//! 幂等标记以及变更去抖。
//!
//! ## 模块组织
//!
//! - `settings` - 运行设置的载入与持久化
//! - `glossary` - 词典装载、合并与缓存
//! - `matching` - 相似度计算与编译索引
//! - `dom` - 文档树的查询与回写原语
//! - `engine` - 收集、批量通道、重写与变更观察
//! - `error` - 统一错误类型

pub mod dom;
pub mod engine;
pub mod error;
pub mod glossary;
pub mod matching;
pub mod settings;

pub use engine::{Command, CommandOutcome, EngineState, PassSummary, TranslationService};
pub use error::{EngineError, EngineResult};
pub use glossary::{GlossaryMap, GlossaryStore};
pub use matching::CompiledIndex;
pub use settings::{Settings, SettingsStore};
