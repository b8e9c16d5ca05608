//! 翻译引擎
//!
//! 组件按依赖自下而上：收集器、批量通道、重写引擎、变更观察者，
//! 外加把它们接起来的服务层与命令面。
//!
//! 单个文档上下文只有一条协作式控制流：不存在并行的翻译轮，
//! 并发只体现在等待词典载入与通道往返这类逻辑异步点上。

pub mod collector;
pub mod rewrite;
pub mod watcher;
pub mod worker;

pub use collector::{CarrierFamily, CollectorConfig, NodeCollector, TextUnit};
pub use rewrite::{PassSummary, RewriteEngine};
pub use watcher::{ChangeWatcher, MutationKind, MutationRecord, WatcherControl};
pub use worker::WorkerClient;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use markup5ever_rcdom::Handle;

use crate::error::EngineResult;
use crate::glossary::GlossaryStore;
use crate::matching::CompiledIndex;
use crate::settings::{Settings, SettingsStore};

/// 引擎常量
pub mod constants {
    use std::time::Duration;

    /// 单批文本数上限（限制单次通道负载，避免长同步停顿）
    pub const BATCH_SIZE: usize = 100;

    /// 变更去抖窗口
    pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(100);

    /// 通道单请求超时
    pub const WORKER_TIMEOUT: Duration = Duration::from_secs(5);

    /// 工作端缓存容量
    pub const WORKER_CACHE_SIZE: usize = 4096;

    /// 整块跳过的元素
    pub const SKIP_TAGS: &[&str] = &[
        "script", "style", "noscript", "input", "select", "textarea",
    ];

    /// 跳过的样式类
    pub const SKIP_CLASS: &str = "no-translate";

    /// 注音式载体标签
    pub const RUBY_CARRIER_TAG: &str = "rt";

    /// 内联式载体标签
    pub const SPAN_CARRIER_TAG: &str = "span";
}

/// 显式的引擎共享状态
///
/// 取代散落的模块级可变量：当前编译索引、开关位、
/// 「翻译进行中」标志都集中在这里，按引用传给各组件入口。
/// 编译索引只读共享，换语言或清缓存时整体替换。
#[derive(Debug)]
pub struct EngineState {
    enabled: AtomicBool,
    debug: AtomicBool,
    translating: AtomicBool,
    markers_invalidated: AtomicBool,
    passes_completed: AtomicU64,
    index: RwLock<Option<Arc<CompiledIndex>>>,
    settings: RwLock<Settings>,
}

impl EngineState {
    pub fn new(settings: Settings) -> Self {
        Self {
            enabled: AtomicBool::new(settings.translation_enabled),
            debug: AtomicBool::new(settings.debug_mode),
            translating: AtomicBool::new(false),
            markers_invalidated: AtomicBool::new(false),
            passes_completed: AtomicU64::new(0),
            index: RwLock::new(None),
            settings: RwLock::new(settings),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, value: bool) {
        self.enabled.store(value, Ordering::Relaxed);
        self.settings.write().unwrap().translation_enabled = value;
    }

    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, value: bool) {
        self.debug.store(value, Ordering::Relaxed);
        self.settings.write().unwrap().debug_mode = value;
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().unwrap().clone()
    }

    pub fn set_locale(&self, locale: &str) {
        self.settings.write().unwrap().locale = locale.to_string();
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.settings.read().unwrap().fuzzy_threshold
    }

    /// 当前编译索引（不存在时引擎表现为直通）
    pub fn index(&self) -> Option<Arc<CompiledIndex>> {
        self.index.read().unwrap().clone()
    }

    /// 整体替换编译索引
    pub fn set_index(&self, index: Option<Arc<CompiledIndex>>) {
        *self.index.write().unwrap() = index;
    }

    /// 尝试占用「翻译进行中」标志；已占用返回 false（不排队）
    pub fn begin_pass(&self) -> bool {
        self.translating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_pass(&self) {
        self.translating.store(false, Ordering::Release);
        self.passes_completed.fetch_add(1, Ordering::Release);
    }

    /// 已完成的翻译轮计数
    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Acquire)
    }

    /// 宣告既有标记失效（下一轮应做完整的无标记翻译）
    pub fn invalidate_markers(&self) {
        self.markers_invalidated.store(true, Ordering::Release);
    }

    /// 取走失效信号（一次性）
    pub fn take_marker_invalidation(&self) -> bool {
        self.markers_invalidated.swap(false, Ordering::AcqRel)
    }
}

/// 控制面下发的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
    ToggleDebug(bool),
    SetLocale(String),
    ClearCache,
}

/// 命令处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    /// 调用方负责整页重载（引擎不原地撤销已翻译内容）
    ReloadRequired,
}

/// 翻译服务：把词典、设置、状态与重写引擎接在一起
pub struct TranslationService {
    state: Arc<EngineState>,
    engine: Arc<RewriteEngine>,
    worker: WorkerClient,
    glossary: GlossaryStore,
    settings_store: SettingsStore,
    watcher_control: Mutex<Option<WatcherControl>>,
}

impl TranslationService {
    /// 创建服务并载入设置
    pub fn new(glossary: GlossaryStore, settings_store: SettingsStore) -> EngineResult<Self> {
        let settings = settings_store.load()?;
        let state = Arc::new(EngineState::new(settings));
        let worker = WorkerClient::spawn();
        let engine = Arc::new(RewriteEngine::new(Arc::clone(&state), worker.clone()));

        Ok(Self {
            state,
            engine,
            worker,
            glossary,
            settings_store,
            watcher_control: Mutex::new(None),
        })
    }

    /// 挂接变更观察者的控制把手，宿主整页翻译期间自动暂停观察
    pub fn set_watcher_control(&self, control: WatcherControl) {
        *self.watcher_control.lock().unwrap() = Some(control);
    }

    pub fn state(&self) -> Arc<EngineState> {
        Arc::clone(&self.state)
    }

    pub fn engine(&self) -> Arc<RewriteEngine> {
        Arc::clone(&self.engine)
    }

    /// 载入当前语言的词典并编译索引
    pub fn reload_glossary(&self) -> EngineResult<usize> {
        let locale = self.state.settings().locale;
        let map = self.glossary.load_locale(&locale)?;
        let index = CompiledIndex::compile(&map);
        let count = index.len();
        self.state.set_index(Some(Arc::new(index)));
        tracing::info!("词典索引已编译: {} ({} 条)", locale, count);
        Ok(count)
    }

    /// 对整个文档跑一轮翻译
    ///
    /// 挂接了观察者时，写回期间暂停观察，结束后恢复。
    pub async fn translate_document(&self, root: &Handle) -> PassSummary {
        let control = self.watcher_control.lock().unwrap().clone();
        if let Some(control) = &control {
            control.suspend();
        }
        let summary = self.engine.run_pass(root).await;
        if let Some(control) = &control {
            control.resume();
        }
        summary
    }

    /// 处理控制面命令
    pub async fn handle_command(&self, command: Command) -> EngineResult<CommandOutcome> {
        match command {
            Command::Enable => {
                self.state.set_enabled(true);
                self.save_settings()?;
                if self.state.index().is_none() {
                    self.reload_glossary()?;
                }
                Ok(CommandOutcome::Done)
            }
            Command::Disable => {
                // 不原地撤销翻译：由调用方重载文档
                self.state.set_enabled(false);
                self.save_settings()?;
                Ok(CommandOutcome::ReloadRequired)
            }
            Command::ToggleDebug(value) => {
                self.state.set_debug(value);
                self.save_settings()?;
                Ok(CommandOutcome::Done)
            }
            Command::SetLocale(locale) => {
                tracing::info!("切换语言: {}", locale);
                self.state.set_locale(&locale);
                self.save_settings()?;
                self.state.set_index(None);
                self.worker.clear_cache().await;
                Ok(CommandOutcome::ReloadRequired)
            }
            Command::ClearCache => {
                self.glossary.clear_cache()?;
                self.state.set_index(None);
                self.worker.clear_cache().await;
                // 旧标记语义随词典一并作废，下一轮做完整翻译
                self.state.invalidate_markers();
                Ok(CommandOutcome::Done)
            }
        }
    }

    fn save_settings(&self) -> EngineResult<()> {
        self.settings_store.save(&self.state.settings())
    }
}
