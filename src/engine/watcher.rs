//! 变更观察者：把文档变更批次折叠成翻译轮
//!
//! 宿主侧把每次文档变更整理成 [`MutationRecord`] 批次灌进通道；
//! 观察者过滤掉自激噪声，在去抖窗口内攒出受影响作用域的并集，
//! 然后对并集跑一轮翻译。翻译期间到达的批次在轮后整体丢弃，
//! 避免回写本身再次触发翻译。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use markup5ever_rcdom::{Handle, NodeData};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

use crate::dom::{get_parent_node, under_marker, MARKER_ATTR};
use crate::engine::constants::DEBOUNCE_DELAY;
use crate::engine::{EngineState, RewriteEngine};

/// 变更类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// 子节点增删
    ChildList,
    /// 文本节点内容变化
    CharacterData,
    /// 属性变化
    Attributes,
}

/// 一条文档变更记录
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: Handle,
    /// 仅 [`MutationKind::Attributes`] 时有值
    pub attribute: Option<String>,
}

impl MutationRecord {
    pub fn child_list(target: Handle) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            attribute: None,
        }
    }

    pub fn character_data(target: Handle) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            attribute: None,
        }
    }

    pub fn attribute(target: Handle, name: &str) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            attribute: Some(name.to_string()),
        }
    }
}

/// 外部暂停/恢复观察的把手
#[derive(Debug, Clone)]
pub struct WatcherControl {
    suspended: Arc<AtomicBool>,
}

impl WatcherControl {
    /// 暂停观察：暂停期间到达的批次整体丢弃
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }
}

pub struct ChangeWatcher {
    engine: Arc<RewriteEngine>,
    state: Arc<EngineState>,
    rx: mpsc::Receiver<Vec<MutationRecord>>,
    suspended: Arc<AtomicBool>,
}

impl ChangeWatcher {
    pub fn new(
        engine: Arc<RewriteEngine>,
        state: Arc<EngineState>,
        rx: mpsc::Receiver<Vec<MutationRecord>>,
    ) -> Self {
        Self {
            engine,
            state,
            rx,
            suspended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn control(&self) -> WatcherControl {
        WatcherControl {
            suspended: Arc::clone(&self.suspended),
        }
    }

    /// 观察循环，通道关闭后返回
    ///
    /// 每个含有效记录的批次重新拉满去抖窗口；窗口静默到期
    /// 才对攒下的作用域并集跑一轮。
    pub async fn run(&mut self) {
        while let Some(batch) = self.rx.recv().await {
            if self.should_drop() {
                continue;
            }
            let mut scopes = relevant_scopes(&batch);
            if scopes.is_empty() {
                continue;
            }

            // 去抖：只有含有效记录的批次才重新拉满窗口
            let mut deadline = Instant::now() + DEBOUNCE_DELAY;
            loop {
                match timeout_at(deadline, self.rx.recv()).await {
                    Ok(Some(more)) => {
                        if !self.should_drop() {
                            let more_scopes = relevant_scopes(&more);
                            if !more_scopes.is_empty() {
                                scopes.extend(more_scopes);
                                deadline = Instant::now() + DEBOUNCE_DELAY;
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }

            let scopes = top_most_scopes(scopes);
            tracing::debug!("去抖窗口到期，翻译 {} 个作用域", scopes.len());
            self.engine.run_pass_multi(&scopes).await;

            // 丢弃翻译回写造成的自激批次
            while self.rx.try_recv().is_ok() {}
        }
    }

    fn should_drop(&self) -> bool {
        !self.state.enabled() || self.suspended.load(Ordering::Acquire)
    }
}

/// 过滤一批记录，返回各自的翻译作用域
///
/// 噪声不产生作用域：标记属性自身的变化（引擎回写所致），
/// 以及落在已标记子树内的任何变化。
pub fn relevant_scopes(batch: &[MutationRecord]) -> Vec<Handle> {
    batch.iter().filter_map(record_scope).collect()
}

fn record_scope(record: &MutationRecord) -> Option<Handle> {
    match record.kind {
        MutationKind::Attributes => {
            if record.attribute.as_deref() == Some(MARKER_ATTR) {
                return None;
            }
            if under_marker(&record.target) {
                return None;
            }
            Some(record.target.clone())
        }
        MutationKind::ChildList => {
            if under_marker(&record.target) {
                return None;
            }
            Some(record.target.clone())
        }
        MutationKind::CharacterData => {
            // 文本节点没有属性，作用域取其父元素
            let scope = match record.target.data {
                NodeData::Text { .. } => get_parent_node(&record.target)?,
                _ => record.target.clone(),
            };
            if under_marker(&scope) {
                return None;
            }
            Some(scope)
        }
    }
}

/// 作用域去重：去掉重复节点和被其他作用域包含的节点
pub fn top_most_scopes(scopes: Vec<Handle>) -> Vec<Handle> {
    let keys: Vec<usize> = scopes.iter().map(node_key).collect();
    let mut result: Vec<Handle> = Vec::new();

    'outer: for (i, scope) in scopes.iter().enumerate() {
        if result.iter().any(|kept| node_key(kept) == keys[i]) {
            continue;
        }
        let mut current = get_parent_node(scope);
        while let Some(ancestor) = current {
            let key = node_key(&ancestor);
            if keys.iter().any(|&k| k == key) {
                continue 'outer;
            }
            current = get_parent_node(&ancestor);
        }
        result.push(scope.clone());
    }
    result
}

fn node_key(node: &Handle) -> usize {
    std::rc::Rc::as_ptr(node) as *const () as usize
}
