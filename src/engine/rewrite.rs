//! 重写引擎：对一个或多个作用域跑完整的翻译轮
//!
//! 一轮的顺序固定：失效标记清理 → 载体合并（先内联后注音）→
//! 收集 → 分批过通道 → 对账回写。回写只在文本确实变化时发生，
//! 回写后给父元素打标记，使后续轮次自然跳过。

use std::slice;
use std::sync::Arc;
use std::sync::OnceLock;

use markup5ever_rcdom::Handle;
use regex::Regex;

use crate::dom::{clear_markers, dump_leaf_text, set_marker, set_text_content};
use crate::engine::constants;
use crate::engine::{CarrierFamily, EngineState, NodeCollector, WorkerClient};
use crate::matching::CompiledIndex;

/// 一轮翻译的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub units_seen: usize,
    pub units_rewritten: usize,
    pub groups_merged: usize,
    pub batches_sent: usize,
}

pub struct RewriteEngine {
    state: Arc<EngineState>,
    worker: WorkerClient,
}

impl RewriteEngine {
    pub fn new(state: Arc<EngineState>, worker: WorkerClient) -> Self {
        Self { state, worker }
    }

    /// 对单个作用域跑一轮
    pub async fn run_pass(&self, scope: &Handle) -> PassSummary {
        self.run_pass_multi(slice::from_ref(scope)).await
    }

    /// 对多个不相交的作用域跑同一轮
    ///
    /// 引擎关闭、索引缺失、或已有轮次在进行时直接返回空统计，
    /// 后两种情况不排队：触发方的去抖窗口会带来下一次机会。
    pub async fn run_pass_multi(&self, scopes: &[Handle]) -> PassSummary {
        if !self.state.enabled() || scopes.is_empty() {
            return PassSummary::default();
        }
        let Some(index) = self.state.index() else {
            tracing::debug!("索引未就绪，跳过本轮");
            return PassSummary::default();
        };
        if !self.state.begin_pass() {
            tracing::debug!("已有翻译轮在进行，跳过");
            return PassSummary::default();
        }

        let summary = self.run_locked(scopes, &index).await;
        self.state.end_pass();

        tracing::info!(
            "翻译轮完成: 单元 {}，改写 {}，合并组 {}",
            summary.units_seen,
            summary.units_rewritten,
            summary.groups_merged,
        );
        summary
    }

    async fn run_locked(&self, scopes: &[Handle], index: &CompiledIndex) -> PassSummary {
        let threshold = self.state.fuzzy_threshold();
        let mut summary = PassSummary::default();

        if self.state.take_marker_invalidation() {
            tracing::debug!("标记已失效，清理后做完整翻译");
            for scope in scopes {
                clear_markers(scope);
            }
        }
        if self.state.debug() {
            for scope in scopes {
                dump_leaf_text(scope);
            }
        }

        let mut collector = NodeCollector::default();
        for scope in scopes {
            summary.groups_merged +=
                collector.merge_adjacent(CarrierFamily::Span, scope, index, threshold);
        }
        for scope in scopes {
            summary.groups_merged +=
                collector.merge_adjacent(CarrierFamily::Ruby, scope, index, threshold);
        }
        // 合并阶段的清空与标记先落定，再做收集
        tokio::task::yield_now().await;

        let mut units = Vec::new();
        for scope in scopes {
            units.extend(collector.collect(scope));
        }
        summary.units_seen = units.len();
        if units.is_empty() {
            return summary;
        }

        // 握手先行于任何 translate 请求；失败则整轮改走进程内替换
        let worker_ready = self.worker.init().await;
        if !worker_ready {
            tracing::warn!("翻译通道未就绪，本轮改用进程内替换");
        }

        let patterns = index.worker_patterns();
        for chunk in units.chunks(constants::BATCH_SIZE) {
            let texts: Vec<String> = chunk.iter().map(|u| u.text.clone()).collect();
            let results = if worker_ready {
                self.worker.translate_batch(texts, &patterns).await
            } else {
                texts.iter().map(|t| index.apply_literal(t)).collect()
            };
            summary.batches_sent += 1;

            for (unit, batch_text) in chunk.iter().zip(results) {
                let rewritten = reconcile(&unit.text, &batch_text, index, threshold);
                if rewritten != unit.text {
                    set_text_content(&unit.node, &rewritten);
                    set_marker(&unit.parent);
                    summary.units_rewritten += 1;
                }
            }
        }
        summary
    }
}

/// 对账：在词典直查、通道结果、模糊回退之间取最终文本
///
/// 词典直查命中优先于通道的部分替换，保证整串命中不被
/// 子串替换撕碎；三路都未命中时保持原文。无论取哪一路，
/// 最后都补一次百分号间隔修整。
pub fn reconcile(
    original: &str,
    batch_text: &str,
    index: &CompiledIndex,
    threshold: f64,
) -> String {
    let trimmed = original.trim();
    let chosen = if let Some(target) = index.find_exact(trimmed) {
        with_affixes(original, target)
    } else if batch_text != original {
        batch_text.to_string()
    } else if let Some(target) = index.find_fuzzy(trimmed, threshold) {
        with_affixes(original, target)
    } else {
        original.to_string()
    };
    fix_percent_gaps(&chosen)
}

/// 保留原文本两端空白，只替换中段
fn with_affixes(original: &str, replacement: &str) -> String {
    let lead = original.len() - original.trim_start().len();
    let keep = original.trim_end().len();
    format!("{}{}{}", &original[..lead], replacement, &original[keep..])
}

/// 百分号后紧跟数字时补分隔符：游戏数值串里 "14%14.7%"
/// 实为两段取值，替换后恢复成 "14%/14.7%"
fn fix_percent_gaps(text: &str) -> String {
    static PERCENT_GAP: OnceLock<Regex> = OnceLock::new();
    let re = PERCENT_GAP.get_or_init(|| Regex::new(r"%(\d)").unwrap());
    if !re.is_match(text) {
        return text.to_string();
    }
    re.replace_all(text, "%/${1}").into_owned()
}
