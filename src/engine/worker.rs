//! 批量翻译通道
//!
//! 把字面替换挪出主控制流：请求带上纯数据的模式表，
//! 工作端逐条做大小写不敏感的字面替换并按原文缓存结果。
//! 调用端用数字 id 关联请求与响应，超时按「原文未变」降级，
//! 迟到的过期响应静默丢弃。

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;

use crate::engine::constants;
use crate::matching::PatternSpec;

/// 通道请求报文
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum WorkerRequest {
    /// 握手
    Init,
    /// 批量替换
    #[serde(rename_all = "camelCase")]
    Translate {
        request_id: u64,
        texts: Vec<String>,
        patterns: Vec<PatternSpec>,
    },
    /// 清空工作端缓存
    ClearCache,
}

/// 通道响应报文
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerResponse {
    Ready {
        ready: bool,
    },
    #[serde(rename_all = "camelCase")]
    Translated {
        request_id: u64,
        result: Vec<String>,
    },
}

type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<Vec<String>>>>>;

/// 通道调用端
///
/// 可克隆；所有调用共享同一个待答表与请求计数器。
#[derive(Clone)]
pub struct WorkerClient {
    tx: mpsc::Sender<WorkerRequest>,
    pending: PendingTable,
    next_id: Arc<AtomicU64>,
    ready: watch::Receiver<bool>,
    timeout: Duration,
}

impl WorkerClient {
    /// 启动工作端与分发循环，返回调用端
    pub fn spawn() -> Self {
        Self::spawn_with_timeout(constants::WORKER_TIMEOUT)
    }

    pub fn spawn_with_timeout(request_timeout: Duration) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<WorkerRequest>(32);
        let (resp_tx, resp_rx) = mpsc::channel::<WorkerResponse>(32);
        let (ready_tx, ready_rx) = watch::channel(false);
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(worker_loop(req_rx, resp_tx));
        tokio::spawn(dispatch_loop(resp_rx, Arc::clone(&pending), ready_tx));

        Self {
            tx: req_tx,
            pending,
            next_id: Arc::new(AtomicU64::new(0)),
            ready: ready_rx,
            timeout: request_timeout,
        }
    }

    /// 握手：发送 init 并等待 ready；已就绪时直接返回
    pub async fn init(&self) -> bool {
        if *self.ready.borrow() {
            return true;
        }
        if self.tx.send(WorkerRequest::Init).await.is_err() {
            return false;
        }
        let mut ready = self.ready.clone();
        let handshake = timeout(self.timeout, ready.wait_for(|r| *r)).await;
        matches!(handshake, Ok(Ok(_)))
    }

    /// 批量翻译
    ///
    /// 与输入等长同序；通道不可用、响应超时或形状不对时
    /// 一律返回原文（绝不报错），调用方把「未变」当作可能
    /// 需要模糊兜底的信号。
    pub async fn translate_batch(
        &self,
        texts: Vec<String>,
        patterns: &[PatternSpec],
    ) -> Vec<String> {
        if texts.is_empty() {
            return texts;
        }

        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (result_tx, result_rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(request_id, result_tx);

        let request = WorkerRequest::Translate {
            request_id,
            texts: texts.clone(),
            patterns: patterns.to_vec(),
        };
        if self.tx.send(request).await.is_err() {
            self.pending.lock().unwrap().remove(&request_id);
            tracing::warn!("翻译通道不可用，批次按原文返回");
            return texts;
        }

        match timeout(self.timeout, result_rx).await {
            Ok(Ok(result)) if result.len() == texts.len() => result,
            Ok(Ok(result)) => {
                tracing::warn!(
                    "通道响应长度不符 ({} != {})，按原文处理",
                    result.len(),
                    texts.len()
                );
                texts
            }
            Ok(Err(_)) => {
                tracing::warn!("翻译通道已关闭，批次按原文返回");
                texts
            }
            Err(_) => {
                // 作废关联 id，迟到的响应会在分发循环里被丢弃
                self.pending.lock().unwrap().remove(&request_id);
                tracing::warn!("批次 {} 超时，按原文处理", request_id);
                texts
            }
        }
    }

    /// 清空工作端缓存
    pub async fn clear_cache(&self) {
        let _ = self.tx.send(WorkerRequest::ClearCache).await;
    }

    /// 没有工作端的客户端：握手必然失败
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let (req_tx, _) = mpsc::channel(1);
        let (_ready_tx, ready_rx) = watch::channel(false);
        Self {
            tx: req_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            ready: ready_rx,
            timeout: Duration::from_millis(50),
        }
    }
}

/// 工作端循环：缓存命中直接返回，否则按长度降序逐模式替换
async fn worker_loop(
    mut rx: mpsc::Receiver<WorkerRequest>,
    tx: mpsc::Sender<WorkerResponse>,
) {
    let mut cache: LruCache<String, String> = LruCache::new(
        NonZeroUsize::new(constants::WORKER_CACHE_SIZE).expect("cache size"),
    );

    while let Some(request) = rx.recv().await {
        match request {
            WorkerRequest::Init => {
                let _ = tx.send(WorkerResponse::Ready { ready: true }).await;
            }
            WorkerRequest::ClearCache => {
                cache.clear();
                tracing::debug!("工作端缓存已清空");
            }
            WorkerRequest::Translate {
                request_id,
                texts,
                patterns,
            } => {
                let compiled = compile_patterns(&patterns);
                let result = texts
                    .into_iter()
                    .map(|text| {
                        if let Some(hit) = cache.get(&text) {
                            return hit.clone();
                        }
                        let translated = apply_patterns(&text, &compiled);
                        cache.put(text, translated.clone());
                        translated
                    })
                    .collect();
                let _ = tx
                    .send(WorkerResponse::Translated { request_id, result })
                    .await;
            }
        }
    }
}

/// 分发循环：按 id 回填待答表，无主响应丢弃
async fn dispatch_loop(
    mut rx: mpsc::Receiver<WorkerResponse>,
    pending: PendingTable,
    ready: watch::Sender<bool>,
) {
    while let Some(response) = rx.recv().await {
        match response {
            WorkerResponse::Ready { .. } => {
                let _ = ready.send(true);
            }
            WorkerResponse::Translated { request_id, result } => {
                let sender = pending.lock().unwrap().remove(&request_id);
                match sender {
                    Some(sender) => {
                        let _ = sender.send(result);
                    }
                    None => {
                        tracing::debug!("丢弃过期响应 request_id={}", request_id);
                    }
                }
            }
        }
    }
}

fn compile_patterns(patterns: &[PatternSpec]) -> Vec<(Regex, &str)> {
    patterns
        .iter()
        .filter_map(|spec| {
            match RegexBuilder::new(&spec.pattern)
                .case_insensitive(true)
                .build()
            {
                Ok(regex) => Some((regex, spec.replacement.as_str())),
                Err(e) => {
                    tracing::warn!("非法模式被跳过 {:?}: {}", spec.pattern, e);
                    None
                }
            }
        })
        .collect()
}

fn apply_patterns(text: &str, compiled: &[(Regex, &str)]) -> String {
    let mut result = text.to_string();
    for (regex, replacement) in compiled {
        if regex.is_match(&result) {
            result = regex
                .replace_all(&result, regex::NoExpand(replacement))
                .into_owned();
        }
    }
    result
}
