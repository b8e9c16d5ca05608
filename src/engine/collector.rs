//! 文本收集与相邻载体合并
//!
//! 深度优先走遍子树，把可翻译的文本叶子收集成翻译单元；
//! 合并阶段把被拆进相邻同类内联元素的词组重新拼起来，
//! 整串查词典后写回第一个成员。

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::OnceLock;

use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;

use crate::dom::{
    element_text, get_node_attr, get_node_name, get_parent_node, has_marker, is_whitespace_text,
    set_element_text, set_marker, under_marker,
};
use crate::engine::constants;
use crate::matching::CompiledIndex;

/// 一个可翻译的文本叶子及其承载元素
///
/// 每轮收集都重新发现，不跨轮保存。
#[derive(Debug, Clone)]
pub struct TextUnit {
    /// 文本节点
    pub node: Handle,
    /// 承载元素（标记只能打在元素上）
    pub parent: Handle,
    /// 收集时的原始文本
    pub text: String,
}

/// 载体家族
///
/// 注音式（ruby 注记）与普通内联 span 两类；
/// 拼接方式不同：注音式按空格连接，span 式直接连接后折叠空白。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierFamily {
    Ruby,
    Span,
}

impl CarrierFamily {
    pub fn tag(&self) -> &'static str {
        match self {
            CarrierFamily::Ruby => constants::RUBY_CARRIER_TAG,
            CarrierFamily::Span => constants::SPAN_CARRIER_TAG,
        }
    }

    fn join(&self, texts: &[String]) -> String {
        match self {
            CarrierFamily::Ruby => texts
                .iter()
                .map(|t| t.trim())
                .collect::<Vec<_>>()
                .join(" "),
            CarrierFamily::Span => texts.concat(),
        }
    }
}

/// 收集器配置
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 整块跳过的元素标签
    pub skip_tags: Vec<String>,
    /// 跳过的样式类
    pub skip_class: String,
    /// 最大递归深度
    pub max_depth: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            skip_tags: constants::SKIP_TAGS.iter().map(|s| s.to_string()).collect(),
            skip_class: constants::SKIP_CLASS.to_string(),
            max_depth: 256,
        }
    }
}

/// 收集统计信息
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectorStats {
    pub nodes_visited: usize,
    pub units_collected: usize,
    pub texts_skipped: usize,
    pub groups_merged: usize,
    pub groups_missed: usize,
}

/// 文档树收集器
pub struct NodeCollector {
    config: CollectorConfig,
    stats: CollectorStats,
}

impl Default for NodeCollector {
    fn default() -> Self {
        Self::new(CollectorConfig::default())
    }
}

impl NodeCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            stats: CollectorStats::default(),
        }
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// 收集子树内的翻译单元
    ///
    /// 前序深度优先；带标记的元素（连同整个后代）直接剪掉。
    pub fn collect(&mut self, scope: &Handle) -> Vec<TextUnit> {
        let mut units = Vec::new();
        if under_marker(scope) {
            return units;
        }
        self.walk(scope, &mut units, 0);
        self.stats.units_collected += units.len();
        units
    }

    fn walk(&mut self, node: &Handle, units: &mut Vec<TextUnit>, depth: usize) {
        if depth > self.config.max_depth {
            return;
        }
        self.stats.nodes_visited += 1;

        match &node.data {
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                let trimmed = text.trim();
                if trimmed.is_empty() || is_numeric_like(trimmed) {
                    self.stats.texts_skipped += 1;
                    return;
                }
                if let Some(parent) = get_parent_node(node) {
                    units.push(TextUnit {
                        node: node.clone(),
                        parent,
                        text,
                    });
                }
            }
            NodeData::Element { .. } => {
                if self.should_skip_element(node) {
                    return;
                }
                for child in node.children.borrow().iter() {
                    self.walk(child, units, depth + 1);
                }
            }
            _ => {
                for child in node.children.borrow().iter() {
                    self.walk(child, units, depth + 1);
                }
            }
        }
    }

    /// 跳过规则：封闭的谓词表，按序求值
    fn should_skip_element(&self, node: &Handle) -> bool {
        if let Some(tag) = get_node_name(node) {
            if self.config.skip_tags.iter().any(|t| t == tag) {
                return true;
            }
        }
        if let Some(class) = get_node_attr(node, "class") {
            if class
                .split_whitespace()
                .any(|c| c == self.config.skip_class)
            {
                return true;
            }
        }
        has_marker(node)
    }

    /// 合并相邻载体
    ///
    /// 同一父节点下、只隔纯空白文本的同标签载体组成一组；
    /// 组内文本拼接、归一化后整串查词典（先精确后模糊）。
    /// 命中：译文写进第一个成员，其余清空，全组打标记。
    /// 未命中：成员原样保留，但本轮不再作为新组的起点。
    pub fn merge_adjacent(
        &mut self,
        family: CarrierFamily,
        scope: &Handle,
        index: &CompiledIndex,
        fuzzy_threshold: f64,
    ) -> usize {
        let mut consumed: HashSet<usize> = HashSet::new();
        let before = self.stats.groups_merged;
        self.merge_walk(family, scope, index, fuzzy_threshold, &mut consumed, 0);
        self.stats.groups_merged - before
    }

    fn merge_walk(
        &mut self,
        family: CarrierFamily,
        node: &Handle,
        index: &CompiledIndex,
        fuzzy_threshold: f64,
        consumed: &mut HashSet<usize>,
        depth: usize,
    ) {
        if depth > self.config.max_depth {
            return;
        }
        if matches!(node.data, NodeData::Element { .. }) && self.should_skip_element(node) {
            return;
        }

        let children: Vec<Handle> = node.children.borrow().iter().cloned().collect();
        let mut i = 0;
        while i < children.len() {
            let child = &children[i];
            if self.is_group_start(family, child, consumed) {
                // 吸收后续同标签兄弟，跳过中间的纯空白文本
                let mut group = vec![child.clone()];
                let mut j = i + 1;
                while j < children.len() {
                    let sibling = &children[j];
                    if is_whitespace_text(sibling) {
                        j += 1;
                        continue;
                    }
                    if self.is_group_start(family, sibling, consumed) {
                        group.push(sibling.clone());
                        j += 1;
                    } else {
                        break;
                    }
                }

                if group.len() >= 2 {
                    self.resolve_group(family, &group, index, fuzzy_threshold, consumed);
                }
                // 未命中或单独成组的载体内部可能还嵌着载体串
                for member in &group {
                    if !has_marker(member) {
                        self.merge_walk(
                            family,
                            member,
                            index,
                            fuzzy_threshold,
                            consumed,
                            depth + 1,
                        );
                    }
                }
                i = j.max(i + 1);
            } else {
                if matches!(child.data, NodeData::Element { .. }) {
                    self.merge_walk(family, child, index, fuzzy_threshold, consumed, depth + 1);
                }
                i += 1;
            }
        }
    }

    fn is_group_start(
        &self,
        family: CarrierFamily,
        node: &Handle,
        consumed: &HashSet<usize>,
    ) -> bool {
        get_node_name(node) == Some(family.tag())
            && !has_marker(node)
            && !consumed.contains(&node_key(node))
    }

    fn resolve_group(
        &mut self,
        family: CarrierFamily,
        group: &[Handle],
        index: &CompiledIndex,
        fuzzy_threshold: f64,
        consumed: &mut HashSet<usize>,
    ) {
        let texts: Vec<String> = group.iter().map(element_text).collect();

        // 游戏界面的数值计数器（14% / 14.7% 之类）不是语言词组，
        // 永远不拼进词典查找
        if family == CarrierFamily::Span
            && texts.iter().all(|t| is_numeric_like(t.trim()))
        {
            for member in group {
                consumed.insert(node_key(member));
            }
            return;
        }

        let key = normalize(&family.join(&texts));
        let hit = index
            .find_exact(&key)
            .or_else(|| index.find_fuzzy(&key, fuzzy_threshold));

        match hit {
            Some(target) => {
                set_element_text(&group[0], target);
                for member in &group[1..] {
                    set_element_text(member, "");
                }
                for member in group {
                    set_marker(member);
                }
                self.stats.groups_merged += 1;
                tracing::debug!("载体组命中: {:?} -> {:?}", key, target);
            }
            None => {
                // 未命中也不再重扫，防止同轮内的平方级重组
                for member in group {
                    consumed.insert(node_key(member));
                }
                self.stats.groups_missed += 1;
            }
        }
    }
}

fn node_key(node: &Handle) -> usize {
    Rc::as_ptr(node) as usize
}

/// 判断文本是否为纯数字/百分号/斜杠形状
pub fn is_numeric_like(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[0-9.,%/+\-\s]+$").unwrap());
    !text.is_empty() && re.is_match(text)
}

/// 归一化合并阶段的比较键
///
/// 空白折叠为单个空格，括号内侧紧贴的空白删除，两端修剪。
/// 只用于查找比较，从不直接写回渲染文本。
pub fn normalize(text: &str) -> String {
    static OPEN: OnceLock<Regex> = OnceLock::new();
    static CLOSE: OnceLock<Regex> = OnceLock::new();

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let open = OPEN.get_or_init(|| Regex::new(r"([(（])\s+").unwrap());
    let close = CLOSE.get_or_init(|| Regex::new(r"\s+([)）])").unwrap());
    let result = open.replace_all(&collapsed, "$1");
    let result = close.replace_all(&result, "$1");
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{html_to_dom, MARKER_ATTR};
    use crate::glossary::GlossaryMap;
    use markup5ever_rcdom::RcDom;

    fn dom_of(html: &str) -> RcDom {
        html_to_dom(html.as_bytes())
    }

    fn body(dom: &RcDom) -> Handle {
        find_tag(&dom.document, "body").unwrap()
    }

    fn find_tag(node: &Handle, tag: &str) -> Option<Handle> {
        if get_node_name(node) == Some(tag) {
            return Some(node.clone());
        }
        for child in node.children.borrow().iter() {
            if let Some(found) = find_tag(child, tag) {
                return Some(found);
            }
        }
        None
    }

    fn find_all(node: &Handle, tag: &str, out: &mut Vec<Handle>) {
        if get_node_name(node) == Some(tag) {
            out.push(node.clone());
        }
        for child in node.children.borrow().iter() {
            find_all(child, tag, out);
        }
    }

    fn index_of(pairs: &[(&str, &str)]) -> CompiledIndex {
        let map: GlossaryMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CompiledIndex::compile(&map)
    }

    #[test]
    fn numeric_like_shapes() {
        assert!(is_numeric_like("14%"));
        assert!(is_numeric_like("14.7%"));
        assert!(is_numeric_like("3/4"));
        assert!(is_numeric_like("1,234"));
        assert!(!is_numeric_like("레벨 14"));
        assert!(!is_numeric_like(""));
    }

    #[test]
    fn normalize_collapses_and_trims() {
        assert_eq!(normalize("  쇼쿠호   미사키  "), "쇼쿠호 미사키");
        assert_eq!(normalize("이름 ( 별명 )"), "이름 (별명)");
        assert_eq!(normalize("a\n\tb"), "a b");
    }

    #[test]
    fn collect_finds_text_leaves_and_skips_noise() {
        let dom = dom_of(
            "<body><p>안녕하세요</p><script>var x=1;</script>\
             <span>42%</span><div class=\"no-translate\">원문</div></body>",
        );
        let mut collector = NodeCollector::default();
        let units = collector.collect(&body(&dom));

        let texts: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["안녕하세요"]);
    }

    #[test]
    fn collect_prunes_marked_subtrees() {
        let dom = dom_of("<body><div><p>하나</p></div><p>둘</p></body>");
        let div = find_tag(&dom.document, "div").unwrap();
        set_marker(&div);

        let mut collector = NodeCollector::default();
        let units = collector.collect(&body(&dom));
        let texts: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["둘"]);
    }

    #[test]
    fn merge_two_spans_into_one_translation() {
        let dom = dom_of("<body><span>쇼쿠</span> <span>호 미사키</span></body>");
        let index = index_of(&[("쇼쿠호 미사키", "食蜂操祈")]);

        let mut collector = NodeCollector::default();
        let merged = collector.merge_adjacent(CarrierFamily::Span, &body(&dom), &index, 0.95);
        assert_eq!(merged, 1);

        let mut spans = Vec::new();
        find_all(&dom.document, "span", &mut spans);
        assert_eq!(element_text(&spans[0]), "食蜂操祈");
        assert_eq!(element_text(&spans[1]), "");
        assert!(spans.iter().all(has_marker));
    }

    #[test]
    fn merge_ruby_family_joins_with_space() {
        let dom = dom_of("<body><ruby><rt>쇼쿠호</rt><rt>미사키</rt></ruby></body>");
        let index = index_of(&[("쇼쿠호 미사키", "食蜂操祈")]);

        let mut collector = NodeCollector::default();
        let merged = collector.merge_adjacent(CarrierFamily::Ruby, &body(&dom), &index, 0.95);
        assert_eq!(merged, 1);

        let mut rts = Vec::new();
        find_all(&dom.document, "rt", &mut rts);
        assert_eq!(element_text(&rts[0]), "食蜂操祈");
        assert_eq!(element_text(&rts[1]), "");
    }

    #[test]
    fn numeric_span_group_is_never_merged() {
        let dom = dom_of("<body><span>14%</span><span>14.7%</span></body>");
        // 即使词典里真有拼接后的键也不查
        let index = index_of(&[("14%14.7%", "绝不应出现")]);

        let mut collector = NodeCollector::default();
        let merged = collector.merge_adjacent(CarrierFamily::Span, &body(&dom), &index, 0.95);
        assert_eq!(merged, 0);

        let mut spans = Vec::new();
        find_all(&dom.document, "span", &mut spans);
        assert_eq!(element_text(&spans[0]), "14%");
        assert_eq!(element_text(&spans[1]), "14.7%");
        assert!(spans.iter().all(|s| !has_marker(s)));
    }

    #[test]
    fn nested_carrier_run_is_still_merged() {
        // 载体串整体套在一个外层载体里
        let dom = dom_of(
            "<body><span><span>쇼쿠</span><span>호 미사키</span></span></body>",
        );
        let index = index_of(&[("쇼쿠호 미사키", "食蜂操祈")]);

        let mut collector = NodeCollector::default();
        let merged = collector.merge_adjacent(CarrierFamily::Span, &body(&dom), &index, 0.95);
        assert_eq!(merged, 1);

        let outer = find_tag(&dom.document, "span").unwrap();
        assert_eq!(element_text(&outer), "食蜂操祈");
    }

    #[test]
    fn merge_hit_writes_into_nested_first_member() {
        // 第一个成员的文本藏在内联子元素里，没有直接文本子节点
        let dom = dom_of(
            "<body><span><b>쇼쿠</b></span><span>호 미사키</span></body>",
        );
        let index = index_of(&[("쇼쿠호 미사키", "食蜂操祈")]);

        let mut collector = NodeCollector::default();
        let merged = collector.merge_adjacent(CarrierFamily::Span, &body(&dom), &index, 0.95);
        assert_eq!(merged, 1);

        let mut spans = Vec::new();
        find_all(&dom.document, "span", &mut spans);
        assert_eq!(element_text(&spans[0]), "食蜂操祈");
        assert_eq!(element_text(&spans[1]), "");
        assert!(spans.iter().all(has_marker));
    }

    #[test]
    fn single_carrier_is_left_alone() {
        let dom = dom_of("<body><span>쇼쿠호 미사키</span></body>");
        let index = index_of(&[("쇼쿠호 미사키", "食蜂操祈")]);

        let mut collector = NodeCollector::default();
        let merged = collector.merge_adjacent(CarrierFamily::Span, &body(&dom), &index, 0.95);
        assert_eq!(merged, 0);

        let span = find_tag(&dom.document, "span").unwrap();
        assert_eq!(element_text(&span), "쇼쿠호 미사키");
    }

    #[test]
    fn missed_group_is_not_regrouped_but_stays_intact() {
        let dom = dom_of("<body><span>없는</span><span>词组</span></body>");
        let index = index_of(&[("다른 키", "别的")]);

        let mut collector = NodeCollector::default();
        let merged = collector.merge_adjacent(CarrierFamily::Span, &body(&dom), &index, 0.95);
        assert_eq!(merged, 0);
        assert_eq!(collector.stats().groups_missed, 1);

        let mut spans = Vec::new();
        find_all(&dom.document, "span", &mut spans);
        assert_eq!(element_text(&spans[0]), "없는");
        assert_eq!(element_text(&spans[1]), "词组");
        assert!(spans.iter().all(|s| get_node_attr(s, MARKER_ATTR).is_none()));
    }

    #[test]
    fn merge_falls_back_to_fuzzy_for_ragged_whitespace() {
        // 渲染文本与词典键的标点略有出入时靠模糊匹配兜底
        // 拼接键 "미사카 미코토!" 对词典键的相似度为 1 - 1/8 = 0.875
        let dom = dom_of("<body><span>미사카</span><span> 미코토!</span></body>");
        let index = index_of(&[("미사카 미코토", "御坂美琴")]);

        let mut collector = NodeCollector::default();
        let merged = collector.merge_adjacent(CarrierFamily::Span, &body(&dom), &index, 0.85);
        assert_eq!(merged, 1);
    }
}
