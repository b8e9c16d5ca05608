//! DOM 辅助函数
//!
//! 基于 markup5ever_rcdom 的节点操作：属性读写、文本读写、
//! 翻译标记以及解析/序列化。

use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

use crate::error::{EngineError, EngineResult};

/// 翻译完成标记属性
///
/// 承载元素带上该属性后，它与其所有后代都不再被收集，
/// 直到标记被显式清除或元素被移除。
pub const MARKER_ATTR: &str = "data-pagegloss-translated";

/// 将 HTML 字节解析为 DOM
pub fn html_to_dom(data: &[u8]) -> RcDom {
    let s = String::from_utf8_lossy(data).to_string();

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .unwrap()
}

/// 序列化文档
pub fn serialize_document(dom: RcDom) -> EngineResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = dom.document.into();
    serialize(&mut buf, &serializable, SerializeOpts::default())
        .map_err(|e| EngineError::ParseError(format!("文档序列化失败: {e}")))?;
    Ok(buf)
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 设置节点属性；`None` 表示删除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    use html5ever::interface::{Attribute, QualName};
    use html5ever::tendril::format_tendril;
    use html5ever::{namespace_url, ns, LocalName};

    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.clone() {
                    let _ = &attrs_mut[i].value.clear();
                    let _ = &attrs_mut[i].value.push_slice(attr_value.as_str());
                } else {
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value.clone() {
                let name = LocalName::from(attr_name);

                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), name),
                    value: format_tendril!("{}", attr_value),
                });
            }
        }
    };
}

/// 获取元素标签名
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let parent = child.parent.take();
    if let Some(ref weak) = parent {
        let upgraded = weak.upgrade();
        child.parent.set(parent);
        upgraded
    } else {
        None
    }
}

/// 读取文本节点内容
pub fn get_text_content(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 覆写文本节点内容
pub fn set_text_content(node: &Handle, text: &str) {
    if let NodeData::Text { contents } = &node.data {
        let mut tendril = contents.borrow_mut();
        tendril.clear();
        tendril.push_slice(text);
    }
}

/// 读取元素的直接拼接文本（只取后代文本节点，按文档顺序）
pub fn element_text(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
    }
}

/// 覆写元素文本
///
/// 按文档顺序找到子树里第一个文本节点写入新值，其余文本节点
/// 全部清空；子树里一个文本节点都没有时追加一个新文本节点，
/// 保证写入不会凭空丢失。
pub fn set_element_text(node: &Handle, text: &str) {
    let mut pending = Some(text);
    write_first_text(node, &mut pending);
    if let Some(text) = pending {
        if !text.is_empty() {
            append_text_node(node, text);
        }
    }
}

fn write_first_text(node: &Handle, pending: &mut Option<&str>) {
    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { .. } => {
                set_text_content(child, pending.take().unwrap_or(""));
            }
            NodeData::Element { .. } => write_first_text(child, pending),
            _ => {}
        }
    }
}

fn append_text_node(node: &Handle, text: &str) {
    use html5ever::tendril::StrTendril;
    use std::cell::RefCell;

    let mut contents = StrTendril::new();
    contents.push_slice(text);
    let text_node = Node::new(NodeData::Text {
        contents: RefCell::new(contents),
    });
    text_node.parent.set(Some(std::rc::Rc::downgrade(node)));
    node.children.borrow_mut().push(text_node);
}

/// 判断元素是否带翻译标记
pub fn has_marker(node: &Handle) -> bool {
    get_node_attr(node, MARKER_ATTR).is_some()
}

/// 给元素打上翻译标记
pub fn set_marker(node: &Handle) {
    set_node_attr(node, MARKER_ATTR, Some("true".to_string()));
}

/// 判断节点自身或任一祖先是否带翻译标记
pub fn under_marker(node: &Handle) -> bool {
    if has_marker(node) {
        return true;
    }
    let mut current = get_parent_node(node);
    while let Some(node) = current {
        if has_marker(&node) {
            return true;
        }
        current = get_parent_node(&node);
    }
    false
}

/// 递归清除子树内的全部翻译标记
pub fn clear_markers(node: &Handle) {
    if matches!(node.data, NodeData::Element { .. }) {
        set_node_attr(node, MARKER_ATTR, None);
    }
    for child in node.children.borrow().iter() {
        clear_markers(child);
    }
}

/// 判断文本节点是否只含空白
pub fn is_whitespace_text(node: &Handle) -> bool {
    match &node.data {
        NodeData::Text { contents } => contents.borrow().trim().is_empty(),
        _ => false,
    }
}

/// 调试输出：打印子树内所有叶子元素的文本
pub fn dump_leaf_text(node: &Handle) {
    if let NodeData::Element { .. } = node.data {
        let children = node.children.borrow();
        let has_element_child = children
            .iter()
            .any(|child| matches!(child.data, NodeData::Element { .. }));
        if !has_element_child {
            let text = element_text(node);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                tracing::debug!("叶子元素文本: {:?}", trimmed);
            }
        }
    }
    for child in node.children.borrow().iter() {
        dump_leaf_text(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dom_of(html: &str) -> RcDom {
        html_to_dom(html.as_bytes())
    }

    fn find_first(node: &Handle, tag: &str) -> Option<Handle> {
        if get_node_name(node) == Some(tag) {
            return Some(node.clone());
        }
        for child in node.children.borrow().iter() {
            if let Some(found) = find_first(child, tag) {
                return Some(found);
            }
        }
        None
    }

    #[test]
    fn marker_round_trip() {
        let dom = dom_of("<div><span>안녕</span></div>");
        let span = find_first(&dom.document, "span").unwrap();

        assert!(!has_marker(&span));
        set_marker(&span);
        assert!(has_marker(&span));
        assert_eq!(get_node_attr(&span, MARKER_ATTR).as_deref(), Some("true"));

        clear_markers(&dom.document);
        assert!(!has_marker(&span));
    }

    #[test]
    fn under_marker_sees_ancestors() {
        let dom = dom_of("<div><p><span>텍스트</span></p></div>");
        let div = find_first(&dom.document, "div").unwrap();
        let span = find_first(&dom.document, "span").unwrap();

        assert!(!under_marker(&span));
        set_marker(&div);
        assert!(under_marker(&span));
        // parent 链在检查后保持可用
        assert!(get_parent_node(&span).is_some());
    }

    #[test]
    fn element_text_and_write_back() {
        let dom = dom_of("<span>쇼쿠<b>호</b></span>");
        let span = find_first(&dom.document, "span").unwrap();
        assert_eq!(element_text(&span), "쇼쿠호");

        set_element_text(&span, "食蜂");
        assert_eq!(element_text(&span), "食蜂");
    }

    #[test]
    fn write_back_reaches_nested_only_text() {
        // 文本全在内联子元素里，没有直接文本子节点
        let dom = dom_of("<span><b>쇼쿠</b><i>호</i></span>");
        let span = find_first(&dom.document, "span").unwrap();

        set_element_text(&span, "食蜂");
        assert_eq!(element_text(&span), "食蜂");
        let b = find_first(&dom.document, "b").unwrap();
        assert_eq!(element_text(&b), "食蜂");
    }

    #[test]
    fn write_back_appends_when_subtree_has_no_text() {
        let dom = dom_of("<span><img src=\"x.png\"></span>");
        let span = find_first(&dom.document, "span").unwrap();

        set_element_text(&span, "食蜂");
        assert_eq!(element_text(&span), "食蜂");
        let appended = span.children.borrow().last().unwrap().clone();
        assert!(get_parent_node(&appended).is_some());
    }

    #[test]
    fn serialize_keeps_translated_text() {
        let dom = dom_of("<html><body><p>원문</p></body></html>");
        let p = find_first(&dom.document, "p").unwrap();
        set_element_text(&p, "译文");

        let bytes = serialize_document(dom).unwrap();
        let html = String::from_utf8(bytes).unwrap();
        assert!(html.contains("译文"));
        assert!(!html.contains("원문"));
    }
}
