// 集成测试公共模块
//
// 提供词典目录搭建、服务装配与 DOM 查询辅助

use std::fs;
use std::path::Path;

use markup5ever_rcdom::{Handle, NodeData, RcDom};
use tempfile::TempDir;

use pagegloss::dom::html_to_dom;
use pagegloss::{GlossaryStore, SettingsStore, TranslationService};

/// 临时词典目录 + 已启用的翻译服务
pub struct TestEnvironment {
    pub service: TranslationService,
    #[allow(dead_code)]
    tmp: TempDir,
}

impl TestEnvironment {
    /// 用给定词条搭出 zh-tw 词典并启用服务
    pub async fn with_entries(entries: &[(&str, &str)]) -> Self {
        Self::with_locale_entries("zh-tw", entries).await
    }

    pub async fn with_locale_entries(locale: &str, entries: &[(&str, &str)]) -> Self {
        let tmp = TempDir::new().expect("创建临时目录失败");
        let glossary_root = tmp.path().join("glossary");
        write_glossary_file(&glossary_root, locale, "terms.json", entries);

        let service = TranslationService::new(
            GlossaryStore::new(&glossary_root, tmp.path().join("cache")),
            SettingsStore::new(tmp.path().join("settings.toml")),
        )
        .expect("创建服务失败");

        if locale != "zh-tw" {
            service
                .handle_command(pagegloss::Command::SetLocale(locale.to_string()))
                .await
                .expect("切换语言失败");
        }
        service
            .handle_command(pagegloss::Command::Enable)
            .await
            .expect("启用翻译失败");

        Self { service, tmp }
    }
}

/// 向 `<root>/<locale>/<name>` 写一个词典 JSON 文件
pub fn write_glossary_file(
    root: &Path,
    locale: &str,
    name: &str,
    entries: &[(&str, &str)],
) {
    let dir = root.join(locale);
    fs::create_dir_all(&dir).expect("创建词典目录失败");
    let map: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    fs::write(
        dir.join(name),
        serde_json::to_string(&serde_json::Value::Object(map)).unwrap(),
    )
    .expect("写词典文件失败");
}

pub fn parse(html: &str) -> RcDom {
    html_to_dom(html.as_bytes())
}

/// 按标签名找第一个元素
pub fn find_tag(node: &Handle, tag: &str) -> Option<Handle> {
    if let NodeData::Element { name, .. } = &node.data {
        if name.local.as_ref() == tag {
            return Some(node.clone());
        }
    }
    for child in node.children.borrow().iter() {
        if let Some(found) = find_tag(child, tag) {
            return Some(found);
        }
    }
    None
}

/// 按标签名收集所有元素
pub fn find_all_tags(node: &Handle, tag: &str, out: &mut Vec<Handle>) {
    if let NodeData::Element { name, .. } = &node.data {
        if name.local.as_ref() == tag {
            out.push(node.clone());
        }
    }
    for child in node.children.borrow().iter() {
        find_all_tags(child, tag, out);
    }
}

/// 子树的拼接文本
pub fn subtree_text(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}
