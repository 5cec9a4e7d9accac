//! 分词模块
//!
//! 提供中英文混合分词能力，用于会话记忆召回打分。
//! 使用 jieba-rs 进行中文分词，英文按空格分词。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

/// 全局 Jieba 实例（延迟初始化）
static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |   // CJK Unified Ideographs
        '\u{3400}'..='\u{4DBF}' |   // CJK Unified Ideographs Extension A
        '\u{F900}'..='\u{FAFF}' |   // CJK Compatibility Ideographs
        '\u{3000}'..='\u{303F}' |   // CJK Symbols and Punctuation
        '\u{3040}'..='\u{309F}' |   // Hiragana
        '\u{30A0}'..='\u{30FF}'     // Katakana
    )
}

/// 判断文本是否包含 CJK 字符
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 智能分词：根据文本内容自动选择分词策略
/// - 包含 CJK 字符时使用 jieba 分词
/// - 纯英文时使用空格分词
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.to_lowercase())
            .filter(|s| s.len() > 1 || is_cjk(s.chars().next().unwrap_or(' ')))
            .collect()
    } else {
        text.split_whitespace()
            .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|s| s.len() > 1)
            .collect()
    }
}

/// 分词并返回词集合（用于相似度计算）
pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 计算两个词集合的重叠分数（交集大小）
pub fn overlap_score(set1: &HashSet<String>, set2: &HashSet<String>) -> usize {
    set1.intersection(set2).count()
}
