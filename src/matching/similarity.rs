//! 编辑距离与字符串相似度
//!
//! 经典 Levenshtein 距离（插入/删除/替换各计 1），
//! 按码点序列计算，两行滚动数组，内存 O(min(|a|,|b|))。

/// 计算两个字符串的编辑距离
pub fn distance(a: &str, b: &str) -> usize {
    // 让 b 作为较短的一侧，滚动行更小
    let (long, short): (Vec<char>, Vec<char>) = {
        let ca: Vec<char> = a.chars().collect();
        let cb: Vec<char> = b.chars().collect();
        if ca.len() >= cb.len() {
            (ca, cb)
        } else {
            (cb, ca)
        }
    };

    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr: Vec<usize> = vec![0; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let cost = if lc == sc { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

/// 归一化相似度，取值 [0,1]
///
/// `1 - distance / max(len)`；两串均为空或完全相同返回 1。
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let la = a.chars().count();
    let lb = b.chars().count();
    let max_len = la.max(lb);
    if max_len == 0 {
        return 1.0;
    }
    1.0 - distance(a, b) as f64 / max_len as f64
}
