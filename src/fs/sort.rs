//! Sibling ordering: directories first, then the configured key.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::fs::node::Node;

/// Sort key for sibling lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Natural, case-insensitive name order ("file2" before "file10").
    #[default]
    Name,
    /// File extension, then name.
    Type,
    Size,
    Modified,
}

impl SortBy {
    /// Parse sort_by from config string. Unknown values fall back to name.
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "type" | "extension" => SortBy::Type,
            "size" => SortBy::Size,
            "modified" | "mtime" => SortBy::Modified,
            _ => SortBy::Name,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "asc", alias = "ascending")]
    Ascending,
    #[serde(rename = "desc", alias = "descending")]
    Descending,
}

impl SortOrder {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "desc" | "descending" => SortOrder::Descending,
            _ => SortOrder::Ascending,
        }
    }
}

/// Compare two siblings.
///
/// Directories always precede files; `Descending` only reverses the key
/// comparison, never the kind priority.
pub fn compare_nodes(a: &Node, b: &Node, sort_by: SortBy, order: SortOrder) -> Ordering {
    let kind = b.is_dir().cmp(&a.is_dir());
    if kind != Ordering::Equal {
        return kind;
    }

    let by_key = match sort_by {
        SortBy::Name => Ordering::Equal,
        SortBy::Type => a.extension().cmp(&b.extension()),
        SortBy::Size => a.size.unwrap_or(0).cmp(&b.size.unwrap_or(0)),
        SortBy::Modified => millis(a.last_modified).cmp(&millis(b.last_modified)),
    }
    .then_with(|| natural_cmp(&a.name, &b.name));

    match order {
        SortOrder::Ascending => by_key,
        SortOrder::Descending => by_key.reverse(),
    }
}

/// Missing timestamps sort as the epoch.
fn millis(t: Option<SystemTime>) -> u128 {
    t.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Case-insensitive comparison that orders embedded digit runs numerically.
///
/// Names equal under folding fall back to plain ordinal order so the result
/// is total and deterministic.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_fold_cmp(a, b).then_with(|| a.cmp(b))
}

fn natural_fold_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();

    loop {
        let (ca, cb) = match (ai.peek(), bi.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&ca), Some(&cb)) => (ca, cb),
        };

        if ca.is_ascii_digit() && cb.is_ascii_digit() {
            let na = take_digits(&mut ai);
            let nb = take_digits(&mut bi);
            let ord = cmp_digit_runs(&na, &nb);
            if ord != Ordering::Equal {
                return ord;
            }
            continue;
        }

        let ord = ca.to_lowercase().cmp(cb.to_lowercase());
        if ord != Ordering::Equal {
            return ord;
        }
        ai.next();
        bi.next();
    }
}

fn take_digits(it: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(&c) = it.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        it.next();
    }
    run
}

fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
