//! Heuristic SQL classification.
//!
//! The classifier never parses SQL. It looks at the leading verb, a
//! bounded prefix for stored-function calls and a bounded suffix for row
//! locks, which is enough to keep writes off replicas.

use once_cell::sync::Lazy;
use regex::Regex;
use tandem_core::RoutingConfig;

static FUNCTION_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bselect\s+([A-Za-z_][\w.]*)\s*\(").expect("Invalid function call regex")
});

/// Classifies statements as writes, row locks or session `SET`s.
#[derive(Debug, Clone, Default)]
pub struct SqlClassifier {
    config: RoutingConfig,
    read_only: Vec<String>,
}

impl SqlClassifier {
    pub fn new(config: RoutingConfig) -> Self {
        let read_only = config
            .read_only_functions
            .iter()
            .map(|name| name.trim().to_ascii_lowercase())
            .collect();
        Self { config, read_only }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// `UPDATE`, `DELETE`, or a call to a function not known to be read-only.
    pub fn is_write_operation(&self, sql: Option<&str>) -> bool {
        let Some(sql) = non_empty(sql) else {
            return false;
        };
        let sql = sql.trim_start();
        starts_with_keyword(sql, "update")
            || starts_with_keyword(sql, "delete")
            || self.is_function_call(sql)
    }

    /// A `FOR UPDATE` clause near the end of the statement.
    pub fn is_select_for_update(&self, sql: Option<&str>) -> bool {
        let Some(sql) = non_empty(sql) else {
            return false;
        };
        suffix(sql, self.config.select_for_update_suffix)
            .to_ascii_lowercase()
            .contains("for update")
    }

    /// A session parameter statement such as `SET search_path TO x`.
    pub fn is_set_statement(&self, sql: Option<&str>) -> bool {
        non_empty(sql).is_some_and(|sql| starts_with_keyword(sql.trim_start(), "set"))
    }

    fn is_function_call(&self, sql: &str) -> bool {
        let head = prefix(sql, self.config.function_call_prefix);
        FUNCTION_CALL
            .captures_iter(head)
            .filter_map(|captures| captures.get(1))
            .any(|name| !self.is_read_only(name.as_str()))
    }

    fn is_read_only(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        let unqualified = name.rsplit('.').next().unwrap_or(&name);
        self.read_only
            .iter()
            .any(|allowed| *allowed == name || allowed == unqualified)
    }
}

fn non_empty(sql: Option<&str>) -> Option<&str> {
    sql.filter(|sql| !sql.trim().is_empty())
}

fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    sql.get(..keyword.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
}

/// First `chars` characters, never splitting a code point.
fn prefix(sql: &str, chars: usize) -> &str {
    match sql.char_indices().nth(chars) {
        Some((end, _)) => &sql[..end],
        None => sql,
    }
}

/// Last `chars` characters, never splitting a code point.
fn suffix(sql: &str, chars: usize) -> &str {
    let total = sql.chars().count();
    if total <= chars {
        return sql;
    }
    match sql.char_indices().nth(total - chars) {
        Some((start, _)) => &sql[start..],
        None => sql,
    }
}
