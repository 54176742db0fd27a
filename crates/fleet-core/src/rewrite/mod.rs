//! HTML form-field rewriting for the interception proxy.
//!
//! The proxy host hands every HTTP response through [`HtmlRewriter`]; for
//! HTML bodies it clears, forces, or fills named `<input>` values according
//! to a [`RewriteConfig`]. Configuration is an explicit snapshot passed in
//! at construction: updating it means loading a new snapshot and building a
//! new rewriter, never mutating shared state behind the proxy's back.

use std::collections::BTreeMap;
use std::path::Path;

use regex::{escape, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Field rewriting rules, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Master switch; a disabled config rewrites nothing.
    pub enabled: bool,
    /// Inputs whose value is replaced, or inserted when absent.
    pub field_values: BTreeMap<String, String>,
    /// Inputs whose existing value is overwritten unconditionally.
    pub fixed_values: BTreeMap<String, String>,
    /// Hidden inputs whose value is emptied.
    pub clear_fields: Vec<String>,
    /// Substring filters on the request host; empty means all hosts.
    pub target_domains: Vec<String>,
    /// Substring filters on the request path; empty means all paths.
    pub target_paths: Vec<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        let mut field_values = BTreeMap::new();
        field_values.insert("answer1".to_string(), "changeme".to_string());
        field_values.insert("answer2".to_string(), "changeme".to_string());
        field_values.insert("pwd".to_string(), "changeme".to_string());
        field_values.insert("surePwd".to_string(), "changeme".to_string());

        let mut fixed_values = BTreeMap::new();
        fixed_values.insert("queId1".to_string(), "1".to_string());
        fixed_values.insert("queId2".to_string(), "1".to_string());

        Self {
            enabled: true,
            field_values,
            fixed_values,
            clear_fields: vec!["bindPhone".to_string(), "bindMail".to_string()],
            target_domains: Vec::new(),
            target_paths: Vec::new(),
        }
    }
}

/// Default location of the rewrite config file.
pub fn default_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|p| p.join("adb-fleet").join("rewrite.json"))
}

impl RewriteConfig {
    /// Load a snapshot from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a snapshot, writing (and returning) the defaults when the file
    /// does not exist yet.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Re-read the file and return a fresh immutable snapshot.
    pub fn reload(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(path)
    }

    /// Persist this snapshot.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

struct FieldRule {
    name: String,
    value: String,
    replace: Regex,
    tag: Regex,
}

/// Applies one [`RewriteConfig`] snapshot to HTML bodies.
pub struct HtmlRewriter {
    config: RewriteConfig,
    clear_rules: Vec<(String, Regex)>,
    fixed_rules: Vec<(String, String, Regex)>,
    field_rules: Vec<FieldRule>,
}

fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("static rewrite pattern")
}

impl HtmlRewriter {
    /// Compile the rewrite rules for a config snapshot.
    pub fn new(config: RewriteConfig) -> Self {
        let clear_rules = config
            .clear_fields
            .iter()
            .map(|field| {
                let pattern = format!(
                    r#"(<input type="hidden" id="{}" value=")[^"]*(")"#,
                    escape(field)
                );
                (field.clone(), ci(&pattern))
            })
            .collect();

        let fixed_rules = config
            .fixed_values
            .iter()
            .map(|(field, value)| {
                let pattern = format!(r#"id="{}" value="[^"]*""#, escape(field));
                (field.clone(), value.clone(), ci(&pattern))
            })
            .collect();

        let field_rules = config
            .field_values
            .iter()
            .map(|(field, value)| FieldRule {
                name: field.clone(),
                value: value.clone(),
                replace: ci(&format!(
                    r#"(id="{}"[^>]*value=")[^"]*(")"#,
                    escape(field)
                )),
                tag: ci(&format!(r#"<[^>]*id="{}"[^>]*>"#, escape(field))),
            })
            .collect();

        Self {
            config,
            clear_rules,
            fixed_rules,
            field_rules,
        }
    }

    /// The snapshot this rewriter was built from.
    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// Whether a response is in scope: rewriting enabled, host and path
    /// pass the filters, and the body is HTML.
    pub fn should_rewrite(&self, host: &str, path: &str, content_type: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        if !content_type.contains("text/html") {
            return false;
        }
        if !self.config.target_domains.is_empty()
            && !self.config.target_domains.iter().any(|d| host.contains(d.as_str()))
        {
            return false;
        }
        if !self.config.target_paths.is_empty()
            && !self.config.target_paths.iter().any(|p| path.contains(p.as_str()))
        {
            return false;
        }
        true
    }

    /// Rewrite an HTML body.
    ///
    /// Returns the new body and the list of applied modifications, or
    /// `None` when nothing matched.
    pub fn rewrite(&self, html: &str) -> Option<(String, Vec<String>)> {
        let mut content = html.to_string();
        let mut modifications = Vec::new();

        for (field, rule) in &self.clear_rules {
            let next = rule.replace_all(&content, "${1}${2}").into_owned();
            if next != content {
                modifications.push(format!("{}_cleared", field));
                content = next;
            }
        }

        for (field, value, rule) in &self.fixed_rules {
            let replacement = format!(r#"id="{}" value="{}""#, field, value);
            let next = rule.replace_all(&content, replacement.as_str()).into_owned();
            if next != content {
                modifications.push(format!("{}_set_to_{}", field, value));
                content = next;
            }
        }

        for rule in &self.field_rules {
            let replacement = format!("${{1}}{}${{2}}", rule.value);
            let mut next = rule
                .replace
                .replace_all(&content, replacement.as_str())
                .into_owned();

            // Tags carrying the id but no value attribute get one inserted
            // before the closing bracket.
            let value = &rule.value;
            next = rule
                .tag
                .replace_all(&next, |caps: &regex::Captures<'_>| {
                    let tag = &caps[0];
                    if tag.to_lowercase().contains("value=") {
                        tag.to_string()
                    } else {
                        let body = tag[..tag.len() - 1].trim_end();
                        match body.strip_suffix('/') {
                            Some(body) => {
                                format!(r#"{} value="{}"/>"#, body.trim_end(), value)
                            }
                            None => format!(r#"{} value="{}">"#, body, value),
                        }
                    }
                })
                .into_owned();

            if next != content {
                modifications.push(format!("{}_set_to_{}", rule.name, rule.value));
                content = next;
            }
        }

        if modifications.is_empty() {
            None
        } else {
            debug!(?modifications, "rewrote response body");
            Some((content, modifications))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter() -> HtmlRewriter {
        let mut config = RewriteConfig::default();
        config
            .field_values
            .insert("answer1".to_string(), "naruto".to_string());
        config
            .field_values
            .insert("pwd".to_string(), "hunter2".to_string());
        HtmlRewriter::new(config)
    }

    #[test]
    fn test_clears_hidden_fields() {
        let html = r#"<input type="hidden" id="bindPhone" value="0812345678">"#;
        let (out, mods) = rewriter().rewrite(html).unwrap();
        assert!(out.contains(r#"id="bindPhone" value="""#));
        assert!(mods.contains(&"bindPhone_cleared".to_string()));
    }

    #[test]
    fn test_forces_fixed_values() {
        let html = r#"<input id="queId1" value="7">"#;
        let (out, mods) = rewriter().rewrite(html).unwrap();
        assert!(out.contains(r#"id="queId1" value="1""#));
        assert!(mods.contains(&"queId1_set_to_1".to_string()));
    }

    #[test]
    fn test_replaces_existing_field_value() {
        let html = r#"<input id="answer1" type="text" value="old">"#;
        let (out, _) = rewriter().rewrite(html).unwrap();
        assert!(out.contains(r#"value="naruto""#));
        assert!(!out.contains("old"));
    }

    #[test]
    fn test_inserts_missing_field_value() {
        let html = r#"<input id="pwd" type="password">"#;
        let (out, mods) = rewriter().rewrite(html).unwrap();
        assert!(out.contains(r#"value="hunter2""#));
        assert!(mods.contains(&"pwd_set_to_hunter2".to_string()));
    }

    #[test]
    fn test_inserts_value_into_self_closing_tag() {
        let html = r#"<input id="pwd" type="password" />"#;
        let (out, _) = rewriter().rewrite(html).unwrap();
        assert!(out.contains(r#"value="hunter2"/>"#));
        assert!(!out.contains("/ value"));
    }

    #[test]
    fn test_untouched_body_returns_none() {
        assert!(rewriter().rewrite("<p>nothing to see</p>").is_none());
    }

    #[test]
    fn test_case_insensitive_matching() {
        let html = r#"<INPUT ID="queId1" VALUE="9">"#;
        assert!(rewriter().rewrite(html).is_some());
    }

    #[test]
    fn test_should_rewrite_filters_content_type() {
        let r = rewriter();
        assert!(r.should_rewrite("game.example.com", "/reset", "text/html; charset=utf-8"));
        assert!(!r.should_rewrite("game.example.com", "/api", "application/json"));
    }

    #[test]
    fn test_should_rewrite_honors_domain_filter() {
        let mut config = RewriteConfig::default();
        config.target_domains = vec!["game.example.com".to_string()];
        let r = HtmlRewriter::new(config);
        assert!(r.should_rewrite("api.game.example.com", "/", "text/html"));
        assert!(!r.should_rewrite("other.net", "/", "text/html"));
    }

    #[test]
    fn test_disabled_config_rewrites_nothing() {
        let mut config = RewriteConfig::default();
        config.enabled = false;
        let r = HtmlRewriter::new(config);
        assert!(!r.should_rewrite("any", "/", "text/html"));
    }

    #[test]
    fn test_config_save_and_reload_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewrite.json");

        let first = RewriteConfig::load_or_init(&path).unwrap();
        assert!(first.enabled);

        let mut updated = first.clone();
        updated
            .field_values
            .insert("answer1".to_string(), "new-answer".to_string());
        updated.save(&path).unwrap();

        // The original snapshot is untouched; reload returns a new one.
        let reloaded = RewriteConfig::reload(&path).unwrap();
        assert_eq!(reloaded.field_values["answer1"], "new-answer");
        assert_ne!(
            first.field_values["answer1"],
            reloaded.field_values["answer1"]
        );
    }
}
