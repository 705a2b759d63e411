//! Layer-name decomposition.
//!
//! Module names such as `bert.encoder.layer.4.attention.self.key` are split
//! into alphanumeric tokens and grouped into hierarchy levels by a positional
//! [`NamingRule`]:
//!
//! | tokens                | levels                                        |
//! |-----------------------|-----------------------------------------------|
//! | fewer than 5          | one level, the cleaned name (`qa_outputs`)    |
//! | 5 or more             | `bert` / `encoder.layer.4` / `attention.self.key` |

use serde::{Deserialize, Serialize};

use crate::error::{Result, SummaryError};

/// Split a layer name into maximal runs of alphanumeric or `_` characters.
///
/// # Example
///
/// ```rust
/// use param_summary_rs::naming::tokenize;
///
/// assert_eq!(
///     tokenize("bert.encoder.layer.4.attention.self.key"),
///     vec!["bert", "encoder", "layer", "4", "attention", "self", "key"],
/// );
/// assert_eq!(tokenize("qa_outputs"), vec!["qa_outputs"]);
/// assert!(tokenize("..").is_empty());
/// ```
#[must_use]
pub fn tokenize(name: &str) -> Vec<String> {
    name.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Hierarchy levels of one layer name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyLevels {
    /// Short name attached directly under the synthetic root.
    Single(String),
    /// `root` / `group` / `member` for names following the nested-block convention.
    Nested {
        /// Model root token (`bert`).
        root: String,
        /// Module group and block index (`encoder.layer.4`).
        group: String,
        /// Submodule path inside the block (`attention.self.key`).
        member: String,
    },
}

impl HierarchyLevels {
    /// Level labels, root to leaf.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        match self {
            HierarchyLevels::Single(name) => vec![name.as_str()],
            HierarchyLevels::Nested {
                root,
                group,
                member,
            } => vec![root.as_str(), group.as_str(), member.as_str()],
        }
    }

    /// Number of levels (1 or 3).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            HierarchyLevels::Single(_) => 1,
            HierarchyLevels::Nested { .. } => 3,
        }
    }

    /// Label written to the `layer_name` column.
    #[must_use]
    pub fn group_label(&self) -> &str {
        match self {
            HierarchyLevels::Single(name) => name,
            HierarchyLevels::Nested { group, .. } => group,
        }
    }

    /// Label written to the `layer_member` column.
    #[must_use]
    pub fn member_label(&self) -> &str {
        match self {
            HierarchyLevels::Single(name) => name,
            HierarchyLevels::Nested { member, .. } => member,
        }
    }
}

/// A decomposed layer name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerName {
    /// Name as captured.
    pub name: String,
    /// Alphanumeric tokens.
    pub tokens: Vec<String>,
    /// Hierarchy levels.
    pub levels: HierarchyLevels,
    /// Numeric block index, if the name carries one.
    pub block_index: Option<u64>,
}

/// Positional rule mapping tokens to hierarchy levels.
///
/// The defaults describe `<model>.<module>.<group>.<block>.<submodule...>`
/// names as produced by Hugging Face BERT/ViT style models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingRule {
    /// Label of the synthetic root node (reserved id 0).
    #[serde(default = "default_root")]
    pub root: String,

    /// Names with fewer tokens collapse to a single level.
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,

    /// First token of the group level. The root level is `tokens[..group_start]`.
    #[serde(default = "default_group_start")]
    pub group_start: usize,

    /// First token of the member level. The group level ends just before it.
    #[serde(default = "default_member_start")]
    pub member_start: usize,

    /// Position of the numeric block index used for ordering.
    #[serde(default = "default_block_index_token")]
    pub block_index_token: usize,

    /// Joins tokens inside a level and levels inside a path.
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_root() -> String {
    "bert".into()
}
fn default_min_tokens() -> usize {
    5
}
fn default_group_start() -> usize {
    1
}
fn default_member_start() -> usize {
    4
}
fn default_block_index_token() -> usize {
    3
}
fn default_separator() -> String {
    ".".into()
}

impl Default for NamingRule {
    fn default() -> Self {
        Self {
            root: default_root(),
            min_tokens: default_min_tokens(),
            group_start: default_group_start(),
            member_start: default_member_start(),
            block_index_token: default_block_index_token(),
            separator: default_separator(),
        }
    }
}

impl NamingRule {
    /// Check that the positions describe three non-empty levels.
    pub fn validate(&self) -> Result<()> {
        if self.root.is_empty() {
            return Err(SummaryError::Config("naming.root cannot be empty".into()));
        }
        if self.separator.is_empty() {
            return Err(SummaryError::Config(
                "naming.separator cannot be empty".into(),
            ));
        }
        if !(0 < self.group_start
            && self.group_start < self.member_start
            && self.member_start < self.min_tokens)
        {
            return Err(SummaryError::Config(format!(
                "naming positions must satisfy 0 < group_start ({}) < member_start ({}) < min_tokens ({})",
                self.group_start, self.member_start, self.min_tokens
            )));
        }
        Ok(())
    }

    /// Group tokens into hierarchy levels.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::MalformedName`] for an empty token sequence.
    pub fn classify(&self, tokens: &[String]) -> Result<HierarchyLevels> {
        if tokens.is_empty() {
            return Err(SummaryError::MalformedName(String::new()));
        }
        if tokens.len() < self.min_tokens {
            return Ok(HierarchyLevels::Single(tokens.join(&self.separator)));
        }
        Ok(HierarchyLevels::Nested {
            root: tokens[..self.group_start].join(&self.separator),
            group: tokens[self.group_start..self.member_start].join(&self.separator),
            member: tokens[self.member_start..].join(&self.separator),
        })
    }

    /// Numeric value of the block-index token, if present.
    #[must_use]
    pub fn block_index(&self, tokens: &[String]) -> Option<u64> {
        tokens.get(self.block_index_token)?.parse().ok()
    }

    /// Tokenize and classify a layer name.
    ///
    /// # Example
    ///
    /// ```rust
    /// use param_summary_rs::naming::{HierarchyLevels, NamingRule};
    ///
    /// # fn main() -> param_summary_rs::Result<()> {
    /// let rule = NamingRule::default();
    /// let layer = rule.decompose("bert.encoder.layer.4.attention.self.key")?;
    ///
    /// assert_eq!(layer.block_index, Some(4));
    /// assert_eq!(layer.levels.labels(), vec!["bert", "encoder.layer.4", "attention.self.key"]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn decompose(&self, name: &str) -> Result<LayerName> {
        let tokens = tokenize(name);
        let levels = self
            .classify(&tokens)
            .map_err(|_| SummaryError::MalformedName(name.to_owned()))?;
        let block_index = self.block_index(&tokens);
        Ok(LayerName {
            name: name.to_owned(),
            tokens,
            levels,
            block_index,
        })
    }
}
