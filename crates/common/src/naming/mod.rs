//! Name resolution and artifact key derivation
//!
//! Lookup entities (method, property, descriptor, modelset) are referenced
//! by name. A user-supplied name becomes a connect-or-create directive that
//! the repository applies inside the model-creation transaction.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of named lookup entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupKind {
    Method,
    Property,
    Descriptor,
    Modelset,
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKind::Method => "method",
            LookupKind::Property => "property",
            LookupKind::Descriptor => "descriptor",
            LookupKind::Modelset => "modelset",
        }
    }

    /// Path segment used when no name was resolved, e.g. `unknown.method`
    pub fn unknown_segment(&self) -> String {
        format!("unknown.{}", self.as_str())
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create payload for a named lookup entity, as supplied by the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedInput {
    pub name: String,
    pub description: Option<String>,
}

impl NamedInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Row to create when nothing matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i32,
}

/// `{ where: {name}, create: {name, ownerId} }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOrCreate {
    pub where_name: String,
    pub create: CreateSpec,
}

impl ConnectOrCreate {
    /// Resolved name; the matched row and the created row share it
    pub fn name(&self) -> &str {
        &self.where_name
    }
}

/// Normalise a lookup name: trim, collapse whitespace runs, lower-case.
///
/// Returns `None` when nothing is left.
pub fn reformat_name(raw: &str) -> Option<String> {
    let name = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Build a connect-or-create directive; `None` input yields `None`.
pub fn connect_or_create(input: Option<&NamedInput>, owner_id: i32) -> Option<ConnectOrCreate> {
    let input = input?;
    let name = reformat_name(&input.name)?;
    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from);

    Some(ConnectOrCreate {
        where_name: name.clone(),
        create: CreateSpec {
            name,
            description,
            owner_id,
        },
    })
}

/// Directives for the four lookups of an upload
#[derive(Debug, Clone, Default)]
pub struct ResolvedNames {
    pub property: Option<ConnectOrCreate>,
    pub descriptor: Option<ConnectOrCreate>,
    pub method: Option<ConnectOrCreate>,
    pub modelset: Option<ConnectOrCreate>,
}

impl ResolvedNames {
    pub fn get(&self, kind: LookupKind) -> Option<&ConnectOrCreate> {
        match kind {
            LookupKind::Property => self.property.as_ref(),
            LookupKind::Descriptor => self.descriptor.as_ref(),
            LookupKind::Method => self.method.as_ref(),
            LookupKind::Modelset => self.modelset.as_ref(),
        }
    }

    /// Path segment for one lookup, never containing `/`
    pub fn segment(&self, kind: LookupKind) -> String {
        match self.get(kind) {
            Some(directive) => directive.name().replace('/', "_"),
            None => kind.unknown_segment(),
        }
    }
}

/// Split a filename into stem and extension (extension keeps its dot).
pub fn split_filename(filename: &str) -> (String, String) {
    // browsers may send a full client path
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() {
        return ("artifact".to_string(), String::new());
    }

    match base.rfind('.') {
        Some(idx) if idx > 0 => (base[..idx].to_string(), base[idx..].to_string()),
        _ => (base.to_string(), String::new()),
    }
}

/// 64 random bits rendered as 16 hex characters
pub fn unique_suffix() -> String {
    let value: u64 = rand::thread_rng().gen();
    format!("{:016x}", value)
}

/// `{modelset}/{property}/{descriptor}/{method}/{stem}-{suffix}{ext}`
pub fn artifact_key(names: &ResolvedNames, filename: &str, suffix: &str) -> String {
    let (stem, ext) = split_filename(filename);
    format!(
        "{}/{}/{}/{}/{}-{}{}",
        names.segment(LookupKind::Modelset),
        names.segment(LookupKind::Property),
        names.segment(LookupKind::Descriptor),
        names.segment(LookupKind::Method),
        stem,
        suffix,
        ext,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reformat_name() {
        assert_eq!(reformat_name("  Band   Gap "), Some("band gap".to_string()));
        assert_eq!(reformat_name("RandomForest"), Some("randomforest".to_string()));
        assert_eq!(reformat_name(" \t "), None);
    }

    #[test]
    fn test_connect_or_create_absent() {
        assert_eq!(connect_or_create(None, 1), None);
        assert_eq!(connect_or_create(Some(&NamedInput::new("   ")), 1), None);
    }

    #[test]
    fn test_connect_or_create_directive() {
        let input = NamedInput {
            name: "Formation  Energy".to_string(),
            description: Some("  eV/atom ".to_string()),
        };
        let directive = connect_or_create(Some(&input), 42).unwrap();
        assert_eq!(directive.where_name, "formation energy");
        assert_eq!(directive.create.name, "formation energy");
        assert_eq!(directive.create.owner_id, 42);
        assert_eq!(directive.create.description.as_deref(), Some("eV/atom"));
    }

    #[test]
    fn test_split_filename() {
        assert_eq!(split_filename("model.pkl.gz"), ("model.pkl".into(), ".gz".into()));
        assert_eq!(split_filename("weights"), ("weights".into(), "".into()));
        assert_eq!(split_filename(".hidden"), (".hidden".into(), "".into()));
        assert_eq!(split_filename("C:\\tmp\\net.pt"), ("net".into(), ".pt".into()));
        assert_eq!(split_filename(""), ("artifact".into(), "".into()));
    }

    #[test]
    fn test_artifact_key_uses_resolved_names() {
        let names = ResolvedNames {
            property: connect_or_create(Some(&NamedInput::new("Band Gap")), 1),
            method: connect_or_create(Some(&NamedInput::new("a/b")), 1),
            ..Default::default()
        };
        let key = artifact_key(&names, "model.pkl", "00ff00ff00ff00ff");
        assert_eq!(
            key,
            "unknown.modelset/band gap/unknown.descriptor/a_b/model-00ff00ff00ff00ff.pkl"
        );
    }

    #[test]
    fn test_unique_suffix_shape() {
        let a = unique_suffix();
        let b = unique_suffix();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
