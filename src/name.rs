//! Model names
//!
//! A [`Name`] addresses one manifest slot: `host/namespace/model:tag`.
//!
//! ## Grammar
//! ```text
//! [host/][namespace/]model[:tag]
//!
//!   host       default "registry.ollama.ai"   may carry a port (host:port)
//!   namespace  default "library"
//!   tag        default "latest"
//! ```
//!
//! A `:` only starts the tag when no `/` follows it, so `localhost:5000/ns/m`
//! is a host with a port and the default tag.
//!
//! Every part is case-insensitive and stored lowercased, so two names are
//! equal exactly when their manifest paths are equal. The same splitter and
//! defaults back [`NamePattern`], which adds `*` and `?` wildcards.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, StoreError};

pub const DEFAULT_HOST: &str = "registry.ollama.ai";
pub const DEFAULT_NAMESPACE: &str = "library";
pub const DEFAULT_TAG: &str = "latest";

const MAX_HOST_LEN: usize = 350;
const MAX_PART_LEN: usize = 80;

/// `:` is legal in a host (port) but is swapped for `%` on disk.
/// `%` is illegal in every part, so the swap is reversible.
const HOST_PORT_SEPARATOR: char = ':';
const HOST_PORT_PATH_SEPARATOR: char = '%';

/// The four parts of a name, in path order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Part {
    Host,
    Namespace,
    Model,
    Tag,
}

impl Part {
    pub(crate) const ALL: [Part; 4] = [Part::Host, Part::Namespace, Part::Model, Part::Tag];

    fn label(self) -> &'static str {
        match self {
            Part::Host => "host",
            Part::Namespace => "namespace",
            Part::Model => "model",
            Part::Tag => "tag",
        }
    }

    fn max_len(self) -> usize {
        match self {
            Part::Host => MAX_HOST_LEN,
            _ => MAX_PART_LEN,
        }
    }

    fn allows(self, c: char) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(c, '_' | '-' | '.')
            || (self == Part::Host && c == HOST_PORT_SEPARATOR)
    }
}

// =============================================================================
// Splitting (shared by Name and NamePattern)
// =============================================================================

/// Split `[host/][namespace/]model[:tag]` into four raw parts with defaults
/// applied. Nothing is validated beyond the shape.
fn split(s: &str) -> Result<[&str; 4]> {
    if s.contains('@') {
        return Err(StoreError::InvalidName(format!(
            "{s:?}: digest references are not names"
        )));
    }

    let (rest, tag) = match s.rfind(':') {
        Some(i) if !s[i..].contains('/') => (&s[..i], &s[i + 1..]),
        _ => (s, DEFAULT_TAG),
    };

    let segments: Vec<&str> = rest.split('/').collect();
    match segments.as_slice() {
        [model] => Ok([DEFAULT_HOST, DEFAULT_NAMESPACE, *model, tag]),
        [namespace, model] => Ok([DEFAULT_HOST, *namespace, *model, tag]),
        [host, namespace, model] => Ok([*host, *namespace, *model, tag]),
        _ => Err(StoreError::InvalidName(format!(
            "{s:?}: expected at most host/namespace/model:tag"
        ))),
    }
}

/// Validate one part and return its normalized (lowercase) form
fn normalize_part(part: Part, raw: &str, wildcards: bool) -> Result<String> {
    let invalid = |why: &str| StoreError::InvalidName(format!("{} {raw:?}: {why}", part.label()));

    if raw.is_empty() {
        return Err(invalid("empty"));
    }
    if raw.len() > part.max_len() {
        return Err(invalid(&format!("longer than {} characters", part.max_len())));
    }

    let is_wildcard = |c: char| wildcards && matches!(c, '*' | '?');
    if let Some(first) = raw.chars().next() {
        if !(first.is_ascii_alphanumeric() || first == '_' || is_wildcard(first)) {
            return Err(invalid("must start with a letter, digit or '_'"));
        }
    }
    if let Some(bad) = raw.chars().find(|&c| !(part.allows(c) || is_wildcard(c))) {
        return Err(invalid(&format!("illegal character {bad:?}")));
    }

    Ok(raw.to_ascii_lowercase())
}

// =============================================================================
// Name
// =============================================================================

/// Fully-qualified, normalized model name
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    host: String,
    namespace: String,
    model: String,
    tag: String,
}

impl Name {
    /// Parse and normalize a name, filling in defaults
    pub fn parse(s: &str) -> Result<Self> {
        let [host, namespace, model, tag] = split(s)?;
        Self::from_parts(host, namespace, model, tag)
    }

    /// Build a name from explicit parts (validated and lowercased)
    pub fn from_parts(host: &str, namespace: &str, model: &str, tag: &str) -> Result<Self> {
        Ok(Self {
            host: normalize_part(Part::Host, host, false)?,
            namespace: normalize_part(Part::Namespace, namespace, false)?,
            model: normalize_part(Part::Model, model, false)?,
            tag: normalize_part(Part::Tag, tag, false)?,
        })
    }

    /// Recover a name from its four on-disk path components.
    ///
    /// Returns `None` unless the components are exactly what
    /// [`Name::path_components`] would produce, so foreign or
    /// non-normalized entries never alias a real name.
    pub fn from_path_components(components: [&str; 4]) -> Option<Self> {
        let host = components[0].replace(HOST_PORT_PATH_SEPARATOR, ":");
        let name = Self::from_parts(&host, components[1], components[2], components[3]).ok()?;
        let expected = name.path_components();
        let matches = expected
            .iter()
            .zip(components.iter())
            .all(|(a, b)| a.as_str() == *b);
        matches.then_some(name)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub(crate) fn part(&self, part: Part) -> &str {
        match part {
            Part::Host => &self.host,
            Part::Namespace => &self.namespace,
            Part::Model => &self.model,
            Part::Tag => &self.tag,
        }
    }

    /// On-disk components: host, namespace, model, tag
    pub fn path_components(&self) -> [String; 4] {
        [
            self.host.replace(HOST_PORT_SEPARATOR, "%"),
            self.namespace.clone(),
            self.model.clone(),
            self.tag.clone(),
        ]
    }

    /// Path of this name's manifest, relative to the manifests root
    pub fn filepath(&self) -> PathBuf {
        self.path_components().iter().collect()
    }

    /// Shortest form that parses back to this name: default host, namespace
    /// and tag are dropped
    pub fn display_shortest(&self) -> String {
        let mut out = match (self.host == DEFAULT_HOST, self.namespace == DEFAULT_NAMESPACE) {
            (true, true) => self.model.clone(),
            (true, false) => format!("{}/{}", self.namespace, self.model),
            _ => format!("{}/{}/{}", self.host, self.namespace, self.model),
        };
        if self.tag != DEFAULT_TAG {
            out.push(':');
            out.push_str(&self.tag);
        }
        out
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}:{}", self.host, self.namespace, self.model, self.tag)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

impl FromStr for Name {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Name::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// NamePattern
// =============================================================================

/// Name pattern with per-part `*` / `?` wildcards
///
/// Parsed with the same grammar and defaults as [`Name`]: `test*` means
/// `registry.ollama.ai/library/test*:latest`; use `*/*/*:*` (or
/// [`NamePattern::any`]) for every name.
#[derive(Clone, PartialEq, Eq)]
pub struct NamePattern {
    parts: [String; 4],
}

impl NamePattern {
    /// Matches every name
    pub fn any() -> Self {
        Self {
            parts: ["*", "*", "*", "*"].map(String::from),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let raw = split(s)?;
        let mut parts: [String; 4] = Default::default();
        for (slot, (part, value)) in parts.iter_mut().zip(Part::ALL.iter().zip(raw)) {
            *slot = normalize_part(*part, value, true)?;
        }
        Ok(Self { parts })
    }

    /// True if every part of `name` matches
    pub fn matches(&self, name: &Name) -> bool {
        Part::ALL
            .iter()
            .all(|&part| self.matches_part(part, name.part(part)))
    }

    /// Match a single normalized part (used to prune directory walks)
    pub(crate) fn matches_part(&self, part: Part, value: &str) -> bool {
        glob_match(&self.parts[part as usize], value)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [host, namespace, model, tag] = &self.parts;
        write!(f, "{host}/{namespace}/{model}:{tag}")
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamePattern({self})")
    }
}

impl FromStr for NamePattern {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Wildcard match: `*` is any run (including empty), `?` exactly one byte
fn glob_match(pattern: &str, text: &str) -> bool {
    let (p, t) = (pattern.as_bytes(), text.as_bytes());
    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` seen and the text index it is currently absorbing up to
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == b'?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == b'*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, absorbed)) = backtrack {
            pi = star + 1;
            ti = absorbed + 1;
            backtrack = Some((star, absorbed + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&b| b == b'*')
}
