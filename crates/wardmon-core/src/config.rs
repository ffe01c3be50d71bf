//! Configuration model and file reader
//!
//! Both roles are driven by the same line-oriented configuration format:
//! `[section]` headers followed by `key = value` pairs, with an optional
//! nested `cookie` sub-block per section. The `general` section is reserved
//! for role selection and endpoints; every other section describes a probe
//! target. The parsed form is JSON round-trippable because the monitor
//! ships it to testers over the wire verbatim.
//!
//! # Example
//!
//! ```
//! use wardmon_core::Config;
//!
//! let config = Config::parse(
//!     "[general]\n\
//!      role = tester\n\
//!      monitor = 127.0.0.1:5000\n\
//!      \n\
//!      [gateway]\n\
//!      proto = icmp\n\
//!      dest = 192.168.1.1\n",
//! );
//! assert_eq!(config.general("role"), Some("tester"));
//! assert_eq!(config.get("gateway", "proto"), Some("icmp"));
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, warn};

/// Name of the section reserved for role and endpoint settings
pub const GENERAL_SECTION: &str = "general";

/// A section parameter: a plain string or the nested `cookie` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Block(BTreeMap<String, String>),
}

impl ParamValue {
    /// The string form of this parameter, `None` for a nested block
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(value) => Some(value),
            ParamValue::Block(_) => None,
        }
    }
}

/// Parameters of one configuration section
pub type Section = BTreeMap<String, ParamValue>;

/// Parsed configuration: section name to parameter mapping
///
/// Section names, keys, and values are trimmed and lowercased by the
/// parser. Duplicate keys merge last-writer-wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    sections: BTreeMap<String, Section>,
}

impl Config {
    /// Read and parse a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read config file {:?}: {}", path, e)))?;
        Ok(Self::parse(&contents))
    }

    /// Parse configuration text
    ///
    /// Malformed lines are skipped with a diagnostic rather than failing
    /// the whole file: a parameter line before any section header, a line
    /// whose `=` count is not exactly one, and empty keys or values are
    /// all dropped.
    pub fn parse(input: &str) -> Self {
        let mut sections: BTreeMap<String, Section> = BTreeMap::new();
        let mut current: Option<String> = None;
        let mut cookie: Option<BTreeMap<String, String>> = None;

        for raw in input.lines() {
            let line = raw.trim();

            if line.is_empty() {
                // A blank line closes an open cookie sub-block.
                Self::close_cookie(&mut sections, &current, &mut cookie);
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                Self::close_cookie(&mut sections, &current, &mut cookie);
                let name = line[1..line.len() - 1].trim().to_lowercase();
                debug!("config section [{}]", name);
                current = Some(name);
                continue;
            }

            let Some(section) = current.clone() else {
                error!("expected a [section] header first, found {:?}, skipping", line);
                continue;
            };

            let Some((key, value)) = line.split_once('=').filter(|_| line.matches('=').count() == 1)
            else {
                warn!("expected exactly one '=' in {:?}, skipping", line);
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim().to_lowercase();

            if key == "cookie" {
                cookie = Some(BTreeMap::new());
                continue;
            }
            if key.is_empty() {
                error!("parameter name missing in {:?}, skipping", line);
                continue;
            }
            if value.is_empty() {
                error!("parameter {:?} requires a value, skipping", key);
                continue;
            }

            if let Some(block) = cookie.as_mut() {
                block.insert(key, value);
            } else {
                sections
                    .entry(section)
                    .or_default()
                    .insert(key, ParamValue::Text(value));
            }
        }
        // End of input closes a still-open cookie sub-block.
        Self::close_cookie(&mut sections, &current, &mut cookie);

        Self { sections }
    }

    fn close_cookie(
        sections: &mut BTreeMap<String, Section>,
        current: &Option<String>,
        cookie: &mut Option<BTreeMap<String, String>>,
    ) {
        if let (Some(block), Some(section)) = (cookie.take(), current) {
            sections
                .entry(section.clone())
                .or_default()
                .insert("cookie".to_string(), ParamValue::Block(block));
        }
    }

    /// Overlay this configuration on a remote one; local sections win
    ///
    /// Sections present in both come from `self` wholesale. The monitor
    /// never ships its `general` section, so role and endpoint settings
    /// always stay local.
    pub fn overlay_on(self, remote: Config) -> Config {
        let mut merged = remote;
        merged.sections.extend(self.sections);
        merged
    }

    /// This configuration minus the `general` section, for the wire
    pub fn without_general(&self) -> Config {
        let mut sections = self.sections.clone();
        sections.remove(GENERAL_SECTION);
        Config { sections }
    }

    /// A string parameter from a named section
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key)?.as_str()
    }

    /// A string parameter from the `general` section
    pub fn general(&self, key: &str) -> Option<&str> {
        self.get(GENERAL_SECTION, key)
    }

    /// All sections in name order
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(name, s)| (name.as_str(), s))
    }

    /// Probe-target sections, every section except `general`
    pub fn targets(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections().filter(|(name, _)| *name != GENERAL_SECTION)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
