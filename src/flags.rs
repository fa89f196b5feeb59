//! Connection modifier flags.
//!
//! A connection string carries a list of `/`-separated modifiers after the host, such as `ssl`,
//! `novalidate-cert` or `authuser=bob`. [`FlagSet`] keeps those tokens in insertion order and
//! enforces the constraints between them that are described by a [`FlagPolicy`].

use std::fmt;
use std::sync::RwLock;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Result, ValidateError};

/// Tokens that only make sense when secure transport is available.
pub const SECURITY_FLAGS: &[&str] = &["ssl", "validate-cert", "novalidate-cert", "tls", "notls"];

lazy_static! {
    static ref KEY_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").unwrap();
    static ref VALUE_REGEX: Regex = Regex::new(r"^[^/{}\s]+$").unwrap();
    static ref GLOBAL_POLICY: RwLock<FlagPolicy> = RwLock::new(FlagPolicy::default());
}

/// The rules a [`FlagSet`] enforces on every mutation.
///
/// A process-wide policy is read by [`FlagSet::new`] and by
/// [`SessionBuilder`](crate::SessionBuilder). It is meant to be installed once at start-up with
/// [`FlagPolicy::install`]; each `FlagSet` keeps its own copy, so later changes to the global
/// policy do not affect sets that already exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagPolicy {
    secure_enabled: bool,
    exclusive: Vec<(String, String)>,
}

impl Default for FlagPolicy {
    fn default() -> Self {
        FlagPolicy {
            secure_enabled: true,
            exclusive: vec![
                ("validate-cert".to_string(), "novalidate-cert".to_string()),
                ("tls".to_string(), "notls".to_string()),
            ],
        }
    }
}

impl FlagPolicy {
    /// A policy with no exclusive pairs and secure transport enabled.
    pub fn empty() -> Self {
        FlagPolicy {
            secure_enabled: true,
            exclusive: Vec::new(),
        }
    }

    /// A snapshot of the process-wide policy.
    pub fn global() -> Self {
        match GLOBAL_POLICY.read() {
            Ok(policy) => policy.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the process-wide policy.
    pub fn install(policy: FlagPolicy) {
        match GLOBAL_POLICY.write() {
            Ok(mut global) => *global = policy,
            Err(poisoned) => *poisoned.into_inner() = policy,
        }
    }

    /// Enable or disable secure-transport flags.
    ///
    /// With secure transport disabled, attempts to set any of [`SECURITY_FLAGS`] are ignored.
    pub fn secure(mut self, enabled: bool) -> Self {
        self.secure_enabled = enabled;
        self
    }

    /// Declare `a` and `b` mutually exclusive.
    pub fn exclusive(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.exclusive.push((a.into(), b.into()));
        self
    }

    /// Whether secure transport flags are accepted.
    pub fn secure_enabled(&self) -> bool {
        self.secure_enabled
    }

    /// The flag that must be evicted when `flag` is set, if any.
    ///
    /// Only bare keys take part in exclusivity: `tls` evicts `notls` whether or not either carries
    /// a value.
    pub fn partner(&self, flag: &str) -> Option<&str> {
        self.exclusive.iter().find_map(|(a, b)| {
            if a == flag {
                Some(b.as_str())
            } else if b == flag {
                Some(a.as_str())
            } else {
                None
            }
        })
    }

    fn rejects(&self, flag: &str) -> bool {
        !self.secure_enabled && SECURITY_FLAGS.contains(&flag)
    }
}

/// What [`FlagSet::set`] should do with a flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagValue {
    /// Ensure the flag is present as a bare token.
    On,
    /// Remove the flag.
    Off,
    /// Set the flag to `key=value`. An empty value behaves like [`FlagValue::Off`].
    Value(String),
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        if b {
            FlagValue::On
        } else {
            FlagValue::Off
        }
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        FlagValue::Value(s.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(s: String) -> Self {
        FlagValue::Value(s)
    }
}

/// A single connection modifier: either a bare token or a `key=value` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Flag {
    key: String,
    value: Option<String>,
}

impl Flag {
    /// The part before `=`, or the whole token.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The part after `=`, if there is one.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub(crate) fn parse(token: &str) -> Result<Flag> {
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (token, None),
        };
        validate_key(key)?;
        if let Some(v) = value {
            validate_value(key, v)?;
        }
        Ok(Flag {
            key: key.to_string(),
            value: value.map(str::to_string),
        })
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(ref v) => write!(f, "{}={}", self.key, v),
            None => write!(f, "{}", self.key),
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if KEY_REGEX.is_match(key) {
        Ok(())
    } else {
        Err(ValidateError::Flag(key.to_string()).into())
    }
}

fn validate_value(key: &str, value: &str) -> Result<()> {
    if VALUE_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidateError::Flag(format!("{}={}", key, value)).into())
    }
}

/// The ordered set of modifiers for one connection.
///
/// Invariants, enforced on every call to [`FlagSet::set`]:
///
///  - at most one member of each exclusive pair of the policy is present;
///  - each key appears at most once, bare or with a value;
///  - security flags are never stored while the policy disables secure transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagSet {
    flags: Vec<Flag>,
    policy: FlagPolicy,
}

impl Default for FlagSet {
    fn default() -> Self {
        FlagSet::new()
    }
}

impl FlagSet {
    /// An empty set governed by the process-wide policy.
    pub fn new() -> Self {
        FlagSet::with_policy(FlagPolicy::global())
    }

    /// An empty set governed by `policy`.
    pub fn with_policy(policy: FlagPolicy) -> Self {
        FlagSet {
            flags: Vec::new(),
            policy,
        }
    }

    /// The policy this set enforces.
    pub fn policy(&self) -> &FlagPolicy {
        &self.policy
    }

    /// Add, replace or remove `flag`.
    ///
    /// ```
    /// # use mailsession::{FlagSet, FlagValue};
    /// # fn main() -> mailsession::Result<()> {
    /// let mut flags = FlagSet::new();
    /// flags.set("tls", FlagValue::On)?;
    /// flags.set("notls", FlagValue::On)?;
    /// flags.set("authuser", "bob")?;
    /// assert_eq!(flags.to_string(), "/notls/authuser=bob");
    /// # Ok(())
    /// # }
    /// ```
    pub fn set(&mut self, flag: &str, value: impl Into<FlagValue>) -> Result<()> {
        let value = value.into();
        if self.policy.rejects(flag) {
            tracing::debug!(flag, "secure transport disabled, ignoring flag");
            return Ok(());
        }
        validate_key(flag)?;
        if let FlagValue::Value(ref v) = value {
            if !v.is_empty() {
                validate_value(flag, v)?;
            }
        }

        if let Some(partner) = self.policy.partner(flag) {
            let partner = partner.to_string();
            self.flags.retain(|f| f.key != partner);
        }

        let existing = self.position(flag);
        match value {
            FlagValue::Off => self.flags.retain(|f| f.key != flag),
            FlagValue::Value(ref v) if v.is_empty() => self.flags.retain(|f| f.key != flag),
            FlagValue::Value(v) => {
                let entry = Flag {
                    key: flag.to_string(),
                    value: Some(v),
                };
                match existing {
                    Some(i) => self.flags[i] = entry,
                    None => self.flags.push(entry),
                }
            }
            FlagValue::On => match existing {
                Some(i) => self.flags[i].value = None,
                None => self.flags.push(Flag {
                    key: flag.to_string(),
                    value: None,
                }),
            },
        }
        Ok(())
    }

    /// Remove `flag`, whether bare or with a value.
    pub fn remove(&mut self, flag: &str) -> Result<()> {
        self.set(flag, FlagValue::Off)
    }

    /// Remove `flag` if present, otherwise add it as a bare token.
    pub fn toggle(&mut self, flag: &str) -> Result<()> {
        if self.contains(flag) {
            self.remove(flag)
        } else {
            self.set(flag, FlagValue::On)
        }
    }

    /// Add a raw `key` or `key=value` token.
    pub fn insert_token(&mut self, token: &str) -> Result<()> {
        let flag = Flag::parse(token)?;
        match flag.value {
            Some(v) => self.set(&flag.key, FlagValue::Value(v)),
            None => self.set(&flag.key, FlagValue::On),
        }
    }

    /// Whether a flag with this key is present.
    pub fn contains(&self, flag: &str) -> bool {
        self.position(flag).is_some()
    }

    /// The value of `flag`, if it is present with one.
    pub fn value(&self, flag: &str) -> Option<&str> {
        self.position(flag).and_then(|i| self.flags[i].value())
    }

    /// Iterate over the flags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    fn position(&self, flag: &str) -> Option<usize> {
        self.flags.iter().position(|f| f.key == flag)
    }
}

/// Renders each flag as its own `/flag` segment.
impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flag in &self.flags {
            write!(f, "/{}", flag)?;
        }
        Ok(())
    }
}
