//! # Typed Option Values
//!
//! Options are leaf nodes of the namespace tree that hold a single typed,
//! validated value. Every option keeps two representations:
//!
//! - the **input**: the raw, user-supplied string, as it appeared in the
//!   project configuration or on the command line, and
//! - the **output**: the converted value produced by the option's
//!   [`OptionKind`] converter.
//!
//! An option whose output is `None` is "required but unset": repository
//! options must all be set before modules can be prepared.
//!
//! Conversion never clamps or silently drops data. A raw value outside the
//! numeric bounds, outside the enumeration's key set, or rejected by the
//! type converter fails with [`Error::OptionInput`] naming the offending
//! value and the reason.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// A converted option value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    Path(PathBuf),
    /// Produced by set options: deduplicated, order-preserving.
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Path(p) => write!(f, "{}", p.display()),
            Value::List(values) => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
        }
    }
}

impl Value {
    /// The value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }
}

/// The converter attached to an option or collector.
///
/// The kind defines how raw inputs are parsed and which inputs are legal.
#[derive(Debug, Clone)]
pub enum OptionKind {
    /// Any string.
    String,
    /// A filesystem path.
    Path {
        /// Relative inputs are joined onto this base (usually the
        /// directory of the descriptor file that declared the option).
        relocate: Option<PathBuf>,
        /// When set, the converted path must stay inside this directory.
        contain: Option<PathBuf>,
    },
    /// Case-insensitive truthy/falsy strings.
    Boolean,
    /// Integer with optional inclusive bounds.
    Numeric { minimum: Option<i64>, maximum: Option<i64> },
    /// A fixed, ordered set of string keys mapping to values.
    Enumeration { entries: Vec<(String, Value)> },
    /// A comma-separated, deduplicated, order-preserving list of the
    /// wrapped kind.
    Set(Box<OptionKind>),
}

impl OptionKind {
    /// Numeric kind; fails if `minimum >= maximum`.
    pub fn numeric(minimum: Option<i64>, maximum: Option<i64>) -> Result<Self> {
        if let (Some(min), Some(max)) = (minimum, maximum) {
            if min >= max {
                return Err(Error::construction(format!(
                    "Minimum '{min}' must be smaller than maximum '{max}'!"
                )));
            }
        }
        Ok(OptionKind::Numeric { minimum, maximum })
    }

    /// Enumeration where every entry maps to its own name.
    pub fn enumeration_from_values(values: Vec<String>) -> Result<Self> {
        let unique: BTreeSet<&String> = values.iter().collect();
        if unique.len() != values.len() {
            return Err(Error::construction(
                "Enumeration values must be unique!".to_string(),
            ));
        }
        let entries = values
            .into_iter()
            .map(|v| (v.clone(), Value::Str(v)))
            .collect();
        Ok(OptionKind::Enumeration { entries })
    }

    /// Enumeration from explicit string-keyed entries.
    pub fn enumeration_from_entries(entries: Vec<(String, Value)>) -> Result<Self> {
        let unique: BTreeSet<&String> = entries.iter().map(|(k, _)| k).collect();
        if unique.len() != entries.len() {
            return Err(Error::construction(
                "Enumeration keys must be unique!".to_string(),
            ));
        }
        Ok(OptionKind::Enumeration { entries })
    }

    /// Set kind wrapping any non-set kind.
    pub fn set(inner: OptionKind) -> Result<Self> {
        if matches!(inner, OptionKind::Set(_)) {
            return Err(Error::construction(
                "Set options cannot be nested!".to_string(),
            ));
        }
        Ok(OptionKind::Set(Box::new(inner)))
    }

    /// Human-readable kind name, used in listings and error messages.
    pub fn class_name(&self) -> &'static str {
        match self {
            OptionKind::String => "String",
            OptionKind::Path { .. } => "Path",
            OptionKind::Boolean => "Boolean",
            OptionKind::Numeric { .. } => "Numeric",
            OptionKind::Enumeration { .. } => "Enumeration",
            OptionKind::Set(_) => "Set",
        }
    }

    /// Legal inputs for this kind, used by `discover-options`.
    pub fn format_values(&self) -> String {
        match self {
            OptionKind::String => "String".to_string(),
            OptionKind::Path { .. } => "Path".to_string(),
            OptionKind::Boolean => "True, False".to_string(),
            OptionKind::Numeric { minimum, maximum } => format!(
                "{} ... {}",
                minimum.map_or("-Inf".to_string(), |m| m.to_string()),
                maximum.map_or("+Inf".to_string(), |m| m.to_string()),
            ),
            OptionKind::Enumeration { entries } => {
                let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
                keys.join(", ")
            }
            OptionKind::Set(inner) => format!("Set of {}", inner.format_values()),
        }
    }

    /// Convert and validate a raw input.
    ///
    /// `option` is the fullname used in error messages.
    pub fn convert(&self, option: &str, raw: &str) -> Result<Value> {
        let fail = |reason: String| Error::OptionInput {
            option: option.to_string(),
            value: raw.to_string(),
            reason,
        };

        match self {
            OptionKind::String => Ok(Value::Str(raw.to_string())),

            OptionKind::Path { relocate, contain } => {
                let mut path = PathBuf::from(raw.trim());
                if path.as_os_str().is_empty() {
                    return Err(fail("path must not be empty".to_string()));
                }
                if path.is_relative() {
                    if let Some(base) = relocate {
                        path = base.join(path);
                    }
                }
                let path = normalize(&path);
                if let Some(root) = contain {
                    if !path.starts_with(normalize(root)) {
                        return Err(fail(format!(
                            "path must stay inside '{}'",
                            root.display()
                        )));
                    }
                }
                Ok(Value::Path(path))
            }

            OptionKind::Boolean => match raw.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(fail("value must be boolean".to_string())),
            },

            OptionKind::Numeric { minimum, maximum } => {
                let number = parse_int(raw.trim())
                    .ok_or_else(|| fail("value must be numeric".to_string()))?;
                if let Some(min) = minimum {
                    if number < *min {
                        return Err(fail(format!("value must be greater than '{min}'")));
                    }
                }
                if let Some(max) = maximum {
                    if number > *max {
                        return Err(fail(format!("value must be smaller than '{max}'")));
                    }
                }
                Ok(Value::Int(number))
            }

            OptionKind::Enumeration { entries } => {
                let key = raw.trim();
                entries
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        let keys: Vec<&str> =
                            entries.iter().map(|(k, _)| k.as_str()).collect();
                        fail(format!(
                            "value not found in enumeration. Possible values are: '{}'",
                            keys.join("', '")
                        ))
                    })
            }

            OptionKind::Set(inner) => {
                let mut values = Vec::new();
                for part in raw.split(',') {
                    let converted = inner.convert(option, part.trim())?;
                    // deduplicate, keep first-seen order
                    if !values.contains(&converted) {
                        values.push(converted);
                    }
                }
                Ok(Value::List(values))
            }
        }
    }
}

/// Parse an integer literal; accepts 0x/0o/0b prefixes and a sign.
fn parse_int(raw: &str) -> Option<i64> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()?
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

/// Lexically normalize a path: resolve `.` and `..` without touching the
/// filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Callback extracting additional dependency names from an assigned
/// option input. This is the only way option values feed back into
/// dependency resolution.
pub struct DependencyHandler(pub Box<dyn Fn(&str) -> Vec<String>>);

impl fmt::Debug for DependencyHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DependencyHandler")
    }
}

/// The state of one option node.
#[derive(Debug)]
pub struct OptionData {
    pub kind: OptionKind,
    /// Raw user-supplied representation, `None` until assigned.
    pub input: Option<String>,
    /// Converted representation, `None` means "required but unset".
    pub output: Option<Value>,
    /// Pre-set input used by [`OptionData::is_default`].
    pub default: Option<String>,
    pub dependency_handler: Option<DependencyHandler>,
}

impl OptionData {
    /// A new, unset option of the given kind.
    pub fn new(kind: OptionKind) -> Self {
        OptionData {
            kind,
            input: None,
            output: None,
            default: None,
            dependency_handler: None,
        }
    }

    /// Pre-set the default input. The default passes through the same
    /// converter as any other assignment.
    pub fn with_default(mut self, option: &str, default: &str) -> Result<Self> {
        let output = self.kind.convert(option, default)?;
        self.input = Some(default.to_string());
        self.output = Some(output);
        self.default = Some(default.to_string());
        Ok(self)
    }

    pub fn with_dependency_handler(mut self, handler: DependencyHandler) -> Self {
        self.dependency_handler = Some(handler);
        self
    }

    /// Assign a raw value. Returns the dependency names extracted by the
    /// handler, if any; the caller appends them to the owning module.
    pub fn set(&mut self, option: &str, raw: &str) -> Result<Vec<String>> {
        let output = self.kind.convert(option, raw)?;
        self.input = Some(raw.to_string());
        self.output = Some(output);
        Ok(self
            .dependency_handler
            .as_ref()
            .map(|handler| (handler.0)(raw))
            .unwrap_or_default())
    }

    /// The converted value, if assigned or defaulted.
    pub fn value(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    /// Whether the option still holds its default input.
    pub fn is_default(&self) -> bool {
        self.input == self.default
    }

    /// The raw input rendered for listings; empty inputs render as `""`.
    pub fn format_value(&self) -> String {
        match &self.input {
            Some(input) if !input.trim().is_empty() => input.trim().to_string(),
            Some(_) => "\"\"".to_string(),
            None => "REQUIRED".to_string(),
        }
    }
}
