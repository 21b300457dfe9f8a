//! # Collectors
//!
//! A collector is a node to which many modules contribute values during
//! the build, for example include paths or compile flags. Each collector
//! wraps exactly one [`OptionKind`] converter for validation and stores
//! the accepted values keyed by a contribution context: the contributing
//! module's fullname plus an optional source file. Per-contributor
//! insertion order is preserved.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::option::{OptionKind, Value};

/// Identifies one contributor to a collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorContext {
    /// Fullname of the contributing module.
    pub module: String,
    /// Source file the contribution originated from, if any.
    pub filename: Option<PathBuf>,
}

impl CollectorContext {
    pub fn new(module: impl Into<String>) -> Self {
        CollectorContext {
            module: module.into(),
            filename: None,
        }
    }

    pub fn with_file(module: impl Into<String>, filename: impl Into<PathBuf>) -> Self {
        CollectorContext {
            module: module.into(),
            filename: Some(filename.into()),
        }
    }

    /// The repository part of the contributing module's fullname.
    pub fn repository(&self) -> &str {
        self.module.split(':').next().unwrap_or(&self.module)
    }
}

/// The state of one collector node.
#[derive(Debug)]
pub struct CollectorData {
    pub kind: OptionKind,
    values: Vec<(CollectorContext, Vec<Value>)>,
}

impl CollectorData {
    pub fn new(kind: OptionKind) -> Self {
        CollectorData {
            kind,
            values: Vec::new(),
        }
    }

    /// Validate and record values under the given context.
    ///
    /// Every value passes through the wrapped converter before anything
    /// is recorded: a single bad value fails the whole call and leaves
    /// the collector unchanged.
    pub fn add_values(
        &mut self,
        collector: &str,
        raw_values: &[String],
        context: CollectorContext,
    ) -> Result<()> {
        let mut checked = Vec::with_capacity(raw_values.len());
        for raw in raw_values {
            let value = self
                .kind
                .convert(collector, raw)
                .map_err(|error| Error::Collect {
                    collector: collector.to_string(),
                    message: error.to_string(),
                })?;
            checked.push(value);
        }

        match self.values.iter_mut().find(|(c, _)| *c == context) {
            Some((_, existing)) => existing.extend(checked),
            None => self.values.push((context, checked)),
        }
        Ok(())
    }

    /// Flatten all contributions, optionally filtered by context.
    ///
    /// With `unique` the result is deduplicated while preserving
    /// first-seen order. When nothing was contributed (or everything was
    /// filtered out), `default` is returned instead. Never mutates the
    /// collector.
    pub fn values(
        &self,
        default: Option<&[Value]>,
        filter: Option<&dyn Fn(&CollectorContext) -> bool>,
        unique: bool,
    ) -> Vec<Value> {
        let mut values = Vec::new();
        for (context, contribution) in &self.values {
            if filter.map_or(true, |f| f(context)) {
                values.extend(contribution.iter().cloned());
            }
        }
        if unique {
            let mut seen = Vec::new();
            for value in values {
                if !seen.contains(&value) {
                    seen.push(value);
                }
            }
            values = seen;
        }
        if values.is_empty() {
            if let Some(default) = default {
                return default.to_vec();
            }
        }
        values
    }

    /// All contribution contexts, in insertion order.
    pub fn contexts(&self) -> impl Iterator<Item = &CollectorContext> {
        self.values.iter().map(|(context, _)| context)
    }
}
