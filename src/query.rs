//! # Queries
//!
//! A query is a named callback attached to a module. Other modules can
//! resolve it by name and invoke it to compute a value from the build
//! environment. Environment queries additionally cache their first
//! result, so expensive computations run at most once per build.

use std::cell::RefCell;
use std::fmt;

use crate::env::BuildEnv;
use crate::error::Result;
use crate::option::Value;

/// The callback behind a query node.
pub type QueryFunction = Box<dyn Fn(&BuildEnv) -> Result<Value>>;

/// The state of one query node.
pub struct QueryData {
    function: QueryFunction,
    /// Environment queries evaluate once and replay the cached result.
    environment: bool,
    cached: RefCell<Option<Value>>,
}

impl QueryData {
    pub fn new(function: QueryFunction) -> Self {
        QueryData {
            function,
            environment: false,
            cached: RefCell::new(None),
        }
    }

    /// A query that caches its first result.
    pub fn environment(function: QueryFunction) -> Self {
        QueryData {
            function,
            environment: true,
            cached: RefCell::new(None),
        }
    }

    /// Evaluate the query against the build environment.
    pub fn value(&self, env: &BuildEnv) -> Result<Value> {
        if self.environment {
            if let Some(cached) = self.cached.borrow().as_ref() {
                return Ok(cached.clone());
            }
            let value = (self.function)(env)?;
            *self.cached.borrow_mut() = Some(value.clone());
            return Ok(value);
        }
        (self.function)(env)
    }
}

impl fmt::Debug for QueryData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryData")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}
