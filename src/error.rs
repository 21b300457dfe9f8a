//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! `modbuild` application. It uses the `thiserror` library to create a
//! comprehensive `Error` enum that covers all anticipated failure modes,
//! providing clear and descriptive error messages.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum that represents all possible errors that can
//!   occur within the application. Each variant corresponds to a specific
//!   type of error and includes contextual information to aid in debugging.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`, used
//!   throughout the application to simplify function signatures and ensure
//!   type safety.
//!
//! ## Error Taxonomy
//!
//! The variants fall into a small number of families:
//!
//! - **Configuration**: bad or missing project configuration, no
//!   repositories loaded, no modules selected.
//! - **Construction**: malformed option, query or node definitions
//!   (numeric bounds, duplicate names, invalid enumerations).
//! - **Resolution**: no match, ambiguous match, unresolved dependency.
//! - **Duplicate**: sibling name collisions and overwritten build outputs.
//! - **Descriptor**: errors forwarded out of module/repository callbacks,
//!   wrapped with the originating location.
//! - **Template**: failures of the template renderer.
//!
//! Every variant maps to a process exit code through [`Error::exit_code`],
//! matching the conventions of the command-line surface: `0` success,
//! `1` generic error, `2` argument/aggregate validation error,
//! `3` template error, `4` forwarded descriptor error.

use thiserror::Error;

/// Main error type for modbuild operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error in the project configuration: missing file, no
    /// repositories, no modules selected, malformed entries.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A malformed option, query or node definition.
    #[error("Construction error: {message}")]
    Construction { message: String },

    /// A command-line argument problem outside of clap's own checks.
    #[error("Argument error: {message}")]
    Argument { message: String },

    /// A name query did not match any node in the tree.
    #[error("Cannot resolve '{query}' from '{scope}'{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    NoMatch {
        query: String,
        scope: String,
        /// Optional "did you mean" suggestion
        hint: Option<String>,
    },

    /// A name query matched more than one node.
    #[error("Ambiguous '{query}'! Found: '{}'", candidates.join("', '"))]
    AmbiguousMatch {
        query: String,
        candidates: Vec<String>,
    },

    /// The resolved node exists but is not available in this build.
    #[error("{kind} '{fullname}' is not available!")]
    NotAvailable { kind: String, fullname: String },

    /// The resolved node exists but was not selected by dependency
    /// resolution.
    #[error("{kind} '{fullname}' is not selected!")]
    NotSelected { kind: String, fullname: String },

    /// The resolved node is of a different type than requested.
    #[error("'{fullname}' is of type '{actual}', but searching for '{requested}'!")]
    WrongType {
        fullname: String,
        actual: String,
        requested: String,
    },

    /// A dependency name of a module failed to resolve.
    #[error("Cannot resolve dependency '{query}' of module '{module}':\n{message}")]
    UnresolvedDependency {
        module: String,
        query: String,
        message: String,
    },

    /// A sibling with the same name is already registered.
    #[error("Name '{name}' is already defined in '{parent}'")]
    DuplicateName { name: String, parent: String },

    /// Two modules generated the same output file.
    #[error("Module '{module}' is overwriting file '{path}' previously generated by module '{previous}'!")]
    OverwritingFile {
        module: String,
        path: String,
        previous: String,
    },

    /// An invalid input value for an option.
    #[error("Invalid value '{value}' for option '{option}': {reason}")]
    OptionInput {
        option: String,
        value: String,
        reason: String,
    },

    /// A value rejected while contributing to a collector.
    #[error("Cannot collect value for '{collector}': {message}")]
    Collect { collector: String, message: String },

    /// An error raised inside a module or repository callback, wrapped
    /// with the originating location.
    #[error("Error in '{location}': {message}")]
    Descriptor { location: String, message: String },

    /// An error occurred during template processing.
    #[error("Template error in module '{module}' for '{template}': {message}")]
    Template {
        module: String,
        template: String,
        message: String,
    },

    /// An error raised while running a module's build step.
    #[error("Building module '{module}' failed: {message}")]
    Build { module: String, message: String },

    /// A malformed persisted build log.
    #[error("Build log format error: {message}")]
    BuildLogFormat { message: String },

    /// Multiple validation errors collected across independent modules.
    #[error("Validation failed with {} error(s):\n{}", errors.len(), errors.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Aggregate { errors: Vec<Error> },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Argument { .. } | Error::Aggregate { .. } => 2,
            Error::Template { .. } => 3,
            Error::Descriptor { .. } => 4,
            _ => 1,
        }
    }

    /// Shorthand for a construction error.
    pub fn construction(message: impl Into<String>) -> Self {
        Error::Construction {
            message: message.into(),
        }
    }

    /// Shorthand for a configuration error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: None,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let error = Error::Config {
            message: "No repositories loaded".to_string(),
            hint: None,
        };
        let display = format!("{}", error);
        assert!(display.contains("Configuration error"));
        assert!(display.contains("No repositories loaded"));
    }

    #[test]
    fn test_error_display_config_with_hint() {
        let error = Error::Config {
            message: "Missing repositories".to_string(),
            hint: Some("Add a 'repositories:' list".to_string()),
        };
        let display = format!("{}", error);
        assert!(display.contains("hint:"));
        assert!(display.contains("Add a 'repositories:'"));
    }

    #[test]
    fn test_error_display_ambiguous() {
        let error = Error::AmbiguousMatch {
            query: "uart".to_string(),
            candidates: vec!["repo:a:uart".to_string(), "repo:b:uart".to_string()],
        };
        let display = format!("{}", error);
        assert!(display.contains("Ambiguous 'uart'"));
        assert!(display.contains("repo:a:uart"));
        assert!(display.contains("repo:b:uart"));
    }

    #[test]
    fn test_error_display_overwriting_file() {
        let error = Error::OverwritingFile {
            module: "repo:b".to_string(),
            path: "out.txt".to_string(),
            previous: "repo:a".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("repo:b"));
        assert!(display.contains("out.txt"));
        assert!(display.contains("repo:a"));
    }

    #[test]
    fn test_error_display_aggregate() {
        let error = Error::Aggregate {
            errors: vec![
                Error::construction("first"),
                Error::construction("second"),
            ],
        };
        let display = format!("{}", error);
        assert!(display.contains("2 error(s)"));
        assert!(display.contains("first"));
        assert!(display.contains("second"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::config("x").exit_code(), 1);
        assert_eq!(
            Error::Argument {
                message: "x".to_string()
            }
            .exit_code(),
            2
        );
        assert_eq!(Error::Aggregate { errors: vec![] }.exit_code(), 2);
        assert_eq!(
            Error::Template {
                module: "m".to_string(),
                template: "t".to_string(),
                message: "x".to_string()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            Error::Descriptor {
                location: "m".to_string(),
                message: "x".to_string()
            }
            .exit_code(),
            4
        );
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();
        let display = format!("{}", error);
        assert!(display.contains("I/O error"));
        assert!(display.contains("File not found"));
    }
}
