//! The node binary's own error type: wraps the boundary failures
//! (reading/parsing a node descriptor, binding a listener) that carry
//! more context than a bare `anyhow::Error`, the way the core crates'
//! `SecopError` does for the protocol layer.

use std::path::PathBuf;

/// Failures that can occur while assembling a node before it ever
/// starts accepting connections.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The descriptor file could not be read at all.
    #[error("could not read node descriptor {path}: {source}")]
    Read {
        /// The path that failed to open.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The descriptor's contents are not valid TOML.
    #[error("could not parse node descriptor {path}: {source}")]
    Parse {
        /// The path whose contents failed to parse.
        path: PathBuf,
        /// The underlying TOML failure.
        #[source]
        source: toml::de::Error,
    },
    /// The descriptor parsed as TOML but doesn't have the shape a node
    /// descriptor requires (e.g. `[modules.*]` is not a table).
    #[error("malformed node descriptor {path}: {message}")]
    Shape {
        /// The path whose shape is wrong.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },
    /// A module's `class` configuration key names no registered factory.
    #[error("module '{module}' names unknown class '{class}'")]
    UnknownClass {
        /// The module name from `[modules.<name>]`.
        module: String,
        /// The offending `class` value.
        class: String,
    },
    /// A module's `class` key is missing entirely.
    #[error("module '{module}' has no 'class' configuration key")]
    MissingClass {
        /// The module name from `[modules.<name>]`.
        module: String,
    },
    /// Module construction itself failed (bad config, failed class
    /// merge, etc).
    #[error("module '{module}' failed to build: {source}")]
    ModuleBuild {
        /// The module name from `[modules.<name>]`.
        module: String,
        /// The underlying construction failure.
        #[source]
        source: frappy_core::SecopError,
    },
    /// The TCP listener could not be bound.
    #[error("could not bind listener on {addr}: {source}")]
    Bind {
        /// The address that failed to bind.
        addr: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}
