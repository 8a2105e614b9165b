use frappy_datatypes::ValidationError;

/// Crate-wide error type unifying every component's failure surface,
/// modelled directly on the taxonomy in the framework's error-handling
/// design: Protocol / Value / Access / Operational / Config categories,
/// each with a fixed wire "kind" string the dispatcher uses verbatim in
/// `error_<kind>` replies.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SecopError {
    /// Malformed request line or unknown action.
    #[error("protocol error: {0}")]
    ProtocolError(String),
    /// No module with this name is registered on the node.
    #[error("no such module: {0}")]
    NoSuchModule(String),
    /// The module exists but has no parameter with this name.
    #[error("module {module} has no parameter {parameter}")]
    NoSuchParameter {
        /// Offending module name.
        module: String,
        /// Offending parameter name.
        parameter: String,
    },
    /// The module exists but has no command with this name.
    #[error("module {module} has no command {command}")]
    NoSuchCommand {
        /// Offending module name.
        module: String,
        /// Offending command name.
        command: String,
    },
    /// Value failed the parameter's datatype (wrong shape, out of range,
    /// or otherwise invalid).
    #[error("bad value: {0}")]
    BadValue(#[from] ValidationError),
    /// A `change` was sent for a readonly parameter.
    #[error("{module}:{parameter} is readonly")]
    ReadOnly {
        /// Offending module name.
        module: String,
        /// Offending parameter name.
        parameter: String,
    },
    /// The module is administratively disabled.
    #[error("{0} is disabled")]
    Disabled(String),
    /// The requested operation cannot be carried out in the module's
    /// current state (e.g. a command that only makes sense while idle).
    #[error("impossible: {0}")]
    Impossible(String),
    /// The module is busy and cannot accept this request right now.
    #[error("{0} is busy")]
    IsBusy(String),
    /// Communication with the underlying hardware failed. Recoverable;
    /// the poller retries on its own schedule.
    #[error("communication failed: {0}")]
    CommFailed(String),
    /// The underlying hardware itself reported a fault (not a comms
    /// problem — the link is up but the device says no).
    #[error("hardware error: {0}")]
    HardwareError(String),
    /// An internal invariant was violated (e.g. a state machine chained
    /// more transitions than `maxloops` allows in one cycle).
    #[error("internal error: {0}")]
    InternalError(String),
    /// Raised only during node/module construction: bad or missing
    /// configuration.
    #[error("config error: {0}")]
    ConfigError(String),
    /// Raised only at module-class build/registration time: a
    /// programming mistake in the module's declaration, never seen by a
    /// client.
    #[error("programming error: {0}")]
    ProgrammingError(String),
}

impl SecopError {
    /// The fixed wire-protocol kind string for this error — one of the
    /// categories spec §7 enumerates (`NoSuchModule`, `BadValue`,
    /// `CommFailed`, `IsError` for a hardware fault, `Internal` for any
    /// internal/config/programming fault, …). Consumed both by the
    /// dispatcher's `error_<action>` reply detail and by `error_update`'s
    /// detail array, so it is defined once here rather than duplicated at
    /// the wire layer.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SecopError::ProtocolError(_) => "ProtocolError",
            SecopError::NoSuchModule(_) => "NoSuchModule",
            SecopError::NoSuchParameter { .. } => "NoSuchParameter",
            SecopError::NoSuchCommand { .. } => "NoSuchCommand",
            SecopError::BadValue(_) => "BadValue",
            SecopError::ReadOnly { .. } => "ReadOnly",
            SecopError::Disabled(_) => "Disabled",
            SecopError::Impossible(_) => "Impossible",
            SecopError::IsBusy(_) => "IsBusy",
            SecopError::CommFailed(_) => "CommFailed",
            SecopError::HardwareError(_) => "IsError",
            SecopError::InternalError(_) | SecopError::ConfigError(_) | SecopError::ProgrammingError(_) => "Internal",
        }
    }
}

/// Result alias used throughout the core crates.
pub type SecopResult<T> = Result<T, SecopError>;
