use thiserror::Error;

use crate::keyspace_id::KeyspaceId;

/// Convenience alias for `Result<T, GateError>`.
pub type GateResult<T> = Result<T, GateError>;

/// Error classification for escalation decisions.
///
/// - `UserError`       : malformed request: bad bind variables, unmappable values
/// - `Misconfiguration`: topology or vschema disagrees with itself
/// - `Consistency`     : lookup verification failed, conflicting insert ids
/// - `Transient`       : timeout, cancellation, shard transport failure
/// - `InternalBug`     : planner contract violated; should never happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Misconfiguration,
    Consistency,
    Transient,
    InternalBug,
}

/// Top-level error type that all router errors convert into.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Bind variable error: {0}")]
    BindVar(#[from] BindVarError),

    /// Failure reported by the shard executor for one target shard.
    #[error("Shard {keyspace}/{shard}: {message}")]
    Executor {
        keyspace: String,
        shard: String,
        message: String,
    },

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Timeout after {timeout_ms}ms: {reason}")]
    Timeout { reason: String, timeout_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// An error annotated with the operation that surfaced it.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<GateError>,
    },
}

/// A value could not be turned into a keyspace id where one is required.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("value must be supplied for column {column}")]
    ValueNotSupplied { column: String },

    #[error("could not map {value} to a keyspace id")]
    Unmapped { value: String },

    #[error("could not compute value for column {column}")]
    NotReversible { column: String },

    #[error("vindex {vindex} cannot map value {value}: {reason}")]
    InvalidValue {
        vindex: String,
        value: String,
        reason: String,
    },

    #[error("vindex {vindex}: {reason}")]
    Lookup { vindex: String, reason: String },
}

/// Keyspace or shard data is missing or inconsistent.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("keyspace {0} not found")]
    KeyspaceNotFound(String),

    #[error("keyspace {0} has no shards")]
    NoShards(String),

    #[error("unsharded keyspace {keyspace} has multiple shards ({count})")]
    UnshardedMultipleShards { keyspace: String, count: usize },

    #[error("keyspace id {ksid} didn't match any shards in {keyspace}")]
    NoShardForKeyspaceId { keyspace: String, ksid: KeyspaceId },

    #[error("invalid key range for shard {shard}: {reason}")]
    InvalidKeyRange { shard: String, reason: String },
}

/// Derived data disagrees with the data it was derived from.
#[derive(Error, Debug)]
pub enum ConsistencyError {
    #[error("value {value} for column {column} does not map to keyspace id {ksid}")]
    VerifyFailed {
        value: String,
        column: String,
        ksid: KeyspaceId,
    },

    #[error("sequence and db generated a value each for insert")]
    DualInsertId,

    #[error("pre-image row {row} has {got} columns, owned vindexes need {expected}")]
    PreImageShape {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("sequence query returned no value: {0}")]
    SequenceEmpty(String),
}

/// The route handed over by the planner cannot be executed as requested.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("unsupported query route: {0}")]
    UnsupportedOpcode(String),

    #[error("query {0:?} cannot be used for streaming")]
    NotStreamable(String),

    #[error("vindex {vindex} does not support {capability}")]
    MissingCapability { vindex: String, capability: String },

    #[error("malformed route: {0}")]
    Malformed(String),
}

/// Bind variables missing or of the wrong shape.
#[derive(Error, Debug)]
pub enum BindVarError {
    #[error("could not find bind var :{0}")]
    Missing(String),

    #[error("expecting list for bind var ::{name}: {got}")]
    NotAList { name: String, got: String },
}

// ── GateError classification & helpers ────────────────────────────────────────

impl GateError {
    /// Classify this error for escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::Mapping(_) => ErrorKind::UserError,
            GateError::BindVar(_) => ErrorKind::UserError,
            GateError::Topology(_) => ErrorKind::Misconfiguration,
            GateError::Config(_) => ErrorKind::Misconfiguration,
            GateError::Consistency(_) => ErrorKind::Consistency,
            GateError::Executor { .. } => ErrorKind::Transient,
            GateError::Cancelled(_) => ErrorKind::Transient,
            GateError::Timeout { .. } => ErrorKind::Transient,
            GateError::Plan(_) => ErrorKind::InternalBug,
            GateError::Internal(_) => ErrorKind::InternalBug,
            GateError::Context { source, .. } => source.kind(),
        }
    }

    /// Returns true if this is a user/input error.
    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    /// Returns true if this error reports disagreeing derived data.
    pub fn is_consistency(&self) -> bool {
        matches!(self.kind(), ErrorKind::Consistency)
    }

    /// Returns true if the failure came from the transport or the clock.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// The innermost error, with every `Context` layer peeled off.
    pub fn root(&self) -> &GateError {
        match self {
            GateError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Chain of operation names from outermost to innermost.
    pub fn context_chain(&self) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut cur = self;
        while let GateError::Context { context, source } = cur {
            chain.push(context.as_str());
            cur = source;
        }
        chain
    }

    /// Wrap this error with the name of the operation that surfaced it,
    /// **preserving error classification**.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        GateError::Context {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    pub fn executor(
        keyspace: impl Into<String>,
        shard: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        GateError::Executor {
            keyspace: keyspace.into(),
            shard: shard.into(),
            message: message.into(),
        }
    }
}

/// Extension trait for tagging `GateResult`s with an operation name.
pub trait ResultExt<T> {
    fn op_context(self, op: &str) -> GateResult<T>;
}

impl<T> ResultExt<T> for GateResult<T> {
    fn op_context(self, op: &str) -> GateResult<T> {
        self.map_err(|e| e.with_context(op))
    }
}
