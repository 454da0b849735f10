use arrow_schema::ArrowError;
use lancedb_native_sys::LoadError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("connection is closed")]
    ConnectionClosed,

    #[error("table is closed")]
    TableClosed,

    /// The engine reported failure; `message` is its text or "unknown error".
    #[error("failed to {op}: {message}")]
    Native { op: String, message: String },

    #[error("failed to {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to {context}: {source}")]
    Arrow {
        context: &'static str,
        #[source]
        source: ArrowError,
    },

    #[error("{0}")]
    FieldNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported Arrow type: {0}")]
    UnsupportedType(String),

    #[error("received null {0} from native engine")]
    NullOutput(&'static str),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("query task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn json(context: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| Self::Json { context, source }
    }

    pub(crate) fn arrow(context: &'static str) -> impl FnOnce(ArrowError) -> Self {
        move |source| Self::Arrow { context, source }
    }

    /// True for the two "operation on a closed handle" variants.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::TableClosed)
    }
}
