use std::fmt::{Debug, Display};
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

pub struct Error {
    kind: ErrorKind,
}

pub enum ErrorKind {
    /// The semaphore or the backing segment could not be created or attached.
    Init(io::Error),
    /// An acquire or release failed mid-run; the primitive can no longer be trusted.
    Sync(io::Error),
    /// A participant context could not be started.
    Spawn(io::Error),
    /// Detach or destroy failed after the participants completed.
    Teardown(io::Error),
    Size(usize),
    Alignment(usize),
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn init(err: impl Into<io::Error>) -> Self {
        Error::new(ErrorKind::Init(err.into()))
    }

    pub fn sync(err: impl Into<io::Error>) -> Self {
        Error::new(ErrorKind::Sync(err.into()))
    }

    pub fn spawn(err: impl Into<io::Error>) -> Self {
        Error::new(ErrorKind::Spawn(err.into()))
    }

    pub fn teardown(err: impl Into<io::Error>) -> Self {
        Error::new(ErrorKind::Teardown(err.into()))
    }
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match &self.kind {
            ErrorKind::Init(err) => format!("initialization failed: {}", err),
            ErrorKind::Sync(err) => format!("semaphore operation failed: {}", err),
            ErrorKind::Spawn(err) => format!("participant could not be started: {}", err),
            ErrorKind::Teardown(err) => format!("teardown failed: {}", err),
            ErrorKind::Size(size) => format!(
                "size of object must be less than or equal to {} bytes",
                size
            ),
            ErrorKind::Alignment(align) => {
                format!("alignment of object must have an alignment of {}", align)
            }
        };
        write!(f, "{}", msg)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
