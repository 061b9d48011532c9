//! Typed commands and results.
//!
//! These are the application messages carried inside encrypted frames. The
//! channel itself treats them as opaque; only the command handler on the
//! server and the caller on the client look at their fields.

use serde::{Deserialize, Serialize};

/// Command requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    /// Liveness check
    Ping,
    /// Read a whole file
    ReadFile,
    /// Create or truncate a file with the given contents
    WriteFile,
    /// Append to an existing file
    AppendFile,
    /// Remove a file
    DeleteFile,
    /// File size and type
    InfoFile,
    /// List directory entries
    ListDir,
    /// Ask the server to close the connection after replying
    Terminate,
}

/// Kind of result returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseType {
    /// Reply to [`RequestType::Ping`]
    Pong,
    /// File contents in `data`
    FileContent,
    /// File metadata in `data`
    FileInfo,
    /// Newline-separated directory entries in `data`
    DirListing,
    /// Command succeeded with no data
    Success,
    /// Reply to [`RequestType::Terminate`]
    Terminated,
    /// Command failed, message in `data`
    Error,
}

/// A client command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Which command to run
    pub command: RequestType,
    /// Target path, relative to the server root (empty if unused)
    #[serde(default)]
    pub filename: String,
    /// Command argument (ping data, file contents to write)
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Request {
    /// Create a request with no filename or data.
    pub fn new(command: RequestType) -> Self {
        Self { command, filename: String::new(), data: Vec::new() }
    }

    /// PING carrying opaque data.
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), ..Self::new(RequestType::Ping) }
    }

    /// READ_FILE for `filename`.
    pub fn read_file(filename: impl Into<String>) -> Self {
        Self { filename: filename.into(), ..Self::new(RequestType::ReadFile) }
    }

    /// WRITE_FILE replacing `filename` with `data`.
    pub fn write_file(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { filename: filename.into(), data: data.into(), ..Self::new(RequestType::WriteFile) }
    }

    /// APPEND_FILE adding `data` to the end of `filename`.
    pub fn append_file(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { filename: filename.into(), data: data.into(), ..Self::new(RequestType::AppendFile) }
    }

    /// DELETE_FILE for `filename`.
    pub fn delete_file(filename: impl Into<String>) -> Self {
        Self { filename: filename.into(), ..Self::new(RequestType::DeleteFile) }
    }

    /// INFO_FILE for `filename`.
    pub fn info_file(filename: impl Into<String>) -> Self {
        Self { filename: filename.into(), ..Self::new(RequestType::InfoFile) }
    }

    /// LIST_DIR for directory `path` (empty for the root).
    pub fn list_dir(path: impl Into<String>) -> Self {
        Self { filename: path.into(), ..Self::new(RequestType::ListDir) }
    }

    /// TERMINATE.
    pub fn terminate() -> Self {
        Self::new(RequestType::Terminate)
    }

    /// True if this request asks the peer to close the connection once the
    /// reply has been sent.
    pub fn is_terminate(&self) -> bool {
        self.command == RequestType::Terminate
    }
}

/// A server result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the command succeeded
    pub success: bool,
    /// Kind of result
    #[serde(rename = "type")]
    pub kind: ResponseType,
    /// Result payload
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Response {
    /// Successful response of `kind` carrying `data`.
    pub fn new(kind: ResponseType, data: impl Into<Vec<u8>>) -> Self {
        Self { success: true, kind, data: data.into() }
    }

    /// PONG carrying `data`.
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ResponseType::Pong, data)
    }

    /// FILE_CONTENT carrying the file bytes.
    pub fn file_content(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ResponseType::FileContent, data)
    }

    /// FILE_INFO carrying a `key=value` description.
    pub fn file_info(info: impl Into<String>) -> Self {
        let info: String = info.into();
        Self::new(ResponseType::FileInfo, info)
    }

    /// DIR_LISTING carrying one entry per line.
    pub fn dir_listing(entries: &[String]) -> Self {
        Self::new(ResponseType::DirListing, entries.join("\n"))
    }

    /// SUCCESS with no data.
    pub fn ok() -> Self {
        Self::new(ResponseType::Success, Vec::new())
    }

    /// TERMINATED acknowledgement.
    pub fn terminated() -> Self {
        Self::new(ResponseType::Terminated, Vec::new())
    }

    /// Failed response with a human-readable reason.
    pub fn error(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self { success: false, kind: ResponseType::Error, data: message.into_bytes() }
    }
}
