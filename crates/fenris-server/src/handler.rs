//! Command handling.
//!
//! The secure channel carries [`Request`]s without looking at them. What a
//! command means is decided here, behind the [`CommandHandler`] trait, so the
//! server loop can be reused with any command set (the test harness plugs in
//! a recording handler).

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use fenris_proto::{Request, RequestType, Response};
use tracing::debug;

/// Turns one request into one response.
///
/// Called from connection worker threads, possibly concurrently.
/// Implementations report failures as [`Response::error`] rather than
/// panicking.
pub trait CommandHandler: Send + Sync + 'static {
    /// Execute `request` and produce the reply.
    fn handle(&self, request: &Request) -> Response;
}

/// File service rooted at a directory.
///
/// Every filename is interpreted relative to the root. Absolute paths and
/// `..` components are rejected, so a client can never reach outside it.
#[derive(Debug, Clone)]
pub struct FileService {
    root: PathBuf,
}

impl FileService {
    /// Serve files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory all filenames are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a client filename to a path under the root.
    ///
    /// An empty name resolves to the root itself.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for absolute paths and `..` components
    pub fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let mut path = self.root.clone();

        for component in Path::new(name).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {},
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "path must stay inside the served directory",
                    ));
                },
            }
        }

        Ok(path)
    }

    fn execute(&self, request: &Request) -> io::Result<Response> {
        match request.command {
            RequestType::Ping if request.data.is_empty() => Ok(Response::pong("PONG")),
            RequestType::Ping => Ok(Response::pong(request.data.clone())),
            RequestType::Terminate => Ok(Response::terminated()),
            RequestType::ReadFile => {
                let contents = fs::read(self.resolve_file(&request.filename)?)?;
                Ok(Response::file_content(contents))
            },
            RequestType::WriteFile => {
                fs::write(self.resolve_file(&request.filename)?, &request.data)?;
                Ok(Response::ok())
            },
            RequestType::AppendFile => {
                let mut file =
                    OpenOptions::new().append(true).open(self.resolve_file(&request.filename)?)?;
                file.write_all(&request.data)?;
                Ok(Response::ok())
            },
            RequestType::DeleteFile => {
                fs::remove_file(self.resolve_file(&request.filename)?)?;
                Ok(Response::ok())
            },
            RequestType::InfoFile => {
                let metadata = fs::metadata(self.resolve_file(&request.filename)?)?;
                let kind = if metadata.is_dir() { "dir" } else { "file" };
                Ok(Response::file_info(format!("size={}\nkind={kind}", metadata.len())))
            },
            RequestType::ListDir => {
                let mut entries = Vec::new();
                for entry in fs::read_dir(self.resolve(&request.filename)?)? {
                    let entry = entry?;
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type()?.is_dir() {
                        name.push('/');
                    }
                    entries.push(name);
                }
                entries.sort();
                Ok(Response::dir_listing(&entries))
            },
        }
    }

    /// Like [`FileService::resolve`], but the root itself is not a file.
    fn resolve_file(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.resolve(name)?;

        if path == self.root {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "missing filename"));
        }

        Ok(path)
    }
}

impl CommandHandler for FileService {
    fn handle(&self, request: &Request) -> Response {
        debug!(command = ?request.command, filename = %request.filename, "executing command");

        self.execute(request).unwrap_or_else(|e| {
            debug!(command = ?request.command, filename = %request.filename, error = %e, "command failed");

            if request.filename.is_empty() {
                Response::error(e.to_string())
            } else {
                Response::error(format!("{}: {e}", request.filename))
            }
        })
    }
}
