//! chdman location and subprocess plumbing shared by the converter and inspector

use std::ffi::OsStr;
use std::io::{BufRead, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::error::{Error, Result};

/// Executable name of the external compressor
pub const TOOL_NAME: &str = "chdman";

/// Directory next to the working directory that may bundle chdman
pub const BUNDLED_TOOL_DIR: &str = "Tools";

/// Resolve the chdman executable used when none is configured
///
/// Prefers a bundled `Tools/chdman` and falls back to `chdman` on `PATH`.
pub fn default_tool_path() -> PathBuf {
    let file_name = if cfg!(windows) {
        format!("{}.exe", TOOL_NAME)
    } else {
        TOOL_NAME.to_string()
    };
    let bundled = Path::new(BUNDLED_TOOL_DIR).join(&file_name);
    if bundled.is_file() {
        bundled
    } else {
        PathBuf::from(file_name)
    }
}

/// Start chdman with piped stdout and stderr and no stdin
pub(crate) fn spawn_tool<I, S>(tool: &Path, args: I) -> Result<Child>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                Error::ToolNotFound(tool.to_path_buf())
            }
            _ => Error::Io(e),
        })
}

/// Line iterator that treats `\r` as a terminator as well as `\n`
///
/// chdman redraws its progress with carriage returns, so a plain
/// `BufRead::lines` would only yield the final update. A `\r\n` pair yields
/// an extra empty line.
pub(crate) struct ToolLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> ToolLines<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for ToolLines<R> {
    type Item = std::io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        loop {
            let available = match self.reader.fill_buf() {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            };

            if available.is_empty() {
                if self.buf.is_empty() {
                    return None;
                }
                return Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()));
            }

            match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(i) => {
                    self.buf.extend_from_slice(&available[..i]);
                    self.reader.consume(i + 1);
                    return Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()));
                }
                None => {
                    let n = available.len();
                    self.buf.extend_from_slice(available);
                    self.reader.consume(n);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(input: &str) -> Vec<String> {
        ToolLines::new(Cursor::new(input.as_bytes().to_vec()))
            .map(|l| l.unwrap())
            .collect()
    }

    #[test]
    fn test_tool_lines_newlines() {
        assert_eq!(collect("a\nb\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_tool_lines_carriage_returns() {
        assert_eq!(
            collect("Compressing, 1.0%\rCompressing, 2.0%\rDone"),
            vec!["Compressing, 1.0%", "Compressing, 2.0%", "Done"]
        );
    }

    #[test]
    fn test_tool_lines_crlf_yields_empty_line() {
        assert_eq!(collect("a\r\nb"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_tool_lines_empty_input() {
        assert!(collect("").is_empty());
    }

    #[test]
    fn test_default_tool_path_names_chdman() {
        let path = default_tool_path();
        assert!(path.to_string_lossy().contains(TOOL_NAME));
    }

    #[test]
    fn test_spawn_missing_tool() {
        let result = spawn_tool(Path::new("/nonexistent/chdman"), ["info"]);
        assert!(matches!(result, Err(Error::ToolNotFound(_))));
    }
}
