//! Line-oriented command scripts for driving a store
//!
//! One command per line, `#` starts a comment:
//!
//! ```text
//! request 1024
//! open data
//! write data 0 512 0xDD
//! close data
//! expect-remaining 512
//! ```

pub mod scenarios;

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{FileHandle, QuotaFileStore};

pub use scenarios::{Scenario, SCENARIOS};

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: {source}")]
    Store {
        line: usize,
        #[source]
        source: StoreError,
    },

    #[error("line {line}: {message}")]
    Failed { line: usize, message: String },
}

/// A parsed script command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Request(u64),
    Release(u64),
    Remaining,
    Snapshot,
    Open(String),
    Close(String),
    Flush(String),
    Length(String),
    SetLength(String, u64),
    Write {
        name: String,
        offset: u64,
        count: usize,
        byte: u8,
    },
    Read {
        name: String,
        offset: u64,
        count: usize,
    },
    Delete(String),
    Rename(String, String),
    List,
    ExpectRemaining(u64),
    ExpectLength(String, u64),
    ExpectFiles(Vec<String>),
    ExpectRead {
        name: String,
        offset: u64,
        count: usize,
        byte: u8,
    },
    ExpectFail(Box<Command>),
}

/// Parse a whole script into numbered commands
pub fn parse(source: &str) -> Result<Vec<(usize, Command)>, ScriptError> {
    let mut commands = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        let command =
            parse_command(&words).map_err(|message| ScriptError::Parse { line, message })?;
        commands.push((line, command));
    }
    Ok(commands)
}

fn parse_command(words: &[&str]) -> Result<Command, String> {
    let (keyword, args) = match words.split_first() {
        Some(split) => split,
        None => return Err("empty command".to_string()),
    };

    let command = match (*keyword, args) {
        ("request", [n]) => Command::Request(number(n)?),
        ("release", [n]) => Command::Release(number(n)?),
        ("remaining", []) => Command::Remaining,
        ("snapshot", []) => Command::Snapshot,
        ("open", [name]) => Command::Open(name.to_string()),
        ("close", [name]) => Command::Close(name.to_string()),
        ("flush", [name]) => Command::Flush(name.to_string()),
        ("length", [name]) => Command::Length(name.to_string()),
        ("set-length", [name, n]) => Command::SetLength(name.to_string(), number(n)?),
        ("write", [name, offset, count, byte]) => Command::Write {
            name: name.to_string(),
            offset: number(offset)?,
            count: count_arg(count)?,
            byte: byte_arg(byte)?,
        },
        ("read", [name, offset, count]) => Command::Read {
            name: name.to_string(),
            offset: number(offset)?,
            count: count_arg(count)?,
        },
        ("delete", [name]) => Command::Delete(name.to_string()),
        ("rename", [old, new]) => Command::Rename(old.to_string(), new.to_string()),
        ("list", []) => Command::List,
        ("expect-remaining", [n]) => Command::ExpectRemaining(number(n)?),
        ("expect-length", [name, n]) => Command::ExpectLength(name.to_string(), number(n)?),
        ("expect-files", names) => {
            let mut names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
            names.sort();
            Command::ExpectFiles(names)
        }
        ("expect-read", [name, offset, count, byte]) => Command::ExpectRead {
            name: name.to_string(),
            offset: number(offset)?,
            count: count_arg(count)?,
            byte: byte_arg(byte)?,
        },
        ("expect-fail", inner) if !inner.is_empty() && inner[0] != "expect-fail" => {
            Command::ExpectFail(Box::new(parse_command(inner)?))
        }
        _ => return Err(format!("unknown command or wrong arguments: {}", words.join(" "))),
    };
    Ok(command)
}

fn number(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| format!("not a non-negative integer: {}", text))
}

fn count_arg(text: &str) -> Result<usize, String> {
    usize::try_from(number(text)?).map_err(|_| format!("count too large: {}", text))
}

fn byte_arg(text: &str) -> Result<u8, String> {
    u8::try_from(number(text)?).map_err(|_| format!("not a byte value: {}", text))
}

/// Runs scripts against a store, keeping one open handle per file name
pub struct ScriptRunner {
    store: QuotaFileStore,
    handles: HashMap<String, FileHandle>,
    output: Vec<String>,
}

impl ScriptRunner {
    pub fn new(store: QuotaFileStore) -> Self {
        ScriptRunner {
            store,
            handles: HashMap::new(),
            output: Vec::new(),
        }
    }

    pub fn store(&self) -> &QuotaFileStore {
        &self.store
    }

    /// Parse and run a script. Returns the lines it printed.
    ///
    /// Handles still open when the script ends, or fails, are closed.
    pub async fn run(&mut self, source: &str) -> Result<Vec<String>, ScriptError> {
        let commands = parse(source)?;
        let result = self.run_commands(&commands).await;
        self.close_all().await;
        let output = std::mem::take(&mut self.output);
        result.map(|_| output)
    }

    async fn run_commands(&mut self, commands: &[(usize, Command)]) -> Result<(), ScriptError> {
        for (line, command) in commands {
            debug!("Script line {}: {:?}", line, command);
            match self.execute(command).await {
                Ok(()) => {}
                Err(Outcome::Store(source)) => {
                    return Err(ScriptError::Store {
                        line: *line,
                        source,
                    })
                }
                Err(Outcome::Failed(message)) => {
                    return Err(ScriptError::Failed {
                        line: *line,
                        message,
                    })
                }
            }
        }
        Ok(())
    }

    async fn close_all(&mut self) {
        for (name, handle) in self.handles.drain() {
            if let Err(e) = handle.close().await {
                debug!("Closing {} after script: {}", name, e);
            }
        }
    }

    fn handle(&self, name: &str) -> Result<&FileHandle, Outcome> {
        self.handles
            .get(name)
            .ok_or_else(|| Outcome::Failed(format!("{} is not open in this script", name)))
    }

    async fn execute(&mut self, command: &Command) -> Result<(), Outcome> {
        let inner = match command {
            Command::ExpectFail(inner) => inner,
            other => return self.perform(other).await,
        };
        match self.perform(inner).await {
            Err(Outcome::Store(e)) => {
                self.print(format!("failed as expected: {}", e));
                Ok(())
            }
            Err(other) => Err(other),
            Ok(()) => Err(Outcome::Failed(format!(
                "expected {:?} to fail but it succeeded",
                inner
            ))),
        }
    }

    async fn perform(&mut self, command: &Command) -> Result<(), Outcome> {
        match command {
            Command::Request(amount) => {
                let remaining = self.store.request_capacity(*amount).await?;
                self.print(format!("request {} -> {} remaining", amount, remaining));
            }
            Command::Release(amount) => {
                let remaining = self.store.release_capacity(*amount).await?;
                self.print(format!("release {} -> {} remaining", amount, remaining));
            }
            Command::Remaining => {
                let remaining = self.store.get_remaining_capacity().await;
                self.print(format!("remaining {}", remaining));
            }
            Command::Snapshot => {
                let snapshot = self.store.capacity_snapshot().await;
                let json = serde_json::to_string(&snapshot)
                    .map_err(|e| Outcome::Failed(e.to_string()))?;
                self.print(json);
            }
            Command::Open(name) => {
                if self.handles.contains_key(name) {
                    return Err(Outcome::Failed(format!("{} is already open", name)));
                }
                let handle = self.store.open(name).await?;
                self.handles.insert(name.clone(), handle);
                self.print(format!("open {}", name));
            }
            Command::Close(name) => {
                let handle = self
                    .handles
                    .remove(name)
                    .ok_or_else(|| Outcome::Failed(format!("{} is not open in this script", name)))?;
                handle.close().await?;
                self.print(format!("close {}", name));
            }
            Command::Flush(name) => {
                self.handle(name)?.flush().await?;
                self.print(format!("flush {}", name));
            }
            Command::Length(name) => {
                let length = self.handle(name)?.get_length().await?;
                self.print(format!("length {} = {}", name, length));
            }
            Command::SetLength(name, length) => {
                self.handle(name)?.set_length(*length).await?;
                self.print(format!("set-length {} {}", name, length));
            }
            Command::Write {
                name,
                offset,
                count,
                byte,
            } => {
                let result = self
                    .handle(name)?
                    .write(vec![*byte; *count], *offset)
                    .await?;
                self.print(format!(
                    "write {} @{} -> {} bytes",
                    name, offset, result.written_bytes
                ));
            }
            Command::Read {
                name,
                offset,
                count,
            } => {
                let result = self.handle(name)?.read(vec![0; *count], *offset).await?;
                self.print(format!(
                    "read {} @{} -> {} bytes {}",
                    name,
                    offset,
                    result.read_bytes,
                    hex_preview(&result.buffer[..result.read_bytes])
                ));
            }
            Command::Delete(name) => {
                self.store.delete(name).await?;
                self.print(format!("delete {}", name));
            }
            Command::Rename(old, new) => {
                self.store.rename(old, new).await?;
                self.print(format!("rename {} -> {}", old, new));
            }
            Command::List => {
                let names = self.store.get_all().await;
                self.print(format!("files [{}]", names.join(", ")));
            }
            Command::ExpectRemaining(expected) => {
                let actual = self.store.get_remaining_capacity().await;
                expect_eq("remaining capacity", expected, &actual)?;
            }
            Command::ExpectLength(name, expected) => {
                let actual = self.handle(name)?.get_length().await?;
                expect_eq("length", expected, &actual)?;
            }
            Command::ExpectFiles(expected) => {
                let actual = self.store.get_all().await;
                expect_eq("files", expected, &actual)?;
            }
            Command::ExpectRead {
                name,
                offset,
                count,
                byte,
            } => {
                let result = self.handle(name)?.read(vec![0; *count], *offset).await?;
                expect_eq("bytes read", count, &result.read_bytes)?;
                if let Some(position) = result.buffer.iter().position(|b| b != byte) {
                    return Err(Outcome::Failed(format!(
                        "byte at offset {} is {:#04x}, expected {:#04x}",
                        *offset + position as u64,
                        result.buffer[position],
                        byte
                    )));
                }
            }
            Command::ExpectFail(_) => {
                return Err(Outcome::Failed("expect-fail cannot be nested".to_string()))
            }
        }
        Ok(())
    }

    fn print(&mut self, line: String) {
        self.output.push(line);
    }
}

/// Why a single command did not complete
enum Outcome {
    Store(StoreError),
    Failed(String),
}

impl From<StoreError> for Outcome {
    fn from(e: StoreError) -> Self {
        Outcome::Store(e)
    }
}

fn expect_eq<T: PartialEq + std::fmt::Debug>(
    what: &str,
    expected: &T,
    actual: &T,
) -> Result<(), Outcome> {
    if expected == actual {
        Ok(())
    } else {
        Err(Outcome::Failed(format!(
            "expected {} {:?}, got {:?}",
            what, expected, actual
        )))
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    const PREVIEW: usize = 16;
    let mut text: String = bytes
        .iter()
        .take(PREVIEW)
        .map(|b| format!("{:02x}", b))
        .collect();
    if bytes.len() > PREVIEW {
        text.push_str("..");
    }
    text
}
