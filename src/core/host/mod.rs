// Host driver interface for Exliar VFIO
//
// Every component reaches sysfs, /dev and subprocesses only through the
// HostInterface trait, so the pipeline can run against the live system,
// a re-rooted directory tree, or an in-memory fake.

#[cfg(test)]
pub mod memory;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

#[cfg(test)]
pub use memory::MemoryHost;

/// A single directory entry as seen by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_symlink: bool,
}

/// Captured result of a finished subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful run with the given stdout
    pub fn ok(stdout: &str) -> Self {
        Self { success: true, stdout: stdout.to_string(), stderr: String::new() }
    }

    /// Non-zero exit with the given stderr
    pub fn failed(stderr: &str) -> Self {
        Self { success: false, stdout: String::new(), stderr: stderr.to_string() }
    }
}

/// Capability set the pipeline needs from the host
pub trait HostInterface {
    /// Lists a directory without following symlinks of the entries themselves
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Reads a whole file, following symlinks
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Returns the raw target of a symlink
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// True if the path exists after following symlinks
    fn exists(&self, path: &Path) -> bool;

    /// Writes a value to an existing control file, opened write-only
    fn write_file(&self, path: &Path, value: &str) -> io::Result<()>;

    /// Runs a subprocess to completion and captures its output
    fn run_command(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;

    /// True when writes and mutating commands are only logged
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// The real host: sysfs, /dev and subprocesses, optionally under a root prefix
#[derive(Debug, Clone, Default)]
pub struct SysfsHost {
    root: Option<PathBuf>,
}

impl SysfsHost {
    /// Operates on the live filesystem
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Operates on a copy of the sysfs layout rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.strip_prefix("/").unwrap_or(path)),
            None => path.to_path_buf(),
        }
    }
}

impl HostInterface for SysfsHost {
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_symlink: entry.file_type()?.is_symlink(),
            });
        }
        Ok(entries)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(self.resolve(path))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(self.resolve(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn write_file(&self, path: &Path, value: &str) -> io::Result<()> {
        // The handle is released when `file` drops, on success and on error
        let mut file = fs::OpenOptions::new().write(true).open(self.resolve(path))?;
        file.write_all(value.as_bytes())
    }

    fn run_command(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        debug!("Executing: {} {}", program, args.join(" "));
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Commands that only inspect host state and are safe to run in a dry run
const READ_ONLY_COMMANDS: &[&str] = &["lsmod"];

/// Wraps another host: reads pass through, writes and mutating commands are only logged
pub struct DryRunHost<'a> {
    inner: &'a dyn HostInterface,
}

impl<'a> DryRunHost<'a> {
    pub fn new(inner: &'a dyn HostInterface) -> Self {
        Self { inner }
    }
}

impl HostInterface for DryRunHost<'_> {
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.inner.list_dir(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.inner.read_to_string(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.inner.read_link(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn write_file(&self, path: &Path, value: &str) -> io::Result<()> {
        info!("[DRY RUN] Would write {:?} to {}", value, path.display());
        Ok(())
    }

    fn run_command(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        if READ_ONLY_COMMANDS.contains(&program) {
            return self.inner.run_command(program, args);
        }
        info!("[DRY RUN] Would execute: {} {}", program, args.join(" "));
        Ok(CommandOutput::ok(""))
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
