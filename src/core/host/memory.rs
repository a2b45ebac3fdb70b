// In-memory host backend
//
// Models just enough of sysfs for the pipeline: regular files, directories,
// symlinks (absolute or relative targets), injected write failures and
// scripted subprocess results.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Component, Path, PathBuf};

use super::{CommandOutput, DirEntry, HostInterface};

/// Symlink hops followed before a path is treated as a loop
const MAX_LINK_HOPS: usize = 40;

/// Fake host for unit tests
#[derive(Debug, Default)]
pub struct MemoryHost {
    files: RefCell<BTreeMap<PathBuf, String>>,
    dirs: BTreeSet<PathBuf>,
    links: BTreeMap<PathBuf, PathBuf>,
    failing_writes: HashSet<PathBuf>,
    // None means the program could not be spawned
    commands: RefCell<HashMap<String, VecDeque<Option<CommandOutput>>>>,
    writes: RefCell<Vec<(PathBuf, String)>>,
    commands_run: RefCell<Vec<String>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a regular file, creating its parent directories
    pub fn with_file(mut self, path: impl AsRef<Path>, content: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        self.add_ancestors(&path);
        self.files.get_mut().insert(path, content.to_string());
        self
    }

    /// Adds an empty directory, creating its parents
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        self.add_ancestors(&path);
        self.dirs.insert(path);
        self
    }

    /// Adds a symlink at `path` pointing to `target`
    pub fn with_symlink(mut self, path: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        self.add_ancestors(&path);
        self.links.insert(path, target.as_ref().to_path_buf());
        self
    }

    /// Makes every write to `path` fail with a permission error
    pub fn with_failing_write(mut self, path: impl AsRef<Path>) -> Self {
        self.failing_writes.insert(path.as_ref().to_path_buf());
        self
    }

    /// Queues a result for `command_line` ("program arg1 arg2").
    /// Results are returned in order; the last one repeats.
    pub fn with_command(self, command_line: &str, output: CommandOutput) -> Self {
        self.queue_command(command_line, Some(output));
        self
    }

    /// Queues a spawn failure for `command_line`
    pub fn with_missing_command(self, command_line: &str) -> Self {
        self.queue_command(command_line, None);
        self
    }

    /// Successful writes, in the order they happened
    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.writes.borrow().clone()
    }

    /// Command lines that were executed, in order
    pub fn commands_run(&self) -> Vec<String> {
        self.commands_run.borrow().clone()
    }

    /// Current content of a file
    pub fn file_content(&self, path: impl AsRef<Path>) -> Option<String> {
        let resolved = self.resolve(path.as_ref());
        self.files.borrow().get(&resolved).cloned()
    }

    fn queue_command(&self, command_line: &str, output: Option<CommandOutput>) {
        self.commands
            .borrow_mut()
            .entry(command_line.to_string())
            .or_default()
            .push_back(output);
    }

    fn add_ancestors(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    /// Follows every symlink along the path, including the last component
    fn resolve(&self, path: &Path) -> PathBuf {
        let mut pending: Vec<Component> = path.components().rev().collect();
        let mut resolved = PathBuf::new();
        let mut hops = 0;

        while let Some(component) = pending.pop() {
            match component {
                Component::RootDir => resolved = PathBuf::from("/"),
                Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(name) => {
                    resolved.push(name);
                    if let Some(target) = self.links.get(&resolved) {
                        hops += 1;
                        if hops > MAX_LINK_HOPS {
                            break;
                        }
                        resolved.pop();
                        pending.extend(target.components().rev());
                    }
                }
            }
        }
        resolved
    }

    /// Follows symlinks in the parent only, leaving the final component as is
    fn resolve_parent(&self, path: &Path) -> PathBuf {
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => self.resolve(parent).join(name),
            _ => path.to_path_buf(),
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{}: No such file or directory", path.display()))
}

impl HostInterface for MemoryHost {
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let dir = self.resolve(path);
        if !self.dirs.contains(&dir) {
            return Err(not_found(path));
        }

        let files = self.files.borrow();
        let children = files
            .keys()
            .chain(self.dirs.iter())
            .filter(|p| p.parent() == Some(dir.as_path()))
            .map(|p| (p, false))
            .chain(
                self.links
                    .keys()
                    .filter(|p| p.parent() == Some(dir.as_path()))
                    .map(|p| (p, true)),
            );

        let mut seen = BTreeSet::new();
        let mut entries = Vec::new();
        for (child, is_symlink) in children {
            let name = child.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if seen.insert(name.clone()) {
                entries.push(DirEntry { name, is_symlink });
            }
        }
        Ok(entries)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .borrow()
            .get(&self.resolve(path))
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.links
            .get(&self.resolve_parent(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{}: not a symlink", path.display())))
    }

    fn exists(&self, path: &Path) -> bool {
        let resolved = self.resolve(path);
        self.dirs.contains(&resolved) || self.files.borrow().contains_key(&resolved)
    }

    fn write_file(&self, path: &Path, value: &str) -> io::Result<()> {
        if self.failing_writes.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: Permission denied", path.display()),
            ));
        }

        let resolved = self.resolve(path);
        let mut files = self.files.borrow_mut();
        let content = files.get_mut(&resolved).ok_or_else(|| not_found(path))?;
        *content = value.to_string();
        self.writes.borrow_mut().push((path.to_path_buf(), value.to_string()));
        Ok(())
    }

    fn run_command(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let command_line = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
        self.commands_run.borrow_mut().push(command_line.clone());

        let mut commands = self.commands.borrow_mut();
        let queue = commands.get_mut(&command_line).ok_or_else(|| not_found(Path::new(program)))?;
        let next = if queue.len() > 1 { queue.pop_front().flatten() } else { queue.front().cloned().flatten() };
        next.ok_or_else(|| not_found(Path::new(program)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_through_relative_symlinks() {
        let host = MemoryHost::new()
            .with_file("/sys/devices/pci0000:00/0000:01:00.0/vendor", "0x19e5\n")
            .with_symlink("/sys/bus/pci/devices/0000:01:00.0", "../../../devices/pci0000:00/0000:01:00.0");

        let vendor = host.read_to_string(Path::new("/sys/bus/pci/devices/0000:01:00.0/vendor")).unwrap();
        assert_eq!(vendor, "0x19e5\n");
        assert!(host.exists(Path::new("/sys/bus/pci/devices/0000:01:00.0")));
        assert!(!host.exists(Path::new("/sys/bus/pci/devices/0000:02:00.0")));
    }

    #[test]
    fn test_list_dir_reports_symlinks() {
        let host = MemoryHost::new()
            .with_file("/drv/new_id", "")
            .with_symlink("/drv/0000:01:00.0", "/dev/null");

        let mut entries = host.list_dir(Path::new("/drv")).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![
                DirEntry { name: "0000:01:00.0".to_string(), is_symlink: true },
                DirEntry { name: "new_id".to_string(), is_symlink: false },
            ]
        );
        assert!(host.list_dir(Path::new("/missing")).is_err());
    }

    #[test]
    fn test_write_requires_existing_file() {
        let host = MemoryHost::new().with_file("/sys/bus/pci/drivers_probe", "");
        assert!(host.write_file(Path::new("/sys/bus/pci/nope"), "x").is_err());
        host.write_file(Path::new("/sys/bus/pci/drivers_probe"), "0000:01:00.0").unwrap();
        assert_eq!(host.file_content("/sys/bus/pci/drivers_probe").as_deref(), Some("0000:01:00.0"));
        assert_eq!(host.writes().len(), 1);
    }

    #[test]
    fn test_command_queue_repeats_last_result() {
        let host = MemoryHost::new()
            .with_command("lsmod", CommandOutput::ok(""))
            .with_command("lsmod", CommandOutput::ok("vfio_pci 1 0"));

        assert_eq!(host.run_command("lsmod", &[]).unwrap().stdout, "");
        assert_eq!(host.run_command("lsmod", &[]).unwrap().stdout, "vfio_pci 1 0");
        assert_eq!(host.run_command("lsmod", &[]).unwrap().stdout, "vfio_pci 1 0");
        assert!(host.run_command("modprobe", &["vfio_pci"]).is_err());
    }
}
