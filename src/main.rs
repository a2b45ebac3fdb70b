use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use log::error;
use serde_json::json;

use vfio_pci_groups::core::pipeline::{bind_configured_devices, discover};
use vfio_pci_groups::ui;
use vfio_pci_groups::utils::logging;
use vfio_pci_groups::{DryRunHost, HostInterface, PassthroughConfig, SysfsHost, VfioError};

const DEFAULT_CONFIG_PATH: &str = "/etc/exliar/vfio.json";

const USAGE: &str = "\
Usage: vfio-pci-groups [OPTIONS]

Scans the devices bound to vfio-pci and groups them into the resources
listed in the config file.

Options:
  -c, --config <PATH>  Resource config (default: /etc/exliar/vfio.json)
  -b, --bind           Bind every matching device to vfio-pci before scanning
  -n, --dry-run        Log sysfs writes and modprobe instead of performing them
      --root <DIR>     Treat DIR as the filesystem root (for sysfs snapshots)
      --json           Print results as JSON
  -v, --verbose        Debug logging (RUST_LOG takes precedence)
  -h, --help           Print this help
  -V, --version        Print version";

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config: PathBuf,
    bind: bool,
    dry_run: bool,
    root: Option<PathBuf>,
    json: bool,
    verbose: bool,
    help: bool,
    version: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG_PATH),
            bind: false,
            dry_run: false,
            root: None,
            json: false,
            verbose: false,
            help: false,
            version: false,
        }
    }
}

impl CliOptions {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut options = Self::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    let value = iter.next().ok_or_else(|| format!("{} requires a path", arg))?;
                    options.config = PathBuf::from(value);
                }
                "--root" => {
                    let value = iter.next().ok_or_else(|| format!("{} requires a directory", arg))?;
                    options.root = Some(PathBuf::from(value));
                }
                "-b" | "--bind" => options.bind = true,
                "-n" | "--dry-run" => options.dry_run = true,
                "--json" => options.json = true,
                "-v" | "--verbose" => options.verbose = true,
                "-h" | "--help" => options.help = true,
                "-V" | "--version" => options.version = true,
                other => return Err(format!("Unknown argument: {}", other)),
            }
        }

        Ok(options)
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match CliOptions::parse(&args) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("{}\n\n{}", msg, USAGE);
            return ExitCode::from(2);
        }
    };

    if options.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }
    if options.version {
        println!("vfio-pci-groups {}", vfio_pci_groups::VERSION);
        return ExitCode::SUCCESS;
    }

    logging::init(options.verbose);

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            if let Some(journal) = e.journal() {
                error!("Completed steps: {}", journal.summary());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(options: &CliOptions) -> vfio_pci_groups::Result<()> {
    let config = PassthroughConfig::load(&options.config)?;

    let sysfs = match &options.root {
        Some(root) => SysfsHost::with_root(root),
        None => SysfsHost::new(),
    };
    let dry_run = DryRunHost::new(&sysfs);
    let host: &dyn HostInterface = if options.dry_run { &dry_run } else { &sysfs };

    let report = if options.bind {
        Some(bind_configured_devices(host, &config)?)
    } else {
        None
    };

    let groups = discover(host, &config.resources)?;

    if options.json {
        let output = json!({ "bind": report, "groups": groups });
        let text = serde_json::to_string_pretty(&output).map_err(VfioError::Encode)?;
        println!("{}", text);
        return Ok(());
    }

    let painter = ui::stdout_painter();
    if let Some(report) = &report {
        print!("{}", ui::render_bind_report(report, &painter));
    }
    print!("{}", ui::render_groups(&groups, &painter));
    Ok(())
}
