//! # cpuset-hook
//! OCI runtime hook that pins a container to the CPUs listed in its `cpu-set`
//! annotation. The runtime spec is read from stdin, or from the bundle given
//! with `--bundle`, and the value is written to the container's cpuset cgroup.
mod observability;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use libcpuset::common::DEFAULT_CGROUP_ROOT;
use libcpuset::hook::{CgroupVersion, Hook, HookConfig, MissingPolicy, Outcome};
use libcpuset::spec::RuntimeSpec;

// Options shared with the runtimes that start the hook, so the same logging
// flags can be passed through unchanged.
#[derive(Parser, Debug)]
pub struct GlobalOpts {
    /// set the log file to write hook logs to (stderr only carries the error line)
    #[clap(short, long, overrides_with("log"))]
    pub log: Option<PathBuf>,
    /// change log level to debug, but the `log-level` flag takes precedence
    #[clap(long)]
    pub debug: bool,
    /// set the log format ('text' (default), or 'json') (default: "text")
    #[clap(long)]
    pub log_format: Option<String>,
    /// set the log level (default is 'error')
    #[clap(long)]
    pub log_level: Option<String>,
    /// also send logs to the systemd journal
    #[clap(long)]
    pub systemd_log: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CgroupVersionArg {
    Auto,
    V1,
    V2,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingPolicyArg {
    Fail,
    Skip,
}

#[derive(Parser, Debug)]
pub struct HookOpts {
    /// mount point of the cgroup hierarchy
    #[clap(long, default_value = DEFAULT_CGROUP_ROOT)]
    pub cgroup_root: PathBuf,
    /// cgroup layout of the host, detected from the cgroup root by default
    #[clap(long, value_enum, default_value_t = CgroupVersionArg::Auto)]
    pub cgroup_version: CgroupVersionArg,
    /// read the cgroups path of the spec as systemd 'slice:prefix:name'
    #[clap(short, long)]
    pub systemd_cgroup: bool,
    /// what to do when the spec has no cpu-set annotation
    #[clap(long, value_enum, default_value_t = MissingPolicyArg::Fail)]
    pub on_missing_policy: MissingPolicyArg,
    /// read config.json from this bundle instead of the spec on stdin
    #[clap(short, long)]
    pub bundle: Option<PathBuf>,
}

impl From<&HookOpts> for HookConfig {
    fn from(opts: &HookOpts) -> Self {
        Self {
            cgroup_root: opts.cgroup_root.clone(),
            cgroup_version: match opts.cgroup_version {
                CgroupVersionArg::Auto => CgroupVersion::Auto,
                CgroupVersionArg::V1 => CgroupVersion::V1,
                CgroupVersionArg::V2 => CgroupVersion::V2,
            },
            systemd_cgroup: opts.systemd_cgroup,
            missing_policy: match opts.on_missing_policy {
                MissingPolicyArg::Fail => MissingPolicy::Fail,
                MissingPolicyArg::Skip => MissingPolicy::Skip,
            },
        }
    }
}

#[derive(Parser, Debug)]
#[clap(version, author = env!("CARGO_PKG_AUTHORS"))]
pub struct Opts {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(flatten)]
    hook: HookOpts,
}

fn run(opts: &Opts) -> Result<Outcome> {
    let hook = Hook::new(HookConfig::from(&opts.hook));

    let outcome = match &opts.hook.bundle {
        Some(bundle) => {
            let spec = RuntimeSpec::load(bundle.join("config.json"))
                .context("failed to load runtime spec from bundle")?;
            hook.process(&spec)?
        }
        None => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .context("failed to read runtime spec from stdin")?;
            hook.process_json(&data)?
        }
    };

    Ok(outcome)
}

/// Entry point of the hook. The container runtime runs it once per container,
/// with the runtime spec on stdin. Exits with 0 after the cpuset was applied
/// and with 1 otherwise, leaving one line on stdout or stderr respectively.
/// Logs only go to the `--log` file or the journal.
fn main() {
    let opts = Opts::parse();

    // A broken logging setup is a misconfigured hook. It is reported like any
    // other failure so stderr keeps to a single line.
    if let Err(err) = observability::init(&opts) {
        eprintln!("hook processing failed: failed to initialize logging: {err:#}");
        std::process::exit(1);
    }

    tracing::debug!(
        "started by the container runtime with {:?}",
        std::env::args_os()
    );

    match run(&opts) {
        Ok(outcome) => println!("{outcome}"),
        Err(err) => {
            eprintln!("hook processing failed: {err:#}");
            std::process::exit(1);
        }
    }
}
