//! JSON Scenario Harness
//!
//! Runs scenario vectors from the `vectors/` directory against a single
//! simulated slave and outputs JSON results, one per step carrying an
//! expectation.

use clap::Parser;
use pmslv::hal::{SimClocks, SimParent};
use pmslv::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{fs, path::Path, path::PathBuf, process::ExitCode};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// Use std Result to avoid conflict with pmslv::Result
type HarnessResult<T> = std::result::Result<T, String>;

/// Scenario vector runner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario vector files
    #[arg(required = true)]
    vectors: Vec<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

// ============================================================================
// Vector Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct Scenario {
    id: String,
    #[serde(default)]
    description: String,
    states: Vec<Vec<String>>,
    #[serde(default)]
    transitions: Vec<TransitionSpec>,
    masters: Vec<u32>,
    #[serde(default)]
    policy: u32,
    #[serde(default)]
    initial_state: StateId,
    #[serde(default)]
    parent: Option<ParentSpec>,
    #[serde(default)]
    clocks: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct TransitionSpec {
    from: StateId,
    to: StateId,
    #[serde(default)]
    latency: LatencyUs,
    /// Enter action fails
    #[serde(default)]
    fails: bool,
}

#[derive(Debug, Deserialize)]
struct ParentSpec {
    #[serde(default)]
    latency: Option<LatencyUs>,
}

#[derive(Debug, Deserialize)]
struct Step {
    op: String,
    #[serde(default)]
    master: Option<u32>,
    #[serde(default)]
    caps: Vec<String>,
    #[serde(default)]
    latency: Option<LatencyUs>,
    #[serde(default)]
    refuse: Option<bool>,
    #[serde(default)]
    expect: Option<Expect>,
}

/// Expected outcome of a step; absent `error` means the step must succeed
#[derive(Debug, Deserialize)]
struct Expect {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    state: Option<StateId>,
    #[serde(default)]
    margin: Option<LatencyUs>,
    #[serde(default)]
    users: Option<u32>,
    #[serde(default)]
    parent_held: Option<u32>,
    #[serde(default)]
    clocks_held: Option<u32>,
}

#[derive(Debug, Serialize)]
struct StepResult {
    id: String,
    op: String,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actual: Option<Value>,
}

/// Enter action for transitions marked `fails`
struct RefusingAction;

impl EnterState for RefusingAction {
    fn enter(&self, _node: NodeId, _next: StateId) -> pmslv::Result<()> {
        Err(Error::Dependency(DependencyError::Hardware(0xdead)))
    }
}

static REFUSING: RefusingAction = RefusingAction;

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {}", e);
    }

    let mut all_results: Vec<StepResult> = Vec::new();
    for path in &args.vectors {
        match run_scenario(path) {
            Ok(results) => all_results.extend(results),
            Err(e) => all_results.push(StepResult {
                id: Path::new(path)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
                op: "load".to_string(),
                passed: false,
                error: Some(e),
                actual: None,
            }),
        }
    }

    match serde_json::to_string_pretty(&all_results) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("failed to encode results: {}", e),
    }

    // Summary to stderr
    let passed = all_results.iter().filter(|r| r.passed).count();
    let total = all_results.len();
    eprintln!("\n=== Scenario Summary ===");
    eprintln!("Passed: {}/{}", passed, total);

    if passed == total {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_scenario(path: &Path) -> HarnessResult<Vec<StepResult>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let scenario: Scenario = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

    info!("scenario {}: {}", scenario.id, scenario.description);

    // FSM
    if scenario.states.is_empty() || scenario.states.len() > StateId::MAX as usize + 1 {
        return Err(format!("{}: state count {} out of range", scenario.id, scenario.states.len()));
    }
    let states = scenario
        .states
        .iter()
        .map(|names| parse_caps(names))
        .collect::<HarnessResult<Vec<_>>>()?;
    let transitions: Vec<Transition<'_>> = scenario
        .transitions
        .iter()
        .map(|t| {
            let transition = Transition::new(t.from, t.to, t.latency);
            if t.fails {
                transition.with_action(&REFUSING)
            } else {
                transition
            }
        })
        .collect();
    let fsm = SlaveFsm::new(&states, &transitions);

    // Masters
    let mut masters = MasterTable::new();
    for &mask in &scenario.masters {
        let id = master_id(Some(mask))?;
        masters
            .add(Master::new(id, "master"))
            .map_err(|e| format!("master {:#x}: {}", mask, e))?;
    }

    // Dependencies
    let parent = scenario.parent.as_ref().map(|p| match p.latency {
        Some(latency) => SimParent::with_latency(latency),
        None => SimParent::new(),
    });
    let clocks = SimClocks::new();

    let mut slave = Slave::new(1, "slave", &fsm).with_state(scenario.initial_state);
    if let Some(parent) = parent.as_ref() {
        slave = slave.with_parent(parent);
    }
    if scenario.clocks {
        slave = slave.with_clocks(&clocks);
    }
    slave
        .set_config(SlavePolicy::from_bits_truncate(scenario.policy), masters.all(), &masters)
        .map_err(|e| format!("{}: configuration failed: {}", scenario.id, e))?;

    let mut results = Vec::new();
    for (index, step) in scenario.steps.iter().enumerate() {
        let status = run_step(step, &mut slave, parent.as_ref(), &clocks)?;
        if let Some(expect) = &step.expect {
            let id = format!("{}#{}", scenario.id, index);
            results.push(check_step(id, step, expect, status, &slave, parent.as_ref(), &clocks));
        }
    }

    Ok(results)
}

fn run_step(
    step: &Step,
    slave: &mut Slave<'_>,
    parent: Option<&SimParent>,
    clocks: &SimClocks,
) -> HarnessResult<pmslv::Result<()>> {
    let status = match step.op.as_str() {
        "request" => {
            let caps = parse_caps(&step.caps)?;
            let latency = step.latency.unwrap_or(MAX_LATENCY);
            slave.request(master_id(step.master)?, caps, latency)
        }
        "release" => slave.release(master_id(step.master)?),
        "set_latency" => {
            let latency = step.latency.ok_or("set_latency needs a latency")?;
            slave.set_latency_requirement(master_id(step.master)?, latency)
        }
        "update" => slave.update(),
        "force_down" => slave.force_down(),
        "verify" => slave.verify_request(),
        "refuse_parent" => {
            let parent = parent.ok_or("refuse_parent without a parent")?;
            parent.set_refuse(step.refuse.unwrap_or(true));
            Ok(())
        }
        "refuse_clocks" => {
            clocks.set_refuse(step.refuse.unwrap_or(true));
            Ok(())
        }
        other => return Err(format!("unknown op '{}'", other)),
    };
    Ok(status)
}

fn check_step(
    id: String,
    step: &Step,
    expect: &Expect,
    status: pmslv::Result<()>,
    slave: &Slave<'_>,
    parent: Option<&SimParent>,
    clocks: &SimClocks,
) -> StepResult {
    let actual_error = status.err().map(error_name);
    let parent_held = parent.map(SimParent::held).unwrap_or(0);
    let actual = json!({
        "error": actual_error,
        "state": slave.state(),
        "margin": slave.latency_margin(),
        "users": slave.users_mask().bits(),
        "parent_held": parent_held,
        "clocks_held": clocks.held(),
    });

    let mut mismatches: Vec<String> = Vec::new();
    if expect.error.as_deref() != actual_error {
        mismatches.push(format!("error: expected {:?}, got {:?}", expect.error, actual_error));
    }
    compare(&mut mismatches, "state", expect.state, slave.state());
    compare(&mut mismatches, "margin", expect.margin, slave.latency_margin());
    compare(&mut mismatches, "users", expect.users, slave.users_mask().bits());
    compare(&mut mismatches, "parent_held", expect.parent_held, parent_held);
    compare(&mut mismatches, "clocks_held", expect.clocks_held, clocks.held());

    StepResult {
        id,
        op: step.op.clone(),
        passed: mismatches.is_empty(),
        error: if mismatches.is_empty() {
            None
        } else {
            Some(mismatches.join("; "))
        },
        actual: Some(actual),
    }
}

fn compare<T>(mismatches: &mut Vec<String>, field: &str, expected: Option<T>, actual: T)
where
    T: PartialEq + std::fmt::Display,
{
    if let Some(expected) = expected {
        if expected != actual {
            mismatches.push(format!("{}: expected {}, got {}", field, expected, actual));
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_caps(names: &[String]) -> HarnessResult<Capability> {
    names.iter().try_fold(Capability::empty(), |acc, name| {
        Capability::from_label(name)
            .map(|cap| acc | cap)
            .ok_or_else(|| format!("unknown capability '{}'", name))
    })
}

fn master_id(mask: Option<u32>) -> HarnessResult<MasterId> {
    let mask = mask.ok_or("step needs a master")?;
    MasterId::new(mask).ok_or_else(|| format!("master mask {:#x} is not one-hot", mask))
}

fn error_name(err: Error) -> &'static str {
    match err {
        Error::Conflict => "Conflict",
        Error::NoFeature => "NoFeature",
        Error::Dependency(_) => "Dependency",
        Error::TransitionUndefined { .. } => "TransitionUndefined",
        Error::UnknownMaster(_) => "UnknownMaster",
        Error::UnknownNode(_) => "UnknownNode",
        Error::NodeBusy => "NodeBusy",
        Error::NoPermission => "NoPermission",
        Error::NotUsing => "NotUsing",
        Error::NoMemory => "NoMemory",
        Error::InvalidArg => "InvalidArg",
    }
}
