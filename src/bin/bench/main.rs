// Costline Benchmark Runner — seeded randomized recalculation workloads
// with invariant checks on every settled timeline.
//
// Usage:
//   cargo run --release --bin bench                  # all scenarios (10 runs each)
//   cargo run --release --bin bench -- --runs 3      # quick mode
//   cargo run --release --bin bench -- LONG          # filter by name
//   cargo run --release --bin bench -- --seed 42     # custom base seed

mod scenarios;

use scenarios::*;

use costline_engine::{recalculate_all, RecalcOutcome, RuleStore, RunCounters};
use serde::Serialize;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    runs: usize,
    seed: u64,
    filter: Option<String>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        runs: 10,
        seed: 0,
        filter: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--runs" => {
                i += 1;
                if i < args.len() {
                    cli.runs = args[i].parse().unwrap_or(10);
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    cli.seed = args[i].parse().unwrap_or(0);
                }
            }
            arg if !arg.starts_with('-') => {
                cli.filter = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    cli
}

// ─── Invariant Checks ───────────────────────────────────────────────────────

/// Violations found in one settled timeline. Empty means the run passed.
fn check_invariants(store: &RuleStore, outcome: &RecalcOutcome) -> Vec<String> {
    let mut violations = Vec::new();
    for row in &outcome.events {
        if row.remaining_cost < 0.0 || row.remaining_cost > store.total_cap {
            violations.push(format!("event {}: balance {} out of bounds", row.id, row.remaining_cost));
        }
        if row.cost_deduction > row.cost + 1e-9 {
            violations.push(format!("event {}: deduction {} exceeds cost {}", row.id, row.cost_deduction, row.cost));
        }
        if row.time_interval < 0.0 {
            violations.push(format!("event {}: negative interval {}", row.id, row.time_interval));
        }
    }
    for pair in outcome.events.windows(2) {
        if pair[1].time > pair[0].time {
            violations.push(format!("event {}: clock ascends ({} > {})", pair[1].id, pair[1].time, pair[0].time));
        }
    }
    if !outcome.warnings.is_empty() {
        violations.push(format!("{} unexpected warnings", outcome.warnings.len()));
    }
    violations
}

// ─── Report ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ScenarioReport {
    name: &'static str,
    label: &'static str,
    category: &'static str,
    runs: usize,
    passed: usize,
    events_settled: usize,
    mean_elapsed_ms: f64,
    max_elapsed_ms: f64,
    violations: Vec<String>,
}

#[derive(Serialize)]
struct BenchReport {
    timestamp: String,
    version: &'static str,
    prng: &'static str,
    runs_per_scenario: usize,
    base_seed: u64,
    total: usize,
    passed: usize,
    scenarios: Vec<ScenarioReport>,
}

fn run_scenario(scenario: &Scenario, runs: usize, base_seed: u64) -> ScenarioReport {
    let mut passed = 0;
    let mut events_settled = 0;
    let mut elapsed_ms = Vec::with_capacity(runs);
    let mut violations = Vec::new();

    for run in 0..runs {
        let mut store = build_store(scenario, base_seed.wrapping_add(run as u64));
        let mut counters = RunCounters::new();

        let start = Instant::now();
        let outcome = recalculate_all(&mut store, &mut counters);
        elapsed_ms.push(start.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(outcome) => {
                events_settled += outcome.events.len();
                let found = check_invariants(&store, &outcome);
                if found.is_empty() {
                    // settled output must be a fixed point
                    let replay = recalculate_all(&mut store, &mut counters);
                    match replay {
                        Ok(replay) if replay.events == outcome.events => passed += 1,
                        Ok(_) => violations.push(format!("run {run}: recalculation not idempotent")),
                        Err(e) => violations.push(format!("run {run}: replay failed: {e}")),
                    }
                } else {
                    violations.extend(found.into_iter().map(|v| format!("run {run}: {v}")));
                }
            }
            Err(e) => violations.push(format!("run {run}: {e}")),
        }
    }

    let mean = elapsed_ms.iter().sum::<f64>() / elapsed_ms.len().max(1) as f64;
    let max = elapsed_ms.iter().fold(0.0_f64, |a, &b| a.max(b));

    ScenarioReport {
        name: scenario.name,
        label: scenario.label,
        category: scenario.category,
        runs,
        passed,
        events_settled,
        mean_elapsed_ms: mean,
        max_elapsed_ms: max,
        violations,
    }
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() {
    let cli = parse_args();
    let all_scenarios = scenarios();

    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f_lower = f.to_lowercase();
            all_scenarios
                .iter()
                .filter(|s| {
                    s.name.to_lowercase().contains(&f_lower)
                        || s.label.to_lowercase().contains(&f_lower)
                        || s.category.to_lowercase().contains(&f_lower)
                })
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        eprintln!("No scenarios match filter: {:?}", cli.filter);
        std::process::exit(1);
    }

    println!("\n  Costline Benchmark Runner v0.1.0");
    println!("  PRNG: ChaCha8Rng | Runs/scenario: {} | Base seed: {}", cli.runs, cli.seed);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!("  {:<32} {:>6} {:>8} {:>10} {:>10}", "Scenario", "Pass", "Events", "Mean(ms)", "Max(ms)");
    println!("  {}", "-".repeat(72));

    let suite_start = Instant::now();
    let mut reports = Vec::new();

    for scenario in &to_run {
        let report = run_scenario(scenario, cli.runs, cli.seed);
        let status = if report.passed == report.runs { "PASS" } else { "FAIL" };
        println!(
            "  {:<32} {:>3}/{:<3} {:>7} {:>10.1} {:>10.1}  {}",
            report.label, report.passed, report.runs, report.events_settled,
            report.mean_elapsed_ms, report.max_elapsed_ms, status,
        );
        for v in report.violations.iter().take(3) {
            println!("      {v}");
        }
        reports.push(report);
    }

    let total = reports.len();
    let passed = reports.iter().filter(|r| r.passed == r.runs).count();
    println!("  {}", "-".repeat(72));
    println!(
        "  Total: {}  Passed: {}  Failed: {}  Suite time: {:.1}s\n",
        total,
        passed,
        total - passed,
        suite_start.elapsed().as_secs_f64()
    );

    // ─── Write JSON Report ──────────────────────────────────────────────

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let timestamp = format!("{ts}");

    let report = BenchReport {
        timestamp: timestamp.clone(),
        version: "0.1.0",
        prng: "ChaCha8Rng",
        runs_per_scenario: cli.runs,
        base_seed: cli.seed,
        total,
        passed,
        scenarios: reports,
    };

    let dir = std::path::Path::new("benchmark-results");
    if !dir.exists() {
        std::fs::create_dir_all(dir).expect("Failed to create benchmark-results/");
    }
    let path = dir.join(format!("bench-{timestamp}.json"));
    let json = serde_json::to_string_pretty(&report).expect("Failed to serialize");
    std::fs::write(&path, &json).expect("Failed to write benchmark file");
    println!("  Results saved to: {}\n", path.display());

    if passed < total {
        std::process::exit(1);
    }
}
