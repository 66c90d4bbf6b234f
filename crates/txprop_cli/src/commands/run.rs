//! Run command implementation.

use tracing::info;
use txprop_testkit::{catalog, find, Scenario, ScenarioReport};

/// Runs one scenario, or every scenario when `name` is `all`.
pub fn run(name: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scenarios: Vec<&Scenario> = if name == "all" {
        catalog().iter().collect()
    } else {
        vec![find(name).ok_or_else(|| format!("Unknown scenario '{name}' (see `txprop list`)"))?]
    };

    let reports: Vec<ScenarioReport> = scenarios
        .iter()
        .map(|scenario| {
            info!("Running scenario {}", scenario.name);
            scenario.run()
        })
        .collect();
    let completed = reports.iter().filter(|r| r.outcome.is_completed()).count();
    info!("Ran {} scenario(s), {} completed", reports.len(), completed);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        "text" => {
            for (report, scenario) in reports.iter().zip(&scenarios) {
                print_text(report, scenario.summary);
            }
        }
        other => return Err(format!("Unknown format '{other}' (expected text or json)").into()),
    }

    Ok(())
}

fn print_text(report: &ScenarioReport, summary: &str) {
    println!("{}", report.title);
    println!("{}", "=".repeat(report.title.len()));
    println!();
    println!("Scenario: {}", report.name);
    println!("{summary}");
    println!();
    println!("Outcome: {}", report.outcome);
    println!();
    println!("Durable state:");
    if report.entities.is_empty() {
        println!("  (nothing)");
    }
    for (key, payload) in &report.entities {
        println!("  {key:<24} {payload}");
    }
    println!();
    println!("Commit log:");
    if report.commits.is_empty() {
        println!("  (empty)");
    }
    for commit in &report.commits {
        let keys: Vec<String> = commit.keys.iter().map(ToString::to_string).collect();
        println!("  {} {} [{}]", commit.sequence, commit.context, keys.join(", "));
    }
    println!();
    println!(
        "Contexts: {} begun, {} committed, {} rolled back, {} released, {} joins, {} suspensions",
        report.stats.contexts_begun,
        report.stats.commits,
        report.stats.rollbacks,
        report.stats.releases,
        report.stats.joins,
        report.stats.suspensions
    );
    println!();
}
