//! Matrix command implementation.

use serde::Serialize;
use txprop_core::{
    resolve, ContextId, Propagation, PropagationError, PropagationResult, Transition,
};

/// One row of the resolver table.
#[derive(Debug, Serialize)]
pub struct MatrixRow {
    /// Requested mode.
    pub mode: Propagation,
    /// Behavior with no ambient context.
    pub without_context: String,
    /// Behavior with an ambient context.
    pub with_context: String,
}

/// Runs the matrix command.
pub fn run(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ambient = ContextId::new(1);
    let rows: Vec<MatrixRow> = Propagation::ALL
        .iter()
        .map(|&mode| MatrixRow {
            mode,
            without_context: describe(resolve(mode, None)),
            with_context: describe(resolve(mode, Some(ambient))),
        })
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
        "text" => {
            println!(
                "{:<14} {:<24} {}",
                "mode", "no ambient context", "ambient context exists"
            );
            println!("{}", "-".repeat(76));
            for row in &rows {
                println!(
                    "{:<14} {:<24} {}",
                    row.mode.as_str(),
                    row.without_context,
                    row.with_context
                );
            }
        }
        other => return Err(format!("Unknown format '{other}' (expected text or json)").into()),
    }

    Ok(())
}

fn describe(resolved: PropagationResult<Transition>) -> String {
    match resolved {
        Ok(transition) => transition.to_string(),
        Err(PropagationError::NoTransaction { .. }) => "NoTransaction error".to_string(),
        Err(PropagationError::ExistingTransaction { .. }) => {
            "ExistingTransaction error".to_string()
        }
        Err(err) => err.to_string(),
    }
}
