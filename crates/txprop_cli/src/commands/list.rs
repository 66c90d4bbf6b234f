//! List command implementation.

use txprop_testkit::catalog;

/// Runs the list command.
pub fn run() {
    let width = catalog()
        .iter()
        .map(|scenario| scenario.name.len())
        .max()
        .unwrap_or(0);

    for scenario in catalog() {
        println!("{:width$}  {}", scenario.name, scenario.title);
    }
}
