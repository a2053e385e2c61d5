//! Diff command - shows the delta from an observed tree to the desired one.

use netconverge::delta::{Delta, diff};
use netconverge::flatten::{Flattener, normalize_entry_lists, strip_markers};

use crate::cli::DiffArgs;
use crate::commands::{CommandResult, load_resource, read_tree};
use crate::output::{OutputFormat, print_table};

/// Run the diff command
pub fn run(args: &DiffArgs, format: OutputFormat) -> CommandResult {
    let (schema, desired) = load_resource(&args.resource)?;
    let observed = read_tree(&args.observed)?;
    let root = schema.resolve_root(&desired)?;

    let refs = &schema.reference_paths;
    let flattener = Flattener::new(refs);
    let desired = flattener.flatten(&strip_markers(&desired, &schema.markers), &root)?;
    let observed = flattener.flatten(&normalize_entry_lists(&observed, &root, refs), &root)?;
    let delta = diff(&desired, &observed);

    match format {
        OutputFormat::Human => print_delta(&root.to_string(), &delta),
        OutputFormat::Json => {
            let value = serde_json::json!({
                "root": root.to_canonical(),
                "updates": delta.updates,
                "deletes": delta.deletes,
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    Ok(())
}

/// Prints a delta as one table of operations.
pub fn print_delta(root: &str, delta: &Delta) {
    println!("Root: {root}");
    if delta.is_empty() {
        println!("Up to date.");
        return;
    }
    let rows: Vec<Vec<String>> = delta
        .updates
        .iter()
        .map(|pv| vec!["update".to_string(), pv.path.to_string(), pv.value.to_string()])
        .chain(
            delta
                .deletes
                .iter()
                .map(|path| vec!["delete".to_string(), path.to_string(), String::new()]),
        )
        .collect();
    print_table(&["OP", "PATH", "VALUE"], &rows);
}
