//! Flatten command - shows the path/value pairs a create would replace.

use netconverge::flatten::{flatten, strip_markers};

use crate::cli::FlattenArgs;
use crate::commands::{CommandResult, load_resource};
use crate::output::{OutputFormat, print_table};

/// Run the flatten command
pub fn run(args: &FlattenArgs, format: OutputFormat) -> CommandResult {
    let (schema, desired) = load_resource(&args.resource)?;
    let root = schema.resolve_root(&desired)?;
    let tree = if args.keep_markers {
        desired
    } else {
        strip_markers(&desired, &schema.markers)
    };
    let values = flatten(&tree, &root, &schema.reference_paths)?;

    match format {
        OutputFormat::Human => {
            println!("Root: {root}");
            if values.is_empty() {
                println!("No values.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = values
                .iter()
                .map(|pv| vec![pv.path.to_string(), pv.value.to_string()])
                .collect();
            print_table(&["PATH", "VALUE"], &rows);
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "root": root.to_canonical(),
                "values": values,
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    Ok(())
}
