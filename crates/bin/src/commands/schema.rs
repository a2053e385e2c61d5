//! Schema command - lists the resource kinds a schema document defines.

use crate::cli::SchemaArgs;
use crate::commands::{CommandResult, load_registry};
use crate::output::{OutputFormat, print_table};

/// Run the schema command
pub fn run(args: &SchemaArgs, format: OutputFormat) -> CommandResult {
    let registry = load_registry(&args.source)?;

    match format {
        OutputFormat::Human => {
            if registry.is_empty() {
                println!("No resource kinds defined.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = registry
                .iter()
                .map(|schema| {
                    vec![
                        schema.kind.clone(),
                        schema.root_path.to_string(),
                        schema.level.to_string(),
                        schema.reference_paths.len().to_string(),
                        (schema.local_leafrefs.len() + schema.external_leafrefs.len()).to_string(),
                    ]
                })
                .collect();
            print_table(&["KIND", "ROOT", "LEVEL", "LISTS", "LEAFREFS"], &rows);
        }
        OutputFormat::Json => {
            let kinds: Vec<_> = registry.iter().collect();
            println!("{}", serde_json::to_string(&kinds)?);
        }
    }

    Ok(())
}
