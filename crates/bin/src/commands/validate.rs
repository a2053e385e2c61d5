//! Validate command - checks local and external leaf references.

use netconverge::leafref::{ResolvedRef, Validation, ValidationMode, validate};

use crate::cli::ValidateArgs;
use crate::commands::{CommandResult, load_resource, read_tree};
use crate::output::{OutputFormat, print_table};

/// Run the validate command
///
/// External rules are only checked when an element configuration is given.
/// Fails when any reference does not resolve.
pub fn run(args: &ValidateArgs, format: OutputFormat) -> CommandResult {
    let (schema, desired) = load_resource(&args.resource)?;

    let mut checks: Vec<(ValidationMode, Validation)> = vec![(
        ValidationMode::Local,
        validate(ValidationMode::Local, &desired, None, &schema.local_leafrefs)?,
    )];
    match &args.element_config {
        Some(path) => {
            let config = read_tree(path)?;
            checks.push((
                ValidationMode::External,
                validate(
                    ValidationMode::External,
                    &desired,
                    Some(&config),
                    &schema.external_leafrefs,
                )?,
            ));
        }
        None if !schema.external_leafrefs.is_empty() => {
            tracing::warn!(
                rules = schema.external_leafrefs.len(),
                "No element config given, skipping external leaf-refs"
            );
        }
        None => {}
    }

    match format {
        OutputFormat::Human => {
            let rows: Vec<Vec<String>> = checks
                .iter()
                .flat_map(|(mode, validation)| validation.results.iter().map(move |r| row(*mode, r)))
                .collect();
            if rows.is_empty() {
                println!("No leaf references found.");
            } else {
                print_table(&["MODE", "PATH", "VALUE", "TARGET", "RESOLVED"], &rows);
            }
        }
        OutputFormat::Json => {
            let value: serde_json::Map<String, serde_json::Value> = checks
                .iter()
                .map(|(mode, validation)| {
                    Ok::<_, serde_json::Error>((mode.to_string(), serde_json::to_value(validation)?))
                })
                .collect::<Result<_, _>>()?;
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    let failures: Vec<String> = checks
        .iter()
        .filter(|(_, validation)| !validation.success)
        .map(|(mode, validation)| format!("{mode}: {}", validation.failure_message()))
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(format!("unresolved leaf references ({})", failures.join("; ")).into())
    }
}

fn row(mode: ValidationMode, r: &ResolvedRef) -> Vec<String> {
    vec![
        mode.to_string(),
        r.local_path.to_string(),
        r.value.clone(),
        r.remote_path.to_string(),
        if r.resolved { "yes" } else { "no" }.to_string(),
    ]
}
