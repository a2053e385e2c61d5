//! Plan command - dry-runs one reconcile cycle against a scripted element.
//!
//! The element is simulated by a [`RecordingClient`], so nothing leaves the
//! process. The set requests the engine would send are printed instead.

use std::sync::Arc;

use netconverge::index::ResourceIndexMap;
use netconverge::{Clock, SystemClock};
use netconverge::reconcile::{
    DesiredState, MemoryStore, ReconcileOutcome, Reconciler, RecordingClient, ResourceIdentity,
    SetRequest, Status,
};

use crate::cli::PlanArgs;
use crate::commands::{CommandResult, load_resource, read_tree};
use crate::output::{OutputFormat, print_table};

/// Run the plan command
pub async fn run(args: &PlanArgs, format: OutputFormat) -> CommandResult {
    let (schema, desired) = load_resource(&args.resource)?;

    let observed = args.observed.as_deref().map(read_tree).transpose()?;
    let mut client = if args.exists {
        RecordingClient::new().with_present(Status::Success, observed)
    } else {
        RecordingClient::new().with_absent(observed)
    };
    client = client.with_cache_ready(!args.cache_not_ready);
    if let Some(path) = &args.element_config {
        client = client.with_config(read_tree(path)?);
    }

    let name = args
        .resource
        .desired
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| schema.kind.clone());
    let mut record = MemoryStore::new(ResourceIdentity::new(schema.kind.as_str(), name), desired);
    if let Some(path) = &args.index_map {
        let json = std::fs::read_to_string(path)?;
        let map: ResourceIndexMap = serde_json::from_str(&json)?;
        record = record.with_index_map(map);
    }

    let client = Arc::new(client);
    let reconciler = Reconciler::new(client.clone(), &schema);
    let outcome = reconciler.reconcile(&mut record).await?;
    let sets = client.sets();

    match format {
        OutputFormat::Human => {
            println!("Resource: {}", record.identity());
            println!("Outcome:  {}", outcome_label(&outcome));
            println!("Planned:  {}", SystemClock.now_rfc3339());
            for request in &sets {
                println!();
                print_request(request);
            }
            println!();
            let rows: Vec<Vec<String>> = record
                .conditions()
                .iter()
                .map(|c| {
                    vec![
                        c.kind.to_string(),
                        format!("{:?}", c.status),
                        c.reason.clone(),
                        c.message.clone(),
                    ]
                })
                .collect();
            print_table(&["CONDITION", "STATUS", "REASON", "MESSAGE"], &rows);
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "outcome": outcome,
                "sets": sets,
                "conditions": record.conditions(),
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    Ok(())
}

fn outcome_label(outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::Deleted => "deleted".to_string(),
        ReconcileOutcome::LocalLeafRefBlocked { failures } => {
            format!("blocked by {} local leaf-ref(s)", failures.len())
        }
        ReconcileOutcome::NotReady => "element cache not ready".to_string(),
        ReconcileOutcome::IndexRepaired { deleted } => {
            format!("deleted {} renamed entr(ies)", deleted.len())
        }
        ReconcileOutcome::ExternalLeafRefBlocked { failures } => {
            format!("blocked by {} external leaf-ref(s)", failures.len())
        }
        ReconcileOutcome::Created => "create".to_string(),
        ReconcileOutcome::Updated { delta } => format!(
            "update ({} update(s), {} delete(s))",
            delta.updates.len(),
            delta.deletes.len()
        ),
        ReconcileOutcome::UpToDate => "up to date".to_string(),
        ReconcileOutcome::Waiting { observation } => format!("waiting ({observation:?})"),
    }
}

fn print_request(request: &SetRequest) {
    println!(
        "Set {} at {}",
        request.envelope.action,
        if request.prefix.is_empty() {
            "/".to_string()
        } else {
            request.prefix.to_string()
        }
    );
    let rows: Vec<Vec<String>> = request
        .replace
        .iter()
        .map(|pv| vec!["replace".to_string(), pv.path.to_string(), pv.value.to_string()])
        .chain(
            request
                .updates
                .iter()
                .map(|pv| vec!["update".to_string(), pv.path.to_string(), pv.value.to_string()]),
        )
        .chain(
            request
                .deletes
                .iter()
                .map(|path| vec!["delete".to_string(), path.to_string(), String::new()]),
        )
        .collect();
    print_table(&["OP", "PATH", "VALUE"], &rows);
}
