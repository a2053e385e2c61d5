//! Subcommand implementations and the file loading they share.

pub mod diff;
pub mod flatten;
pub mod plan;
pub mod schema;
pub mod validate;

use std::path::Path as FsPath;

use netconverge::config::EngineConfig;
use netconverge::schema::{ResourceSchema, SchemaRegistry};
use netconverge::tree::ConfigTree;

use crate::cli::{ResourceArgs, SchemaSource};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Loads the registry named by --schema, or by the engine config.
pub fn load_registry(source: &SchemaSource) -> Result<SchemaRegistry, Box<dyn std::error::Error>> {
    if let Some(path) = &source.schema {
        return Ok(SchemaRegistry::load(path)?);
    }
    if let Some(path) = &source.config {
        let config = EngineConfig::load(path)?;
        if let Some(schema_path) = config.schema_path {
            return Ok(SchemaRegistry::load(schema_path)?);
        }
        return Err(format!("config file '{}' has no schema_path", path.display()).into());
    }
    Err("no schema given: pass --schema or set NETCONVERGE_SCHEMA".into())
}

/// Loads the schema of the requested kind together with the desired tree.
pub fn load_resource(
    args: &ResourceArgs,
) -> Result<(ResourceSchema, ConfigTree), Box<dyn std::error::Error>> {
    let registry = load_registry(&args.source)?;
    let schema = registry.get(&args.kind)?.clone();
    let desired = read_tree(&args.desired)?;
    Ok((schema, desired))
}

/// Reads a JSON file into a tree.
pub fn read_tree(path: &FsPath) -> Result<ConfigTree, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
    let tree = ConfigTree::from_json_str(&json)
        .map_err(|e| format!("invalid JSON in '{}': {e}", path.display()))?;
    tracing::debug!(path = %path.display(), "Loaded tree");
    Ok(tree)
}
