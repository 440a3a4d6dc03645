//! Deployment manifest and per-network settings persistence.
//!
//! The manifest at `<base>/networks/<network>.json` maps logical contract
//! names to addresses, deployment blocks and constructor payloads; the
//! world mirrors it under `contract_data` at load time and writes back
//! through the same shape. A missing file reads as the empty document, and
//! nothing is written during a dry run.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use scen_common::ScenarioError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::world::{ContractHandle, World};

/// `<base>/networks/<network><suffix>.json`
pub fn network_path(base: &Path, network: &str, suffix: &str) -> PathBuf {
    base.join("networks").join(format!("{}{}.json", network, suffix))
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> ScenarioError {
    ScenarioError::Io(format!("{}: {}", path.display(), err))
}

/// Read a JSON document, treating a missing file as the empty document.
pub fn read_json(path: &Path) -> Result<JsonValue, ScenarioError> {
    if !path.exists() {
        return Ok(JsonValue::Object(JsonMap::new()));
    }
    let data = fs::read_to_string(path).map_err(|err| io_error(path, err))?;
    serde_json::from_str(&data).map_err(|err| io_error(path, err))
}

fn write_json(path: &Path, doc: &JsonValue) -> Result<(), ScenarioError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_error(path, err))?;
    }
    let data = serde_json::to_string_pretty(doc).map_err(|err| io_error(path, err))?;
    fs::write(path, data).map_err(|err| io_error(path, err))
}

/// Hydrate the world from the network's deployment manifest: the document
/// deep-merges into `contract_data` and every `Contracts` entry gets a live
/// handle in the contract index. Returns one `name: address` line per
/// loaded contract.
pub fn load_contracts(world: World) -> Result<(World, Vec<String>), ScenarioError> {
    let Some(base_path) = world.base_path.clone() else {
        return Ok((world, Vec::new()));
    };
    let doc = read_json(&network_path(&base_path, &world.network, ""))?;

    let mut info = Vec::new();
    let mut world = world;
    if let Some(contracts) = doc.get("Contracts").and_then(JsonValue::as_object) {
        for (name, address) in contracts {
            let Some(address) = address.as_str() else {
                continue;
            };
            let block = doc
                .get("Blocks")
                .and_then(|blocks| blocks.get(name))
                .and_then(JsonValue::as_u64)
                .unwrap_or(0);
            info.push(format!("{}: {}", name, address));
            world = world.register_contract(ContractHandle {
                name: name.clone(),
                address: address.to_owned(),
                block,
            });
        }
    }
    // Loaded handles should not count as "just deployed".
    world.last_contract = None;

    Ok((world.merge_data(doc), info))
}

/// Record a deployment in the world and write the manifest back, unless
/// this is a dry run.
pub fn store_and_save_contract(
    world: World,
    handle: ContractHandle,
) -> Result<World, ScenarioError> {
    let name = handle.name.clone();
    let world = world
        .register_contract(handle.clone())
        .set_data(&["Contracts", &name], json!(handle.address))
        .set_data(&["Blocks", &name], json!(handle.block));
    save_manifest(&world)?;
    Ok(world)
}

/// Write the world's contract data back to the manifest file.
pub fn save_manifest(world: &World) -> Result<(), ScenarioError> {
    let Some(base_path) = &world.base_path else {
        return Ok(());
    };
    if world.settings.dry_run {
        return Ok(());
    }
    write_json(
        &network_path(base_path, &world.network, ""),
        &world.contract_data,
    )
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    aliases: IndexMap<String, String>,
}

/// Load persisted aliases from `<network>-settings.json`.
pub fn load_settings(world: World) -> Result<World, ScenarioError> {
    let Some(base_path) = world.base_path.clone() else {
        return Ok(world);
    };
    let path = network_path(&base_path, &world.network, "-settings");
    let doc = read_json(&path)?;
    let file: SettingsFile =
        serde_json::from_value(doc).map_err(|err| io_error(&path, err))?;
    Ok(world.update_settings(|settings| {
        for (name, address) in file.aliases {
            settings.aliases.insert(name, address);
        }
    }))
}

/// Persist aliases, unless this is a dry run.
pub fn save_settings(world: &World) -> Result<(), ScenarioError> {
    let Some(base_path) = &world.base_path else {
        return Ok(());
    };
    if world.settings.dry_run {
        return Ok(());
    }
    let file = SettingsFile {
        aliases: world.settings.aliases.clone(),
    };
    write_json(
        &network_path(base_path, &world.network, "-settings"),
        &serde_json::to_value(&file)
            .map_err(|err| ScenarioError::Io(err.to_string()))?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimBackend;
    use crate::printer::BufferPrinter;
    use crate::registry::Registry;
    use std::sync::Arc;

    fn world_at(base: &Path) -> World {
        let backend = Arc::new(SimBackend::new());
        let accounts = backend.named_accounts();
        World::init(
            "testnet",
            accounts,
            backend,
            Arc::new(Registry::core()),
            Arc::new(BufferPrinter::new()),
        )
        .with_base_path(base.to_path_buf())
    }

    #[test]
    fn missing_manifest_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (world, info) = load_contracts(world_at(dir.path())).unwrap();
        assert!(info.is_empty());
        assert!(world.contract_index.is_empty());
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let world = world_at(dir.path());
        let world = store_and_save_contract(
            world,
            ContractHandle {
                name: "Counter".to_owned(),
                address: "0xc001".to_owned(),
                block: 7,
            },
        )
        .unwrap();
        assert_eq!(
            world.get_data_string(&["Contracts", "Counter"]).as_deref(),
            Some("0xc001")
        );

        // A fresh world sees the persisted manifest.
        let (reloaded, info) = load_contracts(world_at(dir.path())).unwrap();
        assert_eq!(info, vec!["Counter: 0xc001".to_owned()]);
        let handle = reloaded.contract_by_address("0xc001").unwrap();
        assert_eq!(handle.name, "Counter");
        assert_eq!(handle.block, 7);
        assert!(reloaded.last_contract.is_none());
    }

    #[test]
    fn dry_run_skips_writes() {
        let dir = tempfile::tempdir().unwrap();
        let world = world_at(dir.path()).update_settings(|settings| settings.dry_run = true);
        store_and_save_contract(
            world,
            ContractHandle {
                name: "Counter".to_owned(),
                address: "0xc001".to_owned(),
                block: 0,
            },
        )
        .unwrap();
        assert!(!network_path(dir.path(), "testnet", "").exists());
    }

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let world = world_at(dir.path()).update_settings(|settings| {
            settings.aliases.insert("Me".to_owned(), "0xme".to_owned());
        });
        save_settings(&world).unwrap();

        let reloaded = load_settings(world_at(dir.path())).unwrap();
        assert_eq!(reloaded.settings.lookup_alias("me"), Some("0xme"));
    }
}
