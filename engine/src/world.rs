//! The immutable interpreter state threaded through command execution.
//!
//! Every mutator takes the world by value and returns a new one; handlers
//! can therefore never leave a half-updated world behind — the caller gets
//! either a fresh consistent value or an error. Ownership transfers
//! linearly from one pipeline step to the next, which is what keeps the
//! whole engine lock-free.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use scen_common::{Number, ScenarioError};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::backend::{ChainBackend, Invokation};
use crate::invariant::{Expectation, Invariant, InvariantCategory};
use crate::printer::Printer;
use crate::registry::Registry;

/// Nested-dispatch recursion cap (composite arguments resolving through
/// further command resolution).
pub const MAX_DISPATCH_DEPTH: u32 = 64;

/// The zero address, also reachable in scripts as `Zero`.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// A named genesis account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub address: String,
}

/// A live contract known to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    pub name: String,
    pub address: String,
    pub block: u64,
}

/// Per-run settings; aliases persist through the networks settings file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub aliases: IndexMap<String, String>,
    pub verbose: bool,
    pub dry_run: bool,
    pub print_tx_logs: bool,
}

impl Settings {
    pub fn lookup_alias(&self, name: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
            .map(|(_, address)| address.as_str())
    }
}

/// One executed operation, most recent first in the world's log.
#[derive(Debug, Clone)]
pub struct Action {
    pub description: String,
    pub invokation: Option<Invokation>,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.invokation {
            Some(invokation) if !invokation.success => {
                write!(f, "{} (failed: {})", self.description, invokation.error_message())
            }
            _ => write!(f, "{}", self.description),
        }
    }
}

/// Versioned, immutable snapshot of the simulation state.
#[derive(Clone)]
pub struct World {
    pub network: String,
    pub accounts: Vec<Account>,
    /// Live contracts keyed by lowercased address.
    pub contract_index: IndexMap<String, ContractHandle>,
    /// Free-form nested key-path store mirroring the deployment manifest.
    pub contract_data: JsonValue,
    pub settings: Settings,
    pub actions: Vec<Action>,
    pub invariants: Vec<Invariant>,
    /// One-shot checks armed for the next event's post-conditions.
    pub expectations: Vec<Expectation>,
    /// Expectations registered during this event; they arm when the event's
    /// scratch clears, so the next event consumes them.
    pub pending_expectations: Vec<Expectation>,
    /// Categories suppressed for the current event's checks.
    pub held_invariants: BTreeSet<InvariantCategory>,
    /// Holds registered during this event; they take effect for the next
    /// event only, then auto-restore.
    pub pending_holds: BTreeSet<InvariantCategory>,
    pub last_contract: Option<ContractHandle>,
    pub base_path: Option<PathBuf>,

    // Per-transaction scratch, reset between top-level events.
    pub trx_from: Option<String>,
    pub trx_value: Option<Number>,
    pub last_invokation: Option<Invokation>,
    pub new_invokation: bool,
    pub dispatch_depth: u32,

    pub backend: Arc<dyn ChainBackend>,
    pub registry: Arc<Registry>,
    pub printer: Arc<dyn Printer>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("network", &self.network)
            .field("accounts", &self.accounts)
            .field("contract_index", &self.contract_index)
            .field("settings", &self.settings)
            .field("actions", &self.actions)
            .field("invariants", &self.invariants)
            .field("expectations", &self.expectations)
            .field("trx_from", &self.trx_from)
            .field("trx_value", &self.trx_value)
            .field("dispatch_depth", &self.dispatch_depth)
            .finish_non_exhaustive()
    }
}

impl World {
    pub fn init(
        network: impl Into<String>,
        accounts: Vec<Account>,
        backend: Arc<dyn ChainBackend>,
        registry: Arc<Registry>,
        printer: Arc<dyn Printer>,
    ) -> Self {
        Self {
            network: network.into(),
            accounts,
            contract_index: IndexMap::new(),
            contract_data: JsonValue::Object(JsonMap::new()),
            settings: Settings::default(),
            actions: Vec::new(),
            invariants: Vec::new(),
            expectations: Vec::new(),
            pending_expectations: Vec::new(),
            held_invariants: BTreeSet::new(),
            pending_holds: BTreeSet::new(),
            last_contract: None,
            base_path: None,
            trx_from: None,
            trx_value: None,
            last_invokation: None,
            new_invokation: false,
            dispatch_depth: 0,
            backend,
            registry,
            printer,
        }
    }

    pub fn with_base_path(mut self, base_path: PathBuf) -> Self {
        self.base_path = Some(base_path);
        self
    }

    /// The ambient sender: an explicit `From` override, the `Me` alias, or
    /// the first account.
    pub fn default_from(&self) -> Option<String> {
        if let Some(from) = &self.trx_from {
            return Some(from.clone());
        }
        if let Some(address) = self.settings.lookup_alias("Me") {
            return Some(address.to_owned());
        }
        self.accounts.first().map(|account| account.address.clone())
    }

    pub fn find_account(&self, name: &str) -> Option<&Account> {
        self.accounts
            .iter()
            .find(|account| account.name.eq_ignore_ascii_case(name))
    }

    pub fn contract_by_address(&self, address: &str) -> Option<&ContractHandle> {
        self.contract_index.get(&address.to_lowercase())
    }

    // ---- key-path store -------------------------------------------------

    /// Case-insensitive nested lookup into the contract data store.
    pub fn get_data(&self, path: &[&str]) -> Option<&JsonValue> {
        path.iter().try_fold(&self.contract_data, |doc, key| match doc {
            JsonValue::Object(map) => map
                .iter()
                .find(|(existing, _)| existing.trim().eq_ignore_ascii_case(key.trim()))
                .map(|(_, value)| value),
            _ => None,
        })
    }

    pub fn get_data_string(&self, path: &[&str]) -> Option<String> {
        self.get_data(path)
            .and_then(JsonValue::as_str)
            .map(str::to_owned)
    }

    /// Copy-on-write nested set: returns a new world with the value placed
    /// at the key path, creating intermediate objects as needed.
    pub fn set_data(mut self, path: &[&str], value: JsonValue) -> Self {
        set_path(&mut self.contract_data, path, value);
        self
    }

    /// Deep-merge a document (the loaded deployment manifest) into the
    /// store; objects merge recursively, anything else is replaced.
    pub fn merge_data(mut self, doc: JsonValue) -> Self {
        merge(&mut self.contract_data, doc);
        self
    }

    // ---- contracts ------------------------------------------------------

    /// Index a contract handle and remember it as the most recent one.
    pub fn register_contract(mut self, handle: ContractHandle) -> Self {
        self.contract_index
            .insert(handle.address.to_lowercase(), handle.clone());
        self.last_contract = Some(handle);
        self
    }

    // ---- actions & invokations ------------------------------------------

    /// Prepend an action to the audit log, recording its invokation as the
    /// latest one when present.
    pub fn add_action(mut self, description: impl Into<String>, invokation: Option<Invokation>) -> Self {
        let action = Action {
            description: description.into(),
            invokation: invokation.clone(),
        };
        log::info!("{}", action);
        self.actions.insert(0, action);
        if let Some(invokation) = invokation {
            self.last_invokation = Some(invokation);
            self.new_invokation = true;
        }
        self
    }

    pub fn update_settings(mut self, apply: impl FnOnce(&mut Settings)) -> Self {
        apply(&mut self.settings);
        self
    }

    // ---- per-event scratch ----------------------------------------------

    pub fn with_trx_from(mut self, from: Option<String>) -> Self {
        self.trx_from = from;
        self
    }

    pub fn with_trx_value(mut self, value: Option<Number>) -> Self {
        self.trx_value = value;
        self
    }

    /// Reset the one-shot per-transaction fields between top-level events,
    /// and promote holds registered during this event so they suppress the
    /// next event's checks.
    pub fn clear_event_scratch(mut self) -> Self {
        self.trx_from = None;
        self.trx_value = None;
        self.new_invokation = false;
        self.dispatch_depth = 0;
        self.held_invariants = std::mem::take(&mut self.pending_holds);
        let mut staged = std::mem::take(&mut self.pending_expectations);
        self.expectations.append(&mut staged);
        self
    }

    pub fn enter_dispatch(mut self) -> Result<Self, ScenarioError> {
        if self.dispatch_depth >= MAX_DISPATCH_DEPTH {
            return Err(ScenarioError::DepthExceeded {
                what: "nested dispatch",
                limit: MAX_DISPATCH_DEPTH,
            });
        }
        self.dispatch_depth += 1;
        Ok(self)
    }

    pub fn exit_dispatch(mut self) -> Self {
        self.dispatch_depth = self.dispatch_depth.saturating_sub(1);
        self
    }

    // ---- diagnostics ----------------------------------------------------

    /// Human-readable summary for `Inspect` and `Debug`.
    pub fn describe(&self) -> String {
        let contracts: Vec<String> = self
            .contract_index
            .values()
            .map(|handle| format!("{}: {}", handle.name, handle.address))
            .collect();
        format!(
            "World {{ network: {}, accounts: {}, aliases: {}, contracts: [{}], invariants: {}, expectations: {}, actions: {} }}",
            self.network,
            self.accounts.len(),
            self.settings.aliases.len(),
            contracts.join(", "),
            self.invariants.len(),
            self.expectations.len(),
            self.actions.len(),
        )
    }

    pub fn print_line(&self, line: &str) {
        self.printer.print_line(line);
    }
}

fn set_path(doc: &mut JsonValue, path: &[&str], value: JsonValue) {
    let Some((key, rest)) = path.split_first() else {
        *doc = value;
        return;
    };
    if !doc.is_object() {
        *doc = JsonValue::Object(JsonMap::new());
    }
    let map = doc.as_object_mut().expect("coerced to object above");
    // Reuse an existing key that differs only by case.
    let existing = map
        .keys()
        .find(|existing| existing.trim().eq_ignore_ascii_case(key.trim()))
        .cloned();
    let entry = map
        .entry(existing.unwrap_or_else(|| (*key).to_owned()))
        .or_insert(JsonValue::Object(JsonMap::new()));
    set_path(entry, rest, value);
}

fn merge(target: &mut JsonValue, incoming: JsonValue) {
    match (target, incoming) {
        (JsonValue::Object(target_map), JsonValue::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target, incoming) => *target = incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_world;
    use serde_json::json;

    #[test]
    fn set_data_returns_a_new_world_and_leaves_the_old_one_alone() {
        let world = test_world();
        let before = world.clone();

        let after = world.set_data(&["Contracts", "Counter"], json!("0xabc"));

        assert_eq!(before.get_data(&["Contracts", "Counter"]), None);
        assert_eq!(
            after.get_data_string(&["Contracts", "Counter"]).as_deref(),
            Some("0xabc")
        );
    }

    #[test]
    fn data_lookup_is_case_insensitive() {
        let world = test_world().set_data(&["Contracts", "Counter"], json!("0xabc"));
        assert_eq!(
            world.get_data_string(&["contracts", "COUNTER"]).as_deref(),
            Some("0xabc")
        );
    }

    #[test]
    fn set_data_reuses_existing_keys_differing_only_by_case() {
        let world = test_world()
            .set_data(&["Contracts", "Counter"], json!("0xabc"))
            .set_data(&["contracts", "Timer"], json!("0xdef"));
        let contracts = world.get_data(&["Contracts"]).unwrap().as_object().unwrap();
        assert_eq!(contracts.len(), 2);
    }

    #[test]
    fn merge_is_deep() {
        let world = test_world()
            .set_data(&["Contracts", "Counter"], json!("0xabc"))
            .merge_data(json!({"Contracts": {"Timer": "0xdef"}, "Blocks": {"Counter": 3}}));
        assert_eq!(world.get_data_string(&["Contracts", "Counter"]).as_deref(), Some("0xabc"));
        assert_eq!(world.get_data_string(&["Contracts", "Timer"]).as_deref(), Some("0xdef"));
        assert_eq!(world.get_data(&["Blocks", "Counter"]), Some(&json!(3)));
    }

    #[test]
    fn add_action_prepends_and_tracks_invokations() {
        let world = test_world()
            .add_action("first", None)
            .add_action("second", Some(Invokation::succeeded("did it")));
        assert_eq!(world.actions[0].description, "second");
        assert_eq!(world.actions[1].description, "first");
        assert!(world.new_invokation);
        assert!(world.last_invokation.as_ref().unwrap().success);
    }

    #[test]
    fn default_from_prefers_trx_override_then_me_alias() {
        let world = test_world();
        let first = world.accounts[0].address.clone();
        assert_eq!(world.default_from().as_deref(), Some(first.as_str()));

        let world = world.update_settings(|settings| {
            settings.aliases.insert("Me".to_owned(), "0xme".to_owned());
        });
        assert_eq!(world.default_from().as_deref(), Some("0xme"));

        let world = world.with_trx_from(Some("0xoverride".to_owned()));
        assert_eq!(world.default_from().as_deref(), Some("0xoverride"));
    }

    #[test]
    fn dispatch_depth_is_bounded() {
        let mut world = test_world();
        for _ in 0..MAX_DISPATCH_DEPTH {
            world = world.enter_dispatch().unwrap();
        }
        assert!(world.enter_dispatch().is_err());
    }

    #[test]
    fn clear_event_scratch_resets_one_shot_fields() {
        let world = test_world()
            .with_trx_from(Some("0xabc".to_owned()))
            .with_trx_value(Some(Number::exact(5)))
            .add_action("send", Some(Invokation::succeeded("send")));
        let world = world.clear_event_scratch();
        assert!(world.trx_from.is_none());
        assert!(world.trx_value.is_none());
        assert!(!world.new_invokation);
        // The last invokation itself is retained for later assertions.
        assert!(world.last_invokation.is_some());
    }
}
