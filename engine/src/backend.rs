//! The external chain collaborator, specified only at its boundary.
//!
//! The interpreter issues calls through [`ChainBackend`] and records the
//! outcome; it never validates chain state itself. Every call is a
//! suspension point with no interpreter-level timeout or cancellation.
//! [`SimBackend`] is a deterministic in-memory stand-in used by the tests
//! and as the repl default.

use std::collections::HashMap;

use async_trait::async_trait;
use scen_common::ScenarioError;
use tokio::sync::Mutex;

use crate::world::{Account, ContractHandle};

/// Starting balance handed to every named genesis account (1000 units at
/// the 1e18 scale).
pub const DEFAULT_BALANCE: u128 = 1_000_000_000_000_000_000_000;

/// The recorded outcome of one side-effecting call.
#[derive(Debug, Clone)]
pub struct Invokation {
    pub description: String,
    pub success: bool,
    pub error: Option<String>,
}

impl Invokation {
    pub fn succeeded(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(description: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

/// Boundary to whatever actually executes on-chain calls.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    async fn balance(&self, address: &str) -> Result<u128, ScenarioError>;

    /// Submit a value transfer. A rejected transfer is a *successful* call
    /// returning a failed [`Invokation`]; `Err` is reserved for the backend
    /// itself misbehaving.
    async fn transfer(&self, from: &str, to: &str, amount: u128)
        -> Result<Invokation, ScenarioError>;

    async fn deploy(&self, name: &str, from: &str) -> Result<ContractHandle, ScenarioError>;

    async fn mine_block(&self) -> Result<u64, ScenarioError>;

    async fn increase_time(&self, seconds: u64) -> Result<u64, ScenarioError>;

    async fn set_time(&self, timestamp: u64) -> Result<(), ScenarioError>;

    async fn block_number(&self) -> Result<u64, ScenarioError>;

    async fn timestamp(&self) -> Result<u64, ScenarioError>;
}

#[derive(Debug, Default)]
struct SimState {
    balances: HashMap<String, u128>,
    block: u64,
    time: u64,
    deployed: u64,
}

/// Deterministic in-memory chain: balances in a map, a monotonic block
/// height and a paused clock that only moves when a script asks it to.
pub struct SimBackend {
    accounts: Vec<Account>,
    state: Mutex<SimState>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::with_accounts(&["root", "alice", "bob", "carol"])
    }

    pub fn with_accounts(names: &[&str]) -> Self {
        let mut state = SimState::default();
        let accounts: Vec<Account> = names
            .iter()
            .enumerate()
            .map(|(index, name)| Account {
                name: (*name).to_owned(),
                address: derive_address(0x10, index as u64, name),
            })
            .collect();
        for account in &accounts {
            state.balances.insert(account.address.to_lowercase(), DEFAULT_BALANCE);
        }
        Self {
            accounts,
            state: Mutex::new(state),
        }
    }

    pub fn named_accounts(&self) -> Vec<Account> {
        self.accounts.clone()
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic 20-byte address: a tag byte, a counter, then the name.
fn derive_address(tag: u8, index: u64, name: &str) -> String {
    let mut bytes = [0u8; 20];
    bytes[0] = tag;
    bytes[1] = (index + 1) as u8;
    for (i, b) in name.bytes().take(18).enumerate() {
        bytes[i + 2] = b;
    }
    format!("0x{}", hex::encode(bytes))
}

#[async_trait]
impl ChainBackend for SimBackend {
    async fn balance(&self, address: &str) -> Result<u128, ScenarioError> {
        let state = self.state.lock().await;
        Ok(state.balances.get(&address.to_lowercase()).copied().unwrap_or(0))
    }

    async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: u128,
    ) -> Result<Invokation, ScenarioError> {
        let mut state = self.state.lock().await;
        let description = format!("transfer {} from {} to {}", amount, from, to);
        let from_key = from.to_lowercase();
        let to_key = to.to_lowercase();

        let available = state.balances.get(&from_key).copied().unwrap_or(0);
        if available < amount {
            return Ok(Invokation::failed(
                description,
                format!("insufficient balance: need {}, have {}", amount, available),
            ));
        }
        state.balances.insert(from_key, available - amount);
        let to_balance = state.balances.get(&to_key).copied().unwrap_or(0);
        state.balances.insert(
            to_key,
            to_balance.checked_add(amount).ok_or_else(|| {
                ScenarioError::Backend(format!("balance overflow crediting {}", to))
            })?,
        );
        Ok(Invokation::succeeded(description))
    }

    async fn deploy(&self, name: &str, _from: &str) -> Result<ContractHandle, ScenarioError> {
        let mut state = self.state.lock().await;
        state.deployed += 1;
        let address = derive_address(0xc0, state.deployed, name);
        state.balances.entry(address.to_lowercase()).or_insert(0);
        Ok(ContractHandle {
            name: name.to_owned(),
            address,
            block: state.block,
        })
    }

    async fn mine_block(&self) -> Result<u64, ScenarioError> {
        let mut state = self.state.lock().await;
        state.block += 1;
        Ok(state.block)
    }

    async fn increase_time(&self, seconds: u64) -> Result<u64, ScenarioError> {
        let mut state = self.state.lock().await;
        state.time = state.time.saturating_add(seconds);
        Ok(state.time)
    }

    async fn set_time(&self, timestamp: u64) -> Result<(), ScenarioError> {
        let mut state = self.state.lock().await;
        state.time = timestamp;
        Ok(())
    }

    async fn block_number(&self) -> Result<u64, ScenarioError> {
        Ok(self.state.lock().await.block)
    }

    async fn timestamp(&self) -> Result<u64, ScenarioError> {
        Ok(self.state.lock().await.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accounts_start_funded_with_deterministic_addresses() {
        let a = SimBackend::with_accounts(&["alice"]);
        let b = SimBackend::with_accounts(&["alice"]);
        let addr_a = a.named_accounts()[0].address.clone();
        assert_eq!(addr_a, b.named_accounts()[0].address);
        assert_eq!(a.balance(&addr_a).await.unwrap(), DEFAULT_BALANCE);
    }

    #[tokio::test]
    async fn transfer_moves_funds() {
        let sim = SimBackend::with_accounts(&["alice", "bob"]);
        let accounts = sim.named_accounts();
        let (alice, bob) = (&accounts[0].address, &accounts[1].address);

        let invokation = sim.transfer(alice, bob, 100).await.unwrap();
        assert!(invokation.success);
        assert_eq!(sim.balance(alice).await.unwrap(), DEFAULT_BALANCE - 100);
        assert_eq!(sim.balance(bob).await.unwrap(), DEFAULT_BALANCE + 100);
    }

    #[tokio::test]
    async fn insufficient_balance_is_a_failed_invokation_not_an_error() {
        let sim = SimBackend::with_accounts(&["alice", "bob"]);
        let accounts = sim.named_accounts();
        let invokation = sim
            .transfer(&accounts[0].address, &accounts[1].address, DEFAULT_BALANCE + 1)
            .await
            .unwrap();
        assert!(!invokation.success);
        assert!(invokation.error_message().contains("insufficient"));
        // Nothing moved.
        assert_eq!(sim.balance(&accounts[0].address).await.unwrap(), DEFAULT_BALANCE);
    }

    #[tokio::test]
    async fn deploys_get_fresh_addresses_and_the_current_block() {
        let sim = SimBackend::new();
        sim.mine_block().await.unwrap();
        let first = sim.deploy("Counter", "0x0").await.unwrap();
        let second = sim.deploy("Counter", "0x0").await.unwrap();
        assert_ne!(first.address, second.address);
        assert_eq!(first.block, 1);
    }

    #[tokio::test]
    async fn clock_only_moves_on_request() {
        let sim = SimBackend::new();
        assert_eq!(sim.timestamp().await.unwrap(), 0);
        sim.increase_time(3600).await.unwrap();
        assert_eq!(sim.timestamp().await.unwrap(), 3600);
        sim.set_time(42).await.unwrap();
        assert_eq!(sim.timestamp().await.unwrap(), 42);
    }
}
