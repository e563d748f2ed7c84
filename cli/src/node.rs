//! Local node: engine state plus the simulated host, backed by sled

use cohort_core::{BlockContext, InMemoryTokens, PermissionTable};
use cohort_storage::{Batch, StateStore};
use governance::{GovernanceEngine, InMemoryHost, VotingSettings};

use crate::config::Config;

const TOKENS_BLOB: &str = "tokens";
const HOST_BLOB: &str = "host";

pub type Engine = GovernanceEngine<InMemoryTokens, InMemoryHost>;

pub struct Node {
    store: StateStore,
    pub engine: Engine,
    pub permissions: PermissionTable,
    pub defaults: VotingSettings,
}

impl Node {
    pub fn open(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;
        let store = StateStore::open(&data_dir)?;

        let upgraded = store.migrate()?;
        if upgraded > 0 {
            println!("🔄 Upgraded {} stored group record(s)", upgraded);
        }

        let state = store.load()?.unwrap_or_default();
        let tokens: InMemoryTokens = store.load_blob(TOKENS_BLOB)?.unwrap_or_default();
        let host: InMemoryHost = store.load_blob(HOST_BLOB)?.unwrap_or_default();
        log::debug!("Opened node at {}", data_dir.display());

        Ok(Self {
            store,
            engine: GovernanceEngine::from_state(state, tokens, host, config.engine_options()),
            permissions: config.permission_table(),
            defaults: config.voting.settings()?,
        })
    }

    /// Last committed block context
    pub fn clock(&self) -> BlockContext {
        self.engine.state().clock
    }

    /// Persist engine state, tokens and host balances in one commit
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let batch = Batch::new()
            .state(self.engine.state())?
            .blob(TOKENS_BLOB, self.engine.tokens())?
            .blob(HOST_BLOB, self.engine.host())?;
        self.store.commit(batch)?;
        Ok(())
    }
}
