//! Application context - wires everything together

use crate::config::AppConfig;
use crate::layers::JournalLayer;
use fundtrail_bus::{EventBus, LogPort};
use fundtrail_events::JournalStore;
use fundtrail_ledger::{LedgerStore, WalletLedger};
use fundtrail_requests::{BudgetRequestStateMachine, RequestStore};
use fundtrail_verify::VerificationService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Application context - wires together all components
///
/// Layout under the data directory:
/// - `journal/` - JSONL ledger journal (source of truth for wallets)
/// - `requests.db` - SQLite request store
pub struct AppContext {
    pub config: AppConfig,
    pub bus: Arc<EventBus>,
    pub journal: Arc<JournalStore>,
    pub ledger: Arc<WalletLedger>,
    pub requests: BudgetRequestStateMachine,
    pub verifier: VerificationService,
    data_path: PathBuf,
    journal_path: PathBuf,
}

impl AppContext {
    /// Create a new application context, replaying the journal
    pub fn new(data_path: impl AsRef<Path>, config: AppConfig) -> Result<Self, anyhow::Error> {
        let data_path = data_path.as_ref().to_path_buf();
        let journal_path = data_path.join("journal");
        std::fs::create_dir_all(&journal_path)?;

        let bus = Arc::new(EventBus::new());
        if config.log_notifications {
            bus.register(Arc::new(LogPort));
        }

        let journal = Arc::new(JournalStore::open(&journal_path)?);
        let store: Arc<dyn LedgerStore> = journal.clone();

        let ledger = Arc::new(WalletLedger::open(
            store.clone(),
            bus.clone(),
            config.ledger_config(),
        )?);

        let request_store = RequestStore::new(data_path.join("requests.db"))?;
        let requests = BudgetRequestStateMachine::new(
            request_store,
            ledger.clone(),
            bus.clone(),
            config.machine_config()?,
        );

        let recovered = requests.reconcile()?;
        if recovered > 0 {
            warn!(recovered, "Request states recovered from the ledger");
        }

        let verifier = VerificationService::new(store, bus.clone())
            .with_reader(Arc::new(JournalLayer::new(&journal_path)));

        info!(
            data = %data_path.display(),
            last_sequence = ledger.last_sequence()?,
            ceiling = %config.budget_ceiling,
            "Fundtrail context ready"
        );

        Ok(Self {
            config,
            bus,
            journal,
            ledger,
            requests,
            verifier,
            data_path,
            journal_path,
        })
    }

    /// Get the data directory path
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Get the journal directory path
    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Sequence of the last committed ledger record (0 when empty)
    pub fn last_sequence(&self) -> Result<u64, anyhow::Error> {
        Ok(self.ledger.last_sequence()?)
    }
}
