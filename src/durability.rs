use crate::config::DurabilityConfig;
use crate::storage::{Logger, PageCache};
use crate::transaction::TransactionManager;
use anyhow::{Context, Result};
use log::info;

/// The three durability primitives opened from one path prefix.
///
/// They stay independent: this type only creates, opens and closes them
/// together. Recovery code sequences log replay against the page cache and
/// the transaction registry itself.
pub struct Durability {
    pub pages: PageCache,
    pub log: Logger,
    pub xids: TransactionManager,
}

impl Durability {
    /// Create fresh page, log and xid files. Fails if any of them exists.
    pub fn create(config: &DurabilityConfig) -> Result<Self> {
        let prefix = config.prefix();
        let pages = PageCache::create(prefix, config.memory_budget)
            .with_context(|| format!("Failed to create page file {:?}", config.page_path()))?;
        let log = Logger::create(prefix)
            .with_context(|| format!("Failed to create log {:?}", config.log_path()))?;
        let xids = TransactionManager::create(prefix)
            .with_context(|| format!("Failed to create xid file {:?}", config.xid_path()))?;

        info!("created durability files at {:?}", prefix);
        Ok(Self { pages, log, xids })
    }

    /// Open existing files. The log drops any bad tail while opening.
    pub fn open(config: &DurabilityConfig) -> Result<Self> {
        let prefix = config.prefix();
        let pages = PageCache::open(prefix, config.memory_budget)
            .with_context(|| format!("Failed to open page file {:?}", config.page_path()))?;
        let log = Logger::open(prefix)
            .with_context(|| format!("Failed to open log {:?}", config.log_path()))?;
        let xids = TransactionManager::open(prefix)
            .with_context(|| format!("Failed to open xid file {:?}", config.xid_path()))?;

        info!(
            "opened durability files at {:?}: {} pages, {} transactions",
            prefix,
            pages.page_number(),
            xids.transaction_count()
        );
        Ok(Self { pages, log, xids })
    }

    /// Flush dirty pages and close all three files.
    pub fn close(self) -> Result<()> {
        self.pages.close().context("Failed to close page cache")?;
        self.log.close().context("Failed to close log")?;
        self.xids.close().context("Failed to close xid file")?;
        Ok(())
    }
}
