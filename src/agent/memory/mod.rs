pub mod index;
pub mod store;

pub use index::MemoryIndex;
pub use store::{MemoryRecord, MemoryStore};

use anyhow::Result;
use tracing::{info, warn};

/// Long-term memory: the CSV table plus its similarity index.
pub struct Memory {
    store: MemoryStore,
    index: MemoryIndex,
}

impl Memory {
    /// Open the table and index every existing row.
    pub async fn open(store: MemoryStore, index: MemoryIndex) -> Result<Self> {
        let records = store.read_all()?;
        let count = records.len();
        index
            .extend(records.iter().map(MemoryRecord::document).collect())
            .await;
        info!("memory loaded: {} records from {}", count, store.path().display());
        Ok(Self { store, index })
    }

    pub async fn remember(&self, user: &str, content: &str) -> Result<()> {
        let record = MemoryRecord::new(user, content);
        self.store.append(&record)?;
        self.index.insert(record.document()).await;
        Ok(())
    }

    /// Up to `n` remembered documents relevant to `user` and `query`.
    /// Retrieval failures are logged and yield nothing.
    pub async fn recall(&self, n: usize, user: &str, query: &str) -> Vec<String> {
        match self.index.search(&format!("{} {}", user, query), n).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("memory recall failed: {}", e);
                Vec::new()
            }
        }
    }

    pub fn index(&self) -> &MemoryIndex {
        &self.index
    }
}
