use crate::domain::cart::{Cart, CartId};
use crate::domain::ports::{CartStore, ProcessorStore, SessionStore};
use crate::domain::processor::{ProcessorId, ProcessorRecord};
use crate::domain::session::{SessionId, SessionState};
use crate::error::{CartError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for cart documents keyed by cart id.
pub const CF_CARTS: &str = "carts";
/// Column Family mapping a cart's reference code to its id.
pub const CF_CART_REFS: &str = "cart_refs";
/// Column Family for processor records keyed by processor id.
pub const CF_PROCESSORS: &str = "processors";
/// Column Family mapping a processor identifier to its id.
pub const CF_PROCESSOR_IDS: &str = "processor_ids";
/// Column Family for session state keyed by session id.
pub const CF_SESSIONS: &str = "sessions";

const COLUMN_FAMILIES: [&str; 5] = [CF_CARTS, CF_CART_REFS, CF_PROCESSORS, CF_PROCESSOR_IDS, CF_SESSIONS];

/// A persistent store implementation using RocksDB.
///
/// Carts, processor records and sessions live in separate Column Families as
/// JSON documents. Secondary lookups go through small index families that are
/// written in the same batch as the document.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any
    /// missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            CartError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, batch: &mut WriteBatch, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn all_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn index_lookup(&self, cf_name: &str, key: &str) -> Result<Option<String>> {
        let cf = self.cf(cf_name)?;
        Ok(self
            .db
            .get_cf(cf, key.as_bytes())?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[async_trait]
impl CartStore for RocksDBStore {
    async fn store(&self, cart: Cart) -> Result<()> {
        let key = cart.id.to_string();
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_CARTS, key.as_bytes(), &cart)?;
        if let Some(reference_code) = &cart.reference_code {
            let refs = self.cf(CF_CART_REFS)?;
            batch.put_cf(refs, reference_code.as_bytes(), key.as_bytes());
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: CartId) -> Result<Option<Cart>> {
        self.get_json(CF_CARTS, id.to_string().as_bytes())
    }

    async fn find_by_reference_code(&self, reference_code: &str) -> Result<Option<Cart>> {
        let Some(id) = self.index_lookup(CF_CART_REFS, reference_code)? else {
            return Ok(None);
        };
        let cart: Option<Cart> = self.get_json(CF_CARTS, id.as_bytes())?;
        // The index is never pruned, so a cart whose code changed may still be listed.
        Ok(cart.filter(|c| c.reference_code.as_deref() == Some(reference_code)))
    }

    async fn get_all(&self) -> Result<Vec<Cart>> {
        self.all_json(CF_CARTS)
    }
}

#[async_trait]
impl ProcessorStore for RocksDBStore {
    async fn store(&self, processor: ProcessorRecord) -> Result<()> {
        let key = processor.id.to_string();
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_PROCESSORS, key.as_bytes(), &processor)?;
        let ids = self.cf(CF_PROCESSOR_IDS)?;
        batch.put_cf(ids, processor.identifier.as_bytes(), key.as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: ProcessorId) -> Result<Option<ProcessorRecord>> {
        self.get_json(CF_PROCESSORS, id.to_string().as_bytes())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<ProcessorRecord>> {
        let Some(id) = self.index_lookup(CF_PROCESSOR_IDS, identifier)? else {
            return Ok(None);
        };
        let record: Option<ProcessorRecord> = self.get_json(CF_PROCESSORS, id.as_bytes())?;
        Ok(record.filter(|r| r.identifier == identifier))
    }

    async fn get_all(&self) -> Result<Vec<ProcessorRecord>> {
        self.all_json(CF_PROCESSORS)
    }
}

#[async_trait]
impl SessionStore for RocksDBStore {
    async fn load(&self, session: &SessionId) -> Result<SessionState> {
        Ok(self
            .get_json(CF_SESSIONS, session.0.as_bytes())?
            .unwrap_or_default())
    }

    async fn store(&self, session: &SessionId, state: SessionState) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_SESSIONS, session.0.as_bytes(), &state)?;
        self.db.write(batch)?;
        Ok(())
    }
}
