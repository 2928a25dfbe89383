use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sled::Db;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::Record;
use crate::query::Query;

/// Envelope keys owned by the store; patches can't overwrite them.
const RESERVED_KEYS: &[&str] = &["id", "version", "createdAt", "updatedAt"];

/// Document store over Sled: one tree per collection, JSON values keyed by id.
#[derive(Clone)] // Clone for sharing across handlers (Sled internals cheap to clone)
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open or create the Sled database at the given path
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        tracing::info!(path, "opened document store");
        Ok(Self { db })
    }

    /// In-memory store removed on drop, for tests and throwaway runs.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn tree(&self, collection: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(collection)?)
    }

    /// Insert a new document under a fresh uuid.
    pub fn insert<T>(&self, collection: &str, data: T) -> Result<Record<T>, StoreError>
    where
        T: Serialize,
    {
        let id = Uuid::new_v4().to_string();
        self.put(collection, &id, data)
    }

    /// Create or replace the document at `id`. Used where the id is chosen by
    /// the caller, e.g. `users/{uid}`.
    pub fn put<T>(&self, collection: &str, id: &str, data: T) -> Result<Record<T>, StoreError>
    where
        T: Serialize,
    {
        let now = Utc::now();
        let record = Record {
            id: id.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            data,
        };
        let bytes = serde_json::to_vec(&record)?;
        self.tree(collection)?.insert(id.as_bytes(), bytes)?;
        tracing::debug!(collection, id, "document written");
        Ok(record)
    }

    pub fn get<T>(&self, collection: &str, id: &str) -> Result<Option<Record<T>>, StoreError>
    where
        T: DeserializeOwned,
    {
        match self.tree(collection)?.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Run a query over every document in the collection.
    pub fn find<T>(&self, collection: &str, query: &Query) -> Result<Vec<Record<T>>, StoreError>
    where
        T: DeserializeOwned,
    {
        let mut docs = vec![];
        for item in self.tree(collection)?.iter() {
            let (_, value) = item?;
            docs.push(serde_json::from_slice::<Value>(&value)?);
        }
        query
            .apply(docs)
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    pub fn all<T>(&self, collection: &str) -> Result<Vec<Record<T>>, StoreError>
    where
        T: DeserializeOwned,
    {
        self.find(collection, &Query::new())
    }

    /// Merge `patch`'s top-level fields into the stored document.
    ///
    /// The merged document must still deserialize as `T`. When
    /// `expected_version` is given it must equal the stored version; otherwise
    /// the last writer wins. The swap is atomic per document.
    pub fn update<T>(
        &self,
        collection: &'static str,
        id: &str,
        patch: Value,
        expected_version: Option<u64>,
    ) -> Result<Record<T>, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let patch = match patch {
            Value::Object(map) => map,
            _ => return Err(StoreError::Invalid("update patch must be an object".into())),
        };
        let tree = self.tree(collection)?;

        // Read, merge, compare-and-swap against the exact bytes we read
        loop {
            let current = tree
                .get(id.as_bytes())?
                .ok_or_else(|| StoreError::not_found(entity_name(collection), id))?;
            let mut doc: Map<String, Value> = serde_json::from_slice(&current)?;

            let found = doc.get("version").and_then(Value::as_u64).unwrap_or(0);
            // Checked on every retry: a racing writer bumps the version
            if let Some(expected) = expected_version {
                if expected != found {
                    return Err(StoreError::Conflict {
                        entity: entity_name(collection),
                        id: id.to_string(),
                        expected,
                        found,
                    });
                }
            }

            // Shallow merge; id, version and timestamps stay server-owned
            for (key, value) in &patch {
                if !RESERVED_KEYS.contains(&key.as_str()) {
                    doc.insert(key.clone(), value.clone());
                }
            }
            doc.insert("version".into(), Value::from(found + 1));
            doc.insert("updatedAt".into(), serde_json::to_value(Utc::now())?);

            let record: Record<T> = serde_json::from_value(Value::Object(doc))
                .map_err(|e| StoreError::Invalid(format!("{} document: {}", entity_name(collection), e)))?;
            let bytes = serde_json::to_vec(&record)?;

            match tree.compare_and_swap(id.as_bytes(), Some(&current), Some(bytes))? {
                Ok(()) => {
                    tracing::debug!(collection, id, version = record.version, "document updated");
                    return Ok(record);
                }
                // Lost a race with another writer; re-read and merge again
                Err(_) => continue,
            }
        }
    }

    /// Remove a document. Returns whether it existed.
    pub fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let existed = self.tree(collection)?.remove(id.as_bytes())?.is_some();
        tracing::debug!(collection, id, existed, "document removed");
        Ok(existed)
    }

    pub fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self.tree(collection)?.len())
    }

    /// Atomically point `key` at `value` in a unique index tree. Returns false
    /// when the key is already taken (the existing entry is left untouched).
    pub fn claim_unique(&self, index: &str, key: &str, value: &str) -> Result<bool, StoreError> {
        let claimed = self
            .tree(index)?
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value.as_bytes()))?
            .is_ok();
        tracing::debug!(index, key, claimed, "unique claim");
        Ok(claimed)
    }

    pub fn lookup_unique(&self, index: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .tree(index)?
            .get(key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Drop a claim, but only if it still points at `value`.
    pub fn release_unique(&self, index: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let _ = self
            .tree(index)?
            .compare_and_swap(key.as_bytes(), Some(value.as_bytes()), None as Option<&[u8]>)?;
        Ok(())
    }
}

/// Singular entity name for error messages.
pub fn entity_name(collection: &'static str) -> &'static str {
    match collection {
        "villas" => "villa",
        "collections" => "collection",
        "offers" => "offer",
        "destinations" => "destination",
        "stars" => "celebrity stay",
        "slides" => "slide",
        "bookings" => "booking",
        "users" => "user",
        other => other,
    }
}
