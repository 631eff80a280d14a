//! Database connection
//!
//! A connection holds one or more attached schemas and is the boundary the
//! replication layer sees. Every operation names its schema; an unknown
//! schema is `NotFound`.
//!
//! Leader mode resolves its plugin in a [`ReplicationRegistry`]: the one given
//! to [`Connection::with_registry`], or the process-wide [`global`] registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::checkpoint::{CheckpointMode, CheckpointResult};
use super::config::EngineConfig;
use super::schema::Schema;
use crate::replication::{
    global, FaultInjector, FrameBatch, ReplicationError, ReplicationRegistry, ReplicationResult,
    SessionArg, SessionContext,
};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A connection to an in-process page database.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    config: EngineConfig,
    registry: Option<Arc<ReplicationRegistry>>,
    schemas: HashMap<String, Schema>,
}

impl Connection {
    /// Open a connection resolving plugins in the global registry.
    pub fn open(config: EngineConfig) -> ReplicationResult<Self> {
        Self::build(config, None)
    }

    /// Open a connection resolving plugins in `registry`.
    pub fn with_registry(
        config: EngineConfig,
        registry: Arc<ReplicationRegistry>,
    ) -> ReplicationResult<Self> {
        Self::build(config, Some(registry))
    }

    fn build(
        config: EngineConfig,
        registry: Option<Arc<ReplicationRegistry>>,
    ) -> ReplicationResult<Self> {
        config.validate()?;

        let mut conn = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            config,
            registry,
            schemas: HashMap::new(),
        };
        let default_schema = conn.config.default_schema.clone();
        conn.attach(&default_schema)?;
        Ok(conn)
    }

    /// Connection identity, also the session argument of its leader sessions.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Attach an empty schema.
    pub fn attach(&mut self, schema: &str) -> ReplicationResult<()> {
        if schema.is_empty() {
            return Err(ReplicationError::contract_violation("schema name must not be empty"));
        }
        if self.schemas.contains_key(schema) {
            return Err(ReplicationError::contract_violation(format!(
                "schema {} is already attached",
                schema
            )));
        }
        self.schemas.insert(
            schema.to_string(),
            Schema::new(schema, self.config.page_size, self.config.wal_autocheckpoint),
        );
        Ok(())
    }

    /// Names of the attached schemas, sorted.
    pub fn schemas(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    fn schema(&self, schema: &str) -> ReplicationResult<&Schema> {
        self.schemas
            .get(schema)
            .ok_or_else(|| ReplicationError::not_found(format!("no such schema: {}", schema)))
    }

    fn schema_mut(&mut self, schema: &str) -> ReplicationResult<&mut Schema> {
        self.schemas
            .get_mut(schema)
            .ok_or_else(|| ReplicationError::not_found(format!("no such schema: {}", schema)))
    }

    fn registry(&self) -> &ReplicationRegistry {
        match &self.registry {
            Some(registry) => registry,
            None => global(),
        }
    }

    // =======================================================================
    // Replication mode
    // =======================================================================

    /// Make `schema` a replication leader driven by the plugin named `name`,
    /// or by the registry's default plugin when `name` is `None`.
    ///
    /// `arg` is handed back to the plugin on every hook call; it defaults to
    /// the connection id. The session starts fresh, armed from
    /// `WALHOOK_FAULT` if set.
    pub fn enable_leader(
        &mut self,
        schema: &str,
        name: Option<&str>,
        arg: Option<SessionArg>,
    ) -> ReplicationResult<()> {
        let plugin = self.registry().find(name).ok_or_else(|| {
            ReplicationError::not_found(match name {
                Some(name) => format!("no replication plugin named {}", name),
                None => "no default replication plugin".to_string(),
            })
        })?;

        let mut session = SessionContext::new(arg.unwrap_or(SessionArg(self.id)));
        *session.faults_mut() = FaultInjector::from_env()?;
        self.schema_mut(schema)?.enable_leader(plugin, session)
    }

    /// Make `schema` a replication follower.
    pub fn enable_follower(&mut self, schema: &str) -> ReplicationResult<()> {
        self.schema_mut(schema)?.enable_follower()
    }

    /// Turn replication off for `schema`.
    pub fn disable(&mut self, schema: &str) -> ReplicationResult<()> {
        self.schema_mut(schema)?.disable()
    }

    /// `(enabled, plugin name)`; followers report no plugin.
    pub fn is_enabled(&self, schema: &str) -> ReplicationResult<(bool, Option<String>)> {
        Ok(self.schema(schema)?.is_enabled())
    }

    /// Session context of a leader schema.
    pub fn session(&self, schema: &str) -> ReplicationResult<&SessionContext> {
        self.schema(schema)?
            .session()
            .ok_or_else(|| not_leader(schema))
    }

    /// Mutable session context of a leader schema, e.g. to attach a sink or
    /// arm a fault.
    pub fn session_mut(&mut self, schema: &str) -> ReplicationResult<&mut SessionContext> {
        self.schema_mut(schema)?
            .session_mut()
            .ok_or_else(|| not_leader(schema))
    }

    // =======================================================================
    // Write transactions
    // =======================================================================

    pub fn begin(&mut self, schema: &str) -> ReplicationResult<()> {
        self.schema_mut(schema)?.begin()
    }

    /// Stage one page image in the open transaction.
    pub fn write_page(&mut self, schema: &str, page_number: u32, data: &[u8]) -> ReplicationResult<()> {
        self.schema_mut(schema)?.write_page(page_number, data)
    }

    /// Shrink the database to `size` pages when the transaction commits.
    pub fn truncate(&mut self, schema: &str, size: u32) -> ReplicationResult<()> {
        self.schema_mut(schema)?.truncate(size)
    }

    /// Spill the dirty pages of the open transaction as one non-commit batch.
    pub fn flush(&mut self, schema: &str) -> ReplicationResult<()> {
        self.schema_mut(schema)?.flush()
    }

    pub fn commit(&mut self, schema: &str) -> ReplicationResult<()> {
        self.schema_mut(schema)?.commit()
    }

    pub fn rollback(&mut self, schema: &str) -> ReplicationResult<()> {
        self.schema_mut(schema)?.rollback()
    }

    pub fn in_transaction(&self, schema: &str) -> ReplicationResult<bool> {
        Ok(self.schema(schema)?.in_transaction())
    }

    // =======================================================================
    // Reads
    // =======================================================================

    /// Latest visible image of a page, `None` past the end of the database.
    pub fn read_page(&self, schema: &str, page_number: u32) -> ReplicationResult<Option<Vec<u8>>> {
        Ok(self.schema(schema)?.read_page(page_number))
    }

    /// Database size in pages.
    pub fn page_count(&self, schema: &str) -> ReplicationResult<u32> {
        Ok(self.schema(schema)?.page_count())
    }

    // =======================================================================
    // Follower apply path
    // =======================================================================

    pub fn apply_frames(&mut self, schema: &str, batch: &FrameBatch) -> ReplicationResult<()> {
        self.schema_mut(schema)?.apply_frames(batch)
    }

    pub fn apply_undo(&mut self, schema: &str) -> ReplicationResult<()> {
        self.schema_mut(schema)?.apply_undo()
    }

    // =======================================================================
    // Checkpoint
    // =======================================================================

    pub fn checkpoint(&mut self, schema: &str, mode: CheckpointMode) -> ReplicationResult<CheckpointResult> {
        self.schema_mut(schema)?.checkpoint(mode)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for schema in self.schemas.values_mut() {
            if schema.in_transaction() {
                info!(connection = self.id, schema = %schema.name(), "rolling back open transaction on close");
                if let Err(err) = schema.rollback() {
                    warn!(connection = self.id, schema = %schema.name(), code = %err.code, "rollback on close failed");
                }
            }
        }
    }
}

fn not_leader(schema: &str) -> ReplicationError {
    ReplicationError::not_leader(format!("schema {} is not a replication leader", schema))
}
