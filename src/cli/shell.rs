//! Replication test shell
//!
//! Holds one leader and one follower connection plus the two reference
//! plugins, `"test"` (forwarding) and `"test-alt"` (no-op), in a private
//! registry. Each request is one JSON object tagged by `op`:
//!
//! ```text
//! {"op":"register","default":true}          {"op":"find","name":"test-alt"}
//! {"op":"enable_leader"}                    {"op":"enable_follower"}
//! {"op":"forward"} {"op":"unforward"}      {"op":"inject","fault":"frames:IOERR_LEADERSHIP_LOST"}
//! {"op":"begin"} {"op":"write","page":1,"fill":7} {"op":"commit"}
//! {"op":"read","role":"follower","page":1}  {"op":"checkpoint","mode":"truncate"}
//! ```
//!
//! `schema` defaults to the configured default schema, `role` to `leader`.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::errors::{CliError, CliResult};
use super::io::{read_lines, write_error, write_response};
use crate::engine::{frame_checksum, CheckpointMode, Connection, EngineConfig, FollowerSink};
use crate::replication::{
    ErrorCode, FaultInjector, ForwardingReplication, HookMethod, NoopReplication,
    ReplicationError, ReplicationRegistry, ReplicationResult, WalReplication, NOOP_ALT_NAME,
};

/// Which of the shell's connections a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Leader,
    Follower,
}

/// One shell request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Register `"test"`, or `"test-alt"` with `alt`
    Register {
        #[serde(default)]
        default: bool,
        #[serde(default)]
        alt: bool,
    },
    Unregister {
        #[serde(default)]
        alt: bool,
    },
    /// Name of the plugin `name` resolves to, or of the default
    Find { name: Option<String> },
    EnableLeader {
        schema: Option<String>,
        name: Option<String>,
    },
    EnableFollower { schema: Option<String> },
    /// Forward the leader session into the follower's schema
    Forward { schema: Option<String> },
    /// Stop forwarding the leader session
    Unforward { schema: Option<String> },
    Disable {
        #[serde(default)]
        role: Role,
        schema: Option<String>,
    },
    IsEnabled {
        #[serde(default)]
        role: Role,
        schema: Option<String>,
    },
    Begin { schema: Option<String> },
    /// Stage page `page` filled with the byte `fill`
    Write {
        schema: Option<String>,
        page: u32,
        fill: u8,
    },
    Truncate { schema: Option<String>, size: u32 },
    Flush { schema: Option<String> },
    Commit { schema: Option<String> },
    Rollback { schema: Option<String> },
    /// Checksum of a page, null past the end of the database
    Read {
        #[serde(default)]
        role: Role,
        schema: Option<String>,
        page: u32,
    },
    PageCount {
        #[serde(default)]
        role: Role,
        schema: Option<String>,
    },
    Checkpoint {
        #[serde(default)]
        role: Role,
        schema: Option<String>,
        #[serde(default)]
        mode: CheckpointMode,
    },
    /// Arm the leader session with a `method:CODE` fault
    Inject {
        schema: Option<String>,
        fault: String,
    },
    /// Phase, pending fault and counters of the leader session
    Session { schema: Option<String> },
}

/// Shell state.
pub struct Shell {
    config: EngineConfig,
    registry: Arc<ReplicationRegistry>,
    plugin: Arc<dyn WalReplication>,
    alt: Arc<dyn WalReplication>,
    leader: Connection,
    follower: Arc<Mutex<Connection>>,
}

impl Shell {
    pub fn new(config: EngineConfig) -> ReplicationResult<Self> {
        let registry = Arc::new(ReplicationRegistry::new());
        let leader = Connection::with_registry(config.clone(), registry.clone())?;
        let follower = Connection::with_registry(config.clone(), registry.clone())?;

        Ok(Self {
            config,
            registry,
            plugin: Arc::new(ForwardingReplication::default()),
            alt: Arc::new(NoopReplication::new(NOOP_ALT_NAME)),
            leader,
            follower: Arc::new(Mutex::new(follower)),
        })
    }

    fn plugin(&self, alt: bool) -> &Arc<dyn WalReplication> {
        if alt {
            &self.alt
        } else {
            &self.plugin
        }
    }

    fn schema(&self, schema: Option<String>) -> String {
        schema.unwrap_or_else(|| self.config.default_schema.clone())
    }

    fn with_conn<T>(
        &mut self,
        role: Role,
        f: impl FnOnce(&mut Connection) -> ReplicationResult<T>,
    ) -> ReplicationResult<T> {
        match role {
            Role::Leader => f(&mut self.leader),
            Role::Follower => {
                let mut follower = self.follower.lock().map_err(|_| {
                    ReplicationError::new(ErrorCode::Error, "follower connection is poisoned")
                })?;
                f(&mut follower)
            }
        }
    }

    /// Execute one request.
    pub fn handle(&mut self, request: Request) -> ReplicationResult<Value> {
        debug!(?request, "shell request");

        match request {
            Request::Register { default, alt } => {
                let plugin = self.plugin(alt).clone();
                let name = plugin.name().to_string();
                self.registry.register(plugin, default);
                Ok(json!({ "name": name }))
            }
            Request::Unregister { alt } => {
                let removed = self.registry.unregister(self.plugin(alt));
                Ok(json!({ "removed": removed }))
            }
            Request::Find { name } => {
                let found = self.registry.find(name.as_deref());
                Ok(json!({ "name": found.map(|plugin| plugin.name().to_string()) }))
            }
            Request::EnableLeader { schema, name } => {
                let schema = self.schema(schema);
                self.leader.enable_leader(&schema, name.as_deref(), None)?;
                enabled_json(self.leader.is_enabled(&schema)?)
            }
            Request::EnableFollower { schema } => {
                let schema = self.schema(schema);
                self.with_conn(Role::Follower, |conn| {
                    conn.enable_follower(&schema)?;
                    enabled_json(conn.is_enabled(&schema)?)
                })
            }
            Request::Forward { schema } => {
                let schema = self.schema(schema);
                let sink = FollowerSink::new(self.follower.clone(), schema.clone());
                self.leader.session_mut(&schema)?.set_sink(Box::new(sink));
                Ok(json!({ "target": format!("follower:{}", schema) }))
            }
            Request::Unforward { schema } => {
                let schema = self.schema(schema);
                let removed = self.leader.session_mut(&schema)?.clear_sink().is_some();
                Ok(json!({ "removed": removed }))
            }
            Request::Disable { role, schema } => {
                let schema = self.schema(schema);
                self.with_conn(role, |conn| conn.disable(&schema))?;
                Ok(Value::Null)
            }
            Request::IsEnabled { role, schema } => {
                let schema = self.schema(schema);
                self.with_conn(role, |conn| enabled_json(conn.is_enabled(&schema)?))
            }
            Request::Begin { schema } => {
                let schema = self.schema(schema);
                self.leader.begin(&schema)?;
                Ok(Value::Null)
            }
            Request::Write { schema, page, fill } => {
                let schema = self.schema(schema);
                let data = vec![fill; self.config.page_size];
                self.leader.write_page(&schema, page, &data)?;
                Ok(Value::Null)
            }
            Request::Truncate { schema, size } => {
                let schema = self.schema(schema);
                self.leader.truncate(&schema, size)?;
                Ok(Value::Null)
            }
            Request::Flush { schema } => {
                let schema = self.schema(schema);
                self.leader.flush(&schema)?;
                Ok(Value::Null)
            }
            Request::Commit { schema } => {
                let schema = self.schema(schema);
                self.leader.commit(&schema)?;
                Ok(Value::Null)
            }
            Request::Rollback { schema } => {
                let schema = self.schema(schema);
                self.leader.rollback(&schema)?;
                Ok(Value::Null)
            }
            Request::Read { role, schema, page } => {
                let schema = self.schema(schema);
                let data = self.with_conn(role, |conn| conn.read_page(&schema, page))?;
                let checksum = data.map(|data| frame_checksum(page, &data));
                Ok(json!({ "page": page, "checksum": checksum }))
            }
            Request::PageCount { role, schema } => {
                let schema = self.schema(schema);
                let pages = self.with_conn(role, |conn| conn.page_count(&schema))?;
                Ok(json!({ "pages": pages }))
            }
            Request::Checkpoint { role, schema, mode } => {
                let schema = self.schema(schema);
                let result = self.with_conn(role, |conn| conn.checkpoint(&schema, mode))?;
                Ok(json!({
                    "frames_in_log": result.frames_in_log,
                    "frames_checkpointed": result.frames_checkpointed,
                }))
            }
            Request::Inject { schema, fault } => {
                let faults = FaultInjector::parse(&fault)?;
                let schema = self.schema(schema);
                *self.leader.session_mut(&schema)?.faults_mut() = faults;
                Ok(Value::Null)
            }
            Request::Session { schema } => {
                let schema = self.schema(schema);
                let session = self.leader.session(&schema)?;
                let counters = session.counters();

                let calls: Map<String, Value> = HookMethod::ALL
                    .into_iter()
                    .map(|method| (method.to_string(), json!(counters.calls(method))))
                    .collect();
                let fault = session
                    .faults()
                    .pending()
                    .map(|(method, code)| format!("{}:{}", method, code));

                Ok(json!({
                    "phase": session.phase().name(),
                    "forwarding": session.has_sink(),
                    "fault": fault,
                    "calls": calls,
                    "failures": counters.failures(),
                    "batches_forwarded": counters.batches_forwarded(),
                    "pages_forwarded": counters.pages_forwarded(),
                }))
            }
        }
    }
}

fn enabled_json((enabled, plugin): (bool, Option<String>)) -> ReplicationResult<Value> {
    Ok(json!({ "enabled": enabled, "plugin": plugin }))
}

/// Serve requests from `input` until it ends, one response line each.
///
/// Undecodable requests and failed operations are reported and skipped;
/// only I/O errors end the loop.
pub fn run_shell<R: BufRead, W: Write>(shell: &mut Shell, input: R, out: &mut W) -> CliResult<()> {
    for line in read_lines(input) {
        let line = line?;
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                let err = CliError::BadRequest(e.to_string());
                write_error(out, err.code_str(), &err.to_string())?;
                continue;
            }
        };

        match shell.handle(request) {
            Ok(data) => write_response(out, data)?,
            Err(err) => write_error(out, err.code.as_str(), &err.message)?,
        }
    }
    Ok(())
}
