//! The per-robot agent: compiled graphs, collaborator handles and the
//! session cache.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dsl::GraphConfig;
use crate::error::{CheckResult, FlowResult, StaticCheckError};
use crate::graph::{build_graph, Graph, GraphRegistry};
use crate::session::{Collaborators, ReplyPacket, StateTracker, TurnEnv};

/// Time source, swappable so TTL eviction is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced time for tests.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    advanced: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            start: Instant::now(),
            advanced: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.advanced.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.advanced.lock()
    }
}

/// Outcome of loading a batch of graph configurations. A graph that fails
/// its static check is skipped; the rest keep serving.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, StaticCheckError)>,
}

/// One inbound turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub text: String,
    /// Params merged into the session before the turn runs.
    pub params: Option<HashMap<String, Value>>,
    /// Force-trigger this graph instead of probing start predicates.
    pub flow_id: Option<String>,
    /// Attach trace records to the reply.
    pub traceback: bool,
}

impl TurnRequest {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        TurnRequest {
            session_id: session_id.into(),
            text: text.into(),
            params: None,
            flow_id: None,
            traceback: false,
        }
    }
}

struct Session {
    last_active: Mutex<Instant>,
    tracker: tokio::sync::Mutex<StateTracker>,
}

/// All dialogue state for one robot.
///
/// Turns for the same session are strictly serialized by the per-session
/// mutex; unrelated sessions run concurrently. Expired sessions are swept
/// lazily on every inbound turn.
pub struct Agent {
    robot_code: String,
    graphs: RwLock<GraphRegistry>,
    collab: Collaborators,
    sessions: DashMap<String, Arc<Session>>,
    session_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl Agent {
    pub fn new(robot_code: impl Into<String>, collab: Collaborators, session_ttl: Duration) -> Self {
        Agent {
            robot_code: robot_code.into(),
            graphs: RwLock::new(GraphRegistry::new()),
            collab,
            sessions: DashMap::new(),
            session_ttl,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Compile and register a batch of graphs, skipping the ones that fail
    /// their static check.
    pub fn load_graphs(&self, configs: &[GraphConfig]) -> LoadReport {
        let mut report = LoadReport::default();
        for config in configs {
            match build_graph(config) {
                Ok(graph) => {
                    report.loaded.push(graph.id.clone());
                    self.graphs.write().insert(graph);
                }
                Err(err) => {
                    tracing::warn!(
                        robot = %self.robot_code,
                        graph = %config.graph_id,
                        error = %err,
                        "skipping graph that failed its static check"
                    );
                    report.failed.push((config.graph_id.clone(), err));
                }
            }
        }
        report
    }

    /// Compile one configuration without registering it.
    pub fn compile_graph(config: &GraphConfig) -> CheckResult<Graph> {
        build_graph(config)
    }

    /// Hot-swap a single graph. Cached sessions may hold iterators parked
    /// inside the old version; pass `clear_sessions` to drop them.
    pub fn update_graph(&self, config: &GraphConfig, clear_sessions: bool) -> CheckResult<()> {
        let graph = build_graph(config)?;
        self.graphs.write().insert(graph);
        if clear_sessions {
            self.sessions.clear();
        }
        Ok(())
    }

    pub fn remove_graph(&self, graph_id: &str) -> bool {
        self.graphs.write().remove(graph_id).is_some()
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.read().len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Drop every session idle past the TTL. Runs lazily on each inbound
    /// turn; sessions currently mid-turn are skipped.
    pub fn evict_expired(&self) {
        let now = self.clock.now();
        let ttl = self.session_ttl;
        self.sessions.retain(|session_id, session| {
            let idle = now.saturating_duration_since(*session.last_active.lock());
            if idle <= ttl {
                return true;
            }
            if session.tracker.try_lock().is_err() {
                // Mid-turn; the next sweep will get it.
                return true;
            }
            tracing::info!(session = %session_id, idle_secs = idle.as_secs(), "evicting idle session");
            false
        });
    }

    fn new_tracker(&self, session_id: &str) -> StateTracker {
        let graphs = self.graphs.read();
        StateTracker::new(
            session_id,
            self.robot_code.clone(),
            graphs.merged_global_slots(),
            graphs.merged_global_params(),
        )
    }

    /// Process one utterance for one session and package the reply.
    pub async fn handle_message(&self, request: TurnRequest) -> FlowResult<ReplyPacket> {
        self.evict_expired();

        let session = self
            .sessions
            .entry(request.session_id.clone())
            .or_insert_with(|| {
                Arc::new(Session {
                    last_active: Mutex::new(self.clock.now()),
                    tracker: tokio::sync::Mutex::new(self.new_tracker(&request.session_id)),
                })
            })
            .clone();
        *session.last_active.lock() = self.clock.now();

        // Strict per-session sequencing: one turn at a time.
        let mut tracker = session.tracker.lock().await;
        if let Some(params) = request.params {
            tracker.session.update_params(params);
        }
        let env = TurnEnv {
            robot_code: self.robot_code.clone(),
            graphs: self.graphs.read().clone(),
            collab: self.collab.clone(),
        };
        tracker
            .handle_message(&request.text, request.flow_id, &env)
            .await?;
        Ok(tracker.latest_pack(request.traceback))
    }
}
