//! Client actions and the per-tick batch handed to entities.
//!
//! An [`Action`] is what a session asked for; an [`ActionBatch`] is the
//! drained, read-only view of every session's actions for one tick.
//!
//! # Wire shape
//!
//! ```text
//! { "name": "move",
//!   "priority": "5",                      // optional, string-encoded integer
//!   "parameters": [ { "name": "dx", "value": "1" } ] }   // optional
//! ```
//!
//! Inbound input is never dropped: anything that is not a JSON object
//! with a string `name` becomes an action whose name is the raw text.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::id::SessionId;

/// A single client-submitted action.
///
/// # Examples
///
/// ```
/// use vigil_core::{Action, SessionId};
///
/// let action = Action::parse(
///     SessionId::from("s1"),
///     r#"{"name":"move","priority":"2","parameters":[{"name":"dx","value":"1"}]}"#,
/// );
/// assert_eq!(action.name, "move");
/// assert_eq!(action.priority, 2);
/// assert_eq!(action.parameter("dx"), Some("1"));
///
/// // Non-JSON input degrades to a name-only action.
/// let raw = Action::parse(SessionId::from("s1"), "enter");
/// assert_eq!(raw.name, "enter");
/// assert!(raw.parameters.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    /// The session that submitted the action.
    pub session: SessionId,
    /// Action name; also the merge key within a session.
    pub name: String,
    /// Merge priority. Higher wins; default 0.
    pub priority: i64,
    /// Named string parameters, unique keys.
    pub parameters: IndexMap<String, String>,
}

#[derive(Deserialize)]
struct WireParameter {
    name: String,
    value: String,
}

impl Action {
    /// A name-only action with priority 0.
    pub fn new(session: SessionId, name: impl Into<String>) -> Self {
        Self {
            session,
            name: name.into(),
            priority: 0,
            parameters: IndexMap::new(),
        }
    }

    /// Builder: set the priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: add (or overwrite) a parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Look up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Parse a raw inbound payload.
    ///
    /// - Not JSON, or not an object with a string `name`: the whole raw
    ///   text becomes the name, priority 0, no parameters.
    /// - `priority` that is neither an integer nor a string holding one
    ///   falls back to 0.
    /// - Malformed `parameters` are discarded; the name is kept.
    pub fn parse(session: SessionId, raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                debug!(session = %session, error = %err, "payload is not JSON, using raw text as action name");
                return Self::new(session, raw);
            }
        };
        let Some(name) = value.get("name").and_then(Value::as_str) else {
            debug!(session = %session, "payload has no string name, using raw text as action name");
            return Self::new(session, raw);
        };

        let mut action = Self::new(session, name);

        match value.get("priority") {
            None | Some(Value::Null) => {}
            Some(p) => match parse_priority(p) {
                Some(priority) => action.priority = priority,
                None => {
                    debug!(session = %action.session, priority = %p, "unparseable priority, defaulting to 0");
                }
            },
        }

        match value.get("parameters") {
            None | Some(Value::Null) => {}
            Some(params) => match Vec::<WireParameter>::deserialize(params) {
                Ok(params) => {
                    for p in params {
                        action.parameters.insert(p.name, p.value);
                    }
                }
                Err(err) => {
                    debug!(session = %action.session, action = %action.name, error = %err, "malformed parameters dropped");
                }
            },
        }

        action
    }
}

fn parse_priority(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Every session's actions for one tick, as drained from the inbox.
///
/// Sessions iterate in order of their first submission since the
/// previous drain; within a session, actions iterate in order of their
/// name's first submission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionBatch {
    by_session: IndexMap<SessionId, Vec<Action>>,
}

impl ActionBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action to its session's list.
    pub fn push(&mut self, action: Action) {
        self.by_session
            .entry(action.session.clone())
            .or_default()
            .push(action);
    }

    /// The actions of one session; empty if the session submitted none.
    pub fn for_session(&self, session: &SessionId) -> &[Action] {
        self.by_session
            .get(session)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Find a session's action by name.
    pub fn find(&self, session: &SessionId, name: &str) -> Option<&Action> {
        self.for_session(session).iter().find(|a| a.name == name)
    }

    /// Whether `session` submitted an action called `name`.
    pub fn contains(&self, session: &SessionId, name: &str) -> bool {
        self.find(session, name).is_some()
    }

    /// Sessions that submitted an action called `name`.
    pub fn sessions_with<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SessionId> + 'a {
        self.by_session
            .iter()
            .filter(move |(_, actions)| actions.iter().any(|a| a.name == name))
            .map(|(session, _)| session)
    }

    /// Number of sessions with at least one action.
    pub fn session_count(&self) -> usize {
        self.by_session.len()
    }

    /// Total number of actions across all sessions.
    pub fn len(&self) -> usize {
        self.by_session.values().map(Vec::len).sum()
    }

    /// Whether the batch holds no actions.
    pub fn is_empty(&self) -> bool {
        self.by_session.values().all(Vec::is_empty)
    }
}

impl FromIterator<Action> for ActionBatch {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut batch = Self::new();
        for action in iter {
            batch.push(action);
        }
        batch
    }
}
