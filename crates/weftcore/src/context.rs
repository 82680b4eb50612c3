use crate::expression::Scope;
use crate::value::FromValue;
use crate::{ContextError, Port, Value};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::any::Any;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Request-scoped values exposed as `$context`. Immutable once a run starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub request_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Json) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}

/// Recorded output of one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    pub output: Json,
    pub port: Port,
    pub branch: usize,
    #[serde(default)]
    pub terminal: bool,
}

impl StepRecord {
    pub fn main(output: Json, branch: usize) -> Self {
        Self {
            output,
            port: Port::Main,
            branch,
            terminal: false,
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `$steps`: append-only, one write per node name.
#[derive(Debug, Clone, Default)]
pub struct StepOutputs {
    inner: Arc<RwLock<BTreeMap<String, StepRecord>>>,
}

impl StepOutputs {
    pub fn record(&self, node: &str, record: StepRecord) -> Result<(), ContextError> {
        let mut steps = write(&self.inner);
        if steps.contains_key(node) {
            return Err(ContextError::AlreadyRecorded {
                node: node.to_string(),
            });
        }
        steps.insert(node.to_string(), record);
        Ok(())
    }

    pub fn get(&self, node: &str) -> Option<StepRecord> {
        read(&self.inner).get(node).cloned()
    }

    pub fn output(&self, node: &str) -> Option<Json> {
        read(&self.inner).get(node).map(|r| r.output.clone())
    }

    pub fn contains(&self, node: &str) -> bool {
        read(&self.inner).contains_key(node)
    }

    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> BTreeMap<String, StepRecord> {
        read(&self.inner).clone()
    }

    /// `{ name: { "output": value } }`, the shape expressions see.
    pub fn to_json(&self) -> Json {
        let steps = read(&self.inner);
        let mut map = Map::with_capacity(steps.len());
        for (name, record) in steps.iter() {
            let mut entry = Map::new();
            entry.insert("output".to_string(), record.output.clone());
            map.insert(name.clone(), Json::Object(entry));
        }
        Json::Object(map)
    }
}

/// Typed key/value store shared by the handlers of one run.
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl ValueStore {
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        write(&self.values).insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        read(&self.values).contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        write(&self.values).remove(key)
    }

    /// Value under `key` as `T`, or `default` when absent or of another type.
    pub fn get<T: FromValue>(&self, key: &str, default: T) -> T {
        read(&self.values)
            .get(key)
            .and_then(T::from_value)
            .unwrap_or(default)
    }

    pub fn get_required<T: FromValue>(&self, key: &str) -> Result<T, ContextError> {
        read(&self.values)
            .get(key)
            .and_then(T::from_value)
            .ok_or_else(|| ContextError::Missing {
                key: key.to_string(),
                expected: T::EXPECTED,
            })
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key, default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key, default)
    }

    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        self.get(key, default)
    }
}

/// A resource owned by the host (connection pool, client, device) that
/// handlers may borrow for the length of a run.
pub trait HostResource: Send + Sync + 'static {
    fn kind(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

impl std::fmt::Debug for dyn HostResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostResource")
            .field("kind", &self.kind())
            .finish()
    }
}

/// Opaque host resources keyed by name. The table never keeps a resource
/// alive: entries are weak and go stale when the host drops the resource.
#[derive(Clone, Default)]
pub struct HandleTable {
    handles: Arc<RwLock<HashMap<String, Weak<dyn HostResource>>>>,
}

impl HandleTable {
    pub fn insert(&self, key: impl Into<String>, resource: &Arc<dyn HostResource>) {
        write(&self.handles).insert(key.into(), Arc::downgrade(resource));
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn HostResource>, ContextError> {
        let handles = read(&self.handles);
        let weak = handles.get(key).ok_or_else(|| ContextError::Missing {
            key: key.to_string(),
            expected: "handle",
        })?;
        weak.upgrade()
            .ok_or_else(|| ContextError::HandleGone(key.to_string()))
    }

    pub fn remove(&self, key: &str) -> bool {
        write(&self.handles).remove(key).is_some()
    }
}

impl std::fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = read(&self.handles).keys().cloned().collect();
        f.debug_struct("HandleTable").field("keys", &keys).finish()
    }
}

/// Per-run store: `$context`, `$config`, `$steps`, typed values and host
/// handles. Cloning shares the same run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    run_id: ExecutionId,
    request: Arc<RequestContext>,
    request_json: Arc<Json>,
    config: Arc<Json>,
    steps: StepOutputs,
    store: ValueStore,
    handles: HandleTable,
}

impl ExecutionContext {
    pub fn new(request: RequestContext, config: Map<String, Json>) -> Self {
        let request_json = Arc::new(request.to_json());
        Self {
            run_id: Uuid::new_v4(),
            request: Arc::new(request),
            request_json,
            config: Arc::new(Json::Object(config)),
            steps: StepOutputs::default(),
            store: ValueStore::default(),
            handles: HandleTable::default(),
        }
    }

    /// Reuse a known run id, e.g. to resume from a checkpoint.
    pub fn with_run_id(mut self, run_id: ExecutionId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> ExecutionId {
        self.run_id
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.request.tenant_id.as_deref()
    }

    pub fn config(&self) -> &Json {
        &self.config
    }

    pub fn steps(&self) -> &StepOutputs {
        &self.steps
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Scope for resolving a step's parameters with `input` as `$json`.
    pub fn scope<'a>(&'a self, input: &'a Json) -> StepScope<'a> {
        StepScope { input, ctx: self }
    }
}

pub struct StepScope<'a> {
    input: &'a Json,
    ctx: &'a ExecutionContext,
}

impl Scope for StepScope<'_> {
    fn root(&self, name: &str) -> Option<Cow<'_, Json>> {
        match name {
            "$json" => Some(Cow::Borrowed(self.input)),
            "$context" => Some(Cow::Borrowed(self.ctx.request_json.as_ref())),
            "$config" => Some(Cow::Borrowed(self.ctx.config.as_ref())),
            "$steps" => Some(Cow::Owned(self.ctx.steps.to_json())),
            _ => None,
        }
    }
}
