//! In-memory test doubles for the control plane and the spoke registry

use crate::domain::ports::{ControlPlane, ResourceType, Spoke, SpokeRegistry};
use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const VIEW_PLURAL: &str = "managedclusterviews";
pub const ACTION_PLURAL: &str = "managedclusteractions";

type ObjectKey = (String, String, String);

/// Status handed out for views in a namespace once they were fetched enough times
#[derive(Debug, Clone)]
pub struct ViewScript {
    pub ready_on_fetch: usize,
    pub status: Value,
}

/// View status carrying the given view-level and job-level condition types
pub fn view_status(view_conditions: &[&str], job_conditions: &[&str]) -> Value {
    let conditions = |types: &[&str]| -> Vec<Value> {
        types
            .iter()
            .map(|t| json!({ "type": t, "status": "True" }))
            .collect()
    };
    json!({
        "conditions": conditions(view_conditions),
        "result": { "status": { "conditions": conditions(job_conditions) } }
    })
}

/// Hub control plane kept in memory
pub struct FakeControlPlane {
    known: Vec<ResourceType>,
    objects: Mutex<BTreeMap<ObjectKey, DynamicObject>>,
    fetches: Mutex<HashMap<ObjectKey, usize>>,
    view_scripts: Mutex<HashMap<String, ViewScript>>,
    fail_create: Mutex<HashSet<String>>,
    fail_delete: Mutex<HashSet<String>>,
    fail_get: Mutex<HashSet<String>>,
    creates: AtomicUsize,
    gets: AtomicUsize,
    deletes: AtomicUsize,
    discovers: AtomicUsize,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self {
            known: vec![
                ResourceType::from_parts(
                    "action.open-cluster-management.io",
                    "v1beta1",
                    "ManagedClusterAction",
                    ACTION_PLURAL,
                    true,
                ),
                ResourceType::from_parts(
                    "view.open-cluster-management.io",
                    "v1beta1",
                    "ManagedClusterView",
                    VIEW_PLURAL,
                    true,
                ),
                ResourceType::from_parts(
                    "cluster.open-cluster-management.io",
                    "v1",
                    "ManagedCluster",
                    "managedclusters",
                    false,
                ),
                ResourceType::from_parts("", "v1", "Namespace", "namespaces", false),
                ResourceType::from_parts("", "v1", "ConfigMap", "configmaps", true),
            ],
            objects: Mutex::new(BTreeMap::new()),
            fetches: Mutex::new(HashMap::new()),
            view_scripts: Mutex::new(HashMap::new()),
            fail_create: Mutex::new(HashSet::new()),
            fail_delete: Mutex::new(HashSet::new()),
            fail_get: Mutex::new(HashSet::new()),
            creates: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            discovers: AtomicUsize::new(0),
        }
    }

    /// Views in `namespace` expose `status` from their `ready_on_fetch`-th read on
    pub fn script_views(&self, namespace: &str, ready_on_fetch: usize, status: Value) {
        self.view_scripts.lock().insert(
            namespace.to_string(),
            ViewScript {
                ready_on_fetch,
                status,
            },
        );
    }

    pub fn fail_create_of(&self, name: &str) {
        self.fail_create.lock().insert(name.to_string());
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.fail_delete.lock().insert(name.to_string());
    }

    pub fn fail_get_of(&self, name: &str) {
        self.fail_get.lock().insert(name.to_string());
    }

    /// Store an object directly, bypassing create accounting
    pub fn seed(&self, plural: &str, namespace: &str, object: DynamicObject) {
        let name = object.metadata.name.clone().unwrap_or_default();
        self.objects
            .lock()
            .insert((plural.to_string(), namespace.to_string(), name), object);
    }

    pub fn open_objects(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn contains(&self, plural: &str, namespace: &str, name: &str) -> bool {
        self.objects
            .lock()
            .contains_key(&(plural.to_string(), namespace.to_string(), name.to_string()))
    }

    /// Names of objects of `plural` in `namespace`
    pub fn names(&self, plural: &str, namespace: &str) -> Vec<String> {
        self.objects
            .lock()
            .keys()
            .filter(|(p, ns, _)| p == plural && ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn discover_calls(&self) -> usize {
        self.discovers.load(Ordering::SeqCst)
    }

    fn key(resource: &ResourceType, namespace: Option<&str>, name: &str) -> ObjectKey {
        let ns = if resource.namespaced {
            namespace.unwrap_or("default")
        } else {
            ""
        };
        (resource.plural().to_string(), ns.to_string(), name.to_string())
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn create(
        &self,
        resource: &ResourceType,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let name = object.metadata.name.clone().unwrap_or_default();
        if self.fail_create.lock().contains(&name) {
            return Err(Error::Internal(format!("create of {} rejected", name)));
        }

        let key = Self::key(resource, namespace, &name);
        let mut objects = self.objects.lock();
        if objects.contains_key(&key) {
            return Err(Error::ResourceExists {
                kind: resource.kind().to_string(),
                name,
            });
        }
        objects.insert(key, object.clone());
        Ok(object.clone())
    }

    async fn get(
        &self,
        resource: &ResourceType,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.lock().contains(name) {
            return Err(Error::Internal(format!("get of {} rejected", name)));
        }

        let key = Self::key(resource, namespace, name);
        let mut object = self
            .objects
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: resource.kind().to_string(),
                name: name.to_string(),
            })?;

        let fetched = {
            let mut fetches = self.fetches.lock();
            let count = fetches.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if key.0 == VIEW_PLURAL {
            if let Some(script) = self.view_scripts.lock().get(&key.1) {
                if fetched >= script.ready_on_fetch {
                    object.data["status"] = script.status.clone();
                }
            }
        }

        Ok(object)
    }

    async fn delete(&self, resource: &ResourceType, namespace: Option<&str>, name: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.lock().contains(name) {
            return Err(Error::Internal(format!("delete of {} rejected", name)));
        }

        let key = Self::key(resource, namespace, name);
        self.fetches.lock().remove(&key);
        match self.objects.lock().remove(&key) {
            Some(_) => Ok(()),
            None => Err(Error::ResourceNotFound {
                kind: resource.kind().to_string(),
                name: name.to_string(),
            }),
        }
    }

    async fn discover(&self, gvk: &GroupVersionKind) -> Result<ResourceType> {
        self.discovers.fetch_add(1, Ordering::SeqCst);
        self.known
            .iter()
            .find(|rt| rt.api.group == gvk.group && rt.api.version == gvk.version && rt.api.kind == gvk.kind)
            .cloned()
            .ok_or_else(|| Error::NotMappable {
                kind: gvk.kind.clone(),
                group: gvk.group.clone(),
                version: gvk.version.clone(),
                reason: "not served".into(),
            })
    }
}

/// Spoke registry with a fixed set of available spokes
#[derive(Default)]
pub struct FakeRegistry {
    available: HashSet<String>,
    panic_on: HashSet<String>,
    fail_on: HashSet<String>,
    lookup_delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeRegistry {
    pub fn with_spokes(names: &[&str]) -> Self {
        Self {
            available: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Make the lookup for `name` panic
    pub fn panicking_on(mut self, name: &str) -> Self {
        self.panic_on.insert(name.to_string());
        self
    }

    /// Make the lookup for `name` return an error
    pub fn failing_on(mut self, name: &str) -> Self {
        self.fail_on.insert(name.to_string());
        self
    }

    /// Hold every lookup for `delay`
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    /// Most lookups that were in progress at the same time
    pub fn peak_lookups(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpokeRegistry for FakeRegistry {
    async fn exists(&self, spoke: &Spoke) -> Result<bool> {
        if self.panic_on.contains(spoke.name()) {
            panic!("registry lookup exploded for {}", spoke);
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        if !self.lookup_delay.is_zero() {
            tokio::time::sleep(self.lookup_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.contains(spoke.name()) {
            return Err(Error::Internal(format!("registry unreachable for {}", spoke)));
        }
        Ok(self.available.contains(spoke.name()))
    }
}
