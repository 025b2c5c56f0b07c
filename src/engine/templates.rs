//! Built-in manifest templates
//!
//! Proxy manifests for Open Cluster Management. Creation happens through
//! `ManagedClusterAction` objects in the spoke's namespace on the hub; the
//! job is observed through a `ManagedClusterView`.
//!
//! Placeholders use `{{ var }}` and are substituted inside string values
//! after the YAML is parsed.

use crate::domain::ports::TemplateStore;
use std::collections::HashMap;

pub const NAMESPACE_ACTION: &str = "namespace-action";
pub const SERVICE_ACCOUNT_ACTION: &str = "service-account-action";
pub const ROLE_BINDING_ACTION: &str = "role-binding-action";
pub const BACKUP_JOB_ACTION: &str = "backup-job-action";
pub const JOB_VIEW: &str = "job-view";
pub const NAMESPACE_DELETE_ACTION: &str = "namespace-delete-action";

const NAMESPACE_ACTION_TEMPLATE: &str = r#"
apiVersion: action.open-cluster-management.io/v1beta1
kind: ManagedClusterAction
metadata:
  name: "{{ resource_name }}-namespace"
  namespace: "{{ spoke_name }}"
spec:
  actionType: Create
  kube:
    resource: namespace
    template:
      apiVersion: v1
      kind: Namespace
      metadata:
        name: "{{ namespace }}"
"#;

const SERVICE_ACCOUNT_ACTION_TEMPLATE: &str = r#"
apiVersion: action.open-cluster-management.io/v1beta1
kind: ManagedClusterAction
metadata:
  name: "{{ resource_name }}-serviceaccount"
  namespace: "{{ spoke_name }}"
spec:
  actionType: Create
  kube:
    resource: serviceaccount
    namespace: "{{ namespace }}"
    template:
      apiVersion: v1
      kind: ServiceAccount
      metadata:
        name: "{{ service_account }}"
        namespace: "{{ namespace }}"
"#;

const ROLE_BINDING_ACTION_TEMPLATE: &str = r#"
apiVersion: action.open-cluster-management.io/v1beta1
kind: ManagedClusterAction
metadata:
  name: "{{ resource_name }}-rolebinding"
  namespace: "{{ spoke_name }}"
spec:
  actionType: Create
  kube:
    resource: clusterrolebinding
    template:
      apiVersion: rbac.authorization.k8s.io/v1
      kind: ClusterRoleBinding
      metadata:
        name: "{{ service_account }}"
      roleRef:
        apiGroup: rbac.authorization.k8s.io
        kind: ClusterRole
        name: cluster-admin
      subjects:
        - kind: ServiceAccount
          name: "{{ service_account }}"
          namespace: "{{ namespace }}"
"#;

const BACKUP_JOB_ACTION_TEMPLATE: &str = r#"
apiVersion: action.open-cluster-management.io/v1beta1
kind: ManagedClusterAction
metadata:
  name: "{{ resource_name }}-job"
  namespace: "{{ spoke_name }}"
spec:
  actionType: Create
  kube:
    resource: job
    namespace: "{{ namespace }}"
    template:
      apiVersion: batch/v1
      kind: Job
      metadata:
        name: "{{ resource_name }}"
        namespace: "{{ namespace }}"
      spec:
        backoffLimit: 0
        template:
          metadata:
            name: "{{ resource_name }}"
          spec:
            serviceAccountName: "{{ service_account }}"
            containers:
              - name: backup
                image: "{{ image }}"
                args: ["launchBackup", "--BackupPath", "{{ recovery_path }}"]
                securityContext:
                  privileged: true
                  runAsUser: 0
                tty: true
                volumeMounts:
                  - name: host
                    mountPath: /host
            hostNetwork: true
            hostPID: true
            restartPolicy: Never
            volumes:
              - name: host
                hostPath:
                  path: /
                  type: Directory
"#;

const JOB_VIEW_TEMPLATE: &str = r#"
apiVersion: view.open-cluster-management.io/v1beta1
kind: ManagedClusterView
metadata:
  name: "{{ resource_name }}-view"
  namespace: "{{ spoke_name }}"
spec:
  scope:
    resource: jobs
    name: "{{ resource_name }}"
    namespace: "{{ namespace }}"
"#;

const NAMESPACE_DELETE_ACTION_TEMPLATE: &str = r#"
apiVersion: action.open-cluster-management.io/v1beta1
kind: ManagedClusterAction
metadata:
  name: "{{ resource_name }}-cleanup"
  namespace: "{{ spoke_name }}"
spec:
  actionType: Delete
  kube:
    resource: namespace
    name: "{{ namespace }}"
"#;

// =============================================================================
// Template Catalog
// =============================================================================

/// In-memory template store seeded with the built-in templates
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: HashMap<String, String>,
}

impl TemplateCatalog {
    /// Catalog without any templates
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Catalog holding every built-in template
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for (name, body) in [
            (NAMESPACE_ACTION, NAMESPACE_ACTION_TEMPLATE),
            (SERVICE_ACCOUNT_ACTION, SERVICE_ACCOUNT_ACTION_TEMPLATE),
            (ROLE_BINDING_ACTION, ROLE_BINDING_ACTION_TEMPLATE),
            (BACKUP_JOB_ACTION, BACKUP_JOB_ACTION_TEMPLATE),
            (JOB_VIEW, JOB_VIEW_TEMPLATE),
            (NAMESPACE_DELETE_ACTION, NAMESPACE_DELETE_ACTION_TEMPLATE),
        ] {
            catalog.insert(name, body);
        }
        catalog
    }

    /// Add or replace a template
    pub fn insert(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(name.into(), body.into());
    }

    pub fn with(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(name, body);
        self
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateStore for TemplateCatalog {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }
}
