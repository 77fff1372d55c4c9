//! Typed view of the owning FileIntegrity.
//!
//! Built once per watch event; loops read these fields instead of digging
//! through the raw object each time.

use crate::error::DaemonError;
use crds::{FileIntegrity, NodeScope};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSnapshot {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub api_version: String,
    pub kind: String,
    pub resource_version: Option<String>,
    /// Parsed hold-off annotation
    pub hold_off: Option<NodeScope>,
    pub debug: bool,
}

impl InstanceSnapshot {
    /// Owner reference pointing reports at this FileIntegrity
    #[must_use]
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            ..OwnerReference::default()
        }
    }

    /// Reference used as the regarding object of daemon events
    #[must_use]
    pub fn object_reference(&self) -> ObjectReference {
        ObjectReference {
            api_version: Some(self.api_version.clone()),
            kind: Some(self.kind.clone()),
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            uid: Some(self.uid.clone()),
            resource_version: self.resource_version.clone(),
            ..ObjectReference::default()
        }
    }
}

impl TryFrom<&FileIntegrity> for InstanceSnapshot {
    type Error = DaemonError;

    fn try_from(fi: &FileIntegrity) -> Result<Self, Self::Error> {
        let missing = |field: &str| DaemonError::InvalidInstance(format!("missing metadata.{field}"));
        Ok(Self {
            name: fi.metadata.name.clone().ok_or_else(|| missing("name"))?,
            namespace: fi.metadata.namespace.clone().ok_or_else(|| missing("namespace"))?,
            uid: fi.metadata.uid.clone().ok_or_else(|| missing("uid"))?,
            api_version: FileIntegrity::api_version(&()).into_owned(),
            kind: FileIntegrity::kind(&()).into_owned(),
            resource_version: fi.metadata.resource_version.clone(),
            hold_off: fi.hold_off(),
            debug: fi.spec.debug,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crds::{FileIntegritySpec, HOLDOFF_ANNOTATION};
    use std::collections::BTreeMap;

    pub(crate) fn file_integrity(hold_off: Option<&str>) -> FileIntegrity {
        let mut fi = FileIntegrity::new("example", FileIntegritySpec::default());
        fi.metadata.namespace = Some("file-integrity".to_string());
        fi.metadata.uid = Some("1234-abcd".to_string());
        fi.metadata.resource_version = Some("42".to_string());
        if let Some(value) = hold_off {
            fi.metadata.annotations = Some(BTreeMap::from([(
                HOLDOFF_ANNOTATION.to_string(),
                value.to_string(),
            )]));
        }
        fi
    }

    pub(crate) fn snapshot(hold_off: Option<&str>) -> InstanceSnapshot {
        InstanceSnapshot::try_from(&file_integrity(hold_off)).unwrap()
    }

    #[test]
    fn test_snapshot_from_file_integrity() {
        let snap = snapshot(Some("worker-1,worker-2"));
        assert_eq!(snap.name, "example");
        assert_eq!(snap.api_version, "fileintegrity.microscaler.io/v1alpha1");
        assert_eq!(snap.kind, "FileIntegrity");
        assert_eq!(
            snap.hold_off,
            Some(NodeScope::Nodes(vec!["worker-1".to_string(), "worker-2".to_string()]))
        );

        let owner = snap.owner_reference();
        assert_eq!(owner.uid, "1234-abcd");
        assert_eq!(owner.name, "example");

        let regarding = snap.object_reference();
        assert_eq!(regarding.kind.as_deref(), Some("FileIntegrity"));
        assert_eq!(regarding.namespace.as_deref(), Some("file-integrity"));
        assert_eq!(regarding.uid.as_deref(), Some("1234-abcd"));
    }

    #[test]
    fn test_snapshot_requires_uid() {
        let mut fi = file_integrity(None);
        fi.metadata.uid = None;
        assert!(matches!(
            InstanceSnapshot::try_from(&fi),
            Err(DaemonError::InvalidInstance(_))
        ));
    }
}
