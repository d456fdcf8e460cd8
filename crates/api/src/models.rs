//! Request and response bodies of the TeamCity REST API.
//!
//! Field names follow the server's JSON schema exactly (`buildType`,
//! `branchName`, `snapshot-dependencies`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Details of a single build as returned by the server.
///
/// Only `id` is guaranteed; everything else depends on the endpoint and the
/// server version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDetails {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// Container returned by the build listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildList {
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default, rename = "build")]
    pub builds: Vec<BuildDetails>,
}

/// Reference to another build, used for dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRef {
    pub id: i64,
    pub build_type_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRefs {
    #[serde(rename = "build")]
    pub builds: Vec<BuildRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTypeRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    pub property: Vec<Property>,
}

/// Body POSTed to the build queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTriggerPayload {
    pub build_type: BuildTypeRef,
    pub branch_name: String,
    pub comment: Comment,
    pub properties: Properties,
    pub personal: bool,
    #[serde(
        rename = "snapshot-dependencies",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub snapshot_dependencies: Option<BuildRefs>,
    #[serde(
        rename = "artifact-dependencies",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub artifact_dependencies: Option<BuildRefs>,
}

/// Body POSTed to stop a running build or drop a queued one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStopPayload {
    pub comment: String,
    pub readd_into_queue: bool,
}

impl BuildStopPayload {
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            readd_into_queue: false,
        }
    }
}

/// Everything needed to queue a new build.
///
/// Parameters and dependencies are kept in sorted maps so the payload is
/// serialized in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildTrigger {
    pub build_type_id: String,
    pub branch: String,
    pub comment: String,
    pub params: BTreeMap<String, String>,
    /// Build type ID → build ID.
    pub snapshot_dependencies: BTreeMap<String, i64>,
    /// Build type ID → build ID.
    pub artifact_dependencies: BTreeMap<String, i64>,
}

impl BuildTrigger {
    pub fn new(build_type_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            build_type_id: build_type_id.into(),
            branch: branch.into(),
            ..Default::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_snapshot_dependency(mut self, build_type_id: impl Into<String>, id: i64) -> Self {
        self.snapshot_dependencies.insert(build_type_id.into(), id);
        self
    }

    pub fn with_artifact_dependency(mut self, build_type_id: impl Into<String>, id: i64) -> Self {
        self.artifact_dependencies.insert(build_type_id.into(), id);
        self
    }

    pub fn payload(&self) -> BuildTriggerPayload {
        BuildTriggerPayload {
            build_type: BuildTypeRef {
                id: self.build_type_id.clone(),
            },
            branch_name: self.branch.clone(),
            comment: Comment {
                text: self.comment.clone(),
            },
            properties: Properties {
                property: self
                    .params
                    .iter()
                    .map(|(name, value)| Property {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            },
            personal: false,
            snapshot_dependencies: build_refs(&self.snapshot_dependencies),
            artifact_dependencies: build_refs(&self.artifact_dependencies),
        }
    }
}

// Empty dependency maps are left out of the payload, not sent as empty lists.
fn build_refs(deps: &BTreeMap<String, i64>) -> Option<BuildRefs> {
    if deps.is_empty() {
        return None;
    }

    Some(BuildRefs {
        builds: deps
            .iter()
            .map(|(build_type_id, id)| BuildRef {
                id: *id,
                build_type_id: build_type_id.clone(),
            })
            .collect(),
    })
}

/// Raw artifact content and the content type the server declared for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_single_param_omits_dependencies() {
        let trigger = BuildTrigger::new("bt1", "main")
            .with_comment("nightly")
            .with_param("KEY", "VALUE");

        let value = serde_json::to_value(trigger.payload()).unwrap();

        assert_eq!(
            value,
            json!({
                "buildType": {"id": "bt1"},
                "branchName": "main",
                "comment": {"text": "nightly"},
                "properties": {"property": [{"name": "KEY", "value": "VALUE"}]},
                "personal": false
            })
        );
        assert!(value.get("snapshot-dependencies").is_none());
        assert!(value.get("artifact-dependencies").is_none());
    }

    #[test]
    fn test_payload_snapshot_dependency() {
        let trigger = BuildTrigger::new("bt1", "main").with_snapshot_dependency("BuildTypeA", 42);

        let value = serde_json::to_value(trigger.payload()).unwrap();

        assert_eq!(
            value["snapshot-dependencies"],
            json!({"build": [{"id": 42, "buildTypeId": "BuildTypeA"}]})
        );
        assert!(value.get("artifact-dependencies").is_none());
        assert_eq!(value["properties"], json!({"property": []}));
    }

    #[test]
    fn test_payload_artifact_dependencies_sorted() {
        let trigger = BuildTrigger::new("bt1", "release")
            .with_artifact_dependency("Zeta", 3)
            .with_artifact_dependency("Alpha", 9);

        let payload = trigger.payload();
        let refs = payload.artifact_dependencies.unwrap();

        assert_eq!(refs.builds[0].build_type_id, "Alpha");
        assert_eq!(refs.builds[0].id, 9);
        assert_eq!(refs.builds[1].build_type_id, "Zeta");
    }

    #[test]
    fn test_params_serialize_in_key_order() {
        let trigger = BuildTrigger::new("bt1", "main")
            .with_param("env.B", "2")
            .with_param("env.A", "1")
            .with_param("env.C", "3");

        let names: Vec<_> = trigger
            .payload()
            .properties
            .property
            .into_iter()
            .map(|p| p.name)
            .collect();

        assert_eq!(names, vec!["env.A", "env.B", "env.C"]);
    }

    #[test]
    fn test_stop_payload_shape() {
        let value = serde_json::to_value(BuildStopPayload::new("no longer needed")).unwrap();
        assert_eq!(
            value,
            json!({"comment": "no longer needed", "readdIntoQueue": false})
        );
    }

    #[test]
    fn test_build_details_tolerates_missing_fields() {
        let details: BuildDetails = serde_json::from_value(json!({"id": 17})).unwrap();
        assert_eq!(details.id, 17);
        assert!(details.status.is_none());

        let details: BuildDetails = serde_json::from_value(json!({
            "id": 18,
            "buildTypeId": "bt1",
            "number": "104",
            "status": "SUCCESS",
            "state": "finished",
            "branchName": "main",
            "webUrl": "https://ci.example.com/viewLog.html?buildId=18",
            "somethingElse": {"ignored": true}
        }))
        .unwrap();
        assert_eq!(details.build_type_id.as_deref(), Some("bt1"));
        assert_eq!(details.branch_name.as_deref(), Some("main"));
    }

    #[test]
    fn test_build_list_defaults() {
        let list: BuildList = serde_json::from_value(json!({})).unwrap();
        assert!(list.builds.is_empty());
        assert!(list.count.is_none());

        let list: BuildList = serde_json::from_value(json!({
            "count": 2,
            "build": [{"id": 1}, {"id": 2}]
        }))
        .unwrap();
        assert_eq!(list.count, Some(2));
        assert_eq!(list.builds[1].id, 2);
    }
}
