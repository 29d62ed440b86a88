//! Typed model of RDA Common Standard maDMP documents
//!
//! Only the fields the synchronization reads are typed. Everything else is
//! kept in the `extra` maps so a document survives a parse/serialize cycle.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level wrapper: `{"dmp": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MadmpDocument {
    pub dmp: Dmp,
}

/// Identifier object (`{"identifier": ..., "type": ...}`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(default)]
    pub identifier: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub id_type: Option<String>,
}

/// Data Management Plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dmp {
    #[serde(default)]
    pub dmp_id: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(default)]
    pub contributor: Vec<Contributor>,
    #[serde(default)]
    pub dataset: Vec<Dataset>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// DMP contact person
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<Identifier>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// DMP contributor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contributor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor_id: Option<Identifier>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mbox: Option<String>,
    #[serde(default)]
    pub role: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Dataset described by a DMP
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub dataset_id: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub dataset_type: Option<String>,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
    #[serde(default)]
    pub distribution: Vec<Distribution>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata standard declaration of a dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub metadata_standard_id: Identifier,
}

/// One hosting location of a dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Distribution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<Host>,
    #[serde(default)]
    pub license: Vec<License>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Host of a distribution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// License of a distribution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct License {
    #[serde(default)]
    pub license_ref: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Dmp {
    /// External DMP identifier
    pub fn id(&self) -> &str {
        &self.dmp_id.identifier
    }

    /// Check the structure the synchronization relies on
    ///
    /// Returns every problem found, not just the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.dmp_id.identifier.trim().is_empty() {
            problems.push("dmp.dmp_id.identifier is missing".to_string());
        }

        for (i, contributor) in self.contributor.iter().enumerate() {
            if contributor.role.is_empty() {
                problems.push(format!("dmp.contributor[{}] has no role", i));
            }
        }

        for (i, dataset) in self.dataset.iter().enumerate() {
            if dataset.dataset_id.identifier.trim().is_empty() {
                problems.push(format!("dmp.dataset[{}].dataset_id.identifier is missing", i));
            }

            for (j, distribution) in dataset.distribution.iter().enumerate() {
                for (k, license) in distribution.license.iter().enumerate() {
                    if license.start_date().is_none() {
                        problems.push(format!(
                            "dmp.dataset[{}].distribution[{}].license[{}].start_date '{}' is not a date",
                            i, j, k, license.start_date
                        ));
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

impl Dataset {
    /// External dataset identifier
    pub fn id(&self) -> &str {
        &self.dataset_id.identifier
    }

    /// Identifiers of the metadata standards this dataset declares
    pub fn metadata_standard_ids(&self) -> impl Iterator<Item = &str> {
        self.metadata
            .iter()
            .map(|m| m.metadata_standard_id.identifier.as_str())
            .filter(|s| !s.is_empty())
    }
}

impl Distribution {
    pub fn host_url(&self) -> Option<&str> {
        self.host.as_ref().and_then(|h| h.url.as_deref())
    }

    pub fn host_title(&self) -> Option<&str> {
        self.host.as_ref().and_then(|h| h.title.as_deref())
    }
}

impl License {
    /// Parse `start_date` as an ISO date (a full timestamp is accepted too)
    pub fn start_date(&self) -> Option<NaiveDate> {
        parse_date(&self.start_date)
    }
}

/// Parse an ISO 8601 date or date-time into its date part
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_document() {
        let doc: MadmpDocument = serde_json::from_value(json!({
            "dmp": {
                "dmp_id": {"identifier": "dmp-42"},
                "contact": {"mbox": "a@x.org"},
                "contributor": [{
                    "name": "A B",
                    "contributor_id": {"type": "ror", "identifier": "0"},
                    "role": ["owner"]
                }],
                "dataset": [{
                    "dataset_id": {"identifier": "ds-1"},
                    "title": "T",
                    "distribution": [{
                        "host": {"url": "https://repo.example", "title": "Repo"},
                        "license": [{"license_ref": "MIT", "start_date": "2020-01-01"}],
                        "data_access": "open"
                    }]
                }]
            }
        }))
        .unwrap();

        assert_eq!(doc.dmp.id(), "dmp-42");
        assert_eq!(doc.dmp.dataset[0].id(), "ds-1");
        let dist = &doc.dmp.dataset[0].distribution[0];
        assert_eq!(dist.host_url(), Some("https://repo.example"));
        assert_eq!(
            dist.license[0].start_date(),
            NaiveDate::from_ymd_opt(2020, 1, 1)
        );
        assert!(doc.dmp.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let dmp: Dmp = serde_json::from_value(json!({
            "dmp_id": {"identifier": "x"},
            "ethical_issues_exist": "no"
        }))
        .unwrap();

        let back = serde_json::to_value(&dmp).unwrap();
        assert_eq!(back["ethical_issues_exist"], "no");
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let dmp: Dmp = serde_json::from_value(json!({
            "contributor": [{"name": "X", "role": []}],
            "dataset": [{
                "distribution": [{"license": [{"license_ref": "MIT", "start_date": "soon"}]}]
            }]
        }))
        .unwrap();

        let problems = dmp.validate().unwrap_err();
        assert_eq!(problems.len(), 4);
    }

    #[test]
    fn test_parse_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 19);
        assert_eq!(parse_date("2021-03-19"), expected);
        assert_eq!(parse_date("2021-03-19T10:00:00Z"), expected);
        assert_eq!(parse_date("2021-03-19T10:00:00.123"), expected);
        assert_eq!(parse_date("Hello!"), None);
    }
}
