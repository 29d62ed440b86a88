//! Field mappings from maDMP documents to record metadata
//!
//! Pure functions; converters combine them into a record document.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use madmp_common::config::{MadmpConfig, SyncConfig, TranslationConfig};
use madmp_common::madmp::{Contributor, Dataset, Distribution, Dmp};

/// Identifier schemes carried over from contributor ids
const ALLOWED_IDENTIFIER_TYPES: &[&str] = &["orcid", "ror"];

const NO_TITLE: &str = "[No Title]";
const NO_DESCRIPTION: &str = "[No Description]";

/// A creator or contributor of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Person {
    pub name: String,
    #[serde(rename = "type")]
    pub person_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    pub identifiers: BTreeMap<String, String>,
    pub affiliations: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Contact and people of one DMP, mapped once and shared by all its datasets
#[derive(Debug, Clone, Default)]
pub struct MappedPeople {
    pub contact: Option<String>,
    pub creators: Vec<Person>,
    pub contributors: Vec<Person>,
}

impl MappedPeople {
    pub fn from_dmp(dmp: &Dmp, config: &SyncConfig) -> Self {
        Self {
            contact: map_contact(dmp, config),
            creators: dmp.contributor.iter().map(map_creator).collect(),
            contributors: dmp.contributor.iter().map(map_contributor).collect(),
        }
    }
}

/// Contact e-mail, falling back to the configured default
pub fn map_contact(dmp: &Dmp, config: &SyncConfig) -> Option<String> {
    dmp.contact
        .as_ref()
        .and_then(|c| c.mbox.clone())
        .or_else(|| config.default_contact.clone())
}

fn map_person(contributor: &Contributor) -> Person {
    let mut identifiers = BTreeMap::new();
    if let Some(id) = &contributor.contributor_id {
        if let Some(id_type) = id.id_type.as_deref() {
            let lowered = id_type.to_ascii_lowercase();
            if ALLOWED_IDENTIFIER_TYPES.contains(&lowered.as_str()) {
                identifiers.insert(id_type.to_string(), id.identifier.clone());
            }
        }
    }

    let (given_name, family_name) = match split_name(&contributor.name) {
        Some((given, family)) => (Some(given), Some(family)),
        None => (None, None),
    };

    Person {
        name: contributor.name.clone(),
        person_type: "Personal",
        given_name,
        family_name,
        identifiers,
        affiliations: Vec::new(),
        role: None,
    }
}

pub fn map_creator(contributor: &Contributor) -> Person {
    map_person(contributor)
}

/// Like [`map_creator`], plus the first declared role
pub fn map_contributor(contributor: &Contributor) -> Person {
    Person {
        role: contributor.role.first().cloned(),
        ..map_person(contributor)
    }
}

/// Split a full name into `(given, family)`
///
/// Understands "Given Family" and "Family, Given". Single words yield `None`.
pub fn split_name(name: &str) -> Option<(String, String)> {
    let name = name.trim();

    if let Some((family, given)) = name.split_once(',') {
        let (family, given) = (family.trim(), given.trim());
        if !family.is_empty() && !given.is_empty() {
            return Some((given.to_string(), family.to_string()));
        }
        return None;
    }

    let mut parts = name.split_whitespace();
    let given = parts.next()?;
    let family: Vec<&str> = parts.collect();
    if family.is_empty() {
        return None;
    }

    Some((given.to_string(), family.join(" ")))
}

pub fn map_language(dataset: &Dataset, config: &SyncConfig) -> String {
    dataset
        .language
        .clone()
        .unwrap_or_else(|| config.default_language.clone())
}

pub fn map_title(dataset: &Dataset, config: &SyncConfig) -> Value {
    json!({
        "title": dataset.title.as_deref().unwrap_or(NO_TITLE),
        "type": "MainTitle",
        "lang": map_language(dataset, config),
    })
}

pub fn map_description(dataset: &Dataset, config: &SyncConfig) -> Value {
    json!({
        "description": dataset.description.as_deref().unwrap_or(NO_DESCRIPTION),
        "type": "Other",
        "lang": map_language(dataset, config),
    })
}

/// Resource type through the translation tables (unknown types become "other")
pub fn map_resource_type(dataset: &Dataset, translations: &TranslationConfig) -> Value {
    let dataset_type = dataset.dataset_type.as_deref().unwrap_or_default();

    json!({
        "type": translations
            .resource_type
            .get(dataset_type)
            .map(String::as_str)
            .unwrap_or("other"),
        "subtype": translations
            .resource_subtype
            .get(dataset_type)
            .map(String::as_str)
            .unwrap_or(""),
    })
}

pub fn map_access_right(distribution: &Distribution, config: &SyncConfig) -> String {
    distribution
        .data_access
        .clone()
        .unwrap_or_else(|| config.default_data_access.clone())
}

/// Earliest parseable license start date of a distribution
pub fn earliest_license_start(distribution: &Distribution) -> Option<NaiveDate> {
    distribution.license.iter().filter_map(|l| l.start_date()).min()
}

/// Embargo end when the earliest license only starts after `today`
pub fn embargo_date(distribution: &Distribution, today: NaiveDate) -> Option<NaiveDate> {
    earliest_license_start(distribution).filter(|start| *start > today)
}

/// Distributions of `dataset` hosted by this repository (URL or title match)
pub fn matching_distributions<'a>(dataset: &'a Dataset, config: &MadmpConfig) -> Vec<&'a Distribution> {
    dataset
        .distribution
        .iter()
        .filter(|d| config.host.matches(d.host_url(), d.host_title()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use madmp_common::madmp::{Host, Identifier, License};

    fn contributor(name: &str, id_type: &str, roles: &[&str]) -> Contributor {
        Contributor {
            contributor_id: Some(Identifier {
                identifier: "0000-0001".to_string(),
                id_type: Some(id_type.to_string()),
            }),
            name: name.to_string(),
            role: roles.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_name_patterns() {
        assert_eq!(
            split_name("Ada Lovelace"),
            Some(("Ada".to_string(), "Lovelace".to_string()))
        );
        assert_eq!(
            split_name("Lovelace, Ada"),
            Some(("Ada".to_string(), "Lovelace".to_string()))
        );
        assert_eq!(
            split_name("Ludwig van Beethoven"),
            Some(("Ludwig".to_string(), "van Beethoven".to_string()))
        );
        assert_eq!(split_name("Plato"), None);
    }

    #[test]
    fn test_identifiers_filtered_by_type() {
        let orcid = map_creator(&contributor("A B", "Orcid", &["owner"]));
        assert_eq!(orcid.identifiers.get("Orcid").map(String::as_str), Some("0000-0001"));

        let isni = map_creator(&contributor("A B", "isni", &["owner"]));
        assert!(isni.identifiers.is_empty());
    }

    #[test]
    fn test_contributor_carries_first_role() {
        let person = map_contributor(&contributor("A B", "ror", &["owner", "editor"]));
        assert_eq!(person.role.as_deref(), Some("owner"));
        assert_eq!(person.given_name.as_deref(), Some("A"));

        let json = serde_json::to_value(map_creator(&contributor("Solo", "ror", &[]))).unwrap();
        assert!(json.get("role").is_none());
        assert!(json.get("given_name").is_none());
        assert_eq!(json["type"], "Personal");
    }

    #[test]
    fn test_embargo_only_for_future_start() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut dist = Distribution {
            license: vec![
                License {
                    license_ref: "MIT".to_string(),
                    start_date: "2030-01-01".to_string(),
                    name: None,
                },
                License {
                    license_ref: "CC0".to_string(),
                    start_date: "2025-01-01".to_string(),
                    name: None,
                },
            ],
            ..Default::default()
        };

        assert_eq!(embargo_date(&dist, today), NaiveDate::from_ymd_opt(2025, 1, 1));

        dist.license[1].start_date = "2020-01-01".to_string();
        assert_eq!(embargo_date(&dist, today), None);

        dist.license.clear();
        assert_eq!(embargo_date(&dist, today), None);
    }

    #[test]
    fn test_resource_type_translation() {
        let mut translations = TranslationConfig::default();
        translations
            .resource_type
            .insert("dataset".to_string(), "dataset".to_string());

        let dataset = Dataset {
            dataset_type: Some("dataset".to_string()),
            ..Default::default()
        };
        assert_eq!(map_resource_type(&dataset, &translations)["type"], "dataset");
        assert_eq!(map_resource_type(&Dataset::default(), &translations)["type"], "other");
    }

    #[test]
    fn test_matching_distributions_uses_or() {
        let mut config = MadmpConfig::default();
        config.host.url = Some("https://repo.example".to_string());
        config.host.title = Some("Repo".to_string());

        let dist = |url: &str, title: &str| Distribution {
            host: Some(Host {
                url: Some(url.to_string()),
                title: Some(title.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let dataset = Dataset {
            distribution: vec![
                dist("https://repo.example", "Elsewhere"),
                dist("https://other.example", "Repo"),
                dist("https://other.example", "Other"),
            ],
            ..Default::default()
        };

        assert_eq!(matching_distributions(&dataset, &config).len(), 2);
    }
}
