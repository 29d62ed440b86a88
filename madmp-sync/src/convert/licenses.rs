//! Known licenses and their lookup
//!
//! A license reference in a DMP may be an SPDX identifier, a short form of
//! it, a URL (http or https), a scheme or a full name. All of them resolve to
//! the same table entry; comparison is case-insensitive.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use madmp_common::madmp::License;

const OPENSOURCE_URI: &str = "https://opensource.org/licenses/";

#[derive(Debug, Clone)]
pub struct KnownLicense {
    pub identifier: &'static str,
    pub name: &'static str,
    pub uri: String,
    pub scheme: &'static str,
    creative_commons: bool,
}

impl KnownLicense {
    fn new(identifier: &'static str, name: &'static str) -> Self {
        Self {
            identifier,
            name,
            uri: format!("{}{}", OPENSOURCE_URI, identifier),
            scheme: identifier,
            creative_commons: false,
        }
    }

    fn with_scheme(mut self, scheme: &'static str) -> Self {
        self.scheme = scheme;
        self
    }

    fn creative_commons(identifier: &'static str, name: &'static str, uri: &str) -> Self {
        Self {
            identifier,
            name,
            uri: uri.to_string(),
            scheme: identifier,
            creative_commons: true,
        }
    }

    /// Every spelling this license is known under
    fn aliases(&self) -> Vec<String> {
        let mut aliases = vec![
            self.identifier.to_string(),
            self.identifier.trim_end_matches(".0").to_string(),
            self.uri.clone(),
            self.scheme.to_string(),
            self.name.to_string(),
        ];

        if let Some(rest) = self.uri.strip_prefix("https://") {
            aliases.push(format!("http://{}", rest));
        } else if let Some(rest) = self.uri.strip_prefix("http://") {
            aliases.push(format!("https://{}", rest));
        }

        let snapshot = aliases.clone();
        for alias in snapshot.iter().filter(|a| a.starts_with("http") && a.ends_with('/')) {
            aliases.push(alias.trim_end_matches('/').to_string());
        }

        if self.creative_commons {
            aliases.push(self.identifier.replace(' ', "-"));
        }

        aliases
    }

    /// True if any of `values` names this license
    pub fn matches<S: AsRef<str>>(&self, values: &[S]) -> bool {
        let aliases = self.aliases();
        values.iter().any(|value| {
            let value = value.as_ref().trim();
            !value.is_empty() && aliases.iter().any(|alias| alias.eq_ignore_ascii_case(value))
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "license": self.name,
            "uri": self.uri,
            "identifier": self.identifier,
            "scheme": self.scheme,
        })
    }
}

pub static KNOWN_LICENSES: Lazy<Vec<KnownLicense>> = Lazy::new(|| {
    vec![
        KnownLicense::new("0BSD", "Zero-Clause BSD"),
        KnownLicense::new("BSD-1-Clause", "1-Clause BSD License").with_scheme("BSD-1"),
        KnownLicense::new("BSD-2-Clause", "2-Clause BSD License").with_scheme("BSD-2"),
        KnownLicense::new("BSD-3-Clause", "3-Clause BSD License").with_scheme("BSD-3"),
        KnownLicense::new("Apache-2.0", "Apache License, Version 2.0"),
        KnownLicense::new("GPL-2.0", "GNU General Public License Version 2"),
        KnownLicense::new("GPL-3.0", "GNU General Public License Version 3"),
        KnownLicense::new("AGPL-3.0", "GNU Affero General Public License Version 3"),
        KnownLicense::new("LGPL-2.0", "GNU Library General Public License Version 2"),
        KnownLicense::new("LGPL-2.1", "GNU Lesser General Public License Version 2.1"),
        KnownLicense::new("LGPL-3.0", "GNU Lesser General Public License Version 3"),
        KnownLicense::new("MIT", "MIT License"),
        KnownLicense::new("MIT-0", "MIT No Attribution License"),
        KnownLicense::new("MPL-2.0", "Mozilla Public License 2.0"),
        KnownLicense::new("CDDL-1.0", "Common Development and Distribution License 1.0"),
        KnownLicense::new("EPL-2.0", "Eclipse Public License Version 2.0"),
        KnownLicense::new("unlicense", "The Unlicense"),
        KnownLicense::creative_commons(
            "CC0",
            "Public Domain Dedication",
            "https://creativecommons.org/publicdomain/zero/1.0/",
        ),
        KnownLicense::creative_commons(
            "CC BY",
            "Attribution",
            "https://creativecommons.org/licenses/by/4.0/",
        ),
        KnownLicense::creative_commons(
            "CC BY-SA",
            "Attribution-ShareAlike",
            "https://creativecommons.org/licenses/by-sa/4.0/",
        ),
        KnownLicense::creative_commons(
            "CC BY-ND",
            "Attribution-NoDerivs",
            "https://creativecommons.org/licenses/by-nd/4.0/",
        ),
        KnownLicense::creative_commons(
            "CC BY-NC",
            "Attribution-NonCommercial",
            "https://creativecommons.org/licenses/by-nc/4.0/",
        ),
        KnownLicense::creative_commons(
            "CC BY-NC-SA",
            "Attribution-NonCommercial-ShareAlike",
            "https://creativecommons.org/licenses/by-nc-sa/4.0/",
        ),
        KnownLicense::creative_commons(
            "CC BY-NC-ND",
            "Attribution-NonCommercial-NoDerivs",
            "https://creativecommons.org/licenses/by-nc-nd/4.0/",
        ),
    ]
});

/// Find the known license a DMP license entry refers to
pub fn lookup(license: &License) -> Option<&'static KnownLicense> {
    let mut values = vec![license.license_ref.as_str()];
    if let Some(name) = license.name.as_deref() {
        values.push(name);
    }

    KNOWN_LICENSES.iter().find(|known| known.matches(&values))
}

/// Record representation of a DMP license entry; unknown licenses become "Other"
pub fn translate_license(license: &License) -> Value {
    match lookup(license) {
        Some(known) => known.to_value(),
        None => json!({
            "license": "Other",
            "uri": "",
            "identifier": "Other",
            "scheme": "Other",
        }),
    }
}
