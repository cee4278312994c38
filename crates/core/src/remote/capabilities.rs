//! Capability catalog
//!
//! A catalog maps capability names to session descriptors and optionally
//! carries named presets (lists of capability names):
//!
//! ```toml
//! [capabilities]
//! presets = { default = ["chrome"], all = ["chrome", "firefox"] }
//!
//! [capabilities.chrome]
//! browserName = "chrome"
//! smoke_order = 1
//! provider = { name = "grid", url = "http://localhost:4444/wd/hub" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::reporter::{category, Entry, Reporter};

/// Remote session service a capability is served by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// One remote environment descriptor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Capability {
    #[serde(default)]
    pub provider: Option<Provider>,

    /// Position in a remote run; lower first
    #[serde(default, alias = "smokeOrder")]
    pub smoke_order: Option<i64>,

    /// Everything else is handed to the session builder untouched
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Capability {
    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CapabilityCatalog {
    /// Preset name to list of capability names; non-list values are
    /// reported at selection time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presets: Option<BTreeMap<String, Value>>,

    #[serde(flatten)]
    pub entries: BTreeMap<String, Capability>,
}

impl CapabilityCatalog {
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, capability: Capability) {
        self.entries.insert(name.into(), capability);
    }

    pub fn add_preset(&mut self, name: impl Into<String>, members: &[&str]) {
        self.presets
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), Value::from(members.to_vec()));
    }
}

/// Resolve the capabilities a remote run should use.
///
/// Any selection problem is logged and yields an empty list.
pub fn select_capabilities(
    catalog: Option<&CapabilityCatalog>,
    provider: Option<&str>,
    caps: &[String],
    presets: &[String],
    reporter: &Reporter,
) -> Vec<(String, Capability)> {
    let log = |message: String| {
        reporter.log(category::INFO, Some("capabilities"), vec![Entry::from(message)], false);
    };

    let Some(catalog) = catalog else {
        log("no capabilities configured".to_string());
        return Vec::new();
    };

    let mut requested: Vec<(String, &str)> = Vec::new();
    let mut error = false;

    if caps.iter().any(|c| c == "*") {
        requested.extend(catalog.entries.keys().map(|name| (name.clone(), "")));
    } else {
        requested.extend(caps.iter().map(|name| (name.clone(), "")));
    }

    if !presets.is_empty() {
        match &catalog.presets {
            None => {
                log("capPreset given but no presets in capabilities".to_string());
                error = true;
            }
            Some(defined) => {
                for preset in presets {
                    match defined.get(preset) {
                        None => {
                            log(format!("capPreset \"{}\" given that does not exist in capabilities presets", preset));
                            error = true;
                        }
                        Some(Value::Array(members)) => {
                            for member in members {
                                match member.as_str() {
                                    Some(name) => requested.push((name.to_string(), "given in presets ")),
                                    None => {
                                        log(format!("capPreset \"{}\" lists a non-string capability {}", preset, member));
                                        error = true;
                                    }
                                }
                            }
                        }
                        Some(_) => {
                            log(format!("capPreset \"{}\" must be an array in capabilities presets", preset));
                            error = true;
                        }
                    }
                }
            }
        }
    }

    let mut selected = resolve(catalog, &requested, &log, &mut error);

    if !error && selected.is_empty() {
        let fallback: Vec<(String, &str)> = catalog
            .presets
            .as_ref()
            .and_then(|p| p.get("default"))
            .and_then(Value::as_array)
            .map(|members| {
                members
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|name| (name.to_string(), "given in presets "))
                    .collect()
            })
            .unwrap_or_default();
        selected = resolve(catalog, &fallback, &log, &mut error);
    }

    if error {
        return Vec::new();
    }

    let mut result: Vec<(String, Capability)> = selected
        .into_iter()
        .filter(|(_, capability)| provider.is_none() || capability.provider_name() == provider)
        .map(|(name, capability)| (name, capability.clone()))
        .collect();
    result.sort_by_key(|(_, capability)| capability.smoke_order.unwrap_or_default());
    result
}

fn resolve<'c>(
    catalog: &'c CapabilityCatalog,
    requested: &[(String, &str)],
    log: &dyn Fn(String),
    error: &mut bool,
) -> BTreeMap<String, &'c Capability> {
    let mut selected = BTreeMap::new();
    for (name, source) in requested {
        match catalog.get(name) {
            Some(capability) => {
                selected.insert(name.clone(), capability);
            }
            None => {
                log(format!("capability \"{}\" {}does not exist in capabilities", name, source));
                *error = true;
            }
        }
    }
    selected
}
