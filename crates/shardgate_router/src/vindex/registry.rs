//! Keyspace schemas and vindex instances loaded from a JSON vschema.
//!
//! ```json
//! {
//!   "keyspaces": {
//!     "user": {
//!       "sharded": true,
//!       "vindexes": {
//!         "user_idx": { "type": "hash" },
//!         "name_idx": {
//!           "type": "lookup",
//!           "params": { "table": "name_user_idx", "from": "name", "to": "user_id", "keyspace": "lookup" }
//!         }
//!       }
//!     },
//!     "lookup": { "sharded": false }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;

use shardgate_common::error::{GateError, GateResult};

use super::lookup::{LookupNonUnique, LookupParams, LookupUnique};
use super::{HashVindex, NumericVindex, Vindex, XxHashVindex};

#[derive(Debug, Deserialize)]
struct VSchemaSpec {
    #[serde(default)]
    keyspaces: BTreeMap<String, KeyspaceSpec>,
}

#[derive(Debug, Deserialize)]
struct KeyspaceSpec {
    #[serde(default)]
    sharded: bool,
    #[serde(default)]
    vindexes: BTreeMap<String, VindexSpec>,
}

#[derive(Debug, Deserialize)]
struct VindexSpec {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: HashMap<String, String>,
}

/// One keyspace as the router sees it.
#[derive(Debug, Clone)]
pub struct KeyspaceSchema {
    pub name: String,
    pub sharded: bool,
    pub vindexes: BTreeMap<String, Arc<dyn Vindex>>,
}

impl KeyspaceSchema {
    pub fn unsharded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sharded: false,
            vindexes: BTreeMap::new(),
        }
    }

    pub fn sharded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sharded: true,
            vindexes: BTreeMap::new(),
        }
    }

    pub fn with_vindex(mut self, vindex: Arc<dyn Vindex>) -> Self {
        self.vindexes.insert(vindex.name().to_string(), vindex);
        self
    }

    pub fn vindex(&self, name: &str) -> Option<Arc<dyn Vindex>> {
        self.vindexes.get(name).cloned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct VSchema {
    pub keyspaces: BTreeMap<String, KeyspaceSchema>,
}

impl VSchema {
    pub fn from_json(json: &str) -> GateResult<Self> {
        let spec: VSchemaSpec = serde_json::from_str(json)
            .map_err(|e| GateError::Config(format!("invalid vschema: {}", e)))?;
        let mut keyspaces = BTreeMap::new();
        for (ks_name, ks) in spec.keyspaces {
            if !ks.sharded && !ks.vindexes.is_empty() {
                return Err(GateError::Config(format!(
                    "unsharded keyspace {} cannot declare vindexes",
                    ks_name
                )));
            }
            let mut vindexes = BTreeMap::new();
            for (name, v) in ks.vindexes {
                let vindex = create_vindex(&v.kind, &name, &v.params)?;
                vindexes.insert(name, vindex);
            }
            keyspaces.insert(
                ks_name.clone(),
                KeyspaceSchema {
                    name: ks_name,
                    sharded: ks.sharded,
                    vindexes,
                },
            );
        }
        tracing::debug!(keyspaces = keyspaces.len(), "Parsed vschema");
        Ok(Self { keyspaces })
    }

    pub fn keyspace(&self, name: &str) -> Option<&KeyspaceSchema> {
        self.keyspaces.get(name)
    }

    /// Find a vindex by `keyspace` and instance name.
    pub fn vindex(&self, keyspace: &str, name: &str) -> GateResult<Arc<dyn Vindex>> {
        self.keyspace(keyspace)
            .and_then(|ks| ks.vindex(name))
            .ok_or_else(|| GateError::Config(format!("vindex {}.{} not found", keyspace, name)))
    }
}

/// Instantiate a vindex of type `kind`.
pub fn create_vindex(
    kind: &str,
    name: &str,
    params: &HashMap<String, String>,
) -> GateResult<Arc<dyn Vindex>> {
    let vindex: Arc<dyn Vindex> = match kind {
        "hash" => Arc::new(HashVindex::new(name)),
        "numeric" => Arc::new(NumericVindex::new(name)),
        "xxhash" => Arc::new(XxHashVindex::new(name)),
        "lookup" => Arc::new(LookupNonUnique::new(name, LookupParams::from_map(name, params)?)),
        "lookup_unique" => Arc::new(LookupUnique::new(name, LookupParams::from_map(name, params)?)),
        other => {
            return Err(GateError::Config(format!(
                "vindex {}: unknown type {:?}",
                name, other
            )))
        }
    };
    Ok(vindex)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VSCHEMA: &str = r#"{
        "keyspaces": {
            "user": {
                "sharded": true,
                "vindexes": {
                    "user_idx": { "type": "hash" },
                    "name_idx": {
                        "type": "lookup",
                        "params": { "table": "name_user_idx", "from": "name", "to": "user_id", "keyspace": "lookup" }
                    },
                    "email_idx": {
                        "type": "lookup_unique",
                        "params": { "table": "email_user_idx", "from": "email", "to": "user_id", "keyspace": "lookup" }
                    }
                }
            },
            "lookup": { "sharded": false }
        }
    }"#;

    #[test]
    fn test_parse_vschema() {
        let vs = VSchema::from_json(VSCHEMA).unwrap();
        assert!(vs.keyspace("user").unwrap().sharded);
        assert!(!vs.keyspace("lookup").unwrap().sharded);

        let user_idx = vs.vindex("user", "user_idx").unwrap();
        assert_eq!(user_idx.kind(), "hash");
        assert!(user_idx.as_reversible().is_some());

        let name_idx = vs.vindex("user", "name_idx").unwrap();
        assert!(name_idx.as_non_unique().is_some());
        assert!(name_idx.as_lookup().is_some());

        let email_idx = vs.vindex("user", "email_idx").unwrap();
        assert!(email_idx.as_unique().is_some());
        assert!(email_idx.cost() < name_idx.cost());
    }

    #[test]
    fn test_unknown_vindex_type() {
        let err = create_vindex("bloom", "b", &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("unknown type"), "{err}");
    }

    #[test]
    fn test_lookup_missing_params() {
        let err = create_vindex("lookup", "l", &HashMap::new()).unwrap_err();
        assert!(matches!(err, GateError::Config(_)));
    }

    #[test]
    fn test_unsharded_with_vindexes_rejected() {
        let json = r#"{"keyspaces": {"main": {"sharded": false, "vindexes": {"x": {"type": "hash"}}}}}"#;
        assert!(VSchema::from_json(json).is_err());
    }

    #[test]
    fn test_missing_vindex_lookup() {
        let vs = VSchema::from_json(VSCHEMA).unwrap();
        assert!(vs.vindex("user", "nope").is_err());
        assert!(vs.vindex("nope", "user_idx").is_err());
    }
}
