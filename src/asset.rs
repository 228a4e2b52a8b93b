use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{Display, EnumString};

/// Fixed-width length of an issuer account id. Canonical identities rely on
/// this width rather than a delimiter search: `"issuer:code"` is split at
/// character 56, not at the first `:`.
pub const ISSUER_LEN: usize = 56;

/// Canonical identity of the native asset.
pub const NATIVE: &str = "native";

/// Type tag of a fungible asset: the native asset, or a credit asset whose
/// subtype depends on the length of its code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum AssetType {
    #[default]
    #[strum(serialize = "native")]
    #[serde(rename = "native")]
    Native,
    #[strum(serialize = "credit_alphanum4")]
    #[serde(rename = "credit_alphanum4")]
    CreditAlphanum4,
    #[strum(serialize = "credit_alphanum12")]
    #[serde(rename = "credit_alphanum12")]
    CreditAlphanum12,
}

impl AssetType {
    pub fn is_native(&self) -> bool {
        matches!(self, AssetType::Native)
    }

    /// Subtype for a credit asset code: codes longer than 4 characters fall
    /// into the 12-character class.
    pub fn for_code(code: &str) -> AssetType {
        if code.len() > 4 { AssetType::CreditAlphanum12 } else { AssetType::CreditAlphanum4 }
    }
}

/// Canonical textual identity of an asset: `"native"`, or `"issuer:code"` for
/// credit assets. Total and injective over well-formed `(type, code, issuer)`.
pub fn asset_to_string(asset_type: AssetType, code: Option<&str>, issuer: Option<&str>) -> String {
    if asset_type.is_native() {
        NATIVE.to_string()
    } else {
        format!("{}:{}", issuer.unwrap_or_default(), code.unwrap_or_default())
    }
}

/// Inverse of [`asset_to_string`]: splits the fixed-width issuer off the front
/// and derives the subtype from the code length. Never fails; malformed input
/// is the caller's responsibility (the query boundary validates before the
/// core is reached).
pub fn parse_asset(identity: &str) -> (AssetType, Option<String>, Option<String>) {
    if identity == NATIVE {
        return (AssetType::Native, None, None);
    }

    let issuer = identity.get(..ISSUER_LEN).unwrap_or(identity);
    let code = identity.get(ISSUER_LEN + 1..).unwrap_or_default();

    (AssetType::for_code(code), Some(code.to_string()), Some(issuer.to_string()))
}

/// Expand an identity into a structured record under caller-supplied field
/// names, for boundary serialization. The native asset renders only the type
/// field; credit assets render type, code and issuer.
pub fn asset_to_object(identity: &str, prop_names: [&str; 3]) -> Value {
    let [type_prop, code_prop, issuer_prop] = prop_names;
    let (asset_type, code, issuer) = parse_asset(identity);

    let mut record = Map::new();
    if asset_type.is_native() {
        record.insert(type_prop.to_string(), Value::String(identity.to_string()));
    } else {
        record.insert(type_prop.to_string(), Value::String(asset_type.to_string()));
        record.insert(code_prop.to_string(), Value::String(code.unwrap_or_default()));
        record.insert(issuer_prop.to_string(), Value::String(issuer.unwrap_or_default()));
    }

    Value::Object(record)
}
