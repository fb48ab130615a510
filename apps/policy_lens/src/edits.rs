use anyhow::{anyhow, bail, Result};
use shared::{dates::iso_to_ddmmyyyy, domain::PolicyField};

/// A `field=value` correction given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEdit {
    pub field: PolicyField,
    pub value: String,
}

impl FieldEdit {
    pub fn new(field: PolicyField, value: &str) -> Self {
        Self {
            field,
            value: normalize_value(field, value),
        }
    }
}

pub fn parse_field_edit(raw: &str) -> Result<FieldEdit> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected FIELD=VALUE, got '{raw}'"))?;
    let field = PolicyField::parse(name.trim())
        .ok_or_else(|| anyhow!("unknown policy field '{}'", name.trim()))?;
    if !field.is_trackable() {
        bail!("field '{}' is not part of verification", field.as_str());
    }
    Ok(FieldEdit::new(field, value))
}

/// Date fields are stored as DD/MM/YYYY; ISO input is converted. Anything
/// that is not a recognisable date is kept as typed.
pub fn normalize_value(field: PolicyField, value: &str) -> String {
    let value = value.trim();
    if field.is_date() {
        let converted = iso_to_ddmmyyyy(value);
        if !converted.is_empty() {
            return converted;
        }
    }
    value.to_string()
}
