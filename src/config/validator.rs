//! Model validation: identity and identifier consistency.

use crate::case::is_identifier;
use crate::config::ModelDescriptor;
use crate::error::ConfigError;

fn invalid(model: &ModelDescriptor, reason: String) -> ConfigError {
    ConfigError::InvalidModel {
        model: model.name.clone(),
        reason,
    }
}

pub fn validate(model: &ModelDescriptor) -> Result<(), ConfigError> {
    if model.name.trim().is_empty() {
        return Err(invalid(model, "name must not be empty".into()));
    }
    if !is_identifier(&model.name) {
        return Err(invalid(model, format!("name '{}' is not an identifier", model.name)));
    }

    let primary: Vec<&str> = model
        .attributes
        .iter()
        .filter(|(_, a)| a.primary_key)
        .map(|(name, _)| name.as_str())
        .collect();
    if primary.len() > 1 {
        return Err(invalid(model, format!("more than one primary key: {}", primary.join(", "))));
    }

    for (name, attribute) in &model.attributes {
        if !is_identifier(&attribute.field) {
            return Err(invalid(model, format!("attribute '{}' has invalid field '{}'", name, attribute.field)));
        }
    }

    for ident in [model.table.as_deref(), model.schema.as_deref()].into_iter().flatten() {
        if !is_identifier(ident) {
            return Err(invalid(model, format!("'{}' is not a valid table or schema name", ident)));
        }
    }

    for sort in &model.sorting {
        if !is_identifier(&sort.field) {
            return Err(invalid(model, format!("sorting field '{}' is not an identifier", sort.field)));
        }
    }

    for set in &model.unique {
        if set.is_empty() {
            return Err(invalid(model, "unique field set must not be empty".into()));
        }
        if let Some(bad) = set.iter().find(|f| !is_identifier(f)) {
            return Err(invalid(model, format!("unique field '{}' is not an identifier", bad)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Attribute, SortSpec};

    #[test]
    fn accepts_single_primary_key() {
        let m = ModelDescriptor::new("Report").attribute("id", Attribute::new("id").primary());
        assert!(validate(&m).is_ok());
    }

    #[test]
    fn rejects_two_primary_keys() {
        let m = ModelDescriptor::new("Report")
            .attribute("id", Attribute::new("id").primary())
            .attribute("uuid", Attribute::new("uuid").primary());
        assert!(matches!(validate(&m), Err(ConfigError::InvalidModel { .. })));
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let m = ModelDescriptor::new("Report").attribute("id", Attribute::new("id\"; --"));
        assert!(validate(&m).is_err());
        let m = ModelDescriptor::new("Report").with_sorting(vec![SortSpec::asc("a b")]);
        assert!(validate(&m).is_err());
        assert!(validate(&ModelDescriptor::new("")).is_err());
    }
}
