//! `$expand` settings tree
//!
//! A client can ask for related entities to be embedded in place of plain
//! navigation links, with arbitrary nesting:
//! `$expand=Datastreams($expand=Observations,Sensor),Locations`. The parsed
//! settings form an immutable tree passed by value down the recursive
//! mapping calls; a mapper consults [`ExpansionSettings::should_expand`]
//! per relation and, on a hit, maps the related entity with the nested
//! settings one level down.
//!
//! Nesting depth is bounded only by what the request asked for; the engine
//! does no independent depth limiting.

use std::collections::BTreeMap;

use sensorgate_common::{GatewayError, Result};

/// Parsed `$expand` clauses for one nesting level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionSettings {
    relations: BTreeMap<String, ExpansionSettings>,
}

impl ExpansionSettings {
    /// Settings that expand nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any relation is requested at this level.
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Whether the given relation should be eagerly embedded. Relations the
    /// client did not name degrade gracefully to link-only representation.
    pub fn should_expand(&self, relation: &str) -> bool {
        self.relations.contains_key(relation)
    }

    /// The nested settings to pass one level down when mapping the given
    /// relation.
    pub fn settings_for(&self, relation: &str) -> ExpansionSettings {
        self.relations.get(relation).cloned().unwrap_or_default()
    }

    /// Relation names requested at this level, in stable order.
    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    /// Parse a `$expand` parameter value.
    ///
    /// Supports comma-separated relations, parenthesised nested options
    /// with an inner `$expand=`, and `A/B` path sugar for
    /// `A($expand=B)`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::empty());
        }
        let mut relations = BTreeMap::new();
        for clause in split_top_level(input)? {
            let (name, nested) = parse_clause(clause.trim())?;
            merge(&mut relations, name, nested);
        }
        Ok(Self { relations })
    }
}

fn merge(relations: &mut BTreeMap<String, ExpansionSettings>, name: String, nested: ExpansionSettings) {
    match relations.entry(name) {
        std::collections::btree_map::Entry::Vacant(entry) => {
            entry.insert(nested);
        }
        std::collections::btree_map::Entry::Occupied(mut entry) => {
            for (key, value) in nested.relations {
                merge(&mut entry.get_mut().relations, key, value);
            }
        }
    }
}

/// Split on commas that are not inside parentheses.
fn split_top_level(input: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in input.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| GatewayError::BadRequest("unbalanced $expand".to_string()))?;
            }
            ',' if depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(GatewayError::BadRequest("unbalanced $expand".to_string()));
    }
    parts.push(&input[start..]);
    Ok(parts)
}

fn parse_clause(clause: &str) -> Result<(String, ExpansionSettings)> {
    if clause.is_empty() {
        return Err(GatewayError::BadRequest("empty $expand clause".to_string()));
    }

    // A/B path sugar nests the remainder under the head segment
    if let Some((head, rest)) = split_path_sugar(clause) {
        let (name, nested) = parse_clause(rest)?;
        let mut relations = BTreeMap::new();
        relations.insert(name, nested);
        return Ok((head.to_string(), ExpansionSettings { relations }));
    }

    match clause.find('(') {
        None => Ok((clause.to_string(), ExpansionSettings::empty())),
        Some(open) => {
            if !clause.ends_with(')') {
                return Err(GatewayError::BadRequest("unbalanced $expand".to_string()));
            }
            let name = clause[..open].trim();
            if name.is_empty() {
                return Err(GatewayError::BadRequest("empty $expand clause".to_string()));
            }
            let inner = &clause[open + 1..clause.len() - 1];
            let mut nested = ExpansionSettings::empty();
            for option in split_options(inner)? {
                let option = option.trim();
                if let Some(value) = option.strip_prefix("$expand=") {
                    nested = ExpansionSettings::parse(value)?;
                } else if !option.is_empty() {
                    return Err(GatewayError::BadRequest(format!(
                        "unsupported $expand option: {option}"
                    )));
                }
            }
            Ok((name.to_string(), nested))
        }
    }
}

/// `A/B` nesting applies only when the slash appears before any parenthesis.
fn split_path_sugar(clause: &str) -> Option<(&str, &str)> {
    let slash = clause.find('/')?;
    match clause.find('(') {
        Some(open) if open < slash => None,
        _ => Some((&clause[..slash], &clause[slash + 1..])),
    }
}

/// Split nested options on semicolons that are not inside parentheses.
fn split_options(input: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in input.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| GatewayError::BadRequest("unbalanced $expand".to_string()))?;
            }
            ';' if depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_flat_relations() {
        let settings = ExpansionSettings::parse("Datastreams,Locations").unwrap();
        assert!(settings.should_expand("Datastreams"));
        assert!(settings.should_expand("Locations"));
        assert!(!settings.should_expand("HistoricalLocations"));
        assert!(settings.settings_for("Datastreams").is_empty());
    }

    #[test]
    fn test_nested_expand() {
        let settings =
            ExpansionSettings::parse("Datastreams($expand=Observations,Sensor),Locations").unwrap();
        let nested = settings.settings_for("Datastreams");
        assert!(nested.should_expand("Observations"));
        assert!(nested.should_expand("Sensor"));
        assert!(!nested.should_expand("Thing"));
        assert!(settings.settings_for("Locations").is_empty());
    }

    #[test]
    fn test_deeply_nested_expand() {
        let settings =
            ExpansionSettings::parse("Datastreams($expand=Observations($expand=FeatureOfInterest))")
                .unwrap();
        let level2 = settings.settings_for("Datastreams").settings_for("Observations");
        assert!(level2.should_expand("FeatureOfInterest"));
    }

    #[test]
    fn test_path_sugar() {
        let settings = ExpansionSettings::parse("Datastreams/Observations").unwrap();
        assert!(settings.should_expand("Datastreams"));
        assert!(settings
            .settings_for("Datastreams")
            .should_expand("Observations"));
    }

    #[test]
    fn test_duplicate_clauses_merge() {
        let settings =
            ExpansionSettings::parse("Datastreams/Observations,Datastreams/Sensor").unwrap();
        let nested = settings.settings_for("Datastreams");
        assert!(nested.should_expand("Observations"));
        assert!(nested.should_expand("Sensor"));
    }

    #[test]
    fn test_empty_input_expands_nothing() {
        assert!(ExpansionSettings::parse("").unwrap().is_empty());
        assert!(ExpansionSettings::parse("  ").unwrap().is_empty());
        assert!(ExpansionSettings::empty().is_empty());
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        assert!(ExpansionSettings::parse("Datastreams(").is_err());
        assert!(ExpansionSettings::parse("Datastreams)").is_err());
        assert!(ExpansionSettings::parse("Datastreams,,Locations").is_err());
        assert!(ExpansionSettings::parse("($expand=X)").is_err());
        assert!(ExpansionSettings::parse("Datastreams($select=name)").is_err());
    }
}
