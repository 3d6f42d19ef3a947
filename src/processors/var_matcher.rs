use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::error::{ColocationError, Result};
use crate::models::{AuxSpec, VariableMatch};

/// Outcome of matching requested obs variables against a model source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSet {
    /// Matches in the order the obs variables were requested
    pub matches: Vec<VariableMatch>,
    /// Obs variables whose model counterpart is not available
    pub unmatched: Vec<String>,
}

impl MatchSet {
    /// obs variable -> model variable
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.matches
            .iter()
            .map(|m| (m.obs_var.clone(), m.model_var.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Resolves which model variable is compared against each obs variable.
///
/// Overrides are keyed by obs variable name; without an override the model
/// variable has the same name as the obs variable.
#[derive(Debug, Clone)]
pub struct VariableMatcher<'a> {
    model_id: &'a str,
    obs_id: &'a str,
    overrides: &'a BTreeMap<String, String>,
    aux: &'a BTreeMap<String, AuxSpec>,
}

impl<'a> VariableMatcher<'a> {
    pub fn new(
        model_id: &'a str,
        obs_id: &'a str,
        overrides: &'a BTreeMap<String, String>,
        aux: &'a BTreeMap<String, AuxSpec>,
    ) -> Self {
        Self {
            model_id,
            obs_id,
            overrides,
            aux,
        }
    }

    /// Fail if any requested obs variable is not provided by the obs source
    pub fn check_obs_support(&self, obs_vars: &[String], supported: &BTreeSet<String>) -> Result<()> {
        let missing: Vec<&str> = obs_vars
            .iter()
            .filter(|v| !supported.contains(*v))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ColocationError::DataCoverage(format!(
            "Obs dataset {} does not support variable(s) {}",
            self.obs_id,
            missing.join(", ")
        )))
    }

    /// Model variable name for one obs variable
    pub fn resolve(&self, obs_var: &str) -> String {
        self.overrides
            .get(obs_var)
            .cloned()
            .unwrap_or_else(|| obs_var.to_string())
    }

    /// Match every requested obs variable against `model_provides`.
    ///
    /// Unavailable model variables are dropped with a warning; an empty match
    /// set is a data coverage error.
    pub fn match_variables(
        &self,
        obs_vars: &[String],
        model_provides: &BTreeSet<String>,
    ) -> Result<MatchSet> {
        let mut set = MatchSet::default();

        for obs_var in obs_vars {
            let model_var = self.resolve(obs_var);
            if !model_provides.contains(&model_var) {
                warn!(
                    "Model {} does not provide {} (requested for obs variable {}), skipping",
                    self.model_id, model_var, obs_var
                );
                set.unmatched.push(obs_var.clone());
                continue;
            }

            let mut matched = VariableMatch::new(obs_var, &model_var);
            if let Some(spec) = self.aux.get(&model_var) {
                matched = matched.with_aux(spec.clone());
            }
            set.matches.push(matched);
        }

        if set.is_empty() {
            return Err(ColocationError::DataCoverage(format!(
                "Could not find any model / obs variable matches for model {} and obs {} (requested: {})",
                self.model_id,
                self.obs_id,
                obs_vars.join(", ")
            )));
        }
        Ok(set)
    }
}
