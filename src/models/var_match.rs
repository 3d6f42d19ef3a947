use serde::{Deserialize, Serialize};
use validator::Validate;

/// How to derive a model variable from other model variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AuxSpec {
    /// Name of a function in the [`crate::readers::AuxRegistry`]
    #[validate(length(min = 1))]
    pub fun: String,

    #[validate(length(min = 1))]
    pub vars_required: Vec<String>,
}

impl AuxSpec {
    pub fn new(fun: &str, vars_required: &[&str]) -> Self {
        Self {
            fun: fun.to_string(),
            vars_required: vars_required.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// An observation variable paired with the model variable compared against it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableMatch {
    pub obs_var: String,
    pub model_var: String,
    pub aux: Option<AuxSpec>,
}

impl VariableMatch {
    pub fn new(obs_var: &str, model_var: &str) -> Self {
        Self {
            obs_var: obs_var.to_string(),
            model_var: model_var.to_string(),
            aux: None,
        }
    }

    pub fn with_aux(mut self, aux: AuxSpec) -> Self {
        self.aux = Some(aux);
        self
    }
}
