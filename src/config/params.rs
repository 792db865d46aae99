//! `${dotted.path}` parameter interpolation.
//!
//! # Rules
//! - Only the first token of a string is substituted
//! - A string that is exactly one token takes the parameter's typed value
//! - Otherwise the token is replaced by the parameter's textual form
//! - A token naming an absent parameter is an error that carries both the
//!   parameter path and the property path where it occurred

use std::sync::OnceLock;

use regex::Regex;

use crate::config::loader::ConfigError;
use crate::layout::Directories;
use crate::tree::{self, Mapping, Value};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{(.*?)\}").expect("valid parameter pattern"))
}

/// Read-only parameter dictionary.
#[derive(Debug, Clone, Default)]
pub struct Params {
    tree: Value,
}

impl Params {
    pub fn new(tree: Value) -> Self {
        Self { tree }
    }

    /// Directory paths plus the active environment name under `env`.
    pub fn for_environment(dirs: &Directories, env: &str) -> Self {
        let mut tree = dirs.to_value();
        let mut overlay = Mapping::new();
        overlay.insert(Value::from("env"), Value::from(env));
        tree::deep_merge(&mut tree, Value::Mapping(overlay));
        Self { tree }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        tree::get_path(&self.tree, path)
    }

    pub fn as_value(&self) -> &Value {
        &self.tree
    }

    /// Substitute the first token of `input`.
    ///
    /// On a missing parameter, returns the parameter path as the error.
    pub fn parse(&self, input: String) -> Result<Value, String> {
        let Some(captures) = token_pattern().captures(&input) else {
            return Ok(Value::String(input));
        };
        let (Some(token), Some(name)) = (captures.get(0), captures.get(1)) else {
            return Ok(Value::String(input));
        };

        let param = name.as_str();
        let value = self.get(param).ok_or_else(|| param.to_string())?;

        if token.start() == 0 && token.end() == input.len() {
            return Ok(value.clone());
        }

        let mut out = String::with_capacity(input.len());
        out.push_str(&input[..token.start()]);
        out.push_str(&tree::scalar_to_string(value));
        out.push_str(&input[token.end()..]);
        Ok(Value::String(out))
    }

    /// Interpolate every string leaf of `tree`.
    pub fn interpolate(&self, tree: Value) -> Result<Value, ConfigError> {
        tree::try_map_strings(tree, &mut |leaf, props| {
            self.parse(leaf).map_err(|param| ConfigError::MissingParameter {
                param,
                property: props.join("."),
            })
        })
    }
}
