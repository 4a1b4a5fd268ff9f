//! A figment provider for the process environment.
//!
//! Values are handed over as the exact strings found in the environment, so
//! `0123` stays `0123` and `[x]` is not mistaken for an array. Only the
//! listed keys are read; names are matched case-insensitively.

use figment::value::{Dict, Map, Value};
use figment::{Error, Metadata, Profile, Provider};

/// Environment variable provider limited to a set of keys.
#[derive(Debug, Clone)]
pub struct EnvVars {
    vars: Vec<(String, String)>,
}

impl EnvVars {
    /// Snapshot the variables of this process named in `keys`.
    #[must_use]
    pub fn only(keys: &[&str]) -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        Self::from_vars(vars, keys)
    }

    /// Build from explicit `(name, value)` pairs.
    pub fn from_vars<I>(vars: I, keys: &[&str]) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let key = key.to_ascii_lowercase();
                keys.contains(&key.as_str()).then_some((key, value))
            })
            .collect();
        Self { vars }
    }
}

impl Provider for EnvVars {
    fn metadata(&self) -> Metadata {
        Metadata::named("environment variable(s)")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let dict = self
            .vars
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value.clone())))
            .collect();
        Ok(Profile::Default.collect(dict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(vars: &[(&str, &str)]) -> Dict {
        let vars = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()));
        let provider = EnvVars::from_vars(vars, &["mqtt_password", "debug"]);
        provider
            .data()
            .unwrap()
            .remove(&Profile::Default)
            .unwrap_or_default()
    }

    #[test]
    fn test_values_stay_strings() {
        let dict = dict(&[("MQTT_PASSWORD", "0123"), ("DEBUG", "1")]);
        assert_eq!(dict.get("mqtt_password").and_then(Value::as_str), Some("0123"));
        assert_eq!(dict.get("debug").and_then(Value::as_str), Some("1"));
    }

    #[test]
    fn test_bracketed_values_are_not_parsed() {
        let dict = dict(&[("MQTT_PASSWORD", "[secret]")]);
        assert_eq!(
            dict.get("mqtt_password").and_then(Value::as_str),
            Some("[secret]")
        );
    }

    #[test]
    fn test_unlisted_keys_are_ignored() {
        let dict = dict(&[("HOME", "/root"), ("PATH", "/usr/bin")]);
        assert!(dict.is_empty());
    }

    #[test]
    fn test_key_names_are_case_insensitive() {
        let dict = dict(&[("mqtt_Password", "x")]);
        assert!(dict.contains_key("mqtt_password"));
    }
}
