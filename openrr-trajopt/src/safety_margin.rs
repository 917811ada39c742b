use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Distance margin and penalty coefficient for each pair of links
///
/// Pairs are symmetric: `(a, b)` and `(b, a)` share one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyMarginData {
    default_safety_margin_data: (f64, f64),
    max_safety_margin: f64,
    pair_lookup: HashMap<(String, String), (f64, f64)>,
}

impl SafetyMarginData {
    pub fn new(default_safety_margin: f64, default_safety_margin_coeff: f64) -> Self {
        Self {
            default_safety_margin_data: (default_safety_margin, default_safety_margin_coeff),
            max_safety_margin: default_safety_margin,
            pair_lookup: HashMap::new(),
        }
    }

    /// Set the margin and coefficient of one pair of links
    pub fn with_pair(
        mut self,
        link_name1: &str,
        link_name2: &str,
        safety_margin: f64,
        safety_margin_coeff: f64,
    ) -> Self {
        let data = (safety_margin, safety_margin_coeff);
        self.pair_lookup
            .insert((link_name1.to_owned(), link_name2.to_owned()), data);
        self.pair_lookup
            .insert((link_name2.to_owned(), link_name1.to_owned()), data);
        if safety_margin > self.max_safety_margin {
            self.max_safety_margin = safety_margin;
        }
        self
    }

    /// Returns `(margin, coeff)` for the pair, or the default one
    pub fn pair_safety_margin_data(&self, link_name1: &str, link_name2: &str) -> (f64, f64) {
        // avoid allocating the key when no pair is configured
        if self.pair_lookup.is_empty() {
            return self.default_safety_margin_data;
        }
        self.pair_lookup
            .get(&(link_name1.to_owned(), link_name2.to_owned()))
            .copied()
            .unwrap_or(self.default_safety_margin_data)
    }

    pub fn default_safety_margin_data(&self) -> (f64, f64) {
        self.default_safety_margin_data
    }

    /// The largest margin of all pairs including the default one
    ///
    /// Contact managers use this as the contact distance threshold.
    pub fn max_safety_margin(&self) -> f64 {
        self.max_safety_margin
    }

    /// Names of the links which have a pair specific entry
    pub fn link_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pair_lookup
            .keys()
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn from_config(config: &SafetyMarginConfig) -> Self {
        config.pairs.iter().fold(
            Self::new(config.default_margin, config.default_coeff),
            |data, pair| data.with_pair(&pair.pair[0], &pair.pair[1], pair.margin, pair.coeff),
        )
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SafetyMarginPairConfig {
    /// Names of the two links
    pub pair: [String; 2],
    pub margin: f64,
    pub coeff: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SafetyMarginConfig {
    #[serde(default = "default_margin")]
    pub default_margin: f64,
    #[serde(default = "default_coeff")]
    pub default_coeff: f64,
    #[serde(default)]
    pub pairs: Vec<SafetyMarginPairConfig>,
}

fn default_margin() -> f64 {
    0.025
}

fn default_coeff() -> f64 {
    20.0
}

impl Default for SafetyMarginConfig {
    fn default() -> Self {
        Self {
            default_margin: default_margin(),
            default_coeff: default_coeff(),
            pairs: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_lookup_is_symmetric() {
        let data = SafetyMarginData::new(0.025, 20.0).with_pair("a", "b", 0.1, 10.0);
        assert_eq!(data.pair_safety_margin_data("a", "b"), (0.1, 10.0));
        assert_eq!(data.pair_safety_margin_data("b", "a"), (0.1, 10.0));
        assert_eq!(data.pair_safety_margin_data("a", "c"), (0.025, 20.0));
        assert_eq!(data.link_names(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn test_max_safety_margin() {
        let data = SafetyMarginData::new(0.05, 1.0);
        assert_eq!(data.max_safety_margin(), 0.05);
        let data = data.with_pair("a", "b", 0.01, 1.0);
        assert_eq!(data.max_safety_margin(), 0.05);
        let data = data.with_pair("a", "c", 0.2, 1.0);
        assert_eq!(data.max_safety_margin(), 0.2);
    }

    #[test]
    fn test_from_config() {
        let config: SafetyMarginConfig = serde_json::from_str(
            r#"{ "default_margin": 0.03, "pairs": [ { "pair": ["l1", "l2"], "margin": 0.1, "coeff": 5.0 } ] }"#,
        )
        .unwrap();
        assert_eq!(config.default_coeff, 20.0);
        let data = SafetyMarginData::from_config(&config);
        assert_eq!(data.default_safety_margin_data(), (0.03, 20.0));
        assert_eq!(data.pair_safety_margin_data("l2", "l1"), (0.1, 5.0));
        assert_eq!(data.max_safety_margin(), 0.1);

        assert!(serde_json::from_str::<SafetyMarginConfig>(r#"{ "margin": 0.1 }"#).is_err());
    }
}
