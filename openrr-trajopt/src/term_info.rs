use std::{collections::HashMap, fmt, rc::Rc, sync::Arc};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    collision_terms::{
        CastCollisionEvaluator, CollisionConstraint, CollisionCost, CollisionEvaluator,
        SingleTimestepCollisionEvaluator,
    },
    errors::*,
    problem::TrajOptProblem,
    safety_margin::{SafetyMarginConfig, SafetyMarginData},
};

/// What a term adds to the problem
#[derive(Clone, Copy, Serialize, Deserialize, Debug, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TermType {
    #[default]
    Cost,
    Constraint,
    /// A cost and a constraint sharing the same evaluator
    CostAndConstraint,
}

impl TermType {
    pub fn has_cost(&self) -> bool {
        matches!(self, TermType::Cost | TermType::CostAndConstraint)
    }

    pub fn has_constraint(&self) -> bool {
        matches!(self, TermType::Constraint | TermType::CostAndConstraint)
    }
}

/// Description of a term, turned into costs and constraints by `hatch`
pub trait TermInfo {
    fn name(&self) -> &str;
    fn term_type(&self) -> TermType;
    fn hatch(&self, prob: &mut TrajOptProblem) -> Result<()>;
}

#[derive(Clone, Serialize, Deserialize, Debug, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CollisionTermConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub term_type: TermType,
    /// First step, inclusive
    #[serde(default)]
    pub first_step: usize,
    /// Last step, inclusive. The last step of the trajectory if not set.
    #[serde(default)]
    pub last_step: Option<usize>,
    /// Check the volume swept between steps instead of each step
    #[serde(default)]
    pub continuous: bool,
    /// Step `i` is swept to step `i + gap`
    #[serde(default = "default_gap")]
    pub gap: usize,
    /// One entry used for all the steps, or one entry for each evaluated step
    #[serde(default = "default_safety_margins")]
    pub safety_margins: Vec<SafetyMarginConfig>,
}

fn default_name() -> String {
    "collision".to_owned()
}

fn default_gap() -> usize {
    1
}

fn default_safety_margins() -> Vec<SafetyMarginConfig> {
    vec![SafetyMarginConfig::default()]
}

impl Default for CollisionTermConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            term_type: TermType::default(),
            first_step: 0,
            last_step: None,
            continuous: false,
            gap: default_gap(),
            safety_margins: default_safety_margins(),
        }
    }
}

/// Collision avoidance for a range of steps
#[derive(Debug, Clone)]
pub struct CollisionTermInfo {
    config: CollisionTermConfig,
    safety_margin_data: Vec<Arc<SafetyMarginData>>,
}

impl CollisionTermInfo {
    pub fn new(config: CollisionTermConfig) -> Self {
        let safety_margin_data = config
            .safety_margins
            .iter()
            .map(|c| Arc::new(SafetyMarginData::from_config(c)))
            .collect();
        Self {
            config,
            safety_margin_data,
        }
    }

    /// Use margins built in code instead of the ones of the config
    pub fn with_safety_margin_data(mut self, data: Vec<Arc<SafetyMarginData>>) -> Self {
        self.safety_margin_data = data;
        self
    }

    pub fn config(&self) -> &CollisionTermConfig {
        &self.config
    }

    fn invalid(&self, message: String) -> Error {
        Error::InvalidTerm {
            name: self.config.name.clone(),
            message,
        }
    }

    /// Steps which get an evaluator
    ///
    /// Discrete terms check `first_step..=last_step`. Continuous terms sweep
    /// each returned step `i` to `i + gap`.
    pub fn steps(&self, n_steps: usize) -> Result<Vec<usize>> {
        if n_steps == 0 {
            return Err(self.invalid("the problem has no step".to_owned()));
        }
        let first = self.config.first_step;
        let last = self.config.last_step.unwrap_or(n_steps - 1);
        if first > last || last >= n_steps {
            return Err(self.invalid(format!(
                "invalid steps {first}..={last} for {n_steps} steps"
            )));
        }
        if !self.config.continuous {
            return Ok((first..=last).collect());
        }
        let gap = self.config.gap;
        if gap == 0 {
            return Err(self.invalid("gap must be positive".to_owned()));
        }
        if last - first < gap {
            return Err(self.invalid(format!(
                "no pair of steps in {first}..={last} with gap {gap}"
            )));
        }
        Ok((first..=last - gap).collect())
    }

    /// Margins of each step returned by [`Self::steps`]
    fn step_safety_margin_data(&self, num_steps: usize) -> Result<Vec<Arc<SafetyMarginData>>> {
        match self.safety_margin_data.len() {
            1 => Ok(vec![self.safety_margin_data[0].clone(); num_steps]),
            n if n == num_steps => Ok(self.safety_margin_data.clone()),
            n => Err(self.invalid(format!(
                "{n} safety margins given for {num_steps} steps"
            ))),
        }
    }
}

impl TermInfo for CollisionTermInfo {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn term_type(&self) -> TermType {
        self.config.term_type
    }

    fn hatch(&self, prob: &mut TrajOptProblem) -> Result<()> {
        let steps = self.steps(prob.n_steps())?;
        let data = self.step_safety_margin_data(steps.len())?;

        let object_names = prob.environment().collision_object_names();
        for d in &data {
            if let Some(name) = d
                .link_names()
                .into_iter()
                .find(|n| !object_names.contains(n))
            {
                return Err(self.invalid(format!("unknown link {name} in safety margins")));
            }
        }

        // build everything before touching the problem
        let mut evaluators = Vec::with_capacity(steps.len());
        for (&step, data) in steps.iter().zip(data) {
            let evaluator: CollisionEvaluator = if self.config.continuous {
                CastCollisionEvaluator::new(
                    prob.manipulator().clone(),
                    prob.environment(),
                    *prob.world_to_base(),
                    data,
                    prob.vars().row(step),
                    prob.vars().row(step + self.config.gap),
                )?
                .into()
            } else {
                SingleTimestepCollisionEvaluator::new(
                    prob.manipulator().clone(),
                    prob.environment(),
                    *prob.world_to_base(),
                    data,
                    prob.vars().row(step),
                )?
                .into()
            };
            evaluators.push((step, Rc::new(evaluator)));
        }
        debug!(
            "hatch {}: {} evaluators, continuous={}",
            self.config.name,
            evaluators.len(),
            self.config.continuous
        );

        let term_type = self.config.term_type;
        for (step, evaluator) in evaluators {
            let name = format!("{}_{step}", self.config.name);
            if term_type.has_cost() {
                prob.add_cost(Box::new(CollisionCost::new(&name, evaluator.clone())));
            }
            if term_type.has_constraint() {
                prob.add_constraint(Box::new(CollisionConstraint::new(&name, evaluator)));
            }
        }
        Ok(())
    }
}

/// Creates a term description from its `params`
pub type TermInfoMaker = fn(&serde_json::Value) -> Result<Box<dyn TermInfo>>;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TermDescription {
    #[serde(rename = "type")]
    term_type: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// Makers of term descriptions, by type name
///
/// `TermRegistry::default()` knows the `"collision"` term.
#[derive(Clone)]
pub struct TermRegistry {
    makers: HashMap<String, TermInfoMaker>,
}

impl TermRegistry {
    /// Create a registry without any maker
    pub fn new() -> Self {
        Self {
            makers: HashMap::new(),
        }
    }

    pub fn register(&mut self, type_name: &str, maker: TermInfoMaker) {
        self.makers.insert(type_name.to_owned(), maker);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.makers.contains_key(type_name)
    }

    pub fn create(&self, type_name: &str, params: &serde_json::Value) -> Result<Box<dyn TermInfo>> {
        let maker = self
            .makers
            .get(type_name)
            .ok_or_else(|| Error::UnknownTermType(type_name.to_owned()))?;
        maker(params)
    }

    /// Create a term from `{ "type": ..., "params": { ... } }`
    pub fn create_from_json(&self, value: &serde_json::Value) -> Result<Box<dyn TermInfo>> {
        let description = TermDescription::deserialize(value)?;
        self.create(&description.term_type, &description.params)
    }

    /// Create terms from a JSON array of descriptions
    pub fn create_from_json_str(&self, json: &str) -> Result<Vec<Box<dyn TermInfo>>> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
        values.iter().map(|v| self.create_from_json(v)).collect()
    }
}

fn make_collision_term_info(params: &serde_json::Value) -> Result<Box<dyn TermInfo>> {
    let config = if params.is_null() {
        CollisionTermConfig::default()
    } else {
        CollisionTermConfig::deserialize(params)?
    };
    Ok(Box::new(CollisionTermInfo::new(config)))
}

impl Default for TermRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("collision", make_collision_term_info);
        registry
    }
}

impl fmt::Debug for TermRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.makers.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("TermRegistry").field("makers", &names).finish()
    }
}
