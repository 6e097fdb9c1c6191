use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RegistryError;

/// Stable identifier a resolver uses to construct a step or compensation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepKey(String);

impl StepKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for StepKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// One registered step of a saga type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInfo {
    order: u32,
    name: String,
    implementation: StepKey,
    compensation: Option<StepKey>,
    timeout: Option<Duration>,
    post_step_delay: Option<Duration>,
}

impl StepInfo {
    #[must_use]
    pub fn new(order: u32, name: impl Into<String>, implementation: impl Into<StepKey>) -> Self {
        Self {
            order,
            name: name.into(),
            implementation: implementation.into(),
            compensation: None,
            timeout: None,
            post_step_delay: None,
        }
    }

    #[must_use]
    pub fn with_compensation(mut self, compensation: impl Into<StepKey>) -> Self {
        self.compensation = Some(compensation.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Delay applied after this step completes, before the next one starts.
    /// Never applied while compensating.
    #[must_use]
    pub fn with_post_step_delay(mut self, delay: Duration) -> Self {
        self.post_step_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn implementation(&self) -> &StepKey {
        &self.implementation
    }

    #[must_use]
    pub fn compensation(&self) -> Option<&StepKey> {
        self.compensation.as_ref()
    }

    #[must_use]
    pub fn is_compensable(&self) -> bool {
        self.compensation.is_some()
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub fn post_step_delay(&self) -> Option<Duration> {
        self.post_step_delay
    }

    /// Name and keys that end up in hash input lines.
    fn hashed_fields(&self) -> impl Iterator<Item = &str> {
        [self.name.as_str(), self.implementation.as_str()]
            .into_iter()
            .chain(self.compensation.as_ref().map(StepKey::as_str))
    }
}

/// Digest of a registry's ordered `(order, name, implementation)` tuples.
///
/// Two registries with equal hashes are execution-compatible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepHash(String);

impl StepHash {
    fn compute(steps: &[StepInfo]) -> Self {
        let mut hasher = Sha256::new();
        for step in steps {
            hasher.update(format!(
                "{}|{}|{}\n",
                step.order, step.name, step.implementation
            ));
        }
        Self(hex::encode(hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks a hash recorded at saga start against this one.
    ///
    /// A missing or empty recorded hash disables validation.
    #[must_use]
    pub fn matches(&self, recorded: Option<&str>) -> bool {
        recorded.is_none_or(|hash| hash.is_empty() || hash == self.0)
    }
}

impl fmt::Display for StepHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable, order-sorted catalogue of a saga type's steps.
///
/// Built once at composition time and shared read-only by every instance.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    saga_type: String,
    steps: Vec<StepInfo>,
    hash: StepHash,
}

impl StepRegistry {
    #[must_use]
    pub fn builder(saga_type: impl Into<String>) -> StepRegistryBuilder {
        StepRegistryBuilder {
            saga_type: saga_type.into(),
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    /// Steps sorted ascending by order.
    #[must_use]
    pub fn steps(&self) -> &[StepInfo] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn step_hash(&self) -> &StepHash {
        &self.hash
    }

    #[must_use]
    pub fn first(&self) -> Option<&StepInfo> {
        self.steps.first()
    }

    #[must_use]
    pub fn step_by_order(&self, order: u32) -> Option<&StepInfo> {
        self.steps.iter().find(|step| step.order == order)
    }

    #[must_use]
    pub fn step_by_name(&self, name: &str) -> Option<&StepInfo> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Ordinal position of the step with `order`.
    #[must_use]
    pub fn index_of(&self, order: u32) -> Option<usize> {
        self.steps.iter().position(|step| step.order == order)
    }

    /// Step at an ordinal position. Negative positions have no step.
    #[must_use]
    pub fn step_at(&self, index: i32) -> Option<&StepInfo> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.steps.get(index))
    }

    /// Step with the smallest order strictly greater than `order`.
    #[must_use]
    pub fn next_after_order(&self, order: u32) -> Option<&StepInfo> {
        self.steps
            .iter()
            .filter(|step| step.order > order)
            .min_by_key(|step| step.order)
    }

    /// Step following the completed step at ordinal `index`; `-1` yields the
    /// first step.
    #[must_use]
    pub fn next_after_index(&self, index: i32) -> Option<&StepInfo> {
        if index < 0 {
            return self.first();
        }
        self.step_at(index)
            .and_then(|completed| self.next_after_order(completed.order))
    }
}

pub struct StepRegistryBuilder {
    saga_type: String,
    steps: Vec<StepInfo>,
}

impl StepRegistryBuilder {
    #[must_use]
    pub fn step(mut self, step: StepInfo) -> Self {
        self.steps.push(step);
        self
    }

    /// # Errors
    ///
    /// Returns a `RegistryError` when no steps were added, an order is zero,
    /// an order or name is registered twice, or a name or key contains `|`
    /// or a line break.
    pub fn build(self) -> Result<StepRegistry, RegistryError> {
        let Self {
            saga_type,
            mut steps,
        } = self;

        if steps.is_empty() {
            return Err(RegistryError::Empty { saga_type });
        }

        let mut names: HashSet<&str> = HashSet::new();
        let mut orders: HashMap<u32, &str> = HashMap::new();
        for step in &steps {
            if step.order == 0 {
                return Err(RegistryError::ZeroOrder {
                    name: step.name.clone(),
                });
            }
            if let Some(first) = orders.insert(step.order, &step.name) {
                return Err(RegistryError::DuplicateOrder {
                    order: step.order,
                    first: first.to_string(),
                    second: step.name.clone(),
                });
            }
            if !names.insert(&step.name) {
                return Err(RegistryError::DuplicateName(step.name.clone()));
            }
            if let Some(value) = step.hashed_fields().find(|value| value.contains(['|', '\n'])) {
                return Err(RegistryError::ReservedCharacter {
                    step: step.name.clone(),
                    value: value.to_string(),
                });
            }
        }

        steps.sort_by_key(StepInfo::order);
        let hash = StepHash::compute(&steps);

        Ok(StepRegistry {
            saga_type,
            steps,
            hash,
        })
    }
}
