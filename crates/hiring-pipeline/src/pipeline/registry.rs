use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::domain::{RegistryId, StageId};

/// Highest score a stage threshold (or an evaluation) may take.
pub const MAX_SCORE: i32 = 100;

/// One step in a hiring pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub order: u32,
    pub pass_threshold: u8,
    pub auto_advance: bool,
}

impl Stage {
    /// Threshold is an inclusive minimum.
    pub fn passes(&self, value: u8) -> bool {
        value >= self.pass_threshold
    }
}

/// Recruiter supplied stage definition prior to validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    #[serde(default)]
    pub id: Option<StageId>,
    pub name: String,
    pub order: u32,
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: i32,
    #[serde(default)]
    pub auto_advance: bool,
}

fn default_pass_threshold() -> i32 {
    70
}

impl StageSpec {
    pub fn new(name: impl Into<String>, order: u32, pass_threshold: i32, auto_advance: bool) -> Self {
        Self {
            id: None,
            name: name.into(),
            order,
            pass_threshold,
            auto_advance,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(StageId(id.into()));
        self
    }
}

/// Validation and republish failures for stage registries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a pipeline needs at least one stage")]
    EmptyRegistry,
    #[error("stage '{name}' must have a positive order")]
    ZeroOrder { name: String },
    #[error("stage order {order} is used more than once")]
    DuplicateOrder { order: u32 },
    #[error("stage id '{stage_id}' is used more than once")]
    DuplicateStageId { stage_id: StageId },
    #[error("stage '{name}' pass threshold {threshold} must be between 0 and 100")]
    ThresholdOutOfRange { name: String, threshold: i32 },
    #[error("stage at order {order} needs a name")]
    EmptyName { order: u32 },
    #[error(
        "stage '{stage_id}' is referenced by existing applications and must keep order {published}"
    )]
    StageOrderConflict {
        stage_id: StageId,
        published: u32,
        requested: Option<u32>,
    },
}

/// Immutable ordered set of stages for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RegistrySnapshot")]
pub struct StageRegistry {
    id: RegistryId,
    revision: u32,
    stages: Vec<Stage>,
}

impl StageRegistry {
    /// Validate the specs and publish them as a registry sorted by `order`.
    pub fn create(id: RegistryId, specs: Vec<StageSpec>) -> Result<Self, RegistryError> {
        let stages = validate_specs(&id, specs)?;
        Ok(Self {
            id,
            revision: 1,
            stages,
        })
    }

    /// Default interview pipeline offered when a recruiter doesn't configure one.
    pub fn standard_stages() -> Vec<StageSpec> {
        vec![
            StageSpec::new("Application Review", 1, 70, false),
            StageSpec::new("Phone Screen", 2, 70, false),
            StageSpec::new("Technical Interview", 3, 75, false),
        ]
    }

    pub fn id(&self) -> &RegistryId {
        &self.id
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, stage_id: &StageId) -> Option<&Stage> {
        self.stages.iter().find(|stage| &stage.id == stage_id)
    }

    pub fn contains(&self, stage_id: &StageId) -> bool {
        self.stage(stage_id).is_some()
    }

    pub fn first_stage(&self) -> Result<&Stage, RegistryError> {
        self.stages.first().ok_or(RegistryError::EmptyRegistry)
    }

    pub fn last_stage(&self) -> Option<&Stage> {
        self.stages.last()
    }

    /// Stage with the next-higher order, or `None` for the last or an unknown stage.
    pub fn stage_after(&self, stage_id: &StageId) -> Option<&Stage> {
        let position = self.stages.iter().position(|stage| &stage.id == stage_id)?;
        self.stages.get(position + 1)
    }

    /// Publish a revised stage list under the same registry id.
    ///
    /// Stages in `referenced` have trackers sitting on them or scores recorded against them,
    /// so they must survive with their published order unchanged.
    pub fn republish(
        &self,
        specs: Vec<StageSpec>,
        referenced: &BTreeSet<StageId>,
    ) -> Result<Self, RegistryError> {
        let stages = validate_specs(&self.id, specs)?;
        let requested: BTreeMap<&StageId, u32> =
            stages.iter().map(|stage| (&stage.id, stage.order)).collect();

        for stage_id in referenced {
            let Some(published) = self.stage(stage_id) else {
                continue;
            };
            let requested_order = requested.get(stage_id).copied();
            if requested_order != Some(published.order) {
                return Err(RegistryError::StageOrderConflict {
                    stage_id: stage_id.clone(),
                    published: published.order,
                    requested: requested_order,
                });
            }
        }

        Ok(Self {
            id: self.id.clone(),
            revision: self.revision + 1,
            stages,
        })
    }
}

/// Stored registry shape; re-validated when loaded back from persistence.
#[derive(Deserialize)]
struct RegistrySnapshot {
    id: RegistryId,
    revision: u32,
    stages: Vec<Stage>,
}

impl TryFrom<RegistrySnapshot> for StageRegistry {
    type Error = RegistryError;

    fn try_from(snapshot: RegistrySnapshot) -> Result<Self, Self::Error> {
        let specs = snapshot
            .stages
            .into_iter()
            .map(|stage| StageSpec {
                id: Some(stage.id),
                name: stage.name,
                order: stage.order,
                pass_threshold: i32::from(stage.pass_threshold),
                auto_advance: stage.auto_advance,
            })
            .collect();
        let stages = validate_specs(&snapshot.id, specs)?;
        Ok(Self {
            id: snapshot.id,
            revision: snapshot.revision,
            stages,
        })
    }
}

fn validate_specs(id: &RegistryId, specs: Vec<StageSpec>) -> Result<Vec<Stage>, RegistryError> {
    if specs.is_empty() {
        return Err(RegistryError::EmptyRegistry);
    }

    let mut orders = HashSet::new();
    let mut ids = HashSet::new();
    let mut stages = Vec::with_capacity(specs.len());

    for spec in specs {
        let name = spec.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyName { order: spec.order });
        }
        if spec.order == 0 {
            return Err(RegistryError::ZeroOrder { name });
        }
        if !(0..=MAX_SCORE).contains(&spec.pass_threshold) {
            return Err(RegistryError::ThresholdOutOfRange {
                name,
                threshold: spec.pass_threshold,
            });
        }
        if !orders.insert(spec.order) {
            return Err(RegistryError::DuplicateOrder { order: spec.order });
        }

        let stage_id = spec
            .id
            .unwrap_or_else(|| StageId(format!("{}-stage-{}", id.0, spec.order)));
        if !ids.insert(stage_id.clone()) {
            return Err(RegistryError::DuplicateStageId { stage_id });
        }

        stages.push(Stage {
            id: stage_id,
            name,
            order: spec.order,
            pass_threshold: spec.pass_threshold as u8,
            auto_advance: spec.auto_advance,
        });
    }

    stages.sort_by_key(|stage| stage.order);
    Ok(stages)
}
