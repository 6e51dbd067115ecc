//! Read-only workout catalog.

use crate::catalog::pagination::{Page, PageRequest};
use crate::workouts::{Workout, WorkoutPlan};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors from a content store.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    IoError(String),

    #[error("Failed to parse catalog: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Catalog backend error: {0}")]
    Backend(String),
}

/// Queries the application makes against the content backend.
///
/// Lists contain published records only, newest first. Slug lookups return
/// the record whatever its status.
pub trait ContentStore: Send + Sync {
    fn list_workouts(&self, page: PageRequest) -> Result<Page<Workout>, CatalogError>;

    fn workout_by_slug(&self, slug: &str) -> Result<Option<Workout>, CatalogError>;

    fn list_workout_plans(&self, page: PageRequest) -> Result<Page<WorkoutPlan>, CatalogError>;

    fn workout_plan_by_slug(&self, slug: &str) -> Result<Option<WorkoutPlan>, CatalogError>;
}

/// Shape of an exported catalog document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogDocument {
    #[serde(default)]
    workouts: Vec<Workout>,
    #[serde(default)]
    workout_plans: Vec<WorkoutPlan>,
}

/// Catalog held in memory, typically loaded from a JSON export.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContentStore {
    workouts: Vec<Workout>,
    plans: Vec<WorkoutPlan>,
}

impl InMemoryContentStore {
    pub fn new(workouts: Vec<Workout>, plans: Vec<WorkoutPlan>) -> Self {
        Self {
            workouts,
            plans,
        }
    }

    /// Parse `{"workouts": [...], "workoutPlans": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        tracing::debug!(
            "Loaded catalog with {} workouts and {} plans",
            document.workouts.len(),
            document.workout_plans.len()
        );
        Ok(Self::new(document.workouts, document.workout_plans))
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn insert_workout(&mut self, workout: Workout) {
        self.workouts.retain(|w| w.id != workout.id);
        self.workouts.push(workout);
    }

    pub fn insert_workout_plan(&mut self, plan: WorkoutPlan) {
        self.plans.retain(|p| p.id != plan.id);
        self.plans.push(plan);
    }
}

impl ContentStore for InMemoryContentStore {
    fn list_workouts(&self, page: PageRequest) -> Result<Page<Workout>, CatalogError> {
        let mut published: Vec<Workout> = self
            .workouts
            .iter()
            .filter(|w| w.is_published())
            .cloned()
            .collect();
        published.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(&published))
    }

    fn workout_by_slug(&self, slug: &str) -> Result<Option<Workout>, CatalogError> {
        Ok(self
            .workouts
            .iter()
            .find(|w| w.slug.as_str() == slug)
            .cloned())
    }

    fn list_workout_plans(&self, page: PageRequest) -> Result<Page<WorkoutPlan>, CatalogError> {
        let mut published: Vec<WorkoutPlan> = self
            .plans
            .iter()
            .filter(|p| p.is_published())
            .cloned()
            .collect();
        published.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page.apply(&published))
    }

    fn workout_plan_by_slug(&self, slug: &str) -> Result<Option<WorkoutPlan>, CatalogError> {
        Ok(self.plans.iter().find(|p| p.slug.as_str() == slug).cloned())
    }
}
