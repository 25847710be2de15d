//! A [`SkillExecutor`] placeholder for when no skill loader is configured.
//! Skill loading is an excluded external collaborator; this always fails
//! closed rather than pretending to run anything.

use async_trait::async_trait;
use silas_executor::ports::{SkillExecutor, SkillInvocation, SkillResult};

/// Rejects every invocation: no skills are registered.
pub struct NullSkillExecutor;

#[async_trait]
impl SkillExecutor for NullSkillExecutor {
    async fn execute(&self, skill_name: &str, _invocation: &SkillInvocation) -> SkillResult {
        SkillResult { success: false, output: None, error: Some(format!("no skill loader configured for '{skill_name}'")), duration_ms: 0 }
    }
}
