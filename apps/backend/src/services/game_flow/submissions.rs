use tracing::debug;

use super::SessionManager;
use crate::broadcast::GameEvent;
use crate::concurrency::{AggregateMutation, MutationReceipt};
use crate::domain::rules::{validate_final_vote, validate_night_action, validate_vote};
use crate::domain::{Role, SubmissionKind};
use crate::error::AppError;

impl SessionManager {
    /// Record `voter_id`'s day vote, replacing an earlier vote of theirs.
    pub async fn submit_vote(
        &self,
        game_id: &str,
        voter_id: &str,
        target_id: &str,
    ) -> Result<MutationReceipt, AppError> {
        let session = self.require_session(game_id).await?;
        validate_vote(&session, voter_id, target_id).inspect_err(|err| {
            debug!(game_id, voter_id, target_id, error = %err, "Vote rejected");
        })?;
        self.record(game_id, SubmissionKind::Vote, voter_id, target_id)
            .await
    }

    /// Record an AGREE/DISAGREE ballot on the current defendant.
    pub async fn submit_final_vote(
        &self,
        game_id: &str,
        voter_id: &str,
        choice: &str,
    ) -> Result<MutationReceipt, AppError> {
        let session = self.require_session(game_id).await?;
        let choice = validate_final_vote(&session, voter_id, choice).inspect_err(|err| {
            debug!(game_id, voter_id, error = %err, "Final vote rejected");
        })?;
        self.record(game_id, SubmissionKind::FinalVote, voter_id, choice.as_str())
            .await
    }

    /// Record a night action. A police investigation is answered right away,
    /// privately, once the action is recorded.
    pub async fn submit_night_action(
        &self,
        game_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<MutationReceipt, AppError> {
        let session = self.require_session(game_id).await?;
        let role = validate_night_action(&session, actor_id, target_id).inspect_err(|err| {
            debug!(game_id, actor_id, target_id, error = %err, "Night action rejected");
        })?;
        let receipt = self
            .record(game_id, SubmissionKind::NightAction, actor_id, target_id)
            .await?;

        if role == Role::Police {
            if let Some(target) = session.player(target_id) {
                let event = GameEvent::PoliceInvestigation {
                    game_id: game_id.to_string(),
                    target_id: target.id.clone(),
                    target_name: target.name.clone(),
                    is_mafia: target.has_role(Role::Mafia),
                };
                self.whisper(actor_id, &event).await;
            }
        }
        Ok(receipt)
    }

    async fn record(
        &self,
        game_id: &str,
        kind: SubmissionKind,
        actor_id: &str,
        value: &str,
    ) -> Result<MutationReceipt, AppError> {
        let key = kind.aggregate_key(game_id);
        let receipt = self
            .strategy
            .execute_with_mutation(&key, &AggregateMutation::upsert(actor_id, value))
            .await?;
        debug!(
            game_id,
            kind = kind.as_str(),
            actor_id,
            strategy = %receipt.strategy,
            attempts = receipt.attempts,
            "Submission recorded"
        );
        Ok(receipt)
    }
}
