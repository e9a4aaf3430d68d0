use rankguard_core::{AppError, AppResult};
use rankguard_domain::{InvalidationEvent, InvalidationSubject, RoleId};
use serde::{Deserialize, Serialize};

/// Stream entry field holding the JSON payload.
pub(super) const PAYLOAD_FIELD: &str = "payload";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RolePayload {
    role_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct JobPayload {
    job: String,
}

pub(super) fn encode_event(event: &InvalidationEvent) -> AppResult<String> {
    let encoded = match event {
        InvalidationEvent::RolePermUpdate { role_id }
        | InvalidationEvent::RoleAttrUpdate { role_id } => serde_json::to_string(&RolePayload {
            role_id: role_id.as_u64(),
        }),
        InvalidationEvent::JobAttrUpdate { job } => {
            serde_json::to_string(&JobPayload { job: job.clone() })
        }
    };

    encoded.map_err(|error| {
        AppError::Internal(format!(
            "failed to encode invalidation payload for '{}': {error}",
            event.subject().as_str()
        ))
    })
}

pub(super) fn decode_event(subject: InvalidationSubject, payload: &str) -> AppResult<InvalidationEvent> {
    let invalid = |error: serde_json::Error| {
        AppError::Validation(format!(
            "invalid payload on '{}': {error}",
            subject.as_str()
        ))
    };

    match subject {
        InvalidationSubject::RolePermUpdate => {
            let payload: RolePayload = serde_json::from_str(payload).map_err(invalid)?;
            Ok(InvalidationEvent::RolePermUpdate {
                role_id: RoleId::new(payload.role_id),
            })
        }
        InvalidationSubject::RoleAttrUpdate => {
            let payload: RolePayload = serde_json::from_str(payload).map_err(invalid)?;
            Ok(InvalidationEvent::RoleAttrUpdate {
                role_id: RoleId::new(payload.role_id),
            })
        }
        InvalidationSubject::JobAttrUpdate => {
            let payload: JobPayload = serde_json::from_str(payload).map_err(invalid)?;
            if payload.job.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "invalid payload on '{}': job must not be empty",
                    subject.as_str()
                )));
            }
            Ok(InvalidationEvent::JobAttrUpdate { job: payload.job })
        }
    }
}
