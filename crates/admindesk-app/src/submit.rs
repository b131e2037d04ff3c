// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    EntityDescriptor, EntityDraft, EntityRecord, MappedError, RecordId, RemoteFailure,
    RemoteService, UPDATE_FAILED_MESSAGE, map_or_fallback,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitTarget {
    Create,
    Update(RecordId),
}

/// A submission that passed the gate and still needs its remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSubmission {
    pub request_id: u64,
    pub target: SubmitTarget,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Carries the record as the remote returned it.
    Saved {
        target: SubmitTarget,
        record: EntityRecord,
    },
    Failed {
        target: SubmitTarget,
        error: MappedError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("a save is already in progress")]
    InFlight,
    #[error("record has no id; reload the list and try again")]
    MissingId,
    #[error("no dialog is open")]
    NoOpenDialog,
    #[error("result for request {got} does not match pending request {expected:?}")]
    StaleResult { expected: Option<u64>, got: u64 },
}

/// Gate and payload builder for one dialog's saves. At most one submission
/// is unresolved at a time.
#[derive(Debug, Clone)]
pub struct EditSubmissionController {
    descriptor: &'static EntityDescriptor,
    in_flight: Option<(u64, SubmitTarget)>,
    next_request: u64,
}

impl EditSubmissionController {
    pub fn new(descriptor: &'static EntityDescriptor) -> Self {
        Self {
            descriptor,
            in_flight: None,
            next_request: 1,
        }
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn build_payload(&self, draft: &EntityDraft) -> Map<String, Value> {
        self.descriptor
            .editable_fields()
            .filter_map(|spec| {
                draft
                    .get(spec.name)
                    .map(|value| (spec.name.to_owned(), value.clone()))
            })
            .collect()
    }

    pub fn begin(
        &mut self,
        draft: &EntityDraft,
        target: SubmitTarget,
    ) -> Result<PendingSubmission, SubmitError> {
        if self.in_flight.is_some() {
            return Err(SubmitError::InFlight);
        }
        if let SubmitTarget::Update(id) = &target
            && id.as_str().is_empty()
        {
            return Err(SubmitError::MissingId);
        }
        let request_id = self.next_request;
        self.next_request += 1;
        self.in_flight = Some((request_id, target.clone()));
        let payload = self.build_payload(draft);
        debug!(
            service = self.descriptor.service,
            request_id,
            fields = payload.len(),
            "submission started"
        );
        Ok(PendingSubmission {
            request_id,
            target,
            payload,
        })
    }

    /// Performs the remote call. Holds no controller state, so it can run on
    /// a worker thread while the controller stays with the dialog.
    pub fn execute<S: RemoteService + ?Sized>(
        service: &S,
        pending: &PendingSubmission,
    ) -> Result<EntityRecord, RemoteFailure> {
        match &pending.target {
            SubmitTarget::Create => service.create(&pending.payload),
            SubmitTarget::Update(id) => service.patch(id, &pending.payload),
        }
    }

    pub fn finish(
        &mut self,
        request_id: u64,
        result: Result<EntityRecord, RemoteFailure>,
    ) -> Result<SubmissionOutcome, SubmitError> {
        let target = match self.in_flight.take() {
            Some((pending, target)) if pending == request_id => target,
            other => {
                let expected = other.as_ref().map(|(pending, _)| *pending);
                self.in_flight = other;
                warn!(
                    service = self.descriptor.service,
                    request_id, "dropping result for a request that is not pending"
                );
                return Err(SubmitError::StaleResult {
                    expected,
                    got: request_id,
                });
            }
        };
        Ok(outcome_for(target, result))
    }

    pub fn submit<S: RemoteService + ?Sized>(
        &mut self,
        service: &S,
        draft: &EntityDraft,
        target: SubmitTarget,
    ) -> Result<SubmissionOutcome, SubmitError> {
        let pending = self.begin(draft, target)?;
        let result = Self::execute(service, &pending);
        self.finish(pending.request_id, result)
    }
}

pub(crate) fn outcome_for(
    target: SubmitTarget,
    result: Result<EntityRecord, RemoteFailure>,
) -> SubmissionOutcome {
    match result {
        Ok(record) => SubmissionOutcome::Saved { target, record },
        Err(failure) => {
            debug!(error = %failure, "submission rejected");
            SubmissionOutcome::Failed {
                target,
                error: map_or_fallback(&failure, UPDATE_FAILED_MESSAGE),
            }
        }
    }
}
