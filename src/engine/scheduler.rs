use crate::engine::request::{Request, RequestStatus};
use crate::error::Result;

/// Tracks every request added to the engine and picks the batch for the
/// next decode step. Newly assigned requests are promoted in assignment
/// order, behind requests already in progress.
pub struct Scheduler {
    requests: Vec<Request>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { requests: Vec::new() }
    }

    pub fn add_request(&mut self, request: Request) {
        self.requests.push(request);
    }

    pub fn remove_request(&mut self, id: uuid::Uuid) {
        self.requests.retain(|r| r.id() != id);
    }

    /// Promotes waiting requests and returns the in-progress batch for this
    /// step. Completed requests are skipped.
    pub fn schedule(&mut self) -> Result<Vec<Request>> {
        let mut in_progress = Vec::new();
        let mut to_promote = Vec::new();
        for request in &self.requests {
            match request.status() {
                RequestStatus::InProgress => in_progress.push(request.clone()),
                RequestStatus::Assigned => to_promote.push(request.clone()),
                RequestStatus::Unassigned | RequestStatus::Completed => {}
            }
        }
        to_promote.sort_by_key(|r| r.assigned_at());
        for request in to_promote {
            request.schedule()?;
            in_progress.push(request);
        }
        Ok(in_progress)
    }

    pub fn has_pending_requests(&self) -> bool {
        self.requests.iter().any(|r| r.status() != RequestStatus::Completed)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
