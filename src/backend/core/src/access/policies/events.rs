//! Per-host job output: events and host summaries.
//!
//! Both are read-only records produced by a running job. Visibility
//! follows the job and the host the record belongs to; nobody creates,
//! edits or deletes them through the API.

use crate::access::context::AccessContext;
use crate::access::payload::Payload;
use crate::access::policy::Policy;
use crate::error::Result;
use crate::rbac::models::{Resource, ResourceType};
use crate::store::Query;

/// Event types emitted while polling an async task.
const POLLING_EVENTS: [&str; 2] = ["runner_on_ok", "runner_on_failed"];
const POLLING_MODULE: &str = "async_status";

fn job_visibility(cx: &AccessContext<'_>) -> Result<Query> {
    let job = cx.registry().resolve(ResourceType::Job)?.visibility_filter(cx)?;
    Ok(Query::related("job", job))
}

fn host_visibility(cx: &AccessContext<'_>) -> Result<Query> {
    cx.registry().resolve(ResourceType::Host)?.visibility_filter(cx)
}

/// Internal events produced by async status polling.
fn polling_event() -> Query {
    Query::any_of(POLLING_EVENTS.iter().map(|event| Query::attr_eq("event", *event)))
        .and(Query::attr_eq("module_name", POLLING_MODULE))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Host Summary
// ═══════════════════════════════════════════════════════════════════════════════

/// Visible whenever both the job and the host are readable.
#[derive(Debug, Default)]
pub struct JobHostSummaryPolicy;

impl Policy for JobHostSummaryPolicy {
    fn name(&self) -> &'static str {
        "job_host_summary"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        Ok(job_visibility(cx)?.and(Query::related("host", host_visibility(cx)?)))
    }

    fn can_add(&self, _cx: &AccessContext<'_>, _payload: &Payload) -> Result<bool> {
        Ok(false)
    }

    fn can_change(&self, _cx: &AccessContext<'_>, _obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        Ok(false)
    }

    fn can_delete(&self, _cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(false)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Event
// ═══════════════════════════════════════════════════════════════════════════════

/// Visible when the job is readable and the event either has no host or
/// its host is readable. Async polling noise is hidden from everyone.
#[derive(Debug, Default)]
pub struct JobEventPolicy;

impl Policy for JobEventPolicy {
    fn name(&self) -> &'static str {
        "job_event"
    }

    fn filtered_query(&self, cx: &AccessContext<'_>) -> Result<Query> {
        let host = Query::RelationIsNull("host".to_string()).or(Query::related("host", host_visibility(cx)?));
        Ok(job_visibility(cx)?.and(host))
    }

    fn visibility_filter(&self, cx: &AccessContext<'_>) -> Result<Query> {
        let scope = if cx.is_superuser() || cx.is_system_auditor() {
            Query::All
        } else {
            self.filtered_query(cx)?
        };
        Ok(scope.and(polling_event().negate()))
    }

    fn can_add(&self, _cx: &AccessContext<'_>, _payload: &Payload) -> Result<bool> {
        Ok(false)
    }

    fn can_change(&self, _cx: &AccessContext<'_>, _obj: &Resource, _payload: Option<&Payload>) -> Result<bool> {
        Ok(false)
    }

    fn can_delete(&self, _cx: &AccessContext<'_>, _obj: &Resource) -> Result<bool> {
        Ok(false)
    }
}
