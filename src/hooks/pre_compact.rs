//! Pre-compaction hook: write the handoff document while the session's
//! full context still exists. Must never block compaction; errors are
//! swallowed by the outer wrapper.

use anyhow::Result;
use chrono::Utc;

use super::HookEvent;
use crate::handoff;
use crate::identity::Scope;
use crate::store::{CapsuleStore, ContextRecord, RecordType};

pub(crate) fn handle(
    store: &CapsuleStore,
    scope: &Scope,
    event: &HookEvent,
) -> Result<Option<String>> {
    if event.session_id.is_empty() {
        return Ok(None);
    }
    let document = handoff::generate(store, scope, &event.session_id);

    let mut tags = vec![
        "handoff".to_string(),
        "pre-compact".to_string(),
        event.session_id.clone(),
    ];
    if let Some(teammate) = scope.teammate_name() {
        tags.push(teammate.to_string());
    }

    let record = ContextRecord::new(
        &scope.session_handoff_ns(&event.session_id),
        &format!("handoff - {}", Utc::now().to_rfc3339()),
        RecordType::Summary,
    )
    .with_summary(document)
    .with_tags(tags);
    store.save(&record)?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_tagged_handoff_record() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = CapsuleStore::open(&tmp.path().join("c.db")).unwrap();
        let scope = Scope::new("abc".to_string(), None);
        let event = HookEvent::parse(r#"{"session_id":"s1"}"#).unwrap();

        let out = handle(&store, &scope, &event).unwrap();
        assert!(out.is_none(), "pre-compact emits nothing to stdout");

        let found = store.latest_with_tag("proj/abc", "handoff").unwrap().unwrap();
        assert_eq!(found.namespace, "proj/abc/session/s1/handoff");
        assert!(found.has_tag("pre-compact"));
        assert!(found.summary.contains("# Session Handoff"));
    }

    #[test]
    fn missing_session_id_is_a_no_op() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = CapsuleStore::open(&tmp.path().join("c.db")).unwrap();
        let scope = Scope::new("abc".to_string(), None);
        let event = HookEvent::parse(r#"{"other":1}"#).unwrap();
        handle(&store, &scope, &event).unwrap();
        assert_eq!(store.count_all().unwrap(), 0);
    }
}
