//! Provider rotation behavior across the pool boundary: quota-aware
//! selection, fallback ordering, and exhaustion reporting.

use amend::llm::{
    BackendError, CallPurpose, CompletionRequest, ProviderDescriptor, ProviderPool, RotationError,
    ScriptedBackend, SessionContext, UsageLedger,
};
use amend::store::MemoryStore;
use std::sync::Arc;

fn descriptor(name: &str, quota: u32, priority: u32) -> ProviderDescriptor {
    ProviderDescriptor {
        name: name.to_string(),
        daily_quota: quota,
        priority,
        fallback_eligible: true,
    }
}

fn request() -> CompletionRequest {
    CompletionRequest::new(
        "prompt",
        SessionContext::new("tester", CallPurpose::Planning),
    )
}

#[tokio::test]
async fn exhausted_primary_falls_through_to_next_provider() {
    let ledger = UsageLedger::new(Arc::new(MemoryStore::new()));
    for _ in 0..30 {
        ledger.record_call("groq").await.unwrap();
    }
    let pool = ProviderPool::with_backends(
        vec![
            (
                descriptor("groq", 30, 1),
                Arc::new(ScriptedBackend::always("groq", "from groq")) as _,
            ),
            (
                descriptor("gemini", 15, 2),
                Arc::new(ScriptedBackend::always("gemini", "from gemini")) as _,
            ),
        ],
        ledger,
    );

    // Selection and dispatch agree: groq is over quota, gemini serves.
    assert_eq!(pool.select().await.unwrap().unwrap().name, "gemini");
    let outcome = pool.dispatch(&request()).await.unwrap();
    assert_eq!(outcome.completion.provider, "gemini");
    assert_eq!(outcome.attempts.len(), 1);
    assert!(outcome.attempts[0].reason.contains("quota"));
}

#[tokio::test]
async fn usage_accrues_only_on_the_serving_provider() {
    let pool = ProviderPool::with_backends(
        vec![
            (
                descriptor("groq", 30, 1),
                Arc::new(ScriptedBackend::always("groq", "ok")) as _,
            ),
            (
                descriptor("gemini", 15, 2),
                Arc::new(ScriptedBackend::always("gemini", "ok")) as _,
            ),
        ],
        UsageLedger::new(Arc::new(MemoryStore::new())),
    );

    for _ in 0..3 {
        pool.dispatch(&request()).await.unwrap();
    }
    assert_eq!(pool.ledger().usage("groq").await.unwrap(), 3);
    assert_eq!(pool.ledger().usage("gemini").await.unwrap(), 0);
}

#[tokio::test]
async fn quota_boundary_is_exact() {
    let ledger = UsageLedger::new(Arc::new(MemoryStore::new()));
    let pool = ProviderPool::with_backends(
        vec![(
            descriptor("groq", 2, 1),
            Arc::new(ScriptedBackend::always("groq", "ok")) as _,
        )],
        ledger,
    );

    pool.dispatch(&request()).await.unwrap();
    pool.dispatch(&request()).await.unwrap();
    // usage == quota: the provider no longer qualifies.
    assert!(pool.select().await.unwrap().is_none());
    let error = pool.dispatch(&request()).await.unwrap_err();
    assert!(matches!(error, RotationError::Exhausted { .. }));
}

#[tokio::test]
async fn exhaustion_reports_every_provider_with_its_reason() {
    let ledger = UsageLedger::new(Arc::new(MemoryStore::new()));
    for _ in 0..15 {
        ledger.record_call("gemini").await.unwrap();
    }
    let pool = ProviderPool::with_backends(
        vec![
            (
                descriptor("groq", 30, 1),
                Arc::new(ScriptedBackend::failing(
                    "groq",
                    BackendError::Unavailable("credentials are not configured".to_string()),
                )) as _,
            ),
            (
                descriptor("gemini", 15, 2),
                Arc::new(ScriptedBackend::always("gemini", "never reached")) as _,
            ),
            (
                descriptor("qwen", 50, 3),
                Arc::new(ScriptedBackend::failing(
                    "qwen",
                    BackendError::CallFailed {
                        status: Some(502),
                        message: "bad gateway".to_string(),
                    },
                )) as _,
            ),
        ],
        ledger,
    );

    let error = pool.dispatch(&request()).await.unwrap_err();
    let RotationError::Exhausted { attempts } = error else {
        panic!("expected exhaustion");
    };
    let providers: Vec<_> = attempts.iter().map(|a| a.provider.as_str()).collect();
    assert_eq!(providers, vec!["groq", "gemini", "qwen"]);
    assert!(attempts[0].reason.contains("credentials"));
    assert!(attempts[1].reason.contains("quota"));
    assert!(attempts[2].reason.contains("bad gateway"));
}

#[tokio::test]
async fn priority_rank_orders_rotation_not_list_position() {
    let pool = ProviderPool::with_backends(
        vec![
            (
                descriptor("gemini", 15, 2),
                Arc::new(ScriptedBackend::always("gemini", "second")) as _,
            ),
            (
                descriptor("groq", 30, 1),
                Arc::new(ScriptedBackend::always("groq", "first")) as _,
            ),
        ],
        UsageLedger::new(Arc::new(MemoryStore::new())),
    );
    let outcome = pool.dispatch(&request()).await.unwrap();
    assert_eq!(outcome.completion.provider, "groq");
}
