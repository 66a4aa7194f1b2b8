mod common;

use common::{TestStore, ATTEMPT, PATIENT};
use speechscore::domain::errors::DomainError;
use speechscore::domain::models::TaskType;
use speechscore::domain::ports::RecordingRepository;
use speechscore::services::AccessTokenService;

#[tokio::test]
async fn test_issue_is_lazy_and_stable() {
    let store = TestStore::new().await;
    let service = AccessTokenService::new(store.tokens.clone());

    let first = service.issue_for(PATIENT).await.unwrap();
    let again = service.issue_for(PATIENT).await.unwrap();
    let other = service.issue_for("2002").await.unwrap();

    assert_eq!(first.token, again.token);
    assert_ne!(first.token, other.token);
    assert_eq!(service.resolve(&first.token).await.unwrap(), PATIENT);
    assert_eq!(service.resolve(&other.token).await.unwrap(), "2002");
}

#[tokio::test]
async fn test_unknown_token_and_empty_patient_are_rejected() {
    let store = TestStore::new().await;
    let service = AccessTokenService::new(store.tokens.clone());

    assert!(matches!(
        service.resolve("no-such-token").await,
        Err(DomainError::TokenNotFound)
    ));
    assert!(matches!(
        service.issue_for("  ").await,
        Err(DomainError::ValidationFailed(_))
    ));
}

#[tokio::test]
async fn test_pending_jobs_carry_the_patient_token() {
    let store = TestStore::new().await;
    store.seed_family(TaskType::Language, "SAY_ANI", 1).await;

    let jobs = store.recordings.list_pending_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].access_token, None);

    let token = AccessTokenService::new(store.tokens.clone())
        .issue_for(PATIENT)
        .await
        .unwrap();

    let jobs = store.recordings.list_pending_jobs().await.unwrap();
    assert_eq!(jobs[0].patient_id, PATIENT);
    assert_eq!(jobs[0].attempt, ATTEMPT);
    assert_eq!(jobs[0].access_token.as_deref(), Some(token.token.as_str()));
}
