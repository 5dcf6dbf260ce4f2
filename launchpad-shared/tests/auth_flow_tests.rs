//! Sign-in, account switching, and password changes against a live database

mod common;

use chrono::{Duration, Utc};
use launchpad_shared::auth::flow::{self, PasswordChange};
use launchpad_shared::models::membership::{Membership, Role};
use launchpad_shared::Error;

const NEW_PASSWORD: &str = "n3w!Frontier";

fn ttl() -> Duration {
    Duration::minutes(30)
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_authenticate_issues_verifiable_token() {
    let pool = common::pool().await;
    let auth = common::authenticator().await;

    let (user, first, _) = common::tenant(&pool, vec![Role::Admin]).await;
    let second = common::create_account(&pool).await;
    // membership order is by created_at, which is millisecond precision
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    common::add_member(&pool, &user, &second, vec![Role::User]).await;

    let grant = flow::authenticate(&pool, &auth, &user.email.to_uppercase(), common::PASSWORD, ttl(), Utc::now())
        .await
        .unwrap();

    assert_eq!(grant.claims.subject, user.id);
    assert_eq!(grant.claims.audience, first.id);
    assert_eq!(grant.claims.account_ids, vec![first.id, second.id]);
    assert_eq!(grant.claims.roles, vec![Role::Admin]);
    assert_eq!(auth.verify(&grant.token).unwrap(), grant.claims);
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_authenticate_failures_are_indistinguishable() {
    let pool = common::pool().await;
    let auth = common::authenticator().await;

    let (user, _, _) = common::tenant(&pool, vec![Role::User]).await;
    let loner = common::create_user(&pool).await;
    let now = Utc::now();

    for (email, password) in [
        (user.email.as_str(), "wrong!Passw0rd"),
        ("nobody@launchpad.test", common::PASSWORD),
        (loner.email.as_str(), common::PASSWORD),
    ] {
        let result = flow::authenticate(&pool, &auth, email, password, ttl(), now).await;
        assert!(matches!(result, Err(Error::AuthenticationFailure)), "{}: {:?}", email, result);
    }
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_switch_account() {
    let pool = common::pool().await;
    let auth = common::authenticator().await;

    let (user, first, _) = common::tenant(&pool, vec![Role::User]).await;
    let second = common::create_account(&pool).await;
    common::add_member(&pool, &user, &second, vec![Role::Admin]).await;
    let stranger = common::create_account(&pool).await;

    let grant = flow::authenticate(&pool, &auth, &user.email, common::PASSWORD, ttl(), Utc::now())
        .await
        .unwrap();

    let switched = flow::switch_account(&pool, &auth, &grant.claims, second.id, ttl(), Utc::now())
        .await
        .unwrap();
    assert_eq!(switched.claims.audience, second.id);
    assert_eq!(switched.claims.roles, vec![Role::Admin]);
    assert_eq!(switched.claims.account_ids, grant.claims.account_ids);
    assert!(switched.claims.is_admin_of(second.id));

    let result = flow::switch_account(&pool, &auth, &grant.claims, stranger.id, ttl(), Utc::now()).await;
    assert!(matches!(result, Err(Error::AuthenticationFailure)));

    Membership::archive(
        &pool,
        &launchpad_shared::auth::claims::Claims::internal(),
        user.id,
        first.id,
        Utc::now(),
    )
    .await
    .unwrap();
    let result = flow::switch_account(&pool, &auth, &switched.claims, first.id, ttl(), Utc::now()).await;
    assert!(matches!(result, Err(Error::AuthenticationFailure)));
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_update_own_password() {
    let pool = common::pool().await;
    let auth = common::authenticator().await;

    let (user, _, claims) = common::tenant(&pool, vec![Role::User]).await;

    let updated = flow::update_password(&pool, &claims, user.id, PasswordChange::new(NEW_PASSWORD, NEW_PASSWORD), Utc::now())
        .await
        .unwrap();
    assert_ne!(updated.password_salt, user.password_salt);

    let old = flow::authenticate(&pool, &auth, &user.email, common::PASSWORD, ttl(), Utc::now()).await;
    assert!(matches!(old, Err(Error::AuthenticationFailure)));
    flow::authenticate(&pool, &auth, &user.email, NEW_PASSWORD, ttl(), Utc::now())
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_update_password_of_peer_requires_admin() {
    let pool = common::pool().await;

    let (_, account, member) = common::tenant(&pool, vec![Role::User]).await;
    let peer = common::create_user(&pool).await;
    common::add_member(&pool, &peer, &account, vec![Role::User]).await;

    let change = PasswordChange::new(NEW_PASSWORD, NEW_PASSWORD);
    let result = flow::update_password(&pool, &member, peer.id, change.clone(), Utc::now()).await;
    assert!(matches!(result, Err(Error::Forbidden)));

    let admin_user = common::create_user(&pool).await;
    common::add_member(&pool, &admin_user, &account, vec![Role::Admin]).await;
    let admin = common::claims_for(&admin_user, &account, vec![account.id], vec![Role::Admin]);
    flow::update_password(&pool, &admin, peer.id, change, Utc::now()).await.unwrap();

    let mismatched = PasswordChange::new(NEW_PASSWORD, "something else");
    let result = flow::update_password(&pool, &admin, peer.id, mismatched, Utc::now()).await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_password_reset() {
    let pool = common::pool().await;
    let auth = common::authenticator().await;

    let (user, _, _) = common::tenant(&pool, vec![Role::User]).await;

    assert!(flow::begin_password_reset(&pool, "nobody@launchpad.test", Utc::now())
        .await
        .unwrap()
        .is_none());

    let token = flow::begin_password_reset(&pool, &user.email, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token.len(), 64);

    let reset = flow::complete_password_reset(&pool, &token, PasswordChange::new(NEW_PASSWORD, NEW_PASSWORD), Utc::now())
        .await
        .unwrap();
    assert_eq!(reset.id, user.id);
    assert!(reset.password_reset.is_none());

    flow::authenticate(&pool, &auth, &user.email, NEW_PASSWORD, ttl(), Utc::now())
        .await
        .unwrap();

    let reused = flow::complete_password_reset(&pool, &token, PasswordChange::new(NEW_PASSWORD, NEW_PASSWORD), Utc::now()).await;
    assert!(matches!(reused, Err(Error::AuthenticationFailure)));
}
