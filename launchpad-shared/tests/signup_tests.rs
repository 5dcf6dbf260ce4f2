//! Atomic signup against a live database

mod common;

use chrono::Utc;
use launchpad_shared::auth::claims::Claims;
use launchpad_shared::auth::flow;
use launchpad_shared::db::query::FindRequest;
use launchpad_shared::models::account::{Account, AccountStatus, CreateAccount};
use launchpad_shared::models::membership::{Membership, MembershipStatus, Role};
use launchpad_shared::signup::{signup, SignupRequest};
use launchpad_shared::Error;

fn request(account_name: &str, email: &str) -> SignupRequest {
    SignupRequest {
        account: CreateAccount {
            name: account_name.to_string(),
            ..Default::default()
        },
        user: common::new_user(email),
    }
}

async fn accounts_named(pool: &sqlx::PgPool, name: &str) -> usize {
    let request = FindRequest::new().filter("name", name).include_archived(true);
    Account::find(pool, &Claims::internal(), &request).await.unwrap().len()
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_signup_creates_account_user_and_admin_membership() {
    let pool = common::pool().await;
    let auth = common::authenticator().await;

    let name = common::unique("signup");
    let email = common::unique_email();
    let result = signup(&pool, request(&name, &email), Utc::now()).await.unwrap();

    assert_eq!(result.account.name, name);
    assert_eq!(result.account.status, AccountStatus::Active);
    assert_eq!(result.account.signup_user_id, Some(result.user.id));
    assert_eq!(result.account.billing_user_id, Some(result.user.id));
    assert_eq!(result.user.email, email);

    let membership = Membership::find_pair(&pool, &Claims::internal(), result.user.id, result.account.id, false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(membership.roles, vec![Role::Admin]);
    assert_eq!(membership.status, MembershipStatus::Active);

    let grant = flow::authenticate(&pool, &auth, &email, common::PASSWORD, chrono::Duration::minutes(5), Utc::now())
        .await
        .unwrap();
    assert!(grant.claims.is_admin_of(result.account.id));

    let json = serde_json::to_value(&result).unwrap();
    assert!(json["user"].get("password_hash").is_none());
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_taken_email_writes_nothing() {
    let pool = common::pool().await;

    let existing = common::create_user(&pool).await;
    let name = common::unique("signup");

    match signup(&pool, request(&name, &existing.email), Utc::now()).await {
        Err(Error::Validation(fields)) => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].name, "user.email");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert_eq!(accounts_named(&pool, &name).await, 0);
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_both_uniqueness_failures_reported_together() {
    let pool = common::pool().await;

    let existing_user = common::create_user(&pool).await;
    let existing_account = common::create_account(&pool).await;

    match signup(&pool, request(&existing_account.name, &existing_user.email), Utc::now()).await {
        Err(Error::Validation(fields)) => {
            let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["user.email", "account.name"]);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_structural_errors_checked_before_uniqueness() {
    let pool = common::pool().await;

    let existing = common::create_user(&pool).await;
    let mut bad = request("", &existing.email);
    bad.user.password_confirm = "nope".to_string();

    match signup(&pool, bad, Utc::now()).await {
        Err(Error::Validation(fields)) => {
            let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["account.name", "user.password_confirm"]);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}
