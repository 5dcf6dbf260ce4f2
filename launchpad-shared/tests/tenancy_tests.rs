//! Tenant isolation and role gates against a live database
//!
//! Run with: cargo test --test tenancy_tests -- --ignored

mod common;

use chrono::{Duration, TimeZone, Utc};
use launchpad_shared::auth::claims::Claims;
use launchpad_shared::db::{cancellable, truncate_ms};
use launchpad_shared::db::query::FindRequest;
use launchpad_shared::models::account::{Account, CreateAccount, UpdateAccount};
use launchpad_shared::models::membership::{AddMembership, Membership, Role, UpdateMembership};
use launchpad_shared::models::project::{CreateProject, Project, UpdateProject};
use launchpad_shared::models::user::{UpdateUser, User};
use launchpad_shared::Error;
use tokio_util::sync::CancellationToken;

async fn project_in(pool: &sqlx::PgPool, account: &Account, name: &str) -> Project {
    let data = CreateProject {
        account_id: Some(account.id),
        name: name.to_string(),
        status: None,
    };
    Project::create(pool, &Claims::internal(), data, Utc::now()).await.unwrap()
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_other_tenants_rows_are_invisible() {
    let pool = common::pool().await;

    let (user_a, account_a, claims_a) = common::tenant(&pool, vec![Role::Admin]).await;
    let (user_b, account_b, _) = common::tenant(&pool, vec![Role::Admin]).await;
    let own = project_in(&pool, &account_a, "own").await;
    let foreign = project_in(&pool, &account_b, "foreign").await;

    assert!(matches!(Account::read(&pool, &claims_a, account_b.id, false).await, Err(Error::NotFound)));
    assert!(matches!(Project::read(&pool, &claims_a, foreign.id, false).await, Err(Error::NotFound)));
    assert!(matches!(User::read(&pool, &claims_a, user_b.id, false).await, Err(Error::NotFound)));

    assert_eq!(Account::read(&pool, &claims_a, account_a.id, false).await.unwrap().id, account_a.id);
    assert_eq!(User::read(&pool, &claims_a, user_a.id, false).await.unwrap().id, user_a.id);

    let projects = Project::find(&pool, &claims_a, &FindRequest::new()).await.unwrap();
    assert_eq!(projects.iter().map(|p| p.id).collect::<Vec<_>>(), vec![own.id]);

    let accounts = Account::find(&pool, &claims_a, &FindRequest::new()).await.unwrap();
    assert!(accounts.iter().all(|a| a.id != account_b.id));
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_filters_cannot_widen_visibility() {
    let pool = common::pool().await;

    let (_, _, claims_a) = common::tenant(&pool, vec![Role::User]).await;
    let (_, account_b, _) = common::tenant(&pool, vec![Role::Admin]).await;
    project_in(&pool, &account_b, "foreign").await;

    let request = FindRequest::new().filter("account_id", account_b.id).include_archived(true);
    assert!(Project::find(&pool, &claims_a, &request).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_hidden_rows_are_not_found_before_forbidden() {
    let pool = common::pool().await;

    let (_, account_a, member_claims) = common::tenant(&pool, vec![Role::User]).await;
    let (_, account_b, _) = common::tenant(&pool, vec![Role::Admin]).await;
    let own = project_in(&pool, &account_a, "own").await;
    let foreign = project_in(&pool, &account_b, "foreign").await;

    let rename = UpdateProject {
        name: Some("renamed".to_string()),
        status: None,
    };

    let result = Project::update(&pool, &member_claims, foreign.id, rename.clone(), Utc::now()).await;
    assert!(matches!(result, Err(Error::NotFound)));

    let result = Project::update(&pool, &member_claims, own.id, rename, Utc::now()).await;
    assert!(matches!(result, Err(Error::Forbidden)));

    let result = Account::archive(&pool, &member_claims, account_b.id, Utc::now()).await;
    assert!(matches!(result, Err(Error::NotFound)));

    let result = Account::archive(&pool, &member_claims, account_a.id, Utc::now()).await;
    assert!(matches!(result, Err(Error::Forbidden)));
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_admin_manages_own_account() {
    let pool = common::pool().await;

    let (_, account, admin) = common::tenant(&pool, vec![Role::Admin]).await;

    let project = Project::create(
        &pool,
        &admin,
        CreateProject {
            account_id: None,
            name: "launch".to_string(),
            status: None,
        },
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(project.account_id, account.id);

    let updated = Account::update(
        &pool,
        &admin,
        account.id,
        UpdateAccount {
            city: Some("Anchorage".to_string()),
            ..Default::default()
        },
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(updated.city, "Anchorage");
    assert!(updated.updated_at >= updated.created_at);

    let newcomer = common::create_user(&pool).await;
    let membership = Membership::add(
        &pool,
        &admin,
        AddMembership {
            user_id: newcomer.id,
            account_id: account.id,
            roles: vec![Role::User],
            status: None,
        },
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(membership.roles, vec![Role::User]);

    // newcomer is visible once they share the audience
    assert_eq!(User::read(&pool, &admin, newcomer.id, false).await.unwrap().id, newcomer.id);

    let promoted = Membership::update(
        &pool,
        &admin,
        newcomer.id,
        account.id,
        UpdateMembership {
            roles: Some(vec![Role::Admin, Role::User]),
            ..Default::default()
        },
        Utc::now(),
    )
    .await
    .unwrap();
    assert!(promoted.roles.contains(&Role::Admin));
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_member_without_admin_role_cannot_add_members() {
    let pool = common::pool().await;

    let (_, account, member) = common::tenant(&pool, vec![Role::User]).await;
    let newcomer = common::create_user(&pool).await;

    let result = Membership::add(
        &pool,
        &member,
        AddMembership {
            user_id: newcomer.id,
            account_id: account.id,
            roles: vec![Role::User],
            status: None,
        },
        Utc::now(),
    )
    .await;
    assert!(matches!(result, Err(Error::Forbidden)));
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_member_without_admin_role_cannot_create_accounts() {
    let pool = common::pool().await;

    let (_, _, member) = common::tenant(&pool, vec![Role::User]).await;
    let name = common::unique("account");

    let data = CreateAccount {
        name: name.clone(),
        ..Default::default()
    };
    let result = Account::create(&pool, &member, data, Utc::now()).await;
    assert!(matches!(result, Err(Error::Forbidden)), "got {:?}", result);

    let request = FindRequest::new().filter("name", name.as_str()).include_archived(true);
    assert!(Account::find(&pool, &Claims::internal(), &request).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_account_user_references_stay_in_tenant() {
    let pool = common::pool().await;

    let (admin_user, account, admin) = common::tenant(&pool, vec![Role::Admin]).await;
    let (foreign, _, _) = common::tenant(&pool, vec![Role::Admin]).await;

    let result = Account::create(
        &pool,
        &admin,
        CreateAccount {
            name: common::unique("account"),
            billing_user_id: Some(foreign.id),
            ..Default::default()
        },
        Utc::now(),
    )
    .await;
    match result {
        Err(Error::Validation(fields)) => assert_eq!(fields[0].name, "billing_user_id"),
        other => panic!("unexpected result: {:?}", other),
    }

    let created = Account::create(
        &pool,
        &admin,
        CreateAccount {
            name: common::unique("account"),
            signup_user_id: Some(foreign.id),
            billing_user_id: Some(admin_user.id),
            ..Default::default()
        },
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(created.signup_user_id, None);
    assert_eq!(created.billing_user_id, Some(admin_user.id));

    let result = Account::update(
        &pool,
        &admin,
        account.id,
        UpdateAccount {
            billing_user_id: Some(foreign.id),
            ..Default::default()
        },
        Utc::now(),
    )
    .await;
    match result {
        Err(Error::Validation(fields)) => assert_eq!(fields[0].name, "billing_user_id"),
        other => panic!("unexpected result: {:?}", other),
    }
    let unchanged = Account::read(&pool, &Claims::internal(), account.id, false).await.unwrap();
    assert_eq!(unchanged.billing_user_id, account.billing_user_id);

    let peer = common::create_user(&pool).await;
    common::add_member(&pool, &peer, &account, vec![Role::User]).await;
    let updated = Account::update(
        &pool,
        &admin,
        account.id,
        UpdateAccount {
            billing_user_id: Some(peer.id),
            ..Default::default()
        },
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(updated.billing_user_id, Some(peer.id));
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_adding_unknown_user_is_not_found() {
    let pool = common::pool().await;

    let (_, account, admin) = common::tenant(&pool, vec![Role::Admin]).await;
    let result = Membership::add(
        &pool,
        &admin,
        AddMembership {
            user_id: uuid::Uuid::new_v4(),
            account_id: account.id,
            roles: vec![Role::User],
            status: None,
        },
        Utc::now(),
    )
    .await;
    assert!(matches!(result, Err(Error::NotFound)), "got {:?}", result);
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_user_updates_self_but_not_peers() {
    let pool = common::pool().await;

    let (user, account, claims) = common::tenant(&pool, vec![Role::User]).await;
    let peer = common::create_user(&pool).await;
    common::add_member(&pool, &peer, &account, vec![Role::User]).await;

    let rename = UpdateUser {
        name: Some("Lee Frontier".to_string()),
        ..Default::default()
    };

    let updated = User::update(&pool, &claims, user.id, rename.clone(), Utc::now()).await.unwrap();
    assert_eq!(updated.name, "Lee Frontier");

    let result = User::update(&pool, &claims, peer.id, rename, Utc::now()).await;
    assert!(matches!(result, Err(Error::Forbidden)));
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_membership_rules() {
    let pool = common::pool().await;

    let user = common::create_user(&pool).await;
    let account = common::create_account(&pool).await;
    let first = common::add_member(&pool, &user, &account, vec![Role::User]).await;

    let internal = Claims::internal();
    let duplicate = Membership::add(
        &pool,
        &internal,
        AddMembership {
            user_id: user.id,
            account_id: account.id,
            roles: vec![Role::Admin],
            status: None,
        },
        Utc::now(),
    )
    .await;
    match duplicate {
        Err(Error::Validation(fields)) => assert_eq!(fields[0].name, "account_id"),
        other => panic!("unexpected result: {:?}", other),
    }

    let empty_roles = Membership::add(
        &pool,
        &internal,
        AddMembership {
            user_id: user.id,
            account_id: account.id,
            roles: vec![],
            status: None,
        },
        Utc::now(),
    )
    .await;
    assert!(matches!(empty_roles, Err(Error::Validation(_))));

    Membership::archive(&pool, &internal, user.id, account.id, Utc::now()).await.unwrap();
    let revived = common::add_member(&pool, &user, &account, vec![Role::Admin]).await;
    assert_eq!(revived.id, first.id);
    assert!(revived.archived_at.is_none());
    assert_eq!(revived.roles, vec![Role::Admin]);

    Membership::delete(&pool, &internal, user.id, account.id).await.unwrap();
    let gone = Membership::find_pair(&pool, &internal, user.id, account.id, true).await.unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_unique_email_and_account_name() {
    let pool = common::pool().await;

    let user = common::create_user(&pool).await;
    let shouted = user.email.to_uppercase();
    let result = User::create(&pool, &Claims::internal(), common::new_user(&shouted), Utc::now()).await;
    match result {
        Err(Error::Validation(fields)) => assert_eq!(fields[0].name, "email"),
        other => panic!("unexpected result: {:?}", other),
    }

    let account = common::create_account(&pool).await;
    let result = Account::create(
        &pool,
        &Claims::internal(),
        CreateAccount {
            name: account.name.clone(),
            ..Default::default()
        },
        Utc::now(),
    )
    .await;
    match result {
        Err(Error::Validation(fields)) => assert_eq!(fields[0].name, "name"),
        other => panic!("unexpected result: {:?}", other),
    }

    // archived names are free again
    Account::archive(&pool, &Claims::internal(), account.id, Utc::now()).await.unwrap();
    let reused = Account::create(
        &pool,
        &Claims::internal(),
        CreateAccount {
            name: account.name.clone(),
            ..Default::default()
        },
        Utc::now(),
    )
    .await
    .unwrap();
    assert_ne!(reused.id, account.id);
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_store_unique_violation_is_validation() {
    let pool = common::pool().await;

    let user = common::create_user(&pool).await;
    let err = sqlx::query(
        "INSERT INTO users (id, name, email, password_salt, password_hash, created_at, updated_at) \
         VALUES ($1, 'x', $2, 's', 'h', now(), now())",
    )
    .bind(uuid::Uuid::new_v4())
    .bind(&user.email)
    .execute(&pool)
    .await
    .unwrap_err();

    match Error::from_store("test.insert", err) {
        Error::Validation(fields) => assert_eq!(fields[0].name, "email"),
        other => panic!("unexpected error: {:?}", other),
    }
}

async fn members_of(pool: &sqlx::PgPool, account: &Account) -> Vec<Membership> {
    let request = FindRequest::new().filter("account_id", account.id).include_archived(true);
    Membership::find(pool, &Claims::internal(), &request).await.unwrap()
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_archive_cascades_to_memberships() {
    let pool = common::pool().await;

    let (_, account, admin) = common::tenant(&pool, vec![Role::Admin]).await;
    for _ in 0..2 {
        let user = common::create_user(&pool).await;
        common::add_member(&pool, &user, &account, vec![Role::User]).await;
    }
    assert_eq!(members_of(&pool, &account).await.len(), 3);

    let now = Utc::now() + Duration::nanoseconds(123_456);
    let archived = Account::archive(&pool, &admin, account.id, now).await.unwrap();
    assert_eq!(archived.archived_at, Some(truncate_ms(now)));

    let memberships = members_of(&pool, &account).await;
    assert_eq!(memberships.len(), 3);
    for membership in &memberships {
        assert_eq!(membership.archived_at, Some(truncate_ms(now)));
    }

    assert!(matches!(Account::read(&pool, &admin, account.id, true).await, Err(Error::NotFound)));
    let internal = Account::read(&pool, &Claims::internal(), account.id, true).await.unwrap();
    assert_eq!(internal.archived_at, archived.archived_at);
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_failed_membership_archive_rolls_back_account() {
    let pool = common::pool().await;

    let (_, account, admin) = common::tenant(&pool, vec![Role::Admin]).await;
    for _ in 0..2 {
        let user = common::create_user(&pool).await;
        common::add_member(&pool, &user, &account, vec![Role::User]).await;
    }

    // fail the membership UPDATE that follows the account write, for this account only
    let name = format!("fail_archive_{}", account.id.simple());
    sqlx::query(&format!(
        "CREATE FUNCTION {name}() RETURNS trigger AS $$ \
         BEGIN RAISE EXCEPTION 'membership archive blocked'; END $$ LANGUAGE plpgsql"
    ))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(&format!(
        "CREATE TRIGGER {name} BEFORE UPDATE ON users_accounts FOR EACH ROW \
         WHEN (OLD.account_id = '{}'::uuid) EXECUTE FUNCTION {name}()",
        account.id
    ))
    .execute(&pool)
    .await
    .unwrap();

    let result = Account::archive(&pool, &admin, account.id, Utc::now()).await;

    sqlx::query(&format!("DROP TRIGGER {name} ON users_accounts"))
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(&format!("DROP FUNCTION {name}()")).execute(&pool).await.unwrap();

    assert!(matches!(result, Err(Error::Internal(_))), "got {:?}", result);

    let reloaded = Account::read(&pool, &Claims::internal(), account.id, false).await.unwrap();
    assert_eq!(reloaded.archived_at, None);
    assert_eq!(reloaded.updated_at, account.updated_at);

    let memberships = members_of(&pool, &account).await;
    assert_eq!(memberships.len(), 3);
    assert!(memberships.iter().all(|m| m.archived_at.is_none()));
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_user_archive_cascades_to_memberships() {
    let pool = common::pool().await;

    let (user, account, _) = common::tenant(&pool, vec![Role::User]).await;
    User::archive(&pool, &Claims::internal(), user.id, Utc::now()).await.unwrap();

    let live = Membership::find_pair(&pool, &Claims::internal(), user.id, account.id, false).await.unwrap();
    assert!(live.is_none());
    assert!(User::find_by_email(&pool, &user.email).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_account_delete_removes_dependents() {
    let pool = common::pool().await;

    let (user, account, admin) = common::tenant(&pool, vec![Role::Admin]).await;
    let project = project_in(&pool, &account, "doomed").await;

    Account::delete(&pool, &admin, account.id).await.unwrap();

    let internal = Claims::internal();
    assert!(matches!(Account::read(&pool, &internal, account.id, true).await, Err(Error::NotFound)));
    assert!(matches!(Project::read(&pool, &internal, project.id, true).await, Err(Error::NotFound)));
    assert!(Membership::find_pair(&pool, &internal, user.id, account.id, true).await.unwrap().is_none());

    // the user outlives the account
    User::read(&pool, &internal, user.id, false).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_timestamps_round_trip_at_millisecond_precision() {
    let pool = common::pool().await;

    let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap() + Duration::nanoseconds(535_897_932);
    let expected = truncate_ms(now);
    assert_eq!(expected.timestamp_subsec_nanos(), 535_000_000);

    let data = CreateAccount {
        name: common::unique("account"),
        ..Default::default()
    };
    let account = Account::create(&pool, &Claims::internal(), data, now).await.unwrap();
    assert_eq!(account.created_at, expected);
    assert_eq!(account.updated_at, expected);

    let read = Account::read(&pool, &Claims::internal(), account.id, false).await.unwrap();
    assert_eq!(read.created_at, expected);
    assert_eq!(read.updated_at, expected);
    assert_eq!(read, account);
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_archived_membership_revokes_access() {
    let pool = common::pool().await;

    let (user, account, _) = common::tenant(&pool, vec![Role::Admin]).await;
    Membership::archive(&pool, &Claims::internal(), user.id, account.id, Utc::now()).await.unwrap();

    // a token minted before the archive no longer reaches the account
    let stale = Claims::new(user.id, account.id, vec![account.id], vec![Role::Admin], Utc::now(), Duration::hours(1));
    assert!(matches!(Account::read(&pool, &stale, account.id, false).await, Err(Error::NotFound)));
}

#[tokio::test]
#[ignore] // Requires running Postgres instance
async fn test_cancelled_operation_returns_cancelled() {
    let pool = common::pool().await;

    let account = common::create_account(&pool).await;
    let token = CancellationToken::new();
    token.cancel();

    let result = cancellable(&token, Account::read(&pool, &Claims::internal(), account.id, false)).await;
    assert!(matches!(result, Err(Error::Cancelled)));
}
