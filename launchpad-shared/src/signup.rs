/// Self-service signup
///
/// Creates an account, its first user, and the admin membership linking them
/// in one transaction: either all three rows exist afterwards or none do.
///
/// Validation runs in two phases before anything is written. Structural rules
/// for both halves of the request are collected together, field names
/// prefixed with `account.` and `user.`; uniqueness of the email and the
/// account name is checked second.
///
/// # Example
///
/// ```no_run
/// use launchpad_shared::models::account::CreateAccount;
/// use launchpad_shared::models::user::CreateUser;
/// use launchpad_shared::signup::{signup, SignupRequest};
///
/// # async fn example(pool: sqlx::PgPool) -> launchpad_shared::Result<()> {
/// let result = signup(&pool, SignupRequest {
///     account: CreateAccount { name: "Frontier".to_string(), ..Default::default() },
///     user: CreateUser {
///         name: "Lee".to_string(),
///         email: "lee@frontier.test".to_string(),
///         password: "pw!Fr0nt1er".to_string(),
///         password_confirm: "pw!Fr0nt1er".to_string(),
///         timezone: None,
///     },
/// }, chrono::Utc::now()).await?;
///
/// assert_eq!(result.account.signup_user_id, Some(result.user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Acquire, Postgres};

use crate::auth::claims::Claims;
use crate::error::{db_err, Error, FieldError, Result};
use crate::models::account::{Account, AccountStatus, CreateAccount};
use crate::models::membership::{AddMembership, Membership, MembershipStatus, Role};
use crate::models::user::{CreateUser, HashedPassword, User};
use crate::validation::{normalize_email, validate_prefixed};

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub account: CreateAccount,
    pub user: CreateUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupResult {
    pub account: Account,
    pub user: User,
}

fn structural_errors(request: &SignupRequest) -> Vec<FieldError> {
    let mut fields = validate_prefixed(&request.account, "account");
    fields.extend(validate_prefixed(&request.user, "user"));
    fields
}

/// Moves the fields of a validation error under `prefix`; other errors pass through
fn under(prefix: &'static str) -> impl Fn(Error) -> Error {
    move |error| match error {
        Error::Validation(fields) => Error::Validation(
            fields
                .into_iter()
                .map(|f| FieldError::new(format!("{}.{}", prefix, f.name), f.message))
                .collect(),
        ),
        other => other,
    }
}

fn prefixed(result: Result<()>, prefix: &'static str) -> Result<Vec<FieldError>> {
    match result.map_err(under(prefix)) {
        Ok(()) => Ok(Vec::new()),
        Err(Error::Validation(fields)) => Ok(fields),
        Err(e) => Err(e),
    }
}

async fn check_unique<'c, A>(db: A, request: &SignupRequest) -> Result<()>
where
    A: Acquire<'c, Database = Postgres>,
{
    let mut conn = db.acquire().await.map_err(db_err("signup.check_unique"))?;

    let mut fields = prefixed(User::unique_email(&mut *conn, &request.user.email, None).await, "user")?;
    fields.extend(prefixed(Account::unique_name(&mut *conn, &request.account.name, None).await, "account")?);

    if fields.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(fields))
    }
}

/// Creates the account, its first user, and their admin membership
///
/// The password is hashed before the transaction opens. A unique-index
/// violation lost to a concurrent signup reports the same prefixed field as
/// the pre-check.
pub async fn signup<'c, A>(db: A, mut request: SignupRequest, now: DateTime<Utc>) -> Result<SignupResult>
where
    A: Acquire<'c, Database = Postgres>,
{
    request.account.status.get_or_insert(AccountStatus::Active);
    request.user.email = normalize_email(&request.user.email);

    let fields = structural_errors(&request);
    if !fields.is_empty() {
        return Err(Error::Validation(fields));
    }

    let password = HashedPassword::new(request.user.password.clone()).await?;

    let mut tx = db.begin().await.map_err(db_err("signup"))?;
    check_unique(&mut *tx, &request).await?;

    let internal = Claims::internal();
    let user = User::insert(&mut *tx, &request.user, &password, now)
        .await
        .map_err(under("user"))?;

    let account = Account::create(
        &mut *tx,
        &internal,
        CreateAccount {
            signup_user_id: Some(user.id),
            billing_user_id: Some(user.id),
            ..request.account
        },
        now,
    )
    .await
    .map_err(under("account"))?;

    Membership::add(
        &mut *tx,
        &internal,
        AddMembership {
            user_id: user.id,
            account_id: account.id,
            roles: vec![Role::Admin],
            status: Some(MembershipStatus::Active),
        },
        now,
    )
    .await?;

    tx.commit().await.map_err(db_err("signup"))?;

    tracing::info!(user_id = %user.id, account_id = %account.id, "Signup completed");
    Ok(SignupResult { account, user })
}
