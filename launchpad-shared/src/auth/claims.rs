/// Verified token payload
///
/// Claims identify who is calling (`subject`), which account they are acting in
/// (`audience`), which accounts they may switch to (`account_ids`), and the
/// roles they hold in the audience account. Every repository call takes
/// `&Claims` explicitly; nothing is read from ambient request state.
///
/// # Wire format
///
/// ```json
/// { "sub": "...", "aud": "...", "acc": ["..."], "roles": ["admin"], "iat": 1735689600, "exp": 1735693200 }
/// ```
///
/// Instants are carried at one-second resolution.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::membership::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    #[serde(rename = "sub")]
    pub subject: Uuid,

    /// Selected account ID
    #[serde(rename = "aud")]
    pub audience: Uuid,

    /// Every account the subject may switch to
    #[serde(rename = "acc", default)]
    pub account_ids: Vec<Uuid>,

    /// Roles held in the audience account
    #[serde(default)]
    pub roles: Vec<Role>,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    /// Builds claims issued at `now` and valid for `ttl`
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use launchpad_shared::auth::claims::Claims;
    /// use launchpad_shared::models::membership::Role;
    /// use uuid::Uuid;
    ///
    /// let account = Uuid::new_v4();
    /// let claims = Claims::new(Uuid::new_v4(), account, vec![account], vec![Role::Admin], Utc::now(), Duration::hours(1));
    /// assert!(claims.is_admin_of(account));
    /// ```
    pub fn new(
        subject: Uuid,
        audience: Uuid,
        account_ids: Vec<Uuid>,
        roles: Vec<Role>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let issued_at = now.with_nanosecond(0).unwrap_or(now);
        Self {
            subject,
            audience,
            account_ids,
            roles,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    /// The internal claims value used by the core for its own lookups
    ///
    /// Internal claims bypass ACL scoping. They are never accepted from a token.
    pub fn internal() -> Self {
        Self {
            subject: Uuid::nil(),
            audience: Uuid::nil(),
            account_ids: Vec::new(),
            roles: Vec::new(),
            issued_at: DateTime::<Utc>::default(),
            expires_at: DateTime::<Utc>::default(),
        }
    }

    /// True when both subject and audience are nil
    pub fn is_internal(&self) -> bool {
        self.subject.is_nil() && self.audience.is_nil()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// True when the caller is acting in `account_id` with the admin role
    pub fn is_admin_of(&self, account_id: Uuid) -> bool {
        self.audience == account_id && self.has_role(Role::Admin)
    }

    pub fn can_switch_to(&self, account_id: Uuid) -> bool {
        self.account_ids.contains(&account_id)
    }
}
