use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{AuthResponse, PublicUser, SignupRequest, UpdateMeRequest, UpdatePasswordRequest},
    jwt::JwtKeys,
    password::PasswordHasher,
    repo::{StoreError, UserStore},
    repo_types::{NewUser, ProfileChanges, Role, UserRecord},
};
use crate::error::{AppError, AppResult, AuthError};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Backdates `password_changed_at` so a token signed in the same second as
/// the change still passes the epoch check.
const PASSWORD_CHANGE_SKEW: TimeDuration = TimeDuration::seconds(1);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Returns the value when present and not blank.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_new_password(password: Option<String>, confirm: Option<String>) -> AppResult<String> {
    let password =
        present(password).ok_or_else(|| AppError::validation("Please provide a password!"))?;
    let confirm =
        present(confirm).ok_or_else(|| AppError::validation("Please confirm your password!"))?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    if password != confirm {
        return Err(AppError::validation("Passwords are not the same!"));
    }
    Ok(password)
}

fn check_email(email: Option<String>) -> AppResult<String> {
    let email = present(email)
        .map(|e| normalize_email(&e))
        .ok_or_else(|| AppError::validation("A user must have an email!"))?;
    if !is_valid_email(&email) {
        return Err(AppError::validation("Please provide a valid email!"));
    }
    Ok(email)
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AppError::validation("Email already in use"),
            StoreError::Other(e) => AppError::Internal(e),
        }
    }
}

/// Signup, login, route protection, role checks and password changes over a
/// [`UserStore`]. Keys and hashing cost are fixed at construction.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
    hasher: PasswordHasher,
    /// Verified against when the email is unknown, so both login failure
    /// paths cost one Argon2 run.
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        keys: JwtKeys,
        hasher: PasswordHasher,
    ) -> anyhow::Result<Self> {
        let dummy_hash = hasher.hash(&Uuid::new_v4().to_string())?;
        Ok(Self {
            store,
            keys,
            hasher,
            dummy_hash,
        })
    }

    fn issue(&self, user: UserRecord) -> AppResult<AuthResponse> {
        let token = self.keys.sign(user.id)?;
        Ok(AuthResponse {
            user: user.into(),
            token,
        })
    }

    #[instrument(skip(self, req))]
    pub async fn signup(&self, req: SignupRequest) -> AppResult<AuthResponse> {
        let name = present(req.name)
            .map(|n| n.trim().to_string())
            .ok_or_else(|| AppError::validation("A user must have a name!"))?;
        let email = check_email(req.email)?;
        let password = check_new_password(req.password, req.password_confirm)?;

        let password_hash = self.hasher.hash_async(password).await?;
        let user = self
            .store
            .create(NewUser {
                name,
                email,
                phone: req.phone.unwrap_or_default().trim().to_string(),
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(|e| {
                if matches!(e, StoreError::DuplicateEmail) {
                    warn!("signup with email already registered");
                }
                AppError::from(e)
            })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        self.issue(user)
    }

    #[instrument(skip(self, email, password))]
    pub async fn login(
        &self,
        email: Option<String>,
        password: Option<String>,
    ) -> AppResult<AuthResponse> {
        let (Some(email), Some(password)) = (present(email), present(password)) else {
            return Err(AuthError::MissingCredentials.into());
        };
        let email = normalize_email(&email);

        let Some(user) = self.store.find_active_by_email(&email).await? else {
            self.hasher
                .verify_async(password, self.dummy_hash.clone())
                .await?;
            warn!("login unknown email");
            return Err(AuthError::InvalidCredentials.into());
        };

        if !self
            .hasher
            .verify_async(password, user.password_hash.clone())
            .await?
        {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials.into());
        }

        info!(user_id = %user.id, "user logged in");
        self.issue(user)
    }

    /// Resolves a bearer token to a live user. Tokens minted before the
    /// user's last password change are rejected.
    #[instrument(skip(self, token))]
    pub async fn protect(&self, token: Option<&str>) -> AppResult<UserRecord> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NotLoggedIn)?;

        let claims = self.keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AuthError::InvalidToken
        })?;

        let Some(user) = self.store.find_active_by_id(claims.sub).await? else {
            warn!(user_id = %claims.sub, "token subject no longer exists");
            return Err(AuthError::UserNoLongerExists.into());
        };

        if user.changed_password_after(claims.iat) {
            warn!(user_id = %user.id, "token predates password change");
            return Err(AuthError::PasswordChanged.into());
        }

        Ok(user)
    }

    pub fn restrict_to(&self, allowed: &[Role], user: &UserRecord) -> AppResult<()> {
        if !allowed.contains(&user.role) {
            warn!(user_id = %user.id, role = %user.role, "role not permitted");
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    #[instrument(skip(self, req))]
    pub async fn update_password(
        &self,
        user_id: Uuid,
        req: UpdatePasswordRequest,
    ) -> AppResult<AuthResponse> {
        let Some(user) = self.store.find_active_by_id(user_id).await? else {
            return Err(AuthError::UserNoLongerExists.into());
        };

        let Some(current) = present(req.password_current) else {
            return Err(AuthError::WrongCurrentPassword.into());
        };
        if !self
            .hasher
            .verify_async(current, user.password_hash.clone())
            .await?
        {
            warn!(user_id = %user.id, "update password with wrong current password");
            return Err(AuthError::WrongCurrentPassword.into());
        }

        let password = check_new_password(req.password, req.password_confirm)?;
        let password_hash = self.hasher.hash_async(password).await?;
        let changed_at = OffsetDateTime::now_utc() - PASSWORD_CHANGE_SKEW;

        let Some(user) = self
            .store
            .update_password(user.id, &password_hash, changed_at)
            .await?
        else {
            return Err(AuthError::UserNoLongerExists.into());
        };

        info!(user_id = %user.id, "password updated");
        self.issue(user)
    }

    pub fn me(&self, user: UserRecord) -> PublicUser {
        user.into()
    }

    #[instrument(skip(self, req))]
    pub async fn update_me(&self, user_id: Uuid, req: UpdateMeRequest) -> AppResult<PublicUser> {
        if req.password.is_some() || req.password_confirm.is_some() {
            return Err(AppError::validation(
                "This route is not for password updates. Please use /updatePassword.",
            ));
        }

        let name = match req.name {
            Some(n) if n.trim().is_empty() => {
                return Err(AppError::validation("A user must have a name!"))
            }
            Some(n) => Some(n.trim().to_string()),
            None => None,
        };
        let email = match req.email {
            Some(e) => Some(check_email(Some(e))?),
            None => None,
        };
        let changes = ProfileChanges {
            name,
            email,
            phone: req.phone.map(|p| p.trim().to_string()),
        };

        let Some(user) = self.store.update_profile(user_id, changes).await? else {
            return Err(AuthError::UserNoLongerExists.into());
        };
        info!(user_id = %user.id, "profile updated");
        Ok(user.into())
    }

    #[instrument(skip(self))]
    pub async fn delete_me(&self, user_id: Uuid) -> AppResult<()> {
        if !self.store.deactivate(user_id).await? {
            return Err(AuthError::UserNoLongerExists.into());
        }
        info!(%user_id, "user deactivated");
        Ok(())
    }

    pub async fn list_users(&self) -> AppResult<Vec<PublicUser>> {
        let users = self.store.list_active().await?;
        Ok(users.into_iter().map(PublicUser::from).collect())
    }
}

#[cfg(test)]
pub(crate) fn test_service() -> (AuthService, Arc<super::memory::MemoryUserStore>) {
    let store = Arc::new(super::memory::MemoryUserStore::new());
    let service = AuthService::new(
        store.clone(),
        super::jwt::test_keys(),
        super::password::cheap_hasher(),
    )
    .expect("test service");
    (service, store)
}
